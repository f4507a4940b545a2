use std::collections::BTreeMap;

use log::{debug, warn};
use network::TipSet;

use crate::CoalescentError;

/// Sparse map from site-pattern tipset to accumulated branch length, summed
/// across replicates and eventually normalized into a probability
/// distribution. Never carries an entry for the empty tipset or the
/// all-samples tipset — both are reserved and meaningless as site patterns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchTable {
    values: BTreeMap<TipSet, f64>,
}

impl BranchTable {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, key: TipSet, length: f64) {
        *self.values.entry(key).or_insert(0.0) += length;
    }

    #[must_use]
    pub fn get(&self, key: TipSet) -> f64 { self.values.get(&key).copied().unwrap_or(0.0) }

    #[must_use]
    pub fn len(&self) -> usize { self.values.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&TipSet, &f64)> { self.values.iter() }

    /// Sum another table's entries into this one, key by key.
    pub fn merge(&mut self, other: &Self) {
        for (&key, &value) in &other.values {
            self.add(key, value);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for value in self.values.values_mut() { *value *= factor; }
    }

    pub fn divide_by(&mut self, divisor: f64) {
        for value in self.values.values_mut() { *value /= divisor; }
    }

    /// Divide every entry by the table's total mass.
    ///
    /// # Errors
    /// [`CoalescentError::EmptyBranchTable`] if the table is empty or its
    /// entries sum to zero — both indicate a broken upstream, not a
    /// recoverable condition.
    pub fn normalize(&mut self) -> Result<(), CoalescentError> {
        let sum: f64 = self.values.values().sum();
        if self.values.is_empty() || sum == 0.0 {
            warn!("Cannot normalize a branch table with {} entries summing to {sum}", self.values.len());
            return Err(CoalescentError::EmptyBranchTable);
        }
        debug!("Normalizing branch table with {} site patterns, total mass {sum}", self.values.len());
        self.divide_by(sum);
        Ok(())
    }

    /// Subtract `other`'s entries from this table, key by key, aligning on
    /// the union of both tables' keys.
    pub fn minus_equals(&mut self, other: &Self) {
        for (&key, &value) in &other.values {
            *self.values.entry(key).or_insert(0.0) -= value;
        }
    }

    /// `Σ o(b) · log(o(b)/e(b))` over keys where `o(b) > 0`.
    ///
    /// # Errors
    /// [`CoalescentError::MissingKey`] if `observed` carries a positive-mass
    /// key absent from `estimated`.
    pub fn kl_divergence(observed: &Self, estimated: &Self) -> Result<f64, CoalescentError> {
        let mut acc = 0.0;
        for (&key, &o) in &observed.values {
            if o <= 0.0 { continue; }
            let e = estimated.values.get(&key).copied()
                .ok_or(CoalescentError::MissingKey(key))?;
            acc += o * (o / e).ln();
        }
        Ok(acc)
    }

    /// Two parallel arrays (keys, values), ordered by key — `TipSet`'s
    /// `Ord` is plain integer order, and the table is backed by a
    /// `BTreeMap`, so this ordering falls out of iteration for free.
    #[must_use]
    pub fn to_arrays(&self) -> (Vec<TipSet>, Vec<f64>) {
        self.values.iter().map(|(&k, &v)| (k, v)).unzip()
    }
}
