use std::collections::HashMap;

use log::{debug, trace, warn};

mod error;
mod expr;

pub use error::ParamError;
pub use expr::Expr;

/// Stable, process-local identity for a [`Parameter`] within a [`ParameterStore`].
///
/// Handles are plain array indices, not pointers: a store can be `clone()`d
/// wholesale and every handle minted from the original remains valid against
/// the clone, which is what makes per-worker duplication of a population DAG
/// (whose segments hold these handles) a trivial `Vec::clone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamCategory {
    PopSize,
    Time,
    MixFrac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStatus {
    Fixed,
    Free,
    Constrained,
    Arbitrary,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
    pub category: ParamCategory,
    pub status: ParamStatus,
    constraint: Option<Expr>,
}

impl Parameter {
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) { (self.lo, self.hi) }
}

/// Declaration input for [`ParameterStore::new`]: one entry per `fixed` or
/// `free` parameter line in the population-description grammar.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
    pub category: ParamCategory,
}

/// Declaration input for a `constrained` parameter: the constraint
/// expression is compiled against names already declared (fixed, free, or
/// an earlier constrained entry), in declaration order.
#[derive(Debug, Clone)]
pub struct ConstrainedDecl {
    pub name: String,
    pub expr_src: String,
    pub category: ParamCategory,
}

/// Owns every scalar parameter for one optimization run: population sizes,
/// split/admixture times, and mixture fractions. Entries keep a stable
/// [`ParamHandle`] for their whole lifetime; `constrained` entries recompute
/// their value as a pure function of other parameters on every [`Self::set_free`].
#[derive(Debug, Clone)]
pub struct ParameterStore {
    params: Vec<Parameter>,
    name_index: HashMap<String, ParamHandle>,
    free_handles: Vec<ParamHandle>,
    constrained_handles: Vec<ParamHandle>,
}

impl ParameterStore {
    /// Build a store from `fixed` and `free` declarations plus `constrained`
    /// declarations (evaluated in the given order, so a constrained
    /// parameter may reference an earlier constrained one).
    ///
    /// # Errors
    /// Fails on a duplicate parameter name, or on a constraint expression
    /// referencing an undeclared name — both are treated as fatal
    /// construction-time errors, per the non-fatal/fatal split for parameter
    /// failures (constraint *evaluation* failures like division by zero are
    /// separately reported later, through [`Self::set_free`]).
    pub fn new(fixed: &[ParamDecl], free: &[ParamDecl], constrained: &[ConstrainedDecl]) -> Result<Self, ParamError> {
        let mut params = Vec::with_capacity(fixed.len() + free.len() + constrained.len());
        let mut name_index = HashMap::new();
        let mut free_handles = Vec::with_capacity(free.len());

        for decl in fixed {
            Self::push_scalar(&mut params, &mut name_index, decl, ParamStatus::Fixed)?;
        }
        for decl in free {
            let handle = Self::push_scalar(&mut params, &mut name_index, decl, ParamStatus::Free)?;
            free_handles.push(handle);
        }

        let mut constrained_handles = Vec::with_capacity(constrained.len());
        for decl in constrained {
            if name_index.contains_key(&decl.name) {
                return Err(ParamError::DuplicateName(decl.name.clone()));
            }
            let handle = ParamHandle(params.len());
            let resolver = |name: &str| name_index.get(name).copied();
            let expr = expr::parse(&decl.name, &decl.expr_src, resolver)?;
            let value = expr.eval(&params.iter().map(|p| p.value).collect::<Vec<_>>(), &decl.name)
                .unwrap_or(f64::NAN);
            params.push(Parameter{
                name: decl.name.clone(),
                value,
                lo: f64::NEG_INFINITY,
                hi: f64::INFINITY,
                category: decl.category,
                status: ParamStatus::Constrained,
                constraint: Some(expr),
            });
            name_index.insert(decl.name.clone(), handle);
            constrained_handles.push(handle);
        }

        debug!(
            "Built parameter store: {} fixed/free, {} constrained",
            fixed.len() + free.len(), constrained_handles.len(),
        );
        Ok(Self{params, name_index, free_handles, constrained_handles})
    }

    fn push_scalar(
        params: &mut Vec<Parameter>,
        name_index: &mut HashMap<String, ParamHandle>,
        decl: &ParamDecl,
        status: ParamStatus,
    ) -> Result<ParamHandle, ParamError> {
        if name_index.contains_key(&decl.name) {
            return Err(ParamError::DuplicateName(decl.name.clone()));
        }
        let handle = ParamHandle(params.len());
        params.push(Parameter{
            name: decl.name.clone(),
            value: decl.value,
            lo: decl.lo,
            hi: decl.hi,
            category: decl.category,
            status,
            constraint: None,
        });
        name_index.insert(decl.name.clone(), handle);
        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, handle: ParamHandle) -> &Parameter { &self.params[handle.0] }

    #[must_use]
    pub fn get_value(&self, handle: ParamHandle) -> f64 { self.params[handle.0].value }

    #[must_use]
    pub fn handle_of(&self, name: &str) -> Option<ParamHandle> { self.name_index.get(name).copied() }

    #[must_use]
    pub fn get_free_bounds(&self) -> Vec<(f64, f64)> {
        self.free_handles.iter().map(|h| self.params[h.0].bounds()).collect()
    }

    #[must_use]
    pub fn get_free(&self) -> Vec<f64> {
        self.free_handles.iter().map(|h| self.params[h.0].value).collect()
    }

    /// Overwrite every free parameter's value from `values` (same order as
    /// [`Self::get_free`]/[`Self::get_free_bounds`]), then recompute every
    /// constrained parameter in declaration order.
    ///
    /// # Errors
    /// Returns [`ParamError::FreeVectorLengthMismatch`] on a length mismatch,
    /// or [`ParamError::DivisionByZero`] if a constraint divides by zero —
    /// the latter is the "infeasible parameter vector" case and is not a
    /// panic: callers should treat it as +infinity cost, not a crash.
    pub fn set_free(&mut self, values: &[f64]) -> Result<(), ParamError> {
        if values.len() != self.free_handles.len() {
            return Err(ParamError::FreeVectorLengthMismatch(self.free_handles.len(), values.len()));
        }
        for (handle, value) in self.free_handles.iter().zip(values) {
            self.params[handle.0].value = *value;
        }
        for handle in self.constrained_handles.clone() {
            let (name, constraint) = {
                let p = &self.params[handle.0];
                (p.name.clone(), p.constraint.clone().expect("constrained parameter always carries an expression"))
            };
            let scratch: Vec<f64> = self.params.iter().map(|p| p.value).collect();
            let value = constraint.eval(&scratch, &name)?;
            trace!("Recomputed constrained parameter '{name}' = {value}");
            self.params[handle.0].value = value;
        }
        Ok(())
    }

    /// Check every parameter's current value against its bounds (mixture
    /// fractions additionally against `[0, 1]`). Used to decide whether a
    /// free-vector move is feasible before running replicates against it.
    ///
    /// # Errors
    /// Returns the first out-of-bounds or out-of-range parameter found.
    pub fn feasible(&self) -> Result<(), ParamError> {
        for p in &self.params {
            if p.category == ParamCategory::MixFrac && !(0.0..=1.0).contains(&p.value) {
                warn!("Infeasible parameter vector: mixture fraction '{}' = {} is outside [0, 1]", p.name, p.value);
                return Err(ParamError::InvalidMixFrac(p.name.clone(), p.value));
            }
            if p.value.is_nan() || p.value < p.lo || p.value > p.hi {
                warn!("Infeasible parameter vector: '{}' = {} is outside [{}, {}]", p.name, p.value, p.lo, p.hi);
                return Err(ParamError::OutOfBounds(p.name.clone(), p.value, p.lo, p.hi));
            }
        }
        Ok(())
    }

    /// Clone the store so a caller holding [`ParamHandle`]s (e.g. a
    /// population DAG's segments) can re-target them at an independent
    /// per-worker copy with no pointer fix-up: handles are plain indices, so
    /// they stay valid against the clone unchanged.
    #[must_use]
    pub fn duplicate(&self) -> Self { self.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn sample_store() -> ParameterStore {
        let fixed = vec![ParamDecl{name: "twoN_a".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize}];
        let free = vec![
            ParamDecl{name: "t_split".into(), value: 0.5, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
            ParamDecl{name: "m_a".into(), value: 0.5, lo: 0.0, hi: 1.0, category: ParamCategory::MixFrac},
        ];
        let constrained = vec![
            ConstrainedDecl{name: "t_double".into(), expr_src: "t_split * 2".into(), category: ParamCategory::Time},
        ];
        ParameterStore::new(&fixed, &free, &constrained).unwrap()
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let fixed = vec![
            ParamDecl{name: "a".into(), value: 1.0, lo: 0.0, hi: 1.0, category: ParamCategory::PopSize},
            ParamDecl{name: "a".into(), value: 2.0, lo: 0.0, hi: 1.0, category: ParamCategory::PopSize},
        ];
        let err = ParameterStore::new(&fixed, &[], &[]).unwrap_err();
        assert!(matches!(err, ParamError::DuplicateName(_)));
    }

    #[test]
    fn undefined_constraint_reference_is_fatal_at_construction() {
        let constrained = vec![ConstrainedDecl{name: "c".into(), expr_src: "ghost + 1".into(), category: ParamCategory::Time}];
        let err = ParameterStore::new(&[], &[], &constrained).unwrap_err();
        assert!(matches!(err, ParamError::UndefinedReference(_, _)));
    }

    #[test]
    fn set_free_recomputes_constrained_values_in_declaration_order() {
        let mut store = sample_store();
        store.set_free(&[2.0, 0.25]).unwrap();
        let t_double = store.get_value(store.handle_of("t_double").unwrap());
        assert!(approx_eq!(f64, t_double, 4.0));
    }

    #[test]
    fn get_free_set_free_round_trips() {
        let mut store = sample_store();
        let original = store.get_free();
        store.set_free(&original).unwrap();
        assert_eq!(store.get_free(), original);
    }

    #[test]
    fn set_free_rejects_wrong_length() {
        let mut store = sample_store();
        let err = store.set_free(&[1.0]).unwrap_err();
        assert!(matches!(err, ParamError::FreeVectorLengthMismatch(2, 1)));
    }

    #[test]
    fn division_by_zero_constraint_is_reported_not_panicking() {
        let free = vec![ParamDecl{name: "denom".into(), value: 1.0, lo: -10.0, hi: 10.0, category: ParamCategory::Time}];
        let constrained = vec![ConstrainedDecl{name: "ratio".into(), expr_src: "1 / denom".into(), category: ParamCategory::Time}];
        let mut store = ParameterStore::new(&[], &free, &constrained).unwrap();
        let err = store.set_free(&[0.0]).unwrap_err();
        assert!(matches!(err, ParamError::DivisionByZero(_)));
    }

    #[test]
    fn feasible_detects_negative_pop_size() {
        let mut store = sample_store();
        let handle = store.handle_of("twoN_a").unwrap();
        // simulate an infeasible optimizer move directly on the underlying slot.
        store.params[handle.0].value = -1.0;
        let err = store.feasible().unwrap_err();
        assert!(matches!(err, ParamError::OutOfBounds(..)));
    }

    #[test]
    fn feasible_detects_out_of_range_mixfrac() {
        let mut store = sample_store();
        store.set_free(&[0.5, 1.5]).unwrap();
        let err = store.feasible().unwrap_err();
        assert!(matches!(err, ParamError::InvalidMixFrac(_, _)));
    }

    #[test]
    fn duplicate_is_independent_and_handles_stay_valid() {
        let store = sample_store();
        let mut dup = store.duplicate();
        let handle = store.handle_of("t_split").unwrap();
        dup.set_free(&[9.0, 0.1]).unwrap();
        assert!(approx_eq!(f64, store.get_value(handle), 0.5));
        assert!(approx_eq!(f64, dup.get_value(handle), 9.0));
    }
}
