use std::collections::HashMap;

use log::{debug, trace};
use params::{ParamHandle, ParameterStore};

use crate::NetworkError;

/// Stable, process-local identity for a [`Segment`] within a [`PopulationDag`].
///
/// As with [`params::ParamHandle`], this is a plain array index rather than a
/// pointer: duplicating the whole DAG for a worker thread is then a trivial
/// `clone`, and every handle minted from the original stays valid against the
/// clone with no address fix-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegHandle(pub usize);

/// One edge of the population DAG: a constant-size population over a time
/// interval, optionally receiving samples and optionally splitting into or
/// merging from other segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub twon: ParamHandle,
    pub start: ParamHandle,
    /// Shared by identity with the start-time handle of this segment's
    /// (unique, in the single-parent case) parent — or, for an admixture
    /// child, with both parents' start handle. `None` denotes the open
    /// upward interval at the root.
    pub end: Option<ParamHandle>,
    /// Set only on the introgressor edge of an admixture node.
    pub mix_frac: Option<ParamHandle>,
    pub parents: Vec<SegHandle>,
    pub children: Vec<SegHandle>,
    /// Bit positions (into the run's `LabelIndex`) of samples declared at
    /// this segment.
    pub tips: Vec<u32>,
}

/// The population network: segments wired into a DAG by split (`derive`) and
/// admixture (`mix`) edges, sharing parameter handles with a [`ParameterStore`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PopulationDag {
    segments: Vec<Segment>,
    name_index: HashMap<String, SegHandle>,
}

impl PopulationDag {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// # Errors
    /// [`NetworkError::DuplicateSegment`] if `name` was already declared.
    pub fn add_segment(&mut self, name: &str, twon: ParamHandle, start: ParamHandle, tips: Vec<u32>) -> Result<SegHandle, NetworkError> {
        if self.name_index.contains_key(name) {
            return Err(NetworkError::DuplicateSegment(name.to_string()));
        }
        let handle = SegHandle(self.segments.len());
        self.segments.push(Segment{
            name: name.to_string(), twon, start, end: None, mix_frac: None,
            parents: Vec::new(), children: Vec::new(), tips,
        });
        self.name_index.insert(name.to_string(), handle);
        Ok(handle)
    }

    #[must_use]
    pub fn handle_of(&self, name: &str) -> Option<SegHandle> { self.name_index.get(name).copied() }

    #[must_use]
    pub fn get(&self, handle: SegHandle) -> &Segment { &self.segments[handle.0] }

    #[must_use]
    pub fn len(&self) -> usize { self.segments.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.segments.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (SegHandle, &Segment)> {
        self.segments.iter().enumerate().map(|(i, s)| (SegHandle(i), s))
    }

    /// Wire a single `derive` edge: `child` joins `parent` at `parent.start`.
    ///
    /// # Errors
    /// [`NetworkError::TooManyChildren`]/[`NetworkError::TooManyParents`] if
    /// either side is already saturated; [`NetworkError::DateMismatch`] if
    /// `child.start` postdates `parent.start`.
    pub fn add_child(&mut self, parent: SegHandle, child: SegHandle, params: &ParameterStore) -> Result<(), NetworkError> {
        self.link(parent, child, None, params)
    }

    /// Wire a `mix` edge: `child` is formed by `native` (weight `1 -
    /// mix_frac`) and `introgressor` (weight `mix_frac`), both required to
    /// share `child`'s end time.
    ///
    /// # Errors
    /// Same as [`Self::add_child`], applied to both parent edges.
    pub fn mix(&mut self, child: SegHandle, mix_frac: ParamHandle, native: SegHandle, introgressor: SegHandle, params: &ParameterStore) -> Result<(), NetworkError> {
        self.link(native, child, None, params)?;
        self.link(introgressor, child, Some(mix_frac), params)?;
        Ok(())
    }

    fn link(&mut self, parent: SegHandle, child: SegHandle, mix_frac: Option<ParamHandle>, params: &ParameterStore) -> Result<(), NetworkError> {
        if self.segments[parent.0].children.len() >= 2 {
            return Err(NetworkError::TooManyChildren(self.segments[parent.0].name.clone()));
        }
        if self.segments[child.0].parents.len() >= 2 {
            return Err(NetworkError::TooManyParents(self.segments[child.0].name.clone()));
        }

        let parent_start = self.segments[parent.0].start;
        let parent_start_value = params.get_value(parent_start);
        let child_start_value = params.get_value(self.segments[child.0].start);
        if parent_start_value < child_start_value {
            return Err(NetworkError::DateMismatch(self.segments[child.0].name.clone()));
        }

        match self.segments[child.0].end {
            Some(existing) if existing != parent_start => {
                return Err(NetworkError::DateMismatch(self.segments[child.0].name.clone()));
            },
            Some(_) => {},
            None => self.segments[child.0].end = Some(parent_start),
        }

        if let Some(m) = mix_frac {
            self.segments[child.0].mix_frac = Some(m);
        }

        self.segments[parent.0].children.push(child);
        self.segments[child.0].parents.push(parent);
        trace!(
            "Wired '{}' as a child of '{}'{}",
            self.segments[child.0].name, self.segments[parent.0].name,
            if mix_frac.is_some() { " (introgressor edge)" } else { "" },
        );
        Ok(())
    }

    /// Walk parent edges up to the unique root.
    ///
    /// # Errors
    /// [`NetworkError::MultipleRoots`] if an admixture node's two parent
    /// chains terminate at different roots.
    pub fn root(&self, node: SegHandle) -> Result<SegHandle, NetworkError> {
        match self.segments[node.0].parents.as_slice() {
            [] => Ok(node),
            [p] => self.root(*p),
            [p0, p1] => {
                let r0 = self.root(*p0)?;
                let r1 = self.root(*p1)?;
                if r0 != r1 {
                    debug!(
                        "Admixture node '{}' diverges to distinct roots '{}' and '{}'",
                        self.segments[node.0].name, self.segments[r0.0].name, self.segments[r1.0].name,
                    );
                    return Err(NetworkError::MultipleRoots);
                }
                Ok(r0)
            },
            _ => unreachable!("a segment never carries more than two parents"),
        }
    }

    /// Structural feasibility: every mixture fraction in `[0, 1]`, and every
    /// parent starting no earlier than its children. Bound-checking of
    /// individual parameter values (twoN, time ranges) is the
    /// [`ParameterStore`]'s own responsibility.
    ///
    /// # Errors
    /// [`NetworkError::Infeasible`] on the first violation found.
    pub fn feasible(&self, params: &ParameterStore) -> Result<(), NetworkError> {
        for seg in &self.segments {
            if let Some(mix) = seg.mix_frac {
                let m = params.get_value(mix);
                if !(0.0..=1.0).contains(&m) {
                    return Err(NetworkError::Infeasible(format!(
                        "mixture fraction for '{}' is {m}, outside [0, 1]", seg.name,
                    )));
                }
            }
            let start = params.get_value(seg.start);
            for &parent in &seg.parents {
                let parent_start = params.get_value(self.segments[parent.0].start);
                if parent_start < start {
                    return Err(NetworkError::Infeasible(format!(
                        "segment '{}' starts after its parent '{}'", seg.name, self.segments[parent.0].name,
                    )));
                }
            }
        }
        debug!("Structural feasibility check passed for {} segments", self.segments.len());
        Ok(())
    }

    /// Deep copy of the whole network. Since segments reference parameters
    /// and each other purely through integer handles, duplication is a plain
    /// `clone` — every handle stays valid against the copy with no address
    /// rewriting, so long as the caller pairs this with a
    /// [`ParameterStore::duplicate`] of the same store.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        trace!("Duplicated population DAG ({} segments) for a worker thread", self.segments.len());
        self.clone()
    }
}
