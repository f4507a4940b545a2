use std::collections::HashMap;

use log::trace;
use network::{PopulationDag, SegHandle, TipSet};
use params::ParameterStore;

use crate::{CoalescentError, GeneNode};

/// Backward-time simulation of one gene genealogy inside a single DAG copy.
///
/// Traversal is top-down from the root through `children` edges, but each
/// segment's own coalescent loop only ever needs the lineages its children
/// hand up to it — so segments are effectively simulated bottom-up, each
/// exactly once. An admixture child is reachable from *both* of its parents
/// (it sits in both parents' `children` list); [`Simulator`] memoizes a
/// segment's finished routing so the second parent to reach it gets its
/// share from cache instead of re-running the simulation.
struct Simulator<'a> {
    dag: &'a PopulationDag,
    params: &'a ParameterStore,
    // Per segment: lineages routed to parents[0] and parents[1] respectively
    // (single-parent segments only ever populate slot 0).
    routed: HashMap<SegHandle, [Vec<GeneNode>; 2]>,
}

impl<'a> Simulator<'a> {
    fn collect_for(&mut self, child: SegHandle, parent: SegHandle, rng: &mut fastrand::Rng) -> Result<Vec<GeneNode>, CoalescentError> {
        if !self.routed.contains_key(&child) {
            let routed = self.simulate_segment(child, rng)?;
            self.routed.insert(child, routed);
        }
        let slot = self.dag.get(child).parents.iter().position(|&p| p == parent)
            .expect("collect_for is only ever called by one of child's declared parents");
        Ok(std::mem::take(&mut self.routed.get_mut(&child).expect("just inserted").as_mut()[slot]))
    }

    fn simulate_segment(&mut self, handle: SegHandle, rng: &mut fastrand::Rng) -> Result<[Vec<GeneNode>; 2], CoalescentError> {
        let children = self.dag.get(handle).children.clone();
        let mut lineages = Vec::new();
        for child in children {
            lineages.extend(self.collect_for(child, handle, rng)?);
        }
        for &bit in &self.dag.get(handle).tips {
            lineages.push(GeneNode::leaf(TipSet::singleton(bit)));
        }

        let seg_name = self.dag.get(handle).name.clone();
        let twon = self.params.get_value(self.dag.get(handle).twon);
        let mut t = self.params.get_value(self.dag.get(handle).start);
        let end = match self.dag.get(handle).end {
            Some(h) => {
                let v = self.params.get_value(h);
                if !v.is_finite() {
                    return Err(CoalescentError::NonFiniteEnd(seg_name));
                }
                v
            },
            None => f64::INFINITY,
        };

        while lineages.len() >= 2 && t < end {
            let n = lineages.len();
            let mean = 2.0 * twon / (n as f64 * (n as f64 - 1.0));
            let x = draw_exponential(rng, mean);
            if t + x < end {
                t += x;
                for lineage in &mut lineages { lineage.branch_length += x; }
                let i = rng.usize(0..lineages.len());
                let mut j = rng.usize(0..lineages.len() - 1);
                if j >= i { j += 1; }
                let (hi, lo) = if i > j { (i, j) } else { (j, i) };
                let a = lineages.remove(hi);
                let b = lineages.remove(lo);
                trace!("Coalescence in '{seg_name}' at t={t}: {n} -> {} lineages", n - 1);
                lineages.push(GeneNode::join(a, b));
            } else {
                let dt = end - t;
                for lineage in &mut lineages { lineage.branch_length += dt; }
                t = end;
            }
        }
        if lineages.len() == 1 && end.is_finite() && t < end {
            lineages[0].branch_length += end - t;
        }

        let parents = self.dag.get(handle).parents.clone();
        let mut routed = [Vec::new(), Vec::new()];
        match parents.len() {
            0 | 1 => routed[0] = lineages,
            2 => {
                let mix = self.params.get_value(self.dag.get(handle).mix_frac
                    .expect("an admixture node always carries a mixture-fraction handle"));
                for lineage in lineages {
                    if rng.f64() < mix {
                        routed[1].push(lineage);
                    } else {
                        routed[0].push(lineage);
                    }
                }
            },
            _ => unreachable!("a segment never carries more than two parents"),
        }
        Ok(routed)
    }
}

fn draw_exponential(rng: &mut fastrand::Rng, mean: f64) -> f64 {
    let u = rng.f64(); // in [0, 1)
    -mean * (1.0 - u).ln()
}

/// Run one replicate from `root` and return its most recent common ancestor.
///
/// # Errors
/// [`CoalescentError::NonFiniteEnd`] if a segment's end-time parameter
/// evaluates to NaN or a finite-looking non-finite value that isn't
/// `+infinity`; [`CoalescentError::IncompleteCoalescence`] if the root
/// finishes with anything other than exactly one lineage (a malformed
/// network — e.g. a root with declared tips numbering zero or one).
pub fn simulate(dag: &PopulationDag, params: &ParameterStore, root: SegHandle, rng: &mut fastrand::Rng) -> Result<GeneNode, CoalescentError> {
    let mut sim = Simulator{dag, params, routed: HashMap::new()};
    let mut finished = sim.simulate_segment(root, rng)?;
    let mrca = std::mem::take(&mut finished[0]);
    if mrca.len() != 1 {
        return Err(CoalescentError::IncompleteCoalescence(mrca.len()));
    }
    Ok(mrca.into_iter().next().expect("length checked above"))
}

/// Traverse a finished gene tree, adding each edge's branch length to
/// `table` keyed by its child's tipset — except the reserved empty and
/// all-samples tipsets, and (unless `include_singletons`) single-tip sets.
pub fn tabulate(node: &GeneNode, universe: TipSet, include_singletons: bool, table: &mut crate::BranchTable) {
    let eligible = !node.tipset.is_empty()
        && node.tipset != universe
        && (include_singletons || node.tipset.count() > 1);
    if eligible {
        table.add(node.tipset, node.branch_length);
    }
    if let Some(left) = &node.left { tabulate(left, universe, include_singletons, table); }
    if let Some(right) = &node.right { tabulate(right, universe, include_singletons, table); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BranchTable;
    use network::PopulationDag;
    use params::{ParamCategory, ParamDecl, ParameterStore};
    use float_cmp::approx_eq;

    /// Boundary scenario 1: two samples in one panmictic segment extending
    /// to infinity, twoN=1.
    #[test]
    fn two_sample_infinite_segment_yields_one_singleton_pair_pattern() {
        let fixed = vec![
            ParamDecl{name: "twoN_a".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize},
            ParamDecl{name: "t_a".into(), value: 0.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ];
        let params = ParameterStore::new(&fixed, &[], &[]).unwrap();
        let mut dag = PopulationDag::new();
        let a = dag.add_segment("a", params.handle_of("twoN_a").unwrap(), params.handle_of("t_a").unwrap(), vec![0, 1]).unwrap();

        let universe = TipSet(0b11);
        let mut table = BranchTable::new();
        let mut rng = fastrand::Rng::with_seed(42);
        let reps = 4_000;
        for _ in 0..reps {
            let tree = simulate(&dag, &params, a, &mut rng).unwrap();
            tabulate(&tree, universe, true, &mut table);
        }
        table.divide_by(f64::from(reps));
        // only the two singleton patterns survive (the pair itself is the
        // all-samples tipset, reserved and excluded); each accrues the same
        // coalescence time, averaging to twoN=1 per-lineage branch length.
        assert_eq!(table.len(), 2);
        for bit in [0u32, 1] {
            let mean_len = table.get(TipSet::singleton(bit));
            assert!((mean_len - 1.0).abs() < 0.15, "expected ~1.0 coalescent unit, got {mean_len}");
        }
    }

    /// Boundary scenario 3: single-lineage segment of finite duration
    /// contributes exactly `end - start` to its singleton pattern.
    #[test]
    fn single_lineage_segment_accrues_exactly_its_duration() {
        let fixed = vec![
            ParamDecl{name: "twoN_a".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize},
            ParamDecl{name: "twoN_b".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize},
            ParamDecl{name: "t_a".into(), value: 0.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
            ParamDecl{name: "t_b".into(), value: 3.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ];
        let params = ParameterStore::new(&fixed, &[], &[]).unwrap();
        let mut dag = PopulationDag::new();
        let a = dag.add_segment("a", params.handle_of("twoN_a").unwrap(), params.handle_of("t_a").unwrap(), vec![0]).unwrap();
        let b = dag.add_segment("b", params.handle_of("twoN_b").unwrap(), params.handle_of("t_b").unwrap(), vec![]).unwrap();
        dag.add_child(b, a, &params).unwrap();

        let mut rng = fastrand::Rng::with_seed(7);
        let tree = simulate(&dag, &params, b, &mut rng).unwrap();
        // the lineage itself (tree) is the MRCA once it reaches b's open interval;
        // its accumulated length up to b's start must be exactly 3.0, and b's
        // own infinite interval contributes nothing further.
        assert!(approx_eq!(f64, tree.branch_length, 3.0));
        let mut universe_table = BranchTable::new();
        tabulate(&tree, TipSet(0b1), true, &mut universe_table);
        assert!(universe_table.is_empty(), "MRCA's own tipset equals the universe and must be excluded");
    }

    #[test]
    fn infinite_end_time_parameter_nan_is_fatal() {
        let fixed = vec![
            ParamDecl{name: "twoN".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize},
            ParamDecl{name: "t_child".into(), value: 0.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ];
        let mut params = ParameterStore::new(&fixed, &[
            ParamDecl{name: "t_parent".into(), value: 1.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ], &[]).unwrap();
        let twon = params.handle_of("twoN").unwrap();
        let mut dag = PopulationDag::new();
        let child = dag.add_segment("child", twon, params.handle_of("t_child").unwrap(), vec![0, 1]).unwrap();
        let parent = dag.add_segment("parent", twon, params.handle_of("t_parent").unwrap(), vec![]).unwrap();
        dag.add_child(parent, child, &params).unwrap();
        params.set_free(&[f64::NAN]).unwrap();

        let mut rng = fastrand::Rng::with_seed(1);
        let err = simulate(&dag, &params, parent, &mut rng).unwrap_err();
        assert!(matches!(err, CoalescentError::NonFiniteEnd(_)));
    }
}
