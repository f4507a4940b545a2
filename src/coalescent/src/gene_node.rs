use network::TipSet;

/// One node of a gene genealogy produced during a single replicate.
///
/// `branch_length` is the length accumulated on the edge immediately above
/// this node (i.e. between it and whatever it eventually joins). Leaves
/// carry exactly one set bit in `tipset`; an internal node's `tipset` is the
/// union of its two children's.
#[derive(Debug, Clone)]
pub struct GeneNode {
    pub tipset: TipSet,
    pub branch_length: f64,
    pub left: Option<Box<GeneNode>>,
    pub right: Option<Box<GeneNode>>,
}

impl GeneNode {
    #[must_use]
    pub fn leaf(tipset: TipSet) -> Self {
        Self{tipset, branch_length: 0.0, left: None, right: None}
    }

    #[must_use]
    pub fn join(left: GeneNode, right: GeneNode) -> Self {
        let tipset = left.tipset.union(right.tipset);
        Self{tipset, branch_length: 0.0, left: Some(Box::new(left)), right: Some(Box::new(right))}
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool { self.left.is_none() && self.right.is_none() }
}
