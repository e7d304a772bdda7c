/// A distance constraint from one vertex to a strictly lower-indexed vertex.
///
/// A reference between vertices i and j (i < j) is stored once, in the
/// reference list of vertex j. The constraint is satisfied by any realized
/// distance inside `[lb, ub]`; whether it counts as "exact" or "interval"
/// depends on the tolerance the instance is solved with, so the
/// classification is a method taking `eps` rather than a stored flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    /// Index of the lower vertex this constraint reaches.
    pub other: usize,
    /// Lower bound on the distance.
    pub lb: f64,
    /// Upper bound on the distance. Invariant: `lb <= ub`.
    pub ub: f64,
}

impl Reference {
    pub fn new(other: usize, lb: f64, ub: f64) -> Self {
        debug_assert!(lb <= ub, "reference bounds out of order: [{lb}, {ub}]");
        Self { other, lb, ub }
    }

    /// Width of the bound interval.
    pub fn range(&self) -> f64 {
        self.ub - self.lb
    }

    /// True when the bound interval is degenerate within tolerance `eps`.
    pub fn is_exact(&self, eps: f64) -> bool {
        self.range() <= eps
    }

    /// True when the bound interval is wider than tolerance `eps`.
    pub fn is_interval(&self, eps: f64) -> bool {
        !self.is_exact(eps)
    }

    /// Midpoint of the bound interval.
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lb + self.ub)
    }
}

/// A vertex of the distance graph: identity, optional group metadata, and the
/// ordered list of references to lower-indexed vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Index of this vertex in the instance ordering.
    pub id: usize,
    /// Optional group identifier (e.g. a residue number in a molecular
    /// instance).
    pub group_id: Option<i32>,
    /// Optional display name of the vertex.
    pub name: Option<String>,
    /// Optional display name of the group.
    pub group: Option<String>,
    /// References to strictly lower-indexed vertices, in insertion order.
    pub refs: Vec<Reference>,
}

impl Vertex {
    /// Creates a bare vertex with no references and no metadata.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            group_id: None,
            name: None,
            group: None,
            refs: Vec::new(),
        }
    }

    pub fn with_names(id: usize, group_id: i32, name: &str, group: &str) -> Self {
        Self {
            id,
            group_id: Some(group_id),
            name: Some(name.to_string()),
            group: Some(group.to_string()),
            refs: Vec::new(),
        }
    }

    /// Number of references held by this vertex.
    pub fn reference_count(&self) -> usize {
        self.refs.len()
    }

    /// Number of references whose bound interval is exact within `eps`.
    pub fn exact_reference_count(&self, eps: f64) -> usize {
        self.refs.iter().filter(|r| r.is_exact(eps)).count()
    }

    /// The reference reaching `other`, if present.
    pub fn reference_to(&self, other: usize) -> Option<&Reference> {
        self.refs.iter().find(|r| r.other == other)
    }
}

/// The three references a vertex is realized from.
///
/// `r1` reaches the nearest predecessor (the synthesis parent), `r2` the
/// middle, `r3` the farthest. Invariants: the three referenced vertices are
/// pairwise distinct, at least two of the references are exact, and the
/// interval reference (when one is present) sits in `r3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub r1: Reference,
    pub r2: Reference,
    pub r3: Reference,
}

impl Triplet {
    pub fn new(r1: Reference, r2: Reference, r3: Reference) -> Self {
        debug_assert!(r1.other != r2.other && r1.other != r3.other && r2.other != r3.other);
        Self { r1, r2, r3 }
    }

    /// Number of interval references in the triplet (0 or 1 by invariant).
    pub fn interval_count(&self, eps: f64) -> usize {
        [self.r1, self.r2, self.r3]
            .iter()
            .filter(|r| r.is_interval(eps))
            .count()
    }
}
