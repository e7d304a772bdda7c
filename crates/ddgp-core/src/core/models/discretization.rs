use super::graph::DistanceGraph;
use super::vertex::{Reference, Triplet};
use crate::core::geometry::cos_bond_angle;

/// Classification of an instance against the discretization assumptions, and
/// the reference-triplet selection policy.
///
/// These checks run once, before any recursion; the search itself consumes
/// their results and never re-validates.
impl DistanceGraph {
    /// True iff the first three vertices are pairwise connected by exact
    /// references, which is the prerequisite for placing vertices 0..3
    /// directly, without branching.
    pub fn initial_clique(&self, eps: f64) -> bool {
        if self.len() < 3 {
            return false;
        }
        [(0, 1), (0, 2), (1, 2)]
            .iter()
            .all(|&(i, j)| self.reference(i, j).is_some_and(|r| r.is_exact(eps)))
    }

    /// First vertex (index >= 3) lacking three references or two exact
    /// references, or `None` when the whole instance is discretizable.
    pub fn first_non_discretizable(&self, eps: f64) -> Option<usize> {
        (3..self.len()).find(|&i| {
            let v = self.vertex(i);
            v.reference_count() < 3 || v.exact_reference_count(eps) < 2
        })
    }

    /// True iff every vertex past the initial clique references its three
    /// nearest predecessors (i-1, i-2, i-3) with exact distances. Such
    /// instances admit the faster exact search variant.
    pub fn is_consecutive(&self, eps: f64) -> bool {
        (3..self.len()).all(|i| {
            (1..=3).all(|k| {
                self.reference(i, i - k)
                    .is_some_and(|r| r.is_exact(eps))
            })
        })
    }

    /// Selects the reference triplet vertex `i` is realized from.
    ///
    /// All 3-subsets of the vertex's references are enumerated; a subset is
    /// usable when it holds at most one interval reference and the three
    /// distances among the referenced vertices exist (the dihedral formula
    /// needs them). With three or more exact references available the
    /// all-exact triplet whose reference points span the best-conditioned
    /// basis wins: the included angle at the middle reference must be
    /// farthest from 0/pi, i.e. its cosine farthest from +/-1. Otherwise the
    /// triplet carrying the interval reference of smallest range is taken.
    ///
    /// Returns `None` when no usable combination exists, which signals a
    /// graph inconsistency: the classification pass is expected to have
    /// ruled this out.
    pub fn select_triplet(&self, i: usize, eps: f64) -> Option<Triplet> {
        let refs = &self.vertex(i).refs;

        let mut best_exact: Option<(f64, Triplet)> = None;
        let mut best_interval: Option<(f64, Triplet)> = None;

        for a in 0..refs.len() {
            for b in (a + 1)..refs.len() {
                for c in (b + 1)..refs.len() {
                    let Some(triplet) = self.order_triplet([refs[a], refs[b], refs[c]], eps)
                    else {
                        continue;
                    };
                    let d21 = self.reference(triplet.r2.other, triplet.r1.other);
                    let d31 = self.reference(triplet.r3.other, triplet.r1.other);
                    let d32 = self.reference(triplet.r3.other, triplet.r2.other);
                    let (Some(d21), Some(d31), Some(d32)) = (d21, d31, d32) else {
                        continue;
                    };

                    if triplet.interval_count(eps) == 0 {
                        let cos = cos_bond_angle(d21.lb, d32.lb, d31.lb);
                        let flatness = cos.abs();
                        if best_exact.as_ref().is_none_or(|(f, _)| flatness < *f) {
                            best_exact = Some((flatness, triplet));
                        }
                    } else {
                        let range = triplet.r3.range();
                        if best_interval.as_ref().is_none_or(|(r, _)| range < *r) {
                            best_interval = Some((range, triplet));
                        }
                    }
                }
            }
        }

        best_exact.or(best_interval).map(|(_, t)| t)
    }

    /// Orders three references into (r1 nearest, r2 middle, r3 farthest),
    /// forcing the interval reference (if any) into r3. `None` when more
    /// than one reference is interval-valued.
    fn order_triplet(&self, trio: [Reference; 3], eps: f64) -> Option<Triplet> {
        let mut exact: Vec<Reference> = Vec::with_capacity(3);
        let mut interval: Vec<Reference> = Vec::with_capacity(1);
        for r in trio {
            if r.is_exact(eps) {
                exact.push(r);
            } else {
                interval.push(r);
            }
        }
        if interval.len() > 1 {
            return None;
        }
        // nearest predecessor first
        exact.sort_by(|x, y| y.other.cmp(&x.other));
        match interval.first() {
            Some(&r3) => Some(Triplet::new(exact[0], exact[1], r3)),
            None => Some(Triplet::new(exact[0], exact[1], exact[2])),
        }
    }

    /// Per-vertex symmetry flags.
    ///
    /// Vertex i (>= 3) is symmetric iff no reference connects a vertex
    /// j < i-3 to any vertex >= i: the two mirror torsion branches then
    /// generate geometrically equivalent subtrees, and one representative
    /// angle per arc suffices.
    pub fn symmetric_layers(&self) -> Vec<bool> {
        let n = self.len();
        let mut flags = vec![false; n];
        for i in 3..n {
            flags[i] = !self.vertices()[i..]
                .iter()
                .any(|w| w.refs.iter().any(|r| r.other + 3 < i));
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Chain with references to the three nearest predecessors, all exact.
    fn consecutive_graph(n: usize) -> DistanceGraph {
        let mut g = DistanceGraph::with_vertices(n);
        for i in 1..n {
            for k in 1..=3.min(i) {
                g.add_distance(i, i - k, 1.0 + 0.1 * k as f64, 1.0 + 0.1 * k as f64);
            }
        }
        g
    }

    #[test]
    fn initial_clique_requires_three_exact_distances() {
        let g = consecutive_graph(4);
        assert!(g.initial_clique(1e-3));

        let mut missing = DistanceGraph::with_vertices(3);
        missing.add_distance(0, 1, 1.0, 1.0);
        missing.add_distance(1, 2, 1.0, 1.0);
        assert!(!missing.initial_clique(1e-3));

        let mut interval = DistanceGraph::with_vertices(3);
        interval.add_distance(0, 1, 1.0, 1.0);
        interval.add_distance(0, 2, 1.0, 1.8);
        interval.add_distance(1, 2, 1.0, 1.0);
        assert!(!interval.initial_clique(1e-3));
    }

    #[test]
    fn discretizable_classification_reports_first_offender() {
        let g = consecutive_graph(6);
        assert_eq!(g.first_non_discretizable(1e-3), None);

        // vertex 4 holds only two references
        let mut bad = DistanceGraph::with_vertices(6);
        bad.add_distance(0, 1, 1.0, 1.0);
        bad.add_distance(0, 2, 1.0, 1.0);
        bad.add_distance(1, 2, 1.0, 1.0);
        for k in 1..=3 {
            bad.add_distance(3, 3 - k, 1.0, 1.0);
            bad.add_distance(5, 5 - k, 1.0, 1.0);
        }
        bad.add_distance(4, 3, 1.0, 1.0);
        bad.add_distance(4, 2, 1.0, 1.0);
        assert_eq!(bad.first_non_discretizable(1e-3), Some(4));

        // an extra interval reference does not hurt a discretizable vertex
        let mut loose = consecutive_graph(5);
        loose.add_distance(4, 0, 1.0, 2.0);
        assert_eq!(loose.first_non_discretizable(1e-3), None);
    }

    #[test]
    fn consecutive_classification() {
        let g = consecutive_graph(6);
        assert!(g.is_consecutive(1e-3));

        let mut gaps = DistanceGraph::with_vertices(5);
        gaps.add_distance(0, 1, 1.0, 1.0);
        gaps.add_distance(0, 2, 1.0, 1.0);
        gaps.add_distance(1, 2, 1.0, 1.0);
        // vertex 3 references (0,1,2) = consecutive
        gaps.add_distance(3, 2, 1.0, 1.0);
        gaps.add_distance(3, 1, 1.0, 1.0);
        gaps.add_distance(3, 0, 1.0, 1.0);
        // vertex 4 skips vertex 3
        gaps.add_distance(4, 2, 1.0, 1.0);
        gaps.add_distance(4, 1, 1.0, 1.0);
        gaps.add_distance(4, 0, 1.0, 1.0);
        assert!(!gaps.is_consecutive(1e-3));
    }

    #[test]
    fn triplet_selection_prefers_well_conditioned_exact_triplets() {
        // Reference points: 0 = (0,0,0), 1 = (1,0,0), 2 = (2,0,0) collinear,
        // 3 = (1,1,0). The (3,1,0) subset spans a right angle at vertex 1;
        // (2,1,0) is collinear and must lose.
        let s2 = std::f64::consts::SQRT_2;
        let s3 = 3.0f64.sqrt();
        let mut g = DistanceGraph::with_vertices(5);
        g.add_distance(0, 1, 1.0, 1.0);
        g.add_distance(0, 2, 2.0, 2.0);
        g.add_distance(0, 3, s2, s2);
        g.add_distance(1, 2, 1.0, 1.0);
        g.add_distance(1, 3, 1.0, 1.0);
        g.add_distance(2, 3, s2, s2);
        // vertex 4 = (1,1,1)
        g.add_distance(4, 3, 1.0, 1.0);
        g.add_distance(4, 2, s3, s3);
        g.add_distance(4, 1, s2, s2);
        g.add_distance(4, 0, s3, s3);

        let t = g.select_triplet(4, 1e-3).unwrap();
        assert_eq!(t.interval_count(1e-3), 0);
        assert_eq!((t.r1.other, t.r2.other, t.r3.other), (3, 1, 0));
    }

    #[test]
    fn triplet_selection_places_the_narrowest_interval_as_r3() {
        let mut g = DistanceGraph::with_vertices(5);
        g.add_distance(0, 1, 1.0, 1.0);
        g.add_distance(0, 2, 1.6, 1.6);
        g.add_distance(0, 3, 2.0, 2.0);
        g.add_distance(1, 2, 1.0, 1.0);
        g.add_distance(1, 3, 1.6, 1.6);
        g.add_distance(2, 3, 1.0, 1.0);
        g.add_distance(4, 3, 1.0, 1.0);
        g.add_distance(4, 2, 1.6, 1.6);
        g.add_distance(4, 1, 1.8, 2.6);
        g.add_distance(4, 0, 2.0, 2.2);

        let t = g.select_triplet(4, 1e-3).unwrap();
        assert_eq!((t.r1.other, t.r2.other), (3, 2));
        assert_eq!(t.r3.other, 0, "narrower interval [2.0,2.2] wins");
        assert_eq!(t.interval_count(1e-3), 1);
    }

    #[test]
    fn triplet_selection_returns_none_without_three_usable_references() {
        let mut g = DistanceGraph::with_vertices(4);
        g.add_distance(0, 1, 1.0, 1.0);
        g.add_distance(0, 2, 1.0, 1.0);
        g.add_distance(1, 2, 1.0, 1.0);
        g.add_distance(3, 2, 1.0, 1.0);
        g.add_distance(3, 1, 1.0, 1.0);
        assert!(g.select_triplet(3, 1e-3).is_none());

        // two interval references can never form a usable triplet
        let mut two_intervals = DistanceGraph::with_vertices(4);
        two_intervals.add_distance(0, 1, 1.0, 1.0);
        two_intervals.add_distance(0, 2, 1.0, 1.0);
        two_intervals.add_distance(1, 2, 1.0, 1.0);
        two_intervals.add_distance(3, 2, 1.0, 1.0);
        two_intervals.add_distance(3, 1, 1.0, 2.0);
        two_intervals.add_distance(3, 0, 1.0, 2.0);
        assert!(two_intervals.select_triplet(3, 1e-3).is_none());
    }

    #[test]
    fn symmetric_layers_detect_long_range_references() {
        // consecutive chain: every branching vertex is symmetric
        let g = consecutive_graph(7);
        let flags = g.symmetric_layers();
        assert!(!flags[0] && !flags[1] && !flags[2]);
        assert!(flags[3..].iter().all(|&f| f));

        // a (0,6) distance breaks the symmetry of layers 4..=6
        let mut long = consecutive_graph(7);
        long.add_distance(6, 0, 2.0, 2.0);
        let flags = long.symmetric_layers();
        assert!(flags[3], "0 is not below 3 - 3");
        assert!(!flags[4] && !flags[5] && !flags[6]);
    }
}
