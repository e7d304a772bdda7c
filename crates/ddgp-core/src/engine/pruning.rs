//! Feasibility tests consulted before every recursion step.
//!
//! A positive violation count means "abandon this sub-arc"; it is the normal
//! pruning of the search space, never an error.

use crate::core::geometry::Aabb;
use crate::core::models::DistanceGraph;
use crate::engine::state::PartialError;
use nalgebra::Point3;

/// Result of the exact direct distance feasibility test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DdfOutcome {
    /// References violated beyond tolerance.
    pub violations: usize,
    /// Normalized deviation over all references of the vertex. The mean
    /// drives the refiner's retry decision, and the per-vertex records
    /// assemble into the mean violation of a full solution.
    pub partial: PartialError,
}

impl DdfOutcome {
    pub fn is_feasible(&self) -> bool {
        self.violations == 0
    }
}

/// Direct distance feasibility of vertex `i` against its realized
/// references.
///
/// Exact references violate when the realized distance misses the bound by
/// more than `eps`; interval references only when the distance leaves
/// `[lb - eps, ub + eps]`. Exact deviations accumulate normalized by the
/// reference distance, interval excursions by the interval midpoint.
pub fn ddf(graph: &DistanceGraph, i: usize, coords: &[Point3<f64>], eps: f64) -> DdfOutcome {
    let mut outcome = DdfOutcome::default();
    for r in &graph.vertex(i).refs {
        let dist = (coords[i] - coords[r.other]).norm();
        let (deviation, scale) = if r.is_exact(eps) {
            ((dist - r.lb).abs(), r.lb)
        } else if dist < r.lb {
            (r.lb - dist, r.midpoint())
        } else if dist > r.ub {
            (dist - r.ub, r.midpoint())
        } else {
            (0.0, r.midpoint())
        };

        if deviation > eps {
            outcome.violations += 1;
        }
        if scale > 0.0 {
            outcome.partial.count += 1;
            outcome.partial.sum += deviation / scale;
        }
    }
    outcome
}

/// Conservative box variant of [`ddf`]: vertex `i`'s references are tested
/// against the axis-aligned boxes of both endpoints.
///
/// A reference is counted infeasible when the interval of distances its two
/// boxes can realize cannot intersect `[lb, ub]` within tolerance, which
/// discards the whole sub-arc before an exact coordinate is computed.
pub fn box_ddf(graph: &DistanceGraph, i: usize, boxes: &[Aabb], eps: f64) -> usize {
    let mut violations = 0;
    for r in &graph.vertex(i).refs {
        let (min, max) = Aabb::distance_bounds(&boxes[i], &boxes[r.other]);
        if max < r.lb - eps || min > r.ub + eps {
            violations += 1;
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-3;

    fn graph_with_vertex_2_refs() -> DistanceGraph {
        let mut g = DistanceGraph::with_vertices(3);
        g.add_distance(0, 1, 1.0, 1.0);
        g.add_distance(2, 1, 1.0, 1.0);
        g.add_distance(2, 0, 1.2, 1.6);
        g
    }

    #[test]
    fn ddf_accepts_a_satisfying_placement() {
        let g = graph_with_vertex_2_refs();
        let coords = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0), // d(2,1) = 1, d(2,0) = sqrt(2) in [1.2, 1.6]
        ];
        let outcome = ddf(&g, 2, &coords, EPS);
        assert!(outcome.is_feasible());
        assert_eq!(outcome.partial.count, 2);
        assert!(outcome.partial.sum < 1e-9);
    }

    #[test]
    fn ddf_flags_exact_deviations_beyond_tolerance() {
        let g = graph_with_vertex_2_refs();
        let coords = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.1, 0.0), // d(2,1) = 1.1
        ];
        let outcome = ddf(&g, 2, &coords, EPS);
        assert_eq!(outcome.violations, 1);
    }

    #[test]
    fn ddf_is_one_sided_for_interval_references() {
        let g = graph_with_vertex_2_refs();
        // d(2,0) = 1.0 < lb = 1.2 while d(2,1) stays exact
        let y = (1.0f64 - 0.25).sqrt();
        let coords = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, y, 0.0),
        ];
        let outcome = ddf(&g, 2, &coords, EPS);
        assert_eq!(outcome.violations, 1);

        // and a distance inside the interval is clean
        let inside = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert!(ddf(&g, 2, &inside, EPS).is_feasible());
    }

    #[test]
    fn ddf_tolerates_deviations_within_eps() {
        let g = graph_with_vertex_2_refs();
        let coords = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0 + 0.5 * EPS, 0.0),
        ];
        let outcome = ddf(&g, 2, &coords, EPS);
        assert!(outcome.is_feasible());
        assert!(outcome.partial.sum > 0.0, "deviation still accumulates");
    }

    #[test]
    fn box_ddf_rejects_a_box_beyond_reach_in_every_axis() {
        let g = graph_with_vertex_2_refs();
        let boxes = vec![
            Aabb::point(Point3::origin()).inflate(EPS),
            Aabb::point(Point3::new(1.0, 0.0, 0.0)).inflate(EPS),
            // farther than ub + eps from both endpoints in every axis
            Aabb::point(Point3::new(5.0, 5.0, 5.0)).inflate(0.2),
        ];
        assert_eq!(box_ddf(&g, 2, &boxes, EPS), 2);
    }

    #[test]
    fn box_ddf_accepts_overlapping_feasibility() {
        let g = graph_with_vertex_2_refs();
        // a wide box around the feasible position cannot be excluded
        let boxes = vec![
            Aabb::point(Point3::origin()).inflate(EPS),
            Aabb::point(Point3::new(1.0, 0.0, 0.0)).inflate(EPS),
            Aabb::point(Point3::new(1.0, 1.0, 0.0)).inflate(0.3),
        ];
        assert_eq!(box_ddf(&g, 2, &boxes, EPS), 0);
    }

    #[test]
    fn box_expansion_never_creates_a_violation() {
        // widening boxes only widens the realizable distance interval, so a
        // feasible sub-arc must stay feasible under any expansion
        let g = graph_with_vertex_2_refs();
        let base = vec![
            Aabb::point(Point3::origin()).inflate(EPS),
            Aabb::point(Point3::new(1.0, 0.0, 0.0)).inflate(EPS),
            Aabb::point(Point3::new(1.0, 1.0, 0.0)).inflate(0.1),
        ];
        assert_eq!(box_ddf(&g, 2, &base, EPS), 0);

        for margin in [0.01, 0.1, 1.0] {
            let expanded: Vec<_> = base.iter().map(|b| b.inflate(margin)).collect();
            assert_eq!(box_ddf(&g, 2, &expanded, EPS), 0, "margin {margin}");
        }
    }

    #[test]
    fn box_ddf_rejects_boxes_too_close_for_the_lower_bound() {
        let mut g = DistanceGraph::with_vertices(2);
        g.add_distance(0, 1, 2.0, 2.5);
        let boxes = vec![
            Aabb::point(Point3::origin()).inflate(0.1),
            Aabb::point(Point3::new(0.5, 0.0, 0.0)).inflate(0.1),
        ];
        // max distance 0.7 + small diagonal slack < lb - eps
        assert_eq!(box_ddf(&g, 1, &boxes, 1e-3), 1);
    }
}
