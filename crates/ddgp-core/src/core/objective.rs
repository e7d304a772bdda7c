//! Objective and quality functions over partial realizations.
//!
//! `stress` and `stress_gradient` drive the local refiner; the violation
//! measures grade complete solutions. All functions operate on the leading
//! `n` vertices of the graph so they can be evaluated on the prefix the
//! search has realized so far.

use super::models::DistanceGraph;
use nalgebra::{Point3, Vector3};

/// Largest absolute violation of any reference among the first `n` vertices.
///
/// Exact references contribute |dist - lb|; interval references only the
/// one-sided excursion outside [lb, ub].
pub fn largest_violation(
    graph: &DistanceGraph,
    n: usize,
    coords: &[Point3<f64>],
    eps: f64,
) -> f64 {
    let mut max = 0.0f64;
    for i in 0..n {
        for r in &graph.vertex(i).refs {
            let dist = (coords[i] - coords[r.other]).norm();
            let diff = if r.is_exact(eps) {
                (dist - r.lb).abs()
            } else if dist < r.lb {
                r.lb - dist
            } else if dist > r.ub {
                dist - r.ub
            } else {
                0.0
            };
            max = max.max(diff);
        }
    }
    max
}

/// Mean normalized violation over the first `n` vertices.
///
/// Exact deviations are normalized by the reference distance, interval
/// excursions by the interval midpoint; the sum is averaged over the
/// vertex count.
pub fn mean_violation(graph: &DistanceGraph, n: usize, coords: &[Point3<f64>], eps: f64) -> f64 {
    let mut value = 0.0;
    let mut m = 0usize;
    for i in 0..n {
        for r in &graph.vertex(i).refs {
            let dist = (coords[i] - coords[r.other]).norm();
            if r.is_exact(eps) {
                value += (dist - r.lb).abs() / r.lb;
            } else if dist < r.lb {
                value += (r.lb - dist) / r.midpoint();
            } else if dist > r.ub {
                value += (dist - r.ub) / r.midpoint();
            }
            m += 1;
        }
    }
    if m > 0 { value / n as f64 } else { 0.0 }
}

/// Stress of a realization: the sum of (realized distance - y)^2 over the
/// references of the first `n` vertices, with `y` holding one chosen target
/// distance per reference in storage order.
pub fn stress(graph: &DistanceGraph, n: usize, coords: &[Point3<f64>], y: &[f64]) -> f64 {
    let mut sigma = 0.0;
    let mut h = 0;
    for i in 0..n {
        for r in &graph.vertex(i).refs {
            let term = (coords[i] - coords[r.other]).norm() - y[h];
            sigma += term * term;
            h += 1;
        }
    }
    sigma
}

/// Closed-form gradient of [`stress`] with respect to the coordinates
/// (`gx`) and the chosen distances (`gy`).
///
/// `scratch` accumulates the per-vertex degree terms so the coordinate
/// gradient completes in a single pass over the references plus one over
/// the vertices; it needs at least `n` entries.
pub fn stress_gradient(
    graph: &DistanceGraph,
    n: usize,
    coords: &[Point3<f64>],
    y: &[f64],
    gx: &mut [Vector3<f64>],
    gy: &mut [f64],
    scratch: &mut [f64],
) {
    scratch[..n].fill(0.0);
    gx[..n].fill(Vector3::zeros());

    let mut h = 0;
    for i in 0..n {
        for r in &graph.vertex(i).refs {
            let j = r.other;
            let dist = (coords[i] - coords[j]).norm();
            gy[h] = -2.0 * (dist - y[h]);
            if dist > 0.0 {
                let t = -y[h] / dist;
                scratch[i] += t + 1.0;
                scratch[j] += t + 1.0;
                let s = -2.0 * (1.0 + t);
                gx[i] += s * coords[j].coords;
                gx[j] += s * coords[i].coords;
            }
            h += 1;
        }
    }

    for i in 0..n {
        gx[i] += 2.0 * scratch[i] * coords[i].coords;
    }
}
