//! Constrained local refinement by spectral projected gradient descent.
//!
//! When box pruning is ambiguous but the exact distance test still reports a
//! violation, the search hands the realized prefix to this refiner. It
//! minimizes the stress objective over the prefix coordinates and one
//! auxiliary distance variable per reference (a chosen point inside each
//! bound interval), subject to box constraints on both.

use crate::core::geometry::Aabb;
use crate::core::models::DistanceGraph;
use crate::core::objective::{stress, stress_gradient};
use crate::engine::config::SpgParams;
use nalgebra::{Point3, Vector3};

/// How a refinement run ended. None of these are fatal: the caller re-tests
/// feasibility and either keeps or prunes the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Objective fell below the convergence tolerance.
    Converged,
    /// The projected direction (or the line-search step) became too small to
    /// make progress.
    Stalled,
    /// The iteration cap was reached.
    IterationLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    pub outcome: RefineOutcome,
    pub objective: f64,
    pub iterations: usize,
}

/// Pre-allocated buffers for the refiner. One instance lives in the search
/// context and is reused across all refinement calls; slices of length `n`
/// (vertices) and `m` (references of the prefix) are taken per call.
#[derive(Debug, Clone)]
pub struct SpgWorkspace {
    y: Vec<f64>,
    yp: Vec<f64>,
    gy: Vec<f64>,
    gyp: Vec<f64>,
    sy: Vec<f64>,
    dy: Vec<f64>,
    xp: Vec<Point3<f64>>,
    sx: Vec<Point3<f64>>,
    gx: Vec<Vector3<f64>>,
    gxp: Vec<Vector3<f64>>,
    dx: Vec<Vector3<f64>>,
    scratch: Vec<f64>,
}

impl SpgWorkspace {
    pub fn new(vertices: usize, references: usize) -> Self {
        Self {
            y: vec![0.0; references],
            yp: vec![0.0; references],
            gy: vec![0.0; references],
            gyp: vec![0.0; references],
            sy: vec![0.0; references],
            dy: vec![0.0; references],
            xp: vec![Point3::origin(); vertices],
            sx: vec![Point3::origin(); vertices],
            gx: vec![Vector3::zeros(); vertices],
            gxp: vec![Vector3::zeros(); vertices],
            dx: vec![Vector3::zeros(); vertices],
            scratch: vec![0.0; vertices],
        }
    }
}

/// Projects a value onto `[lo, hi]`; a degenerate (inverted) interval maps
/// to its midpoint.
fn project(value: f64, lo: f64, hi: f64) -> f64 {
    if lo > hi {
        0.5 * (lo + hi)
    } else {
        value.clamp(lo, hi)
    }
}

fn inner_product(
    n: usize,
    x1: &[Vector3<f64>],
    x2: &[Vector3<f64>],
    m: usize,
    y1: &[f64],
    y2: &[f64],
) -> f64 {
    let mut prod = 0.0;
    for i in 0..n {
        prod += x1[i].dot(&x2[i]);
    }
    for j in 0..m {
        prod += y1[j] * y2[j];
    }
    prod
}

/// Refines the leading `n` coordinates in place.
///
/// Coordinates are constrained to their per-vertex boxes expanded by
/// `margin` in every direction; the auxiliary y variables to their reference
/// bound intervals. The iteration cap scales with the prefix size
/// (50 + 10 n).
pub fn spg(
    graph: &DistanceGraph,
    n: usize,
    coords: &mut [Point3<f64>],
    boxes: &[Aabb],
    margin: f64,
    params: &SpgParams,
    ws: &mut SpgWorkspace,
) -> Refinement {
    let m = graph.reference_count_upto(n);
    let max_it = 50 + 10 * n;

    // y starts at the realized distances, projected into the bounds
    let mut h = 0;
    for i in 0..n {
        for r in &graph.vertex(i).refs {
            let dist = (coords[i] - coords[r.other]).norm();
            ws.y[h] = project(dist, r.lb, r.ub);
            h += 1;
        }
    }

    let mut objval = stress(graph, n, coords, &ws.y[..m]);
    {
        let SpgWorkspace { y, gx, gy, scratch, .. } = &mut *ws;
        stress_gradient(graph, n, coords, &y[..m], gx, gy, scratch);
    }

    let mut c_ref = objval;
    let mut q = 1.0;
    let mut alpha = 1.0;
    let mut it = 1usize;
    let mut stalled = false;

    while it < max_it && objval > params.obj_tol && alpha > params.step_tol {
        // spectral parameter from the previous secant pair
        let mu = if it == 1 {
            1.0
        } else {
            let mut num = 0.0;
            let mut den = 0.0;
            for i in 0..n {
                let zx = coords[i] - ws.xp[i];
                num += (ws.gx[i] - ws.gxp[i]).dot(&zx);
                den += zx.dot(&zx);
            }
            for j in 0..m {
                let zy = ws.y[j] - ws.yp[j];
                num += (ws.gy[j] - ws.gyp[j]) * zy;
                den += zy * zy;
            }
            (num / den).clamp(params.mu_min, params.mu_max)
        };

        // full gradient step, projected onto the box constraints
        for i in 0..n {
            let step = coords[i] - ws.gx[i] / mu;
            ws.sx[i] = Point3::new(
                project(step.x, boxes[i].lo.x - margin, boxes[i].hi.x + margin),
                project(step.y, boxes[i].lo.y - margin, boxes[i].hi.y + margin),
                project(step.z, boxes[i].lo.z - margin, boxes[i].hi.z + margin),
            );
        }
        let mut h = 0;
        for i in 0..n {
            for r in &graph.vertex(i).refs {
                ws.sy[h] = project(ws.y[h] - ws.gy[h] / mu, r.lb, r.ub);
                h += 1;
            }
        }

        for i in 0..n {
            ws.dx[i] = ws.sx[i] - coords[i];
        }
        for j in 0..m {
            ws.dy[j] = ws.sy[j] - ws.y[j];
        }
        let dir_norm = inner_product(n, &ws.dx, &ws.dx, m, &ws.dy, &ws.dy).sqrt();
        if dir_norm < params.direction_tol {
            stalled = true;
            break;
        }

        // nonmonotone line search against the blended reference value
        ws.xp[..n].copy_from_slice(&coords[..n]);
        ws.yp[..m].copy_from_slice(&ws.y[..m]);
        ws.gxp[..n].copy_from_slice(&ws.gx[..n]);
        ws.gyp[..m].copy_from_slice(&ws.gy[..m]);
        let descent = inner_product(n, &ws.gx, &ws.dx, m, &ws.gy, &ws.dy);

        alpha = 2.0;
        let mut newobj;
        loop {
            alpha *= 0.5;
            for i in 0..n {
                coords[i] = ws.xp[i] + alpha * ws.dx[i];
            }
            for j in 0..m {
                ws.y[j] = ws.yp[j] + alpha * ws.dy[j];
            }
            newobj = stress(graph, n, coords, &ws.y[..m]);
            if alpha <= params.step_tol || newobj <= c_ref + params.gamma * alpha * descent {
                break;
            }
        }

        c_ref = params.eta * q * c_ref;
        q = params.eta * q + 1.0;
        c_ref = (c_ref + newobj) / q;
        objval = newobj;
        {
            let SpgWorkspace { y, gx, gy, scratch, .. } = &mut *ws;
            stress_gradient(graph, n, coords, &y[..m], gx, gy, scratch);
        }
        it += 1;
    }

    let outcome = if objval <= params.obj_tol {
        RefineOutcome::Converged
    } else if stalled || alpha <= params.step_tol {
        RefineOutcome::Stalled
    } else {
        RefineOutcome::IterationLimit
    };

    Refinement {
        outcome,
        objective: objval,
        iterations: it,
    }
}
