//! Torsion-angle arc algebra.
//!
//! A vertex whose third reference is interval-valued is feasible on up to
//! two arcs of its torsion circle, one per sign of sin(omega). The set is
//! built fresh per branching call: raw arcs from the dihedral cosines at the
//! two interval extremes, an adjacency merge where the sign branches meet,
//! an optional collapse to midpoints on symmetric layers, and a subdivision
//! bounding the spatial displacement any single sub-arc may represent.

use std::f64::consts::PI;

/// A closed torsion-angle arc `[lo, hi]` in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmegaArc {
    pub lo: f64,
    pub hi: f64,
}

impl OmegaArc {
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi);
        Self { lo, hi }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    /// True when the arc is a single angle.
    pub fn is_point(&self) -> bool {
        self.width() == 0.0
    }
}

/// The feasible torsion sub-arcs of one vertex, ready for iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct OmegaIntervalSet {
    sub_arcs: Vec<OmegaArc>,
}

impl OmegaIntervalSet {
    /// Builds the sub-arc set for one branching step.
    ///
    /// `cos_lb` and `cos_ub` are the torsion cosines at the two extremes of
    /// the interval reference (equal for an exact reference). `radius` is
    /// the parent distance the positions are synthesized with, so
    /// `radius * width` bounds the displacement an arc represents;
    /// subdivision caps that at `resolution`. `merge_tol` is the angular
    /// adjacency tolerance for fusing the two sign branches.
    pub fn build(
        cos_lb: f64,
        cos_ub: f64,
        symmetric: bool,
        radius: f64,
        resolution: f64,
        merge_tol: f64,
    ) -> Self {
        let mut arcs = raw_arcs(cos_lb, cos_ub, merge_tol);

        if symmetric {
            for arc in &mut arcs {
                let mid = arc.midpoint();
                *arc = OmegaArc::new(mid, mid);
            }
        }

        let mut sub_arcs = Vec::new();
        for arc in arcs {
            subdivide_into(arc, radius, resolution, &mut sub_arcs);
        }
        Self { sub_arcs }
    }

    pub fn len(&self) -> usize {
        self.sub_arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_arcs.is_empty()
    }

    /// Iterates the sub-arcs from either end; backward scans drive the
    /// mirrored half of a symmetric exploration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = OmegaArc> + '_ {
        self.sub_arcs.iter().copied()
    }

    pub fn sub_arcs(&self) -> &[OmegaArc] {
        &self.sub_arcs
    }
}

/// Minimal number of equal sub-arcs keeping `radius * width / k` at or
/// below `resolution`.
pub fn subdivision_count(radius: f64, width: f64, resolution: f64) -> usize {
    if width <= 0.0 {
        return 1;
    }
    ((radius * width) / resolution).ceil().max(1.0) as usize
}

/// The one or two raw arcs induced by the torsion cosines at the interval
/// extremes: `[lo, hi]` on the positive-sine half and its mirror on the
/// negative half, fused where they are adjacent within `merge_tol`.
fn raw_arcs(cos_lb: f64, cos_ub: f64, merge_tol: f64) -> Vec<OmegaArc> {
    let angle_lb = sin_of(cos_lb).atan2(cos_lb);
    let angle_ub = sin_of(cos_ub).atan2(cos_ub);
    let lo = angle_lb.min(angle_ub);
    let hi = angle_lb.max(angle_ub);

    let meets_zero = lo <= merge_tol;
    let meets_pi = hi >= PI - merge_tol;
    match (meets_zero, meets_pi) {
        (true, true) => vec![OmegaArc::new(-PI, PI)],
        (true, false) => vec![OmegaArc::new(-hi, hi)],
        (false, true) => vec![OmegaArc::new(lo, 2.0 * PI - lo)],
        (false, false) => vec![OmegaArc::new(lo, hi), OmegaArc::new(-hi, -lo)],
    }
}

fn sin_of(cos: f64) -> f64 {
    (1.0 - cos * cos).max(0.0).sqrt()
}

fn subdivide_into(arc: OmegaArc, radius: f64, resolution: f64, out: &mut Vec<OmegaArc>) {
    let width = arc.width();
    if width == 0.0 {
        out.push(arc);
        return;
    }
    let k = subdivision_count(radius, width, resolution);
    let step = width / k as f64;
    for j in 0..k {
        let lo = arc.lo + j as f64 * step;
        let hi = if j + 1 == k {
            arc.hi
        } else {
            arc.lo + (j + 1) as f64 * step
        };
        out.push(OmegaArc::new(lo, hi));
    }
}
