use nalgebra::{Point3, Vector3};

/// Clamps a computed cosine back into [-1, 1].
///
/// Rounding drift in the law-of-cosines arithmetic routinely pushes values a
/// few ulps outside the valid range; the drift is absorbed here, never
/// propagated as an error.
#[inline]
pub fn clamp_cosine(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

/// Cosine of the angle at the middle of three points, from the three
/// pairwise distances: `d12` and `d23` are adjacent to the angle, `d13`
/// spans it.
pub fn cos_bond_angle(d12: f64, d23: f64, d13: f64) -> f64 {
    clamp_cosine((d12 * d12 + d23 * d23 - d13 * d13) / (2.0 * d12 * d23))
}

/// Cosine of the torsion angle defined by four points, from their six
/// pairwise distances (point order 1-2-3-4, `dij` between points i and j).
///
/// Returns `None` when one of the intermediate sines is imaginary or
/// numerically zero, i.e. the six distances do not embed in 3D or three of
/// the four points are collinear; the caller treats that as a degenerate
/// configuration.
pub fn cos_torsion_angle(d12: f64, d13: f64, d14: f64, d23: f64, d24: f64, d34: f64) -> Option<f64> {
    let a = (d12 * d12 + d24 * d24 - d14 * d14) / (2.0 * d12 * d24);
    let b = (d24 * d24 + d23 * d23 - d34 * d34) / (2.0 * d24 * d23);
    let c = (d12 * d12 + d23 * d23 - d13 * d13) / (2.0 * d12 * d23);
    let e = 1.0 - b * b;
    let f = 1.0 - c * c;
    if e <= 0.0 || f <= 0.0 {
        return None;
    }
    Some(clamp_cosine((a - b * c) / (e.sqrt() * f.sqrt())))
}

/// The orthonormal frame a vertex position is synthesized in, anchored at
/// the three reference positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    x: Vector3<f64>,
    y: Vector3<f64>,
    z: Vector3<f64>,
}

impl Frame {
    /// Builds the frame from the positions of the reference vertices:
    /// `nearest` (the synthesis parent), `middle`, and `farthest`.
    ///
    /// The x axis runs along (nearest - middle), the z axis is the
    /// normalized cross product of (nearest - middle) and
    /// (farthest - middle), and the y axis completes the right-handed
    /// frame. The triplet selection pass guarantees the three points are
    /// not collinear.
    pub fn from_points(
        nearest: &Point3<f64>,
        middle: &Point3<f64>,
        farthest: &Point3<f64>,
    ) -> Self {
        let v1 = nearest - middle;
        let v2 = farthest - middle;
        let x = v1.normalize();
        let z = v1.cross(&v2).normalize();
        let y = z.cross(&x);
        Self { x, y, z }
    }

    /// Places a new point at the given spherical offset from `parent`.
    ///
    /// The local offset is (-d cos(theta), d sin(theta) cos(omega),
    /// d sin(theta) sin(omega)) expressed in the frame's basis. This is the
    /// only primitive that realizes a vertex position, and it is fully
    /// deterministic: identical inputs give bit-identical coordinates.
    pub fn synthesize(
        &self,
        parent: &Point3<f64>,
        distance: f64,
        cos_theta: f64,
        sin_theta: f64,
        cos_omega: f64,
        sin_omega: f64,
    ) -> Point3<f64> {
        let local = Vector3::new(
            -distance * cos_theta,
            distance * sin_theta * cos_omega,
            distance * sin_theta * sin_omega,
        );
        parent + self.x * local.x + self.y * local.y + self.z * local.z
    }
}

/// An axis-aligned box, the conservative stand-in for a position that is not
/// exactly fixed yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub lo: Point3<f64>,
    pub hi: Point3<f64>,
}

impl Aabb {
    /// The degenerate box holding a single point.
    pub fn point(p: Point3<f64>) -> Self {
        Self { lo: p, hi: p }
    }

    /// Smallest box containing all given points. Panics on an empty slice.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut lo = points[0];
        let mut hi = points[0];
        for p in &points[1..] {
            for k in 0..3 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }
        Self { lo, hi }
    }

    /// Grows the box by `margin` in every direction.
    pub fn inflate(&self, margin: f64) -> Self {
        let m = Vector3::new(margin, margin, margin);
        Self {
            lo: self.lo - m,
            hi: self.hi + m,
        }
    }

    /// Minimal and maximal Euclidean distance between two boxes.
    ///
    /// Per axis, a gap between disjoint spans contributes to the minimum and
    /// the outer span to the maximum; overlapping spans contribute nothing
    /// to the minimum. Two point boxes give coinciding bounds.
    pub fn distance_bounds(a: &Self, b: &Self) -> (f64, f64) {
        let mut min = 0.0;
        let mut max = 0.0;
        for k in 0..3 {
            if a.hi[k] < b.lo[k] {
                let gap = b.lo[k] - a.hi[k];
                min += gap * gap;
                let span = b.hi[k] - a.lo[k];
                max += span * span;
            } else if b.hi[k] < a.lo[k] {
                let gap = a.lo[k] - b.hi[k];
                min += gap * gap;
                let span = a.hi[k] - b.lo[k];
                max += span * span;
            } else {
                let lo = a.lo[k].min(b.lo[k]);
                let hi = a.hi[k].max(b.hi[k]);
                let span = hi - lo;
                max += span * span;
            }
        }
        (min.sqrt(), max.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bond_angle_cosine_matches_known_triangles() {
        // equilateral: 60 degrees at every corner
        assert!((cos_bond_angle(1.0, 1.0, 1.0) - 0.5).abs() < 1e-12);
        // right angle spanned by the hypotenuse
        let c = cos_bond_angle(3.0, 4.0, 5.0);
        assert!(c.abs() < 1e-12);
        // collinear points clamp instead of drifting outside [-1, 1]
        assert_eq!(cos_bond_angle(1.0, 1.0, 2.0), -1.0);
    }

    #[test]
    fn torsion_cosine_of_a_planar_quadruplet_is_unit() {
        // four collinear-free points in a plane: omega is 0 or pi
        // square 1-2-3-4 with unit sides
        let s2 = std::f64::consts::SQRT_2;
        let cos = cos_torsion_angle(1.0, s2, 1.0, 1.0, s2, 1.0).unwrap();
        assert!((cos.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn torsion_cosine_rejects_non_embeddable_distances() {
        // d23 makes the 2-3-4 triangle degenerate beyond repair
        assert!(cos_torsion_angle(1.0, 1.0, 1.0, 10.0, 1.0, 1.0).is_none());
    }

    #[test]
    fn frame_synthesis_is_deterministic() {
        let frame = Frame::from_points(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.3, 1.1, 0.0),
        );
        let parent = Point3::new(1.0, 0.0, 0.0);
        let p1 = frame.synthesize(&parent, 1.5, 0.3, (1.0f64 - 0.09).sqrt(), 0.7, 0.2);
        let p2 = frame.synthesize(&parent, 1.5, 0.3, (1.0f64 - 0.09).sqrt(), 0.7, 0.2);
        assert_eq!(p1, p2, "identical inputs must give bit-identical output");
    }

    #[test]
    fn frame_synthesis_reproduces_the_reference_distance() {
        let nearest = Point3::new(2.0, 1.0, -1.0);
        let middle = Point3::new(1.0, 1.0, 0.0);
        let farthest = Point3::new(0.0, 2.0, 0.5);
        let frame = Frame::from_points(&nearest, &middle, &farthest);

        let d = 1.7;
        let theta: f64 = 1.1;
        let omega: f64 = -2.3;
        let p = frame.synthesize(&nearest, d, theta.cos(), theta.sin(), omega.cos(), omega.sin());
        assert!(((p - nearest).norm() - d).abs() < 1e-12);
    }

    #[test]
    fn box_distance_bounds_for_disjoint_boxes() {
        let a = Aabb {
            lo: Point3::new(0.0, 0.0, 0.0),
            hi: Point3::new(1.0, 1.0, 1.0),
        };
        let b = Aabb {
            lo: Point3::new(3.0, 0.0, 0.0),
            hi: Point3::new(4.0, 1.0, 1.0),
        };
        let (min, max) = Aabb::distance_bounds(&a, &b);
        assert!((min - 2.0).abs() < 1e-12);
        assert!((max - (16.0f64 + 1.0 + 1.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn box_distance_bounds_for_overlapping_boxes() {
        let a = Aabb {
            lo: Point3::new(0.0, 0.0, 0.0),
            hi: Point3::new(2.0, 2.0, 2.0),
        };
        let b = Aabb {
            lo: Point3::new(1.0, 1.0, 1.0),
            hi: Point3::new(3.0, 3.0, 3.0),
        };
        let (min, max) = Aabb::distance_bounds(&a, &b);
        assert_eq!(min, 0.0);
        assert!((max - (27.0f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn point_boxes_collapse_the_bounds() {
        let a = Aabb::point(Point3::new(0.0, 0.0, 0.0));
        let b = Aabb::point(Point3::new(1.0, 2.0, 2.0));
        let (min, max) = Aabb::distance_bounds(&a, &b);
        assert!((min - 3.0).abs() < 1e-12);
        assert!((max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn inflate_grows_every_side() {
        let a = Aabb::point(Point3::new(1.0, 1.0, 1.0)).inflate(0.5);
        assert_eq!(a.lo, Point3::new(0.5, 0.5, 0.5));
        assert_eq!(a.hi, Point3::new(1.5, 1.5, 1.5));
    }

    proptest! {
        #[test]
        fn clamped_cosines_stay_in_range(
            d12 in 0.1f64..10.0,
            d23 in 0.1f64..10.0,
            d13 in 0.1f64..10.0,
        ) {
            let c = cos_bond_angle(d12, d23, d13);
            prop_assert!((-1.0..=1.0).contains(&c));
        }

        #[test]
        fn torsion_cosine_stays_in_range_when_defined(
            d12 in 0.5f64..3.0,
            d13 in 0.5f64..3.0,
            d14 in 0.5f64..3.0,
            d23 in 0.5f64..3.0,
            d24 in 0.5f64..3.0,
            d34 in 0.5f64..3.0,
        ) {
            if let Some(c) = cos_torsion_angle(d12, d13, d14, d23, d24, d34) {
                prop_assert!((-1.0..=1.0).contains(&c));
            }
        }

        #[test]
        fn box_bounds_are_ordered(
            ax in -5.0f64..5.0, ay in -5.0f64..5.0, az in -5.0f64..5.0,
            bx in -5.0f64..5.0, by in -5.0f64..5.0, bz in -5.0f64..5.0,
            wa in 0.0f64..2.0, wb in 0.0f64..2.0,
        ) {
            let a = Aabb::point(Point3::new(ax, ay, az)).inflate(wa);
            let b = Aabb::point(Point3::new(bx, by, bz)).inflate(wb);
            let (min, max) = Aabb::distance_bounds(&a, &b);
            prop_assert!(min >= 0.0);
            prop_assert!(min <= max);
        }
    }
}
