use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::fixed_math::{FixedNum, FixedVec2, Transform, HALF};
use crate::settings::DEFAULT_POLYGON_RADIUS;

/// Line segment from `vertex1` to `vertex2`.
///
/// A one-sided edge only collides on its right side (normal points along
/// `cross(v2 - v1, 1)`), and uses the ghost vertices `vertex0` and `vertex3`
/// to smooth collisions across neighbouring segments of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeShape {
    pub vertex0: FixedVec2,
    pub vertex1: FixedVec2,
    pub vertex2: FixedVec2,
    pub vertex3: FixedVec2,
    pub one_sided: bool,
    pub radius: FixedNum,
}

impl EdgeShape {
    pub fn two_sided(v1: FixedVec2, v2: FixedVec2) -> Self {
        Self {
            vertex0: FixedVec2::ZERO,
            vertex1: v1,
            vertex2: v2,
            vertex3: FixedVec2::ZERO,
            one_sided: false,
            radius: DEFAULT_POLYGON_RADIUS,
        }
    }

    /// `v0` and `v3` are the neighbouring (ghost) vertices.
    pub fn one_sided(v0: FixedVec2, v1: FixedVec2, v2: FixedVec2, v3: FixedVec2) -> Self {
        Self {
            vertex0: v0,
            vertex1: v1,
            vertex2: v2,
            vertex3: v3,
            one_sided: true,
            radius: DEFAULT_POLYGON_RADIUS,
        }
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = FixedVec2::new(e.y, -e.x).normalize();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        if self.one_sided && numerator > FixedNum::ZERO {
            return None;
        }

        let denominator = normal.dot(d);
        if denominator == FixedNum::ZERO {
            return None;
        }

        let t = numerator.checked_div(denominator)?;
        if t < FixedNum::ZERO || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;

        // q = v1 + s * r
        let r = v2 - v1;
        let rr = r.length_squared();
        if rr == FixedNum::ZERO {
            return None;
        }

        let s = (q - v1).dot(r).checked_div(rr)?;
        if s < FixedNum::ZERO || FixedNum::ONE < s {
            return None;
        }

        let normal = if numerator > FixedNum::ZERO {
            -xf.q.apply(normal)
        } else {
            xf.q.apply(normal)
        };
        Some(RayCastOutput { normal, fraction: t })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        Aabb::new(v1.min(v2), v1.max(v2)).fattened(self.radius)
    }

    /// Edges are massless.
    pub fn compute_mass(&self) -> MassData {
        MassData {
            mass: FixedNum::ZERO,
            center: (self.vertex1 + self.vertex2) * HALF,
            inertia: FixedNum::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    fn input(p1: FixedVec2, p2: FixedVec2) -> RayCastInput {
        RayCastInput { p1, p2, max_fraction: FixedNum::ONE }
    }

    #[test]
    fn test_two_sided_edge_hit_from_both_sides() {
        let edge = EdgeShape::two_sided(FixedVec2::from_int(-1, 0), FixedVec2::from_int(1, 0));

        let down = edge
            .ray_cast(&input(FixedVec2::from_int(0, 2), FixedVec2::from_int(0, -2)), &Transform::IDENTITY)
            .unwrap();
        assert_eq!(down.fraction, ratio(1, 2));
        assert_eq!(down.normal, FixedVec2::from_int(0, 1));

        let up = edge
            .ray_cast(&input(FixedVec2::from_int(0, -2), FixedVec2::from_int(0, 2)), &Transform::IDENTITY)
            .unwrap();
        assert_eq!(up.normal, FixedVec2::from_int(0, -1));
    }

    #[test]
    fn test_one_sided_edge_ignores_back_face() {
        // Normal of (-1,0)->(1,0) is (0,-1); the front side is below.
        let edge = EdgeShape::one_sided(
            FixedVec2::from_int(-2, 0),
            FixedVec2::from_int(-1, 0),
            FixedVec2::from_int(1, 0),
            FixedVec2::from_int(2, 0),
        );
        let from_above = input(FixedVec2::from_int(0, 2), FixedVec2::from_int(0, -2));
        assert!(edge.ray_cast(&from_above, &Transform::IDENTITY).is_none());
        let from_below = input(FixedVec2::from_int(0, -2), FixedVec2::from_int(0, 2));
        assert!(edge.ray_cast(&from_below, &Transform::IDENTITY).is_some());
    }

    #[test]
    fn test_edge_mass_is_zero() {
        let edge = EdgeShape::two_sided(FixedVec2::from_int(0, 0), FixedVec2::from_int(2, 2));
        let md = edge.compute_mass();
        assert_eq!(md.mass, FixedNum::ZERO);
        assert_eq!(md.center, FixedVec2::new(int(1), int(1)));
    }
}
