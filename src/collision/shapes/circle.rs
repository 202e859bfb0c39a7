use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::fixed_math::{sqrt, FixedNum, FixedVec2, Transform, EPSILON, HALF, PI};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleShape {
    /// Center in body coordinates.
    pub position: FixedVec2,
    pub radius: FixedNum,
}

impl CircleShape {
    pub fn new(position: FixedVec2, radius: FixedNum) -> Self {
        Self { position, radius }
    }

    pub fn test_point(&self, xf: &Transform, p: FixedVec2) -> bool {
        let center = xf.apply(self.position);
        let d = p - center;
        d.length_squared() <= self.radius * self.radius
    }

    /// Solves `|p1 + t * (p2 - p1) - center| = radius` for the entering root.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.apply(self.position);
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        // Negative discriminant or degenerate segment.
        if sigma < FixedNum::ZERO || rr < EPSILON {
            return None;
        }

        let a = -(c + sqrt(sigma));
        if FixedNum::ZERO <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            let normal = (s + r * fraction).normalize();
            return Some(RayCastOutput { normal, fraction });
        }
        None
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.apply(self.position);
        Aabb::new(
            FixedVec2::new(p.x - self.radius, p.y - self.radius),
            FixedVec2::new(p.x + self.radius, p.y + self.radius),
        )
    }

    pub fn compute_mass(&self, density: FixedNum) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * PI * rr;
        MassData {
            mass,
            center: self.position,
            // Inertia about the local origin.
            inertia: mass * (HALF * rr + self.position.length_squared()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;

    #[test]
    fn test_circle_mass() {
        let circle = CircleShape::new(FixedVec2::from_int(1, 0), int(2));
        let md = circle.compute_mass(int(1));
        let expected_mass = std::f64::consts::PI * 4.0;
        assert!((md.mass.to_num::<f64>() - expected_mass).abs() < 1e-6);
        assert!((md.inertia.to_num::<f64>() - expected_mass * 3.0).abs() < 1e-5);
        assert_eq!(md.center, FixedVec2::from_int(1, 0));
    }

    #[test]
    fn test_circle_ray_cast() {
        let circle = CircleShape::new(FixedVec2::ZERO, int(1));
        let input = RayCastInput {
            p1: FixedVec2::from_int(-4, 0),
            p2: FixedVec2::from_int(4, 0),
            max_fraction: FixedNum::ONE,
        };
        let hit = circle.ray_cast(&input, &Transform::IDENTITY).unwrap();
        assert!((hit.fraction.to_num::<f64>() - 0.375).abs() < 1e-8);
        assert_eq!(hit.normal, FixedVec2::from_int(-1, 0));
        assert!(circle.test_point(&Transform::IDENTITY, FixedVec2::from_f32(0.5, 0.5)));
    }
}
