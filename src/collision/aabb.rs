use serde::{Deserialize, Serialize};

use super::{RayCastInput, RayCastOutput};
use crate::fixed_math::{FixedNum, FixedVec2, EPSILON, HALF, TWO};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: FixedVec2,
    pub upper: FixedVec2,
}

impl Aabb {
    pub fn new(lower: FixedVec2, upper: FixedVec2) -> Self {
        Self { lower, upper }
    }

    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= FixedNum::ZERO && d.y >= FixedNum::ZERO
    }

    pub fn center(&self) -> FixedVec2 {
        (self.lower + self.upper) * HALF
    }

    /// Half-widths.
    pub fn extents(&self) -> FixedVec2 {
        (self.upper - self.lower) * HALF
    }

    pub fn perimeter(&self) -> FixedNum {
        let wx = self.upper.x - self.lower.x;
        let wy = self.upper.y - self.lower.y;
        TWO * (wx + wy)
    }

    pub fn combine(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            lower: a.lower.min(b.lower),
            upper: a.upper.max(b.upper),
        }
    }

    pub fn combine_with(&mut self, other: &Aabb) {
        *self = Aabb::combine(self, other);
    }

    /// Does this box fully contain `other`?
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.lower - self.upper;
        let d2 = self.lower - other.upper;
        !(d1.x > FixedNum::ZERO || d1.y > FixedNum::ZERO || d2.x > FixedNum::ZERO || d2.y > FixedNum::ZERO)
    }

    /// Grow by `margin` on every side.
    pub fn fattened(&self, margin: FixedNum) -> Aabb {
        let r = FixedVec2::new(margin, margin);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Slab test. Returns `None` when the ray starts inside the box or misses.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = FixedNum::MIN;
        let mut tmax = FixedNum::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = FixedVec2::ZERO;

        for axis in 0..2 {
            let (p_i, d_i, abs_i, lower_i, upper_i) = if axis == 0 {
                (p.x, d.x, abs_d.x, self.lower.x, self.upper.x)
            } else {
                (p.y, d.y, abs_d.y, self.lower.y, self.upper.y)
            };

            if abs_i < EPSILON {
                // Parallel to this slab.
                if p_i < lower_i || upper_i < p_i {
                    return None;
                }
            } else {
                let inv_d = FixedNum::ONE / d_i;
                let mut t1 = (lower_i - p_i) * inv_d;
                let mut t2 = (upper_i - p_i) * inv_d;

                // Sign of the normal vector.
                let mut s = -FixedNum::ONE;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = FixedNum::ONE;
                }

                if t1 > tmin {
                    normal = if axis == 0 {
                        FixedVec2::new(s, FixedNum::ZERO)
                    } else {
                        FixedVec2::new(FixedNum::ZERO, s)
                    };
                    tmin = t1;
                }

                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < FixedNum::ZERO || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput { normal, fraction: tmin })
    }

    pub fn shifted(&self, offset: FixedVec2) -> Aabb {
        Aabb {
            lower: self.lower - offset,
            upper: self.upper - offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    fn unit_box() -> Aabb {
        Aabb::new(FixedVec2::from_int(-1, -1), FixedVec2::from_int(1, 1))
    }

    #[test]
    fn test_combine_contains_overlap() {
        let a = unit_box();
        let b = Aabb::new(FixedVec2::from_int(0, 0), FixedVec2::from_int(3, 2));
        let c = Aabb::combine(&a, &b);
        assert!(c.contains(&a) && c.contains(&b));
        assert!(a.overlaps(&b));
        assert_eq!(c.perimeter(), int(14));
        assert_eq!(c.center(), FixedVec2::new(int(1), ratio(1, 2)));

        let far = Aabb::new(FixedVec2::from_int(5, 5), FixedVec2::from_int(6, 6));
        assert!(!a.overlaps(&far));
    }

    #[test]
    fn test_ray_cast_hits_face() {
        let input = RayCastInput {
            p1: FixedVec2::from_int(-3, 0),
            p2: FixedVec2::from_int(3, 0),
            max_fraction: FixedNum::ONE,
        };
        let hit = unit_box().ray_cast(&input).unwrap();
        assert_eq!(hit.normal, FixedVec2::from_int(-1, 0));
        assert!((hit.fraction - ratio(1, 3)).abs() <= FixedNum::from_bits(4));
    }

    #[test]
    fn test_ray_cast_misses() {
        let input = RayCastInput {
            p1: FixedVec2::from_int(-3, 2),
            p2: FixedVec2::from_int(3, 2),
            max_fraction: FixedNum::ONE,
        };
        assert!(unit_box().ray_cast(&input).is_none());
    }
}
