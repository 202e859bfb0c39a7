use serde::{Deserialize, Serialize};

use super::{atan2, sin_cos, FixedNum, FixedVec2, TAU};

/// Rotation stored as sine and cosine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rot {
    pub s: FixedNum,
    pub c: FixedNum,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { s: FixedNum::ZERO, c: FixedNum::ONE };

    pub fn from_angle(angle: FixedNum) -> Self {
        let (s, c) = sin_cos(angle);
        Self { s, c }
    }

    pub fn set_angle(&mut self, angle: FixedNum) {
        *self = Self::from_angle(angle);
    }

    pub fn angle(&self) -> FixedNum {
        atan2(self.s, self.c)
    }

    #[inline]
    pub fn x_axis(&self) -> FixedVec2 {
        FixedVec2::new(self.c, self.s)
    }

    #[inline]
    pub fn y_axis(&self) -> FixedVec2 {
        FixedVec2::new(-self.s, self.c)
    }

    /// Rotate a vector.
    #[inline]
    pub fn apply(&self, v: FixedVec2) -> FixedVec2 {
        FixedVec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse rotate a vector.
    #[inline]
    pub fn apply_inv(&self, v: FixedVec2) -> FixedVec2 {
        FixedVec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`
    #[inline]
    pub fn mul(&self, other: &Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// `transpose(self) * other`
    #[inline]
    pub fn mul_t(&self, other: &Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

/// Translation plus rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transform {
    pub p: FixedVec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self { p: FixedVec2::ZERO, q: Rot::IDENTITY };

    pub fn new(p: FixedVec2, angle: FixedNum) -> Self {
        Self { p, q: Rot::from_angle(angle) }
    }

    pub fn set(&mut self, p: FixedVec2, angle: FixedNum) {
        self.p = p;
        self.q = Rot::from_angle(angle);
    }

    /// Local point to world point.
    #[inline]
    pub fn apply(&self, v: FixedVec2) -> FixedVec2 {
        self.q.apply(v) + self.p
    }

    /// World point to local point.
    #[inline]
    pub fn apply_inv(&self, v: FixedVec2) -> FixedVec2 {
        self.q.apply_inv(v - self.p)
    }

    /// `self * other`
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul(&other.q),
            p: self.q.apply(other.p) + self.p,
        }
    }

    /// `inverse(self) * other`
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(&other.q),
            p: self.q.apply_inv(other.p - self.p),
        }
    }
}

/// Motion of a body over a time step, used by continuous collision.
///
/// `c0`/`a0` are the center and angle at `alpha0`, `c`/`a` are the values at
/// the end of the step. Positions are of the center of mass, not the body
/// origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    pub local_center: FixedVec2,
    pub c0: FixedVec2,
    pub c: FixedVec2,
    pub a0: FixedNum,
    pub a: FixedNum,
    /// Fraction of the current step already consumed, in `[0, 1)`.
    pub alpha0: FixedNum,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    pub fn get_transform(&self, beta: FixedNum) -> Transform {
        let one_minus = FixedNum::ONE - beta;
        let center = self.c0 * one_minus + self.c * beta;
        let angle = one_minus * self.a0 + beta * self.a;
        let q = Rot::from_angle(angle);
        Transform { p: center - q.apply(self.local_center), q }
    }

    /// Move the start of the sweep forward to `alpha`.
    pub fn advance(&mut self, alpha: FixedNum) {
        let remaining = FixedNum::ONE - self.alpha0;
        if remaining <= FixedNum::ZERO {
            return;
        }
        let beta = (alpha - self.alpha0) / remaining;
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wrap the angles so `a0` lies in `[0, 2pi)`.
    pub fn normalize(&mut self) {
        let d = TAU * (self.a0 / TAU).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{degrees, int, ratio, FRAC_PI_2};

    fn near(a: FixedVec2, b: FixedVec2) -> bool {
        let tol = FixedNum::from_num(1e-7);
        (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol
    }

    #[test]
    fn test_rot_apply_and_inverse() {
        let q = Rot::from_angle(FRAC_PI_2);
        let v = FixedVec2::from_int(1, 0);
        assert!(near(q.apply(v), FixedVec2::from_int(0, 1)));
        assert!(near(q.apply_inv(q.apply(v)), v));
        assert!((q.angle() - FRAC_PI_2).abs() < FixedNum::from_num(1e-8));
    }

    #[test]
    fn test_transform_composition() {
        let a = Transform::new(FixedVec2::from_int(1, 2), degrees(30));
        let b = Transform::new(FixedVec2::from_int(-3, 1), degrees(45));
        let p = FixedVec2::from_int(2, -1);

        let ab = a.mul(&b);
        assert!(near(ab.apply(p), a.apply(b.apply(p))));

        let atb = a.mul_t(&b);
        assert!(near(atb.apply(p), a.apply_inv(b.apply(p))));
    }

    #[test]
    fn test_sweep_advance_and_transform() {
        let mut sweep = Sweep {
            local_center: FixedVec2::ZERO,
            c0: FixedVec2::ZERO,
            c: FixedVec2::from_int(4, 0),
            a0: FixedNum::ZERO,
            a: int(1),
            alpha0: FixedNum::ZERO,
        };
        let mid = sweep.get_transform(ratio(1, 2));
        assert!(near(mid.p, FixedVec2::from_int(2, 0)));

        sweep.advance(ratio(1, 4));
        assert!(near(sweep.c0, FixedVec2::from_int(1, 0)));
        assert_eq!(sweep.a0, ratio(1, 4));
        assert_eq!(sweep.alpha0, ratio(1, 4));
    }

    #[test]
    fn test_sweep_normalize_keeps_difference() {
        let mut sweep = Sweep {
            a0: int(7),
            a: int(8),
            ..Default::default()
        };
        sweep.normalize();
        assert!(sweep.a0 >= FixedNum::ZERO && sweep.a0 < TAU);
        assert_eq!(sweep.a - sweep.a0, int(1));
    }
}
