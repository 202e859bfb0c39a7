use serde::{Deserialize, Serialize};

use super::{isqrt_u128, FixedNum, EPSILON};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: FixedNum,
    pub y: FixedNum,
}

impl FixedVec2 {
    pub const ZERO: Self = Self { x: FixedNum::ZERO, y: FixedNum::ZERO };
    pub const UNIT_X: Self = Self { x: FixedNum::ONE, y: FixedNum::ZERO };
    pub const UNIT_Y: Self = Self { x: FixedNum::ZERO, y: FixedNum::ONE };

    #[inline]
    pub const fn new(x: FixedNum, y: FixedNum) -> Self {
        Self { x, y }
    }

    /// Convert from floats. Only meant for configuration and tests.
    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    pub fn from_int(x: i32, y: i32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    pub fn to_f32(self) -> (f32, f32) {
        (self.x.to_num(), self.y.to_num())
    }

    /// Euclidean length. Computed on the raw bits so it cannot overflow
    /// for any representable vector.
    pub fn length(self) -> FixedNum {
        let xb = self.x.to_bits() as i128;
        let yb = self.y.to_bits() as i128;
        let sum = (xb * xb) as u128 + (yb * yb) as u128;
        let root = isqrt_u128(sum);
        FixedNum::from_bits(root.min(i64::MAX as u128) as i64)
    }

    #[inline]
    pub fn length_squared(self) -> FixedNum {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction, or zero when the length is below
    /// `EPSILON`.
    pub fn normalize(self) -> Self {
        self.normalize_with_length().0
    }

    /// Normalize and report the original length. Near-zero vectors yield
    /// `(ZERO, 0)` instead of dividing by a tiny value.
    pub fn normalize_with_length(self) -> (Self, FixedNum) {
        let len = self.length();
        if len < EPSILON {
            (Self::ZERO, FixedNum::ZERO)
        } else {
            (
                Self {
                    x: self.x / len,
                    y: self.y / len,
                },
                len,
            )
        }
    }

    #[inline]
    pub fn dot(self, other: Self) -> FixedNum {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component of the 3D cross product).
    #[inline]
    pub fn cross(self, other: Self) -> FixedNum {
        self.x * other.y - self.y * other.x
    }

    /// Cross product of this vector with a scalar: `(s * y, -s * x)`.
    #[inline]
    pub fn cross_scalar(self, s: FixedNum) -> Self {
        Self { x: s * self.y, y: -s * self.x }
    }

    /// Cross product of a scalar with a vector: `(-s * y, s * x)`.
    #[inline]
    pub fn scalar_cross(s: FixedNum, v: Self) -> Self {
        Self { x: -s * v.y, y: s * v.x }
    }

    /// Perpendicular vector such that `skew().dot(other) == self.cross(other)`.
    #[inline]
    pub fn skew(self) -> Self {
        Self { x: -self.y, y: self.x }
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self { x: self.x.abs(), y: self.y.abs() }
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self { x: self.x.min(other.x), y: self.y.min(other.y) }
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self { x: self.x.max(other.x), y: self.y.max(other.y) }
    }

    #[inline]
    pub fn distance(self, other: Self) -> FixedNum {
        (self - other).length()
    }

    #[inline]
    pub fn distance_squared(self, other: Self) -> FixedNum {
        (self - other).length_squared()
    }

    #[inline]
    pub fn lerp(self, other: Self, t: FixedNum) -> Self {
        self + (other - self) * t
    }
}

impl std::ops::Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<FixedNum> for FixedVec2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

impl std::ops::Mul<FixedVec2> for FixedNum {
    type Output = FixedVec2;
    #[inline]
    fn mul(self, rhs: FixedVec2) -> Self::Output {
        FixedVec2 { x: self * rhs.x, y: self * rhs.y }
    }
}

impl std::ops::Div<FixedNum> for FixedVec2 {
    type Output = Self;
    #[inline]
    fn div(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x / rhs, y: self.y / rhs }
    }
}

impl std::ops::Neg for FixedVec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self::Output {
        Self { x: -self.x, y: -self.y }
    }
}

impl std::ops::AddAssign for FixedVec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for FixedVec2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::MulAssign<FixedNum> for FixedVec2 {
    #[inline]
    fn mul_assign(&mut self, rhs: FixedNum) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    #[test]
    fn test_length_three_four_five() {
        let v = FixedVec2::from_int(3, 4);
        assert_eq!(v.length(), int(5));
        assert_eq!(v.length_squared(), int(25));
    }

    #[test]
    fn test_length_does_not_overflow() {
        let v = FixedVec2::from_int(100_000, 100_000);
        let expected = FixedNum::from_num(141_421.356_237_31_f64);
        assert!((v.length() - expected).abs() < ratio(1, 1000));
    }

    #[test]
    fn test_normalize_small_vector_is_zero() {
        let tiny = FixedVec2::new(FixedNum::from_bits(3), FixedNum::ZERO);
        let (n, len) = tiny.normalize_with_length();
        assert_eq!(n, FixedVec2::ZERO);
        assert_eq!(len, FixedNum::ZERO);

        let (n, len) = FixedVec2::from_int(0, -2).normalize_with_length();
        assert_eq!(n, FixedVec2::from_int(0, -1));
        assert_eq!(len, int(2));
    }

    #[test]
    fn test_cross_products() {
        let a = FixedVec2::from_int(1, 0);
        let b = FixedVec2::from_int(0, 1);
        assert_eq!(a.cross(b), int(1));
        assert_eq!(a.cross_scalar(int(2)), FixedVec2::from_int(0, -2));
        assert_eq!(FixedVec2::scalar_cross(int(2), a), FixedVec2::from_int(0, 2));
        assert_eq!(a.skew().dot(b), a.cross(b));
    }
}
