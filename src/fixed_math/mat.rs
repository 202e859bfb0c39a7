//! Small matrices used by the joint solvers.

use serde::{Deserialize, Serialize};

use super::{inv_or_zero, FixedNum, FixedVec2};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedVec3 {
    pub x: FixedNum,
    pub y: FixedNum,
    pub z: FixedNum,
}

impl FixedVec3 {
    pub const ZERO: Self = Self {
        x: FixedNum::ZERO,
        y: FixedNum::ZERO,
        z: FixedNum::ZERO,
    };

    #[inline]
    pub const fn new(x: FixedNum, y: FixedNum, z: FixedNum) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, other: Self) -> FixedNum {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    #[inline]
    pub fn xy(self) -> FixedVec2 {
        FixedVec2::new(self.x, self.y)
    }
}

impl std::ops::Add for FixedVec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for FixedVec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Neg for FixedVec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<FixedNum> for FixedVec3 {
    type Output = Self;
    fn mul(self, rhs: FixedNum) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::AddAssign for FixedVec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// 2x2 matrix stored by columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mat22 {
    pub ex: FixedVec2,
    pub ey: FixedVec2,
}

impl Mat22 {
    pub const ZERO: Self = Self { ex: FixedVec2::ZERO, ey: FixedVec2::ZERO };

    #[inline]
    pub const fn new(ex: FixedVec2, ey: FixedVec2) -> Self {
        Self { ex, ey }
    }

    fn det(&self) -> FixedNum {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse, or the zero matrix when singular.
    pub fn inverse(&self) -> Mat22 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let det = inv_or_zero(self.det());
        Mat22 {
            ex: FixedVec2::new(det * d, -det * c),
            ey: FixedVec2::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b` without computing the inverse.
    pub fn solve(&self, b: FixedVec2) -> FixedVec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let det = inv_or_zero(self.det());
        FixedVec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    #[inline]
    pub fn mul_vec(&self, v: FixedVec2) -> FixedVec2 {
        FixedVec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

/// 3x3 matrix stored by columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mat33 {
    pub ex: FixedVec3,
    pub ey: FixedVec3,
    pub ez: FixedVec3,
}

impl Mat33 {
    pub const ZERO: Self = Self {
        ex: FixedVec3::ZERO,
        ey: FixedVec3::ZERO,
        ez: FixedVec3::ZERO,
    };

    /// Solve `A * x = b` for the full 3x3 system.
    pub fn solve33(&self, b: FixedVec3) -> FixedVec3 {
        let det = inv_or_zero(self.ex.dot(self.ey.cross(self.ez)));
        FixedVec3::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solve the upper-left 2x2 block only.
    pub fn solve22(&self, b: FixedVec2) -> FixedVec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let det = inv_or_zero(a11 * a22 - a12 * a21);
        FixedVec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    /// Inverse of the upper-left 2x2 block, zero elsewhere.
    pub fn inverse22(&self) -> Mat33 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let det = inv_or_zero(a * d - b * c);
        Mat33 {
            ex: FixedVec3::new(det * d, -det * c, FixedNum::ZERO),
            ey: FixedVec3::new(-det * b, det * a, FixedNum::ZERO),
            ez: FixedVec3::ZERO,
        }
    }

    /// Inverse assuming the matrix is symmetric.
    pub fn sym_inverse33(&self) -> Mat33 {
        let det = inv_or_zero(self.ex.dot(self.ey.cross(self.ez)));
        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23, a33) = (self.ey.y, self.ez.y, self.ez.z);

        let ex = FixedVec3::new(
            det * (a22 * a33 - a23 * a23),
            det * (a13 * a23 - a12 * a33),
            det * (a12 * a23 - a13 * a22),
        );
        let ey = FixedVec3::new(
            ex.y,
            det * (a11 * a33 - a13 * a13),
            det * (a13 * a12 - a11 * a23),
        );
        let ez = FixedVec3::new(ex.z, ey.z, det * (a11 * a22 - a12 * a12));
        Mat33 { ex, ey, ez }
    }

    pub fn mul_vec(&self, v: FixedVec3) -> FixedVec3 {
        self.ex * v.x + self.ey * v.y + self.ez * v.z
    }

    pub fn mul_vec22(&self, v: FixedVec2) -> FixedVec2 {
        FixedVec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;

    #[test]
    fn test_mat22_solve_and_inverse() {
        let m = Mat22::new(FixedVec2::from_int(2, 1), FixedVec2::from_int(1, 3));
        let b = FixedVec2::from_int(3, 5);
        let x = m.solve(b);
        let back = m.mul_vec(x);
        let tol = FixedNum::from_num(1e-8);
        assert!((back.x - b.x).abs() < tol && (back.y - b.y).abs() < tol);
        let y = m.inverse().mul_vec(b);
        assert!((y.x - x.x).abs() < tol && (y.y - x.y).abs() < tol);
    }

    #[test]
    fn test_singular_matrix_solves_to_zero() {
        let m = Mat22::new(FixedVec2::from_int(1, 2), FixedVec2::from_int(2, 4));
        assert_eq!(m.solve(FixedVec2::from_int(1, 1)), FixedVec2::ZERO);
        assert_eq!(m.inverse(), Mat22::ZERO);
    }

    #[test]
    fn test_mat33_solve() {
        let m = Mat33 {
            ex: FixedVec3::new(int(4), int(1), int(0)),
            ey: FixedVec3::new(int(1), int(3), int(1)),
            ez: FixedVec3::new(int(0), int(1), int(2)),
        };
        let b = FixedVec3::new(int(1), int(2), int(3));
        let x = m.solve33(b);
        let back = m.mul_vec(x);
        let tol = FixedNum::from_num(1e-7);
        assert!((back.x - b.x).abs() < tol);
        assert!((back.y - b.y).abs() < tol);
        assert!((back.z - b.z).abs() < tol);

        let inv = m.sym_inverse33();
        let y = inv.mul_vec(b);
        assert!((y.x - x.x).abs() < tol && (y.z - x.z).abs() < tol);
    }
}
