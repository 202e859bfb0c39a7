//! Deterministic fixed-point mathematics library.
//!
//! This module provides deterministic math types and operations using fixed-point
//! arithmetic to ensure identical behavior across different platforms and architectures.
//! Replays and lockstep networking depend on every client producing the exact same
//! bits for the same inputs, so nothing below this module touches `f32`/`f64`.

use fixed::types::I32F32;

pub use mat::{Mat22, Mat33, FixedVec3};
pub use rot::{Rot, Sweep, Transform};
pub use trig::{atan2, cos, sin, sin_cos};
pub use vec2::FixedVec2;

mod mat;
mod rot;
mod trig;
mod vec2;

/// Fixed-point number type used throughout the simulation.
///
/// Uses I32F32 format: 32 bits for the integer part, 32 bits for the fractional part.
/// This provides a range of approximately ±2.1 billion with a precision of ~2.3e-10.
pub type FixedNum = I32F32;

/// Tolerance for "effectively zero" lengths and determinants (2^-24).
pub const EPSILON: FixedNum = FixedNum::from_bits(1 << 8);

/// Threshold for squared lengths. `EPSILON * EPSILON` is below the format's
/// resolution, so squared comparisons use the smallest representable value.
pub const EPSILON_SQUARED: FixedNum = FixedNum::DELTA;

pub const PI: FixedNum = FixedNum::from_bits(13_493_037_705);
pub const FRAC_PI_2: FixedNum = FixedNum::from_bits(6_746_518_852);
pub const FRAC_PI_4: FixedNum = FixedNum::from_bits(3_373_259_426);
pub const TAU: FixedNum = FixedNum::from_bits(26_986_075_409);

pub const HALF: FixedNum = FixedNum::from_bits(1 << 31);
pub const TWO: FixedNum = FixedNum::from_bits(2 << 32);

/// Build a `FixedNum` from an integer.
#[inline]
pub fn int(n: i32) -> FixedNum {
    FixedNum::from_num(n)
}

/// Build a `FixedNum` from the ratio `num / den` without going through floats.
#[inline]
pub fn ratio(num: i32, den: i32) -> FixedNum {
    FixedNum::from_num(num) / FixedNum::from_num(den)
}

/// Angle in radians from degrees, computed in fixed point.
#[inline]
pub fn degrees(deg: i32) -> FixedNum {
    FixedNum::from_num(deg) * PI / FixedNum::from_num(180)
}

#[inline]
pub fn clamp(a: FixedNum, low: FixedNum, high: FixedNum) -> FixedNum {
    a.max(low).min(high)
}

/// Multiply without panicking on overflow. Used where one operand may be
/// `FixedNum::MAX` (open-ended limits).
#[inline]
pub fn safe_mul(a: FixedNum, b: FixedNum) -> FixedNum {
    a.saturating_mul(b)
}

/// `1 / value`, or zero when the inverse is zero or not representable.
/// Near-singular systems then solve to zero instead of overflowing.
#[inline]
pub fn inv_or_zero(value: FixedNum) -> FixedNum {
    if value == FixedNum::ZERO {
        return FixedNum::ZERO;
    }
    FixedNum::ONE.checked_div(value).unwrap_or(FixedNum::ZERO)
}

/// Deterministic square root. Negative inputs return zero.
#[inline]
pub fn sqrt(value: FixedNum) -> FixedNum {
    if value <= FixedNum::ZERO {
        return FixedNum::ZERO;
    }
    // sqrt(bits * 2^-32) * 2^32 == isqrt(bits * 2^32)
    let wide = (value.to_bits() as u128) << 32;
    FixedNum::from_bits(isqrt_u128(wide) as i64)
}

/// Integer square root (floor) using the bit-by-bit method.
pub(crate) fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut remainder = n;
    let mut root: u128 = 0;
    let mut bit: u128 = 1 << ((127 - n.leading_zeros()) & !1);
    while bit != 0 {
        if remainder >= root + bit {
            remainder -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root
}
