//! Deterministic trigonometry on `FixedNum`.
//!
//! Everything is integer arithmetic: range reduction followed by short
//! Horner-evaluated series, so results are bit-identical on every platform.

use super::{sqrt, FixedNum, FRAC_PI_2, FRAC_PI_4, PI, TAU};

/// Taylor series for sin and cos on `[-pi/4, pi/4]`.
fn sin_cos_reduced(r: FixedNum) -> (FixedNum, FixedNum) {
    let r2 = r * r;

    // sin(r) = r * (1 - r^2/(2*3) * (1 - r^2/(4*5) * (...)))
    let mut s = FixedNum::ONE;
    for d in [110, 72, 42, 20, 6] {
        s = FixedNum::ONE - r2 * s / FixedNum::from_num(d);
    }

    // cos(r) = 1 - r^2/(1*2) * (1 - r^2/(3*4) * (...))
    let mut c = FixedNum::ONE;
    for d in [132, 90, 56, 30, 12, 2] {
        c = FixedNum::ONE - r2 * c / FixedNum::from_num(d);
    }

    (r * s, c)
}

/// Sine and cosine of `angle` (radians) in a single evaluation.
pub fn sin_cos(angle: FixedNum) -> (FixedNum, FixedNum) {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }

    let three_quarter_pi = FRAC_PI_2 + FRAC_PI_4;
    let quadrant: i32 = if a > three_quarter_pi {
        2
    } else if a > FRAC_PI_4 {
        1
    } else if a >= -FRAC_PI_4 {
        0
    } else if a >= -three_quarter_pi {
        -1
    } else {
        -2
    };

    let r = a - FRAC_PI_2 * FixedNum::from_num(quadrant);
    let (s, c) = sin_cos_reduced(r);
    match quadrant {
        0 => (s, c),
        1 => (c, -s),
        -1 => (-c, s),
        _ => (-s, -c),
    }
}

#[inline]
pub fn sin(angle: FixedNum) -> FixedNum {
    sin_cos(angle).0
}

#[inline]
pub fn cos(angle: FixedNum) -> FixedNum {
    sin_cos(angle).1
}

/// atan(z) for z in [0, 1].
fn atan_unit(z: FixedNum) -> FixedNum {
    // Two half-angle reductions: atan(z) = 2 * atan(z / (1 + sqrt(1 + z^2))).
    let mut z = z;
    for _ in 0..2 {
        z /= FixedNum::ONE + sqrt(FixedNum::ONE + z * z);
    }

    let z2 = z * z;
    let mut t = FixedNum::ZERO;
    for k in (0..8).rev() {
        t = FixedNum::ONE / FixedNum::from_num(2 * k + 1) - z2 * t;
    }
    z * t * FixedNum::from_num(4)
}

/// Angle of the vector `(x, y)` in `(-pi, pi]`. Returns zero for the zero vector.
pub fn atan2(y: FixedNum, x: FixedNum) -> FixedNum {
    if x == FixedNum::ZERO && y == FixedNum::ZERO {
        return FixedNum::ZERO;
    }

    let ax = x.abs();
    let ay = y.abs();
    let base = if ay <= ax {
        atan_unit(ay / ax)
    } else {
        FRAC_PI_2 - atan_unit(ax / ay)
    };

    let unsigned = if x < FixedNum::ZERO { PI - base } else { base };
    if y < FixedNum::ZERO {
        -unsigned
    } else {
        unsigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: FixedNum, b: f64, tol: f64) -> bool {
        (a.to_num::<f64>() - b).abs() < tol
    }

    #[test]
    fn test_sin_cos_against_reference() {
        let mut deg = -720;
        while deg <= 720 {
            let rad = FixedNum::from_num(deg) * PI / FixedNum::from_num(180);
            let reference = rad.to_num::<f64>();
            let (s, c) = sin_cos(rad);
            assert!(close(s, reference.sin(), 1e-8), "sin({}) = {}", deg, s);
            assert!(close(c, reference.cos(), 1e-8), "cos({}) = {}", deg, c);
            deg += 7;
        }
    }

    #[test]
    fn test_pythagorean_identity() {
        let mut a = FixedNum::from_num(-10);
        let step = FixedNum::from_num(0.37);
        while a < FixedNum::from_num(10) {
            let (s, c) = sin_cos(a);
            assert!(close(s * s + c * c, 1.0, 1e-8));
            a += step;
        }
    }

    #[test]
    fn test_atan2_quadrants() {
        let one = FixedNum::ONE;
        let cases = [
            (one, one),
            (one, -one),
            (-one, -one),
            (-one, one),
            (FixedNum::ZERO, -one),
            (one, FixedNum::ZERO),
            (-one, FixedNum::ZERO),
            (FixedNum::from_num(3), FixedNum::from_num(0.25)),
            (FixedNum::from_num(-0.01), FixedNum::from_num(40)),
        ];
        for (y, x) in cases {
            let expected = y.to_num::<f64>().atan2(x.to_num::<f64>());
            assert!(close(atan2(y, x), expected, 1e-8), "atan2({}, {})", y, x);
        }
        assert_eq!(atan2(FixedNum::ZERO, FixedNum::ZERO), FixedNum::ZERO);
    }

    #[test]
    fn test_atan2_inverts_sin_cos() {
        let angle = FixedNum::from_num(2.5);
        let (s, c) = sin_cos(angle);
        assert!(close(atan2(s, c), 2.5, 1e-8));
    }
}
