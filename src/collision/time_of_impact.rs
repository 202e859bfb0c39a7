//! Time of impact by conservative advancement over separating axes.

use super::distance::{distance_profiled, DistanceInput, DistanceProxy, SimplexCache};
use crate::fixed_math::{FixedNum, FixedVec2, Sweep, HALF};
use crate::profiling::GjkProfile;
use crate::settings::{Settings, MAX_POLYGON_VERTICES};

const MAX_ITERATIONS: usize = 20;
const MAX_ROOT_ITERATIONS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Defines the sweep interval `[0, t_max]`.
    pub t_max: FixedNum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToiState {
    #[default]
    Unknown,
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: FixedNum,
    pub iterations: usize,
    pub root_iterations: usize,
    pub max_root_iterations: usize,
    pub gjk: GjkProfile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: FixedVec2,
    axis: FixedVec2,
}

impl<'a> SeparationFunction<'a> {
    /// Builds the separating axis from the GJK cache and returns it with the
    /// separation at `t1`.
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: FixedNum,
    ) -> (Self, FixedNum) {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.get_transform(t1);
        let xf_b = sweep_b.get_transform(t1);
        let index_a0 = usize::from(cache.index_a[0]);
        let index_b0 = usize::from(cache.index_b[0]);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: FixedVec2::ZERO,
            axis: FixedVec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(index_a0));
            let point_b = xf_b.apply(proxy_b.vertex(index_b0));
            let (axis, s) = (point_b - point_a).normalize_with_length();
            f.axis = axis;
            return (f, s);
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let local_b1 = proxy_b.vertex(index_b0);
            let local_b2 = proxy_b.vertex(usize::from(cache.index_b[1]));

            f.axis = (local_b2 - local_b1).cross_scalar(FixedNum::ONE).normalize();
            let normal = xf_b.q.apply(f.axis);

            f.local_point = (local_b1 + local_b2) * HALF;
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(index_a0));

            let mut s = (point_a - point_b).dot(normal);
            if s < FixedNum::ZERO {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        } else {
            // Two points on A and one or two points on B.
            f.kind = SeparationKind::FaceA;
            let local_a1 = proxy_a.vertex(index_a0);
            let local_a2 = proxy_a.vertex(usize::from(cache.index_a[1]));

            f.axis = (local_a2 - local_a1).cross_scalar(FixedNum::ONE).normalize();
            let normal = xf_a.q.apply(f.axis);

            f.local_point = (local_a1 + local_a2) * HALF;
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(index_b0));

            let mut s = (point_b - point_a).dot(normal);
            if s < FixedNum::ZERO {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        }
    }

    /// Deepest points along the axis at time `t`: `(index_a, index_b, separation)`.
    fn find_min_separation(&self, t: FixedNum) -> (usize, usize, FixedNum) {
        let xf_a = self.sweep_a.get_transform(t);
        let xf_b = self.sweep_b.get_transform(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.apply_inv(self.axis);
                let axis_b = xf_b.q.apply_inv(-self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let axis_b = xf_b.q.apply_inv(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (0, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let axis_a = xf_a.q.apply_inv(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (index_a, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given points along the axis at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: FixedNum) -> FixedNum {
        let xf_a = self.sweep_a.get_transform(t);
        let xf_b = self.sweep_b.get_transform(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Upper bound on the time before two moving shapes touch, found by
/// advancing along separating axes. The sweeps must be in the same time
/// frame. `t` is the last time the shapes were known to be separated when
/// the state is `Touching`.
pub fn time_of_impact(input: &ToiInput, settings: &Settings) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
        ..Default::default()
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    // Large rotations can make the root finder fail.
    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;
    let linear_slop = settings.linear_slop;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = linear_slop.max(total_radius - linear_slop * FixedNum::from_num(3));
    let tolerance = linear_slop / FixedNum::from_num(4);
    debug_assert!(target > tolerance);

    let mut t1 = FixedNum::ZERO;
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: *proxy_a,
        proxy_b: *proxy_b,
        transform_a: sweep_a.get_transform(t1),
        transform_b: sweep_b.get_transform(t1),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // It terminates when an axis is repeated (no progress is made).
    let mut iter = 0;
    loop {
        distance_input.transform_a = sweep_a.get_transform(t1);
        distance_input.transform_b = sweep_b.get_transform(t1);

        // Distance between the cores, with a fresh separating axis.
        let distance_output = distance_profiled(&mut cache, &distance_input, Some(&mut output.gjk));

        // Overlapped: give up on continuous collision.
        if distance_output.distance <= FixedNum::ZERO {
            output.state = ToiState::Overlapped;
            output.t = FixedNum::ZERO;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let (fcn, _) = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point. This loop is bounded by the number of
        // vertices.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (index_a, index_b, mut s2) = fcn.find_min_separation(t2);

            // Final configuration separated?
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Separation reached tolerance: advance.
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Initial overlap, possible when the root finder ran out of
            // iterations.
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(x) - target = 0, mixing secant and bisection.
            let mut root_iter_count = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let bisect = (a1 + a2) * HALF;
                let t = if root_iter_count & 1 == 1 {
                    ((target - s1) * (a2 - a1))
                        .checked_div(s2 - s1)
                        .map_or(bisect, |step| a1 + step)
                } else {
                    bisect
                };
                root_iter_count += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                // Keep the bracket: s1 above target, s2 below.
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter_count == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            output.root_iterations += root_iter_count;
            output.max_root_iterations = output.max_root_iterations.max(root_iter_count);

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == MAX_ITERATIONS {
            // Root finder got stuck.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output.iterations = iter;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{PolygonShape, Shape};
    use crate::fixed_math::int;

    fn sweep(c0: FixedVec2, c: FixedVec2) -> Sweep {
        Sweep {
            local_center: FixedVec2::ZERO,
            c0,
            c,
            a0: FixedNum::ZERO,
            a: FixedNum::ZERO,
            alpha0: FixedNum::ZERO,
        }
    }

    fn box_proxy() -> DistanceProxy {
        let shape: Shape = PolygonShape::new_box(int(1), int(1)).into();
        DistanceProxy::from_shape(&shape, 0)
    }

    #[test]
    fn test_fast_box_touches_before_tunneling() {
        let input = ToiInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            sweep_a: sweep(FixedVec2::ZERO, FixedVec2::ZERO),
            // Would pass straight through A within one step.
            sweep_b: sweep(FixedVec2::from_int(-10, 0), FixedVec2::from_int(10, 0)),
            t_max: FixedNum::ONE,
        };
        let output = time_of_impact(&input, &Settings::default());
        assert_eq!(output.state, ToiState::Touching);
        // Cores meet when B has travelled 8 of 20 units.
        let t = output.t.to_num::<f64>();
        assert!(t > 0.39 && t < 0.4, "t = {t}");
        assert!(output.iterations <= MAX_ITERATIONS);
    }

    #[test]
    fn test_parallel_motion_is_separated() {
        let input = ToiInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            sweep_a: sweep(FixedVec2::ZERO, FixedVec2::ZERO),
            sweep_b: sweep(FixedVec2::from_int(-10, 5), FixedVec2::from_int(10, 5)),
            t_max: FixedNum::ONE,
        };
        let output = time_of_impact(&input, &Settings::default());
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.t, FixedNum::ONE);
    }

    #[test]
    fn test_initial_overlap() {
        let input = ToiInput {
            proxy_a: box_proxy(),
            proxy_b: box_proxy(),
            sweep_a: sweep(FixedVec2::ZERO, FixedVec2::ZERO),
            sweep_b: sweep(FixedVec2::from_f32(0.5, 0.0), FixedVec2::from_int(3, 0)),
            t_max: FixedNum::ONE,
        };
        let output = time_of_impact(&input, &Settings::default());
        assert_eq!(output.state, ToiState::Overlapped);
        assert_eq!(output.t, FixedNum::ZERO);
    }
}
