//! GJK distance between convex proxies and linear shape casting.

use serde::{Deserialize, Serialize};

use super::shapes::Shape;
use crate::fixed_math::{FixedNum, FixedVec2, Transform, EPSILON, EPSILON_SQUARED, HALF, TWO};
use crate::profiling::GjkProfile;
use crate::settings::{Settings, MAX_POLYGON_VERTICES};

/// Hard cap on GJK iterations.
pub const MAX_GJK_ITERATIONS: usize = 20;

/// Convex vertex cloud plus radius, built from one child of a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceProxy {
    vertices: [FixedVec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: FixedNum,
}

impl DistanceProxy {
    pub fn new(points: &[FixedVec2], radius: FixedNum) -> Self {
        debug_assert!(!points.is_empty() && points.len() <= MAX_POLYGON_VERTICES);
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut vertices = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(&points[..count]);
        Self { vertices, count, radius }
    }

    pub fn from_shape(shape: &Shape, child_index: usize) -> Self {
        match shape {
            Shape::Circle(circle) => Self::new(&[circle.position], circle.radius),
            Shape::Polygon(polygon) => Self::new(polygon.vertices(), polygon.radius),
            Shape::Edge(edge) => Self::new(&[edge.vertex1, edge.vertex2], edge.radius),
            Shape::Chain(chain) => {
                let vs = chain.vertices();
                debug_assert!(child_index < chain.child_count());
                let v2 = if child_index + 1 < vs.len() { vs[child_index + 1] } else { vs[0] };
                Self::new(&[vs[child_index], v2], chain.radius)
            }
        }
    }

    pub fn vertices(&self) -> &[FixedVec2] {
        &self.vertices[..self.count]
    }

    pub fn vertex(&self, index: usize) -> FixedVec2 {
        self.vertices[index]
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: FixedVec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

/// Warm-start state for GJK, carried between calls on the same pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: FixedNum,
    pub count: usize,
    pub index_a: [u8; 3],
    pub index_b: [u8; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub use_radii: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistanceOutput {
    /// Closest point on shape A.
    pub point_a: FixedVec2,
    /// Closest point on shape B.
    pub point_b: FixedVec2,
    pub distance: FixedNum,
    /// Number of GJK iterations used.
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeCastInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub translation_b: FixedVec2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShapeCastOutput {
    pub point: FixedVec2,
    pub normal: FixedVec2,
    pub lambda: FixedNum,
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SimplexVertex {
    /// Support point in proxy A.
    w_a: FixedVec2,
    /// Support point in proxy B.
    w_b: FixedVec2,
    /// w_b - w_a
    w: FixedVec2,
    /// Barycentric coordinate for the closest point.
    a: FixedNum,
    index_a: usize,
    index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

/// `num / den`, zero when the division is undefined.
fn barycentric(num: FixedNum, den: FixedNum) -> FixedNum {
    num.checked_div(den).unwrap_or(FixedNum::ZERO)
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        debug_assert!(cache.count <= 3);
        let mut simplex = Simplex::default();

        // Copy data from cache.
        simplex.count = cache.count.min(3);
        for i in 0..simplex.count {
            let v = &mut simplex.v[i];
            v.index_a = usize::from(cache.index_a[i]);
            v.index_b = usize::from(cache.index_b[i]);
            v.w_a = xf_a.apply(proxy_a.vertex(v.index_a));
            v.w_b = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.w_b - v.w_a;
            v.a = FixedNum::ZERO;
        }

        // Flush the simplex if the metric changed a lot.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < HALF * metric1 || TWO * metric1 < metric2 || metric2 < EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let v = &mut simplex.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.w_a = xf_a.apply(proxy_a.vertex(0));
            v.w_b = xf_b.apply(proxy_b.vertex(0));
            v.w = v.w_b - v.w_a;
            v.a = FixedNum::ONE;
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn search_direction(&self) -> FixedVec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > FixedNum::ZERO {
                    // Origin is left of e12.
                    FixedVec2::scalar_cross(FixedNum::ONE, e12)
                } else {
                    // Origin is right of e12.
                    e12.cross_scalar(FixedNum::ONE)
                }
            }
            _ => FixedVec2::ZERO,
        }
    }

    fn closest_point(&self) -> FixedVec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].w * self.v[0].a + self.v[1].w * self.v[1].a,
            _ => FixedVec2::ZERO,
        }
    }

    fn witness_points(&self) -> (FixedVec2, FixedVec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.w_a * v1.a + v2.w_a * v2.a,
                v1.w_b * v1.a + v2.w_b * v2.a,
            ),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (FixedVec2::ZERO, FixedVec2::ZERO),
        }
    }

    fn metric(&self) -> FixedNum {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => FixedNum::ZERO,
        }
    }

    /// Closest point on the segment w1-w2 to the origin.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= FixedNum::ZERO {
            // a2 <= 0, so we clamp it to 0
            self.v[0].a = FixedNum::ONE;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= FixedNum::ZERO {
            // a1 <= 0, so we clamp it to 0
            self.v[1].a = FixedNum::ONE;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region.
        let sum = d12_1 + d12_2;
        self.v[0].a = barycentric(d12_1, sum);
        self.v[1].a = barycentric(d12_2, sum);
        self.count = 2;
    }

    /// Closest point on the triangle w1-w2-w3 to the origin, by Voronoi
    /// regions of vertices, edges and the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // Edge12
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // Edge13
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // Edge23
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        let zero = FixedNum::ZERO;

        // w1 region
        if d12_2 <= zero && d13_2 <= zero {
            self.v[0].a = FixedNum::ONE;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > zero && d12_2 > zero && d123_3 <= zero {
            let sum = d12_1 + d12_2;
            self.v[0].a = barycentric(d12_1, sum);
            self.v[1].a = barycentric(d12_2, sum);
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > zero && d13_2 > zero && d123_2 <= zero {
            let sum = d13_1 + d13_2;
            self.v[0].a = barycentric(d13_1, sum);
            self.v[2].a = barycentric(d13_2, sum);
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= zero && d23_2 <= zero {
            self.v[1].a = FixedNum::ONE;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= zero && d23_1 <= zero {
            self.v[2].a = FixedNum::ONE;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > zero && d23_2 > zero && d123_1 <= zero {
            let sum = d23_1 + d23_2;
            self.v[1].a = barycentric(d23_1, sum);
            self.v[2].a = barycentric(d23_2, sum);
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let sum = d123_1 + d123_2 + d123_3;
        self.v[0].a = barycentric(d123_1, sum);
        self.v[1].a = barycentric(d123_2, sum);
        self.v[2].a = barycentric(d123_3, sum);
        self.count = 3;
    }

    fn solve(&mut self) {
        match self.count {
            2 => self.solve2(),
            3 => self.solve3(),
            _ => {}
        }
    }
}

/// Closest points between two convex proxies. `cache` warm-starts the
/// simplex and is updated on return.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    distance_profiled(cache, input, None)
}

/// `distance`, also recording call and iteration counts in `profile`.
pub fn distance_profiled(
    cache: &mut SimplexCache,
    input: &DistanceInput,
    profile: Option<&mut GjkProfile>,
) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    // Vertices of the last simplex, to detect cycling.
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_GJK_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        simplex.solve();

        // With 3 points the origin is inside the triangle.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // Origin is probably on a segment or inside; the shapes overlap.
        if d.length_squared() < EPSILON_SQUARED {
            break;
        }

        // Tentative new simplex vertex from the support points.
        let index_a = proxy_a.support(xf_a.q.apply_inv(-d));
        let index_b = proxy_b.support(xf_b.q.apply_inv(d));
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));

        // Iteration count is the number of support point calls.
        iter += 1;

        // Duplicate support points are the main termination criterion.
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.v[simplex.count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: FixedNum::ZERO,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    if let Some(profile) = profile {
        profile.record(iter);
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut distance = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        if distance < EPSILON {
            // Too close to compute a normal safely.
            let p = (point_a + point_b) * HALF;
            point_a = p;
            point_b = p;
            distance = FixedNum::ZERO;
        } else {
            // Keep the points on the surface even when overlapped so they
            // move smoothly.
            let r_a = proxy_a.radius;
            let r_b = proxy_b.radius;
            let normal = (point_b - point_a).normalize();
            distance = (distance - r_a - r_b).max(FixedNum::ZERO);
            point_a += normal * r_a;
            point_b -= normal * r_b;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance,
        iterations: iter,
    }
}

/// Sweep shape B along `translation_b` against a fixed shape A by
/// conservative advancement. Returns `None` on a miss or when the shapes
/// start out overlapped.
pub fn shape_cast(input: &ShapeCastInput, settings: &Settings) -> Option<ShapeCastOutput> {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let radius_a = proxy_a.radius.max(settings.polygon_radius);
    let radius_b = proxy_b.radius.max(settings.polygon_radius);
    let radius = radius_a + radius_b;

    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let r = input.translation_b;
    let mut n = FixedVec2::ZERO;
    let mut lambda = FixedNum::ZERO;

    let mut simplex = Simplex::default();

    // Support point in the -r direction.
    let index_a = proxy_a.support(xf_a.q.apply_inv(-r));
    let w_a = xf_a.apply(proxy_a.vertex(index_a));
    let index_b = proxy_b.support(xf_b.q.apply_inv(r));
    let w_b = xf_b.apply(proxy_b.vertex(index_b));
    let mut v = w_a - w_b;

    // Target distance between the cores.
    let sigma = settings.polygon_radius.max(radius - settings.polygon_radius);
    let tolerance = HALF * settings.linear_slop;

    let mut iter = 0;
    while iter < MAX_GJK_ITERATIONS && v.length() - sigma > tolerance {
        debug_assert!(simplex.count < 3);

        // Support in direction -v (A - B).
        let index_a = proxy_a.support(xf_a.q.apply_inv(-v));
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let index_b = proxy_b.support(xf_b.q.apply_inv(v));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));
        let p = w_a - w_b;

        // -v is a normal at p.
        v = v.normalize();

        // Intersect the ray with the support plane.
        let vp = v.dot(p);
        let vr = v.dot(r);
        if vp - sigma > lambda * vr {
            if vr <= FixedNum::ZERO {
                // Moving away.
                return None;
            }

            lambda = (vp - sigma).checked_div(vr)?;
            if lambda > FixedNum::ONE {
                // Hit beyond the sweep.
                return None;
            }

            n = -v;
            simplex.count = 0;
        }

        // Reverse the simplex since it works with B - A. Shift by lambda * r
        // so the closest point is relative to the current clip point.
        simplex.v[simplex.count] = SimplexVertex {
            index_a: index_b,
            w_a: w_b + r * lambda,
            index_b: index_a,
            w_b: w_a,
            w: w_a - (w_b + r * lambda),
            a: FixedNum::ONE,
        };
        simplex.count += 1;

        simplex.solve();

        if simplex.count == 3 {
            // Overlap
            return None;
        }

        v = simplex.closest_point();
        iter += 1;
    }

    if iter == 0 {
        // Initial overlap
        return None;
    }

    let (_, point_a) = simplex.witness_points();

    if v.length_squared() > FixedNum::ZERO {
        n = (-v).normalize();
    }

    Some(ShapeCastOutput {
        point: point_a + n * radius_a,
        normal: n,
        lambda,
        iterations: iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{CircleShape, PolygonShape};
    use crate::fixed_math::int;

    fn box_proxy(h: i32) -> DistanceProxy {
        DistanceProxy::from_shape(&PolygonShape::new_box(int(h), int(h)).into(), 0)
    }

    #[test]
    fn test_distance_between_separated_boxes() {
        let input = DistanceInput {
            proxy_a: box_proxy(1),
            proxy_b: box_proxy(1),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(FixedVec2::from_int(5, 0), FixedNum::ZERO),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input);
        assert!((out.distance - int(3)).abs() < FixedNum::from_num(1e-6));
        assert!((out.point_a.x - int(1)).abs() < FixedNum::from_num(1e-6));
        assert!((out.point_b.x - int(4)).abs() < FixedNum::from_num(1e-6));
        assert!(out.iterations <= MAX_GJK_ITERATIONS);

        // Warm start reaches the same answer.
        let again = distance(&mut cache, &input);
        assert!((again.distance - out.distance).abs() < FixedNum::from_num(1e-6));
    }

    #[test]
    fn test_distance_with_radii_and_profile() {
        let circle: Shape = CircleShape::new(FixedVec2::ZERO, int(1)).into();
        let input = DistanceInput {
            proxy_a: DistanceProxy::from_shape(&circle, 0),
            proxy_b: DistanceProxy::from_shape(&circle, 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(FixedVec2::from_int(0, 5), FixedNum::ZERO),
            use_radii: true,
        };
        let mut profile = GjkProfile::default();
        let out = distance_profiled(&mut SimplexCache::default(), &input, Some(&mut profile));
        assert_eq!(out.distance, int(3));
        assert_eq!(out.point_a, FixedVec2::from_int(0, 1));
        assert_eq!(out.point_b, FixedVec2::from_int(0, 4));
        assert_eq!(profile.calls, 1);
    }

    #[test]
    fn test_overlapping_boxes_report_zero_distance() {
        let input = DistanceInput {
            proxy_a: box_proxy(1),
            proxy_b: box_proxy(1),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(FixedVec2::from_f32(0.5, 0.25), FixedNum::ZERO),
            use_radii: true,
        };
        let out = distance(&mut SimplexCache::default(), &input);
        assert_eq!(out.distance, FixedNum::ZERO);
    }

    #[test]
    fn test_shape_cast_hits_box() {
        let settings = Settings::default();
        let input = ShapeCastInput {
            proxy_a: box_proxy(1),
            proxy_b: box_proxy(1),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(FixedVec2::from_int(6, 0), FixedNum::ZERO),
            translation_b: FixedVec2::from_int(-8, 0),
        };
        let out = shape_cast(&input, &settings).unwrap();
        // The cores meet after 4 units of travel, less the target gap.
        assert!((out.lambda.to_num::<f64>() - 0.5).abs() < 0.01);
        assert!((out.normal - FixedVec2::UNIT_X).length() < FixedNum::from_num(1e-6));

        let away = ShapeCastInput { translation_b: FixedVec2::from_int(8, 0), ..input };
        assert!(shape_cast(&away, &settings).is_none());
    }
}
