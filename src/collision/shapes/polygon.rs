use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::fixed_math::{FixedNum, FixedVec2, Transform, HALF};
use crate::settings::{DEFAULT_LINEAR_SLOP, DEFAULT_POLYGON_RADIUS, MAX_POLYGON_VERTICES};

/// Convex polygon with counter-clockwise winding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonShape {
    pub(crate) vertices: [FixedVec2; MAX_POLYGON_VERTICES],
    pub(crate) normals: [FixedVec2; MAX_POLYGON_VERTICES],
    pub(crate) count: usize,
    pub(crate) centroid: FixedVec2,
    pub radius: FixedNum,
}

impl PolygonShape {
    /// Axis-aligned box centered on the body origin.
    pub fn new_box(hx: FixedNum, hy: FixedNum) -> Self {
        let mut vertices = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[0] = FixedVec2::new(-hx, -hy);
        vertices[1] = FixedVec2::new(hx, -hy);
        vertices[2] = FixedVec2::new(hx, hy);
        vertices[3] = FixedVec2::new(-hx, hy);
        normals[0] = FixedVec2::new(FixedNum::ZERO, -FixedNum::ONE);
        normals[1] = FixedVec2::new(FixedNum::ONE, FixedNum::ZERO);
        normals[2] = FixedVec2::new(FixedNum::ZERO, FixedNum::ONE);
        normals[3] = FixedVec2::new(-FixedNum::ONE, FixedNum::ZERO);
        Self {
            vertices,
            normals,
            count: 4,
            centroid: FixedVec2::ZERO,
            radius: DEFAULT_POLYGON_RADIUS,
        }
    }

    /// Box with half extents `hx`, `hy` placed at `center` and rotated by `angle`.
    pub fn new_oriented_box(hx: FixedNum, hy: FixedNum, center: FixedVec2, angle: FixedNum) -> Self {
        let mut shape = Self::new_box(hx, hy);
        let xf = Transform::new(center, angle);
        for i in 0..shape.count {
            shape.vertices[i] = xf.apply(shape.vertices[i]);
            shape.normals[i] = xf.q.apply(shape.normals[i]);
        }
        shape.centroid = center;
        shape
    }

    /// Convex hull of `points` (gift wrapping). Points closer than half the
    /// linear slop are welded. Fails when given more than
    /// `MAX_POLYGON_VERTICES` points or when fewer than three distinct hull
    /// points remain.
    pub fn from_points(points: &[FixedVec2]) -> Result<Self, PhysicsError> {
        if points.len() < 3 {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon needs at least 3 points",
            });
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon has more than 8 points",
            });
        }

        let weld = HALF * DEFAULT_LINEAR_SLOP;
        let weld_squared = weld * weld;
        let mut ps = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        let mut temp_count = 0;
        for &v in points {
            let unique = ps[..temp_count]
                .iter()
                .all(|p| v.distance_squared(*p) >= weld_squared);
            if unique {
                ps[temp_count] = v;
                temp_count += 1;
            }
        }
        let n = temp_count;
        if n < 3 {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon points are too close together",
            });
        }

        // Right most point (lowest y on ties) is on the hull.
        let mut i0 = 0;
        let mut x0 = ps[0].x;
        for (i, p) in ps.iter().enumerate().take(n).skip(1) {
            if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
                i0 = i;
                x0 = p.x;
            }
        }

        let mut hull = [0usize; MAX_POLYGON_VERTICES];
        let mut m = 0;
        let mut ih = i0;
        loop {
            if m >= MAX_POLYGON_VERTICES {
                return Err(PhysicsError::InvalidShape {
                    reason: "hull construction did not terminate",
                });
            }
            hull[m] = ih;

            let mut ie = 0;
            for j in 1..n {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[hull[m]];
                let v = ps[j] - ps[hull[m]];
                let c = r.cross(v);
                if c < FixedNum::ZERO {
                    ie = j;
                }
                // Collinear: keep the farthest point.
                if c == FixedNum::ZERO && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }

            m += 1;
            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if m < 3 {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon hull is degenerate",
            });
        }

        let mut vertices = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..m {
            vertices[i] = ps[hull[i]];
        }

        let mut normals = [FixedVec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..m {
            let i2 = if i + 1 < m { i + 1 } else { 0 };
            let edge = vertices[i2] - vertices[i];
            if edge.length_squared() == FixedNum::ZERO {
                return Err(PhysicsError::InvalidShape {
                    reason: "polygon has a zero length edge",
                });
            }
            normals[i] = edge.cross_scalar(FixedNum::ONE).normalize();
        }

        let centroid = compute_centroid(&vertices[..m]).ok_or(PhysicsError::InvalidShape {
            reason: "polygon has no area",
        })?;

        Ok(Self {
            vertices,
            normals,
            count: m,
            centroid,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn vertices(&self) -> &[FixedVec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[FixedVec2] {
        &self.normals[..self.count]
    }

    pub fn centroid(&self) -> FixedVec2 {
        self.centroid
    }

    pub fn test_point(&self, xf: &Transform, p: FixedVec2) -> bool {
        let local = xf.q.apply_inv(p - xf.p);
        (0..self.count).all(|i| self.normals[i].dot(local - self.vertices[i]) <= FixedNum::ZERO)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Work in the polygon's frame.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = FixedNum::ZERO;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator == FixedNum::ZERO {
                if numerator < FixedNum::ZERO {
                    return None;
                }
            } else if denominator < FixedNum::ZERO && numerator < lower * denominator {
                // The segment enters this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > FixedNum::ZERO && numerator < upper * denominator {
                // The segment exits this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q.apply(self.normals[i]),
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let mut lower = xf.apply(self.vertices[0]);
        let mut upper = lower;
        for v in &self.vertices[1..self.count] {
            let w = xf.apply(*v);
            lower = lower.min(w);
            upper = upper.max(w);
        }
        Aabb::new(lower, upper).fattened(self.radius)
    }

    /// Mass from triangle fans rooted at the first vertex. The skin radius is
    /// not included.
    pub fn compute_mass(&self, density: FixedNum) -> MassData {
        let inv3 = FixedNum::ONE / FixedNum::from_num(3);
        let quarter_inv3 = inv3 / FixedNum::from_num(4);
        let s = self.vertices[0];

        let mut center = FixedVec2::ZERO;
        let mut area = FixedNum::ZERO;
        let mut inertia = FixedNum::ZERO;

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = if i + 1 < self.count {
                self.vertices[i + 1] - s
            } else {
                self.vertices[0] - s
            };

            let d = e1.cross(e2);
            let triangle_area = HALF * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * inv3);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += quarter_inv3 * d * (intx2 + inty2);
        }

        let mass = density * area;
        if area <= FixedNum::ZERO {
            return MassData {
                mass,
                center: s,
                inertia: FixedNum::ZERO,
            };
        }

        let local = center / area;
        let center = local + s;
        // Inertia about `s`, shifted to the centroid, then to the body origin.
        let inertia = density * inertia + mass * (center.dot(center) - local.dot(local));
        MassData { mass, center, inertia }
    }

    /// Convexity check: every vertex must be on the inner side of every edge.
    pub fn validate(&self) -> bool {
        for i in 0..self.count {
            let i2 = if i + 1 < self.count { i + 1 } else { 0 };
            let p = self.vertices[i];
            let e = self.vertices[i2] - p;
            for j in 0..self.count {
                if j == i || j == i2 {
                    continue;
                }
                if e.cross(self.vertices[j] - p) < FixedNum::ZERO {
                    return false;
                }
            }
        }
        true
    }
}

/// Area weighted centroid. `None` for zero area.
fn compute_centroid(vs: &[FixedVec2]) -> Option<FixedVec2> {
    let inv3 = FixedNum::ONE / FixedNum::from_num(3);
    let s = vs[0];
    let mut c = FixedVec2::ZERO;
    let mut area = FixedNum::ZERO;

    for i in 0..vs.len() {
        let p1 = FixedVec2::ZERO;
        let p2 = vs[i] - s;
        let p3 = if i + 1 < vs.len() { vs[i + 1] - s } else { FixedVec2::ZERO };

        let e1 = p2 - p1;
        let e2 = p3 - p1;
        let triangle_area = HALF * e1.cross(e2);
        area += triangle_area;
        c += (p1 + p2 + p3) * (triangle_area * inv3);
    }

    if area <= FixedNum::ZERO {
        return None;
    }
    Some(c / area + s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{degrees, int, ratio, sin_cos};

    #[test]
    fn test_hull_orders_points_ccw() {
        let points = [
            FixedVec2::from_int(0, 0),
            FixedVec2::from_int(1, 1),
            FixedVec2::from_int(1, 0),
            FixedVec2::from_int(0, 1),
            FixedVec2::from_f32(0.5, 0.5),
        ];
        let poly = PolygonShape::from_points(&points).unwrap();
        assert_eq!(poly.count(), 4);
        assert!(poly.validate());
        let c = poly.centroid() - FixedVec2::new(ratio(1, 2), ratio(1, 2));
        assert!(c.length() < FixedNum::from_num(1e-8));
        assert_eq!(poly.vertices()[0], FixedVec2::from_int(1, 0));
    }

    #[test]
    fn test_degenerate_hull_rejected() {
        let points = [
            FixedVec2::from_int(0, 0),
            FixedVec2::from_int(1, 0),
            FixedVec2::from_int(2, 0),
        ];
        assert!(matches!(
            PolygonShape::from_points(&points),
            Err(PhysicsError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_too_many_points_rejected() {
        // Regular 12-gon
        let points: Vec<FixedVec2> = (0..12)
            .map(|i| {
                let (s, c) = sin_cos(degrees(30 * i));
                FixedVec2::new(c, s)
            })
            .collect();
        assert!(matches!(
            PolygonShape::from_points(&points),
            Err(PhysicsError::InvalidShape { .. })
        ));
        assert!(PolygonShape::from_points(&points[..MAX_POLYGON_VERTICES]).is_ok());
    }

    #[test]
    fn test_box_mass() {
        let poly = PolygonShape::new_box(int(1), int(2));
        let md = poly.compute_mass(int(2));
        assert_eq!(md.mass, int(16));
        let expected_inertia = 16.0 / 3.0 * 5.0;
        assert!((md.inertia.to_num::<f64>() - expected_inertia).abs() < 1e-6);
        assert!(md.center.length() < FixedNum::from_num(1e-8));
    }

    #[test]
    fn test_box_ray_cast_and_test_point() {
        let poly = PolygonShape::new_box(int(1), int(1));
        let xf = Transform::new(FixedVec2::from_int(5, 0), FixedNum::ZERO);
        let input = RayCastInput {
            p1: FixedVec2::from_int(0, 0),
            p2: FixedVec2::from_int(10, 0),
            max_fraction: FixedNum::ONE,
        };
        let hit = poly.ray_cast(&input, &xf).unwrap();
        assert_eq!(hit.fraction, ratio(2, 5));
        assert_eq!(hit.normal, FixedVec2::from_int(-1, 0));
        assert!(poly.test_point(&xf, FixedVec2::from_f32(5.5, 0.5)));
        assert!(!poly.test_point(&xf, FixedVec2::from_int(3, 0)));
    }
}
