use super::manifold::{ContactFeature, Manifold, ManifoldType};
use super::shapes::{CircleShape, PolygonShape};
use crate::fixed_math::{FixedNum, FixedVec2, Transform, EPSILON, HALF};

pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.position);
    let p_b = xf_b.apply(circle_b.position);
    let radius = circle_a.radius + circle_b.radius;
    if (p_b - p_a).length() > radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.position;
    manifold.local_normal = FixedVec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactFeature::default();
    manifold
}

pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon's frame.
    let c = xf_b.apply(circle_b.position);
    let c_local = xf_a.apply_inv(c);

    // Find the min separating edge.
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let mut normal_index = 0;
    let mut separation = FixedNum::MIN;
    for i in 0..vertices.len() {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[if normal_index + 1 < vertices.len() { normal_index + 1 } else { 0 }];

    manifold.kind = ManifoldType::FaceA;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactFeature::default();

    // Center is inside the polygon.
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * HALF;
        return manifold;
    }

    // Voronoi region of the closest feature.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= FixedNum::ZERO {
        if c_local.distance(v1) > radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= FixedNum::ZERO {
        if c_local.distance(v2) > radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * HALF;
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return Manifold::default();
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;

    #[test]
    fn test_circles_touching_and_apart() {
        let a = CircleShape::new(FixedVec2::ZERO, int(1));
        let b = CircleShape::new(FixedVec2::ZERO, int(1));
        let close = Transform::new(FixedVec2::from_f32(1.5, 0.0), FixedNum::ZERO);
        let m = collide_circles(&a, &Transform::IDENTITY, &b, &close);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::Circles);

        let apart = Transform::new(FixedVec2::from_int(3, 0), FixedNum::ZERO);
        assert_eq!(collide_circles(&a, &Transform::IDENTITY, &b, &apart).point_count, 0);
    }

    #[test]
    fn test_polygon_and_circle_face_region() {
        let poly = PolygonShape::new_box(int(1), int(1));
        let circle = CircleShape::new(FixedVec2::ZERO, int(1));
        let xf_b = Transform::new(FixedVec2::from_f32(0.0, 1.5), FixedNum::ZERO);
        let m = collide_polygon_and_circle(&poly, &Transform::IDENTITY, &circle, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, FixedVec2::UNIT_Y);
        assert_eq!(m.local_point, FixedVec2::from_int(0, 1));
    }

    #[test]
    fn test_polygon_and_circle_vertex_region() {
        let poly = PolygonShape::new_box(int(1), int(1));
        let circle = CircleShape::new(FixedVec2::ZERO, HALF);
        let near_corner = Transform::new(FixedVec2::from_f32(1.25, 1.25), FixedNum::ZERO);
        let m = collide_polygon_and_circle(&poly, &Transform::IDENTITY, &circle, &near_corner);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.local_point, FixedVec2::from_int(1, 1));

        let far_corner = Transform::new(FixedVec2::from_f32(1.5, 1.5), FixedNum::ZERO);
        assert_eq!(
            collide_polygon_and_circle(&poly, &Transform::IDENTITY, &circle, &far_corner).point_count,
            0
        );
    }
}
