use super::manifold::{clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType};
use super::shapes::PolygonShape;
use crate::fixed_math::{FixedNum, FixedVec2, Transform, HALF};

/// Largest separation of `poly2` along the edge normals of `poly1`, and the
/// edge that achieves it.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, FixedNum) {
    let xf = xf2.mul_t(xf1);
    let mut best_index = 0;
    let mut max_separation = FixedNum::MIN;

    for (i, (n1, v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // poly1 normal and vertex in poly2's frame.
        let n = xf.q.apply(*n1);
        let v1 = xf.apply(*v1);

        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .min()
            .unwrap_or(FixedNum::MAX);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to the reference edge `edge1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in poly2's frame.
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals()[edge1]));

    let normals2 = poly2.normals();
    let mut index = 0;
    let mut min_dot = FixedNum::MAX;
    for (i, n2) in normals2.iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < normals2.len() { i1 + 1 } else { 0 };
    let vertices2 = poly2.vertices();
    let feature = |index_b: usize| ContactFeature {
        index_a: edge1 as u8,
        index_b: index_b as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };

    [
        ClipVertex { v: xf2.apply(vertices2[i1]), id: feature(i1) },
        ClipVertex { v: xf2.apply(vertices2[i2]), id: feature(i2) },
    ]
}

/// Polygon vs polygon by clipping the incident edge against the side planes
/// of the reference edge.
///
/// The reference face is the edge of largest separation; polygon B is only
/// chosen when it is better by a tolerance, which keeps the choice stable
/// across frames. Points are kept when their separation is within the
/// combined skin radius plus `linear_slop`.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
    linear_slop: FixedNum,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    let k_tol = linear_slop / FixedNum::from_num(10);

    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + k_tol {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let vertices1 = poly1.vertices();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < vertices1.len() { edge1 + 1 } else { 0 };

    let mut v11 = vertices1[iv1];
    let mut v12 = vertices1[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = local_tangent.cross_scalar(FixedNum::ONE);
    let plane_point = (v11 + v12) * HALF;

    let tangent = xf1.q.apply(local_tangent);
    let normal = tangent.cross_scalar(FixedNum::ONE);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polygon skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let clip_points1 = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if clip_points1.len() < 2 {
        return manifold;
    }

    let clip_points2 =
        clip_segment_to_line(&[clip_points1[0], clip_points1[1]], tangent, side_offset2, iv2);
    if clip_points2.len() < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cv in clip_points2.iter().take(2) {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius + linear_slop {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inv(cv.v);
            cp.id = if flip { cv.id.swapped() } else { cv.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;
    use crate::settings::DEFAULT_LINEAR_SLOP;

    #[test]
    fn test_stacked_boxes_produce_two_points() {
        let a = PolygonShape::new_box(int(1), int(1));
        let b = PolygonShape::new_box(int(1), int(1));
        let xf_b = Transform::new(FixedVec2::from_f32(0.0, 1.9), FixedNum::ZERO);
        let m = collide_polygons(&a, &Transform::IDENTITY, &b, &xf_b, DEFAULT_LINEAR_SLOP);
        assert_eq!(m.point_count, 2);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, FixedVec2::UNIT_Y);
        assert_ne!(m.points[0].id.key(), m.points[1].id.key());
    }

    #[test]
    fn test_separated_boxes_produce_nothing() {
        let a = PolygonShape::new_box(int(1), int(1));
        let b = PolygonShape::new_box(int(1), int(1));
        let xf_b = Transform::new(FixedVec2::from_int(0, 3), FixedNum::ZERO);
        let m = collide_polygons(&a, &Transform::IDENTITY, &b, &xf_b, DEFAULT_LINEAR_SLOP);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_ids_stable_under_small_motion() {
        let a = PolygonShape::new_box(int(2), FixedNum::from_num(0.25));
        let b = PolygonShape::new_box(int(1), int(1));
        let xf1 = Transform::new(FixedVec2::from_f32(0.1, 1.22), FixedNum::ZERO);
        let xf2 = Transform::new(FixedVec2::from_f32(0.12, 1.21), FixedNum::ZERO);
        let m1 = collide_polygons(&a, &Transform::IDENTITY, &b, &xf1, DEFAULT_LINEAR_SLOP);
        let m2 = collide_polygons(&a, &Transform::IDENTITY, &b, &xf2, DEFAULT_LINEAR_SLOP);
        assert_eq!(m1.point_count, 2);
        assert_eq!(m1.points[0].id, m2.points[0].id);
        assert_eq!(m1.points[1].id, m2.points[1].id);
    }
}
