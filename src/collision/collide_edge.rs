use super::manifold::{clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType};
use super::shapes::{CircleShape, EdgeShape, PolygonShape};
use crate::fixed_math::{ratio, FixedNum, FixedVec2, Transform};
use crate::settings::{MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES};

/// Edge vs circle. Regions: vertex A, vertex B, or the face between them.
/// One-sided edges reject contacts owned by a neighbouring segment.
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle in the edge's frame.
    let q = xf_a.apply_inv(xf_b.apply(circle_b.position));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Normal points to the right for a CCW winding.
    let mut n = FixedVec2::new(e.y, -e.x);
    let offset = n.dot(q - a);

    if edge_a.one_sided && offset < FixedNum::ZERO {
        return manifold;
    }

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let vertex_contact = |index_a: u8, p: FixedVec2| {
        let mut m = Manifold::default();
        m.point_count = 1;
        m.kind = ManifoldType::Circles;
        m.local_normal = FixedVec2::ZERO;
        m.local_point = p;
        m.points[0].id = ContactFeature {
            index_a,
            index_b: 0,
            type_a: FeatureType::Vertex,
            type_b: FeatureType::Vertex,
        };
        m.points[0].local_point = circle_b.position;
        m
    };

    // Region A
    if v <= FixedNum::ZERO {
        if q.distance(a) > radius {
            return manifold;
        }
        // Is there an edge connected to A that owns this contact?
        if edge_a.one_sided {
            let e1 = a - edge_a.vertex0;
            let u1 = e1.dot(a - q);
            if u1 > FixedNum::ZERO {
                return manifold;
            }
        }
        return vertex_contact(0, a);
    }

    // Region B
    if u <= FixedNum::ZERO {
        if q.distance(b) > radius {
            return manifold;
        }
        if edge_a.one_sided {
            let e2 = edge_a.vertex3 - b;
            let v2 = e2.dot(q - b);
            if v2 > FixedNum::ZERO {
                return manifold;
            }
        }
        return vertex_contact(1, b);
    }

    // Region AB
    let den = e.length_squared();
    let Some(t) = v.checked_div(den) else {
        return manifold;
    };
    let p = a + e * t;
    if q.distance(p) > radius {
        return manifold;
    }

    if offset < FixedNum::ZERO {
        n = -n;
    }
    manifold.point_count = 1;
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.points[0].id = ContactFeature {
        index_a: 0,
        index_b: 0,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };
    manifold.points[0].local_point = circle_b.position;
    manifold
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AxisKind {
    EdgeA,
    EdgeB,
}

/// Separating axis candidate.
#[derive(Clone, Copy, Debug)]
struct EpAxis {
    normal: FixedVec2,
    kind: AxisKind,
    index: usize,
    separation: FixedNum,
}

/// Polygon B expressed in the edge's frame.
struct TempPolygon {
    vertices: [FixedVec2; MAX_POLYGON_VERTICES],
    normals: [FixedVec2; MAX_POLYGON_VERTICES],
    count: usize,
}

struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: FixedVec2,
    v2: FixedVec2,
    normal: FixedVec2,
    side_normal1: FixedVec2,
    side_offset1: FixedNum,
    side_normal2: FixedVec2,
    side_offset2: FixedNum,
}

fn compute_edge_separation(polygon_b: &TempPolygon, v1: FixedVec2, normal1: FixedVec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: FixedVec2::ZERO,
        kind: AxisKind::EdgeA,
        index: 0,
        separation: FixedNum::MIN,
    };

    // Axis with the least overlap.
    for (j, n) in [normal1, -normal1].into_iter().enumerate() {
        let sj = polygon_b.vertices[..polygon_b.count]
            .iter()
            .map(|v| n.dot(*v - v1))
            .min()
            .unwrap_or(FixedNum::MAX);
        if sj > axis.separation {
            axis.index = j;
            axis.separation = sj;
            axis.normal = n;
        }
    }
    axis
}

fn compute_polygon_separation(polygon_b: &TempPolygon, v1: FixedVec2, v2: FixedVec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: FixedVec2::ZERO,
        kind: AxisKind::EdgeB,
        index: 0,
        separation: FixedNum::MIN,
    };

    for i in 0..polygon_b.count {
        let n = -polygon_b.normals[i];
        let s1 = n.dot(polygon_b.vertices[i] - v1);
        let s2 = n.dot(polygon_b.vertices[i] - v2);
        let s = s1.min(s2);
        if s > axis.separation {
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }
    axis
}

/// Edge vs polygon using separating axes. One-sided edges consult the
/// ghost vertices so polygons slide smoothly over chain joints.
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.mul_t(xf_b);
    let centroid_b = xf.apply(polygon_b.centroid());

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;
    let edge1 = (v2 - v1).normalize();

    // Normal points to the right for a CCW winding.
    let normal1 = FixedVec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    if edge_a.one_sided && offset1 < FixedNum::ZERO {
        return manifold;
    }

    let mut temp = TempPolygon {
        vertices: [FixedVec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [FixedVec2::ZERO; MAX_POLYGON_VERTICES],
        count: polygon_b.count(),
    };
    for i in 0..temp.count {
        temp.vertices[i] = xf.apply(polygon_b.vertices()[i]);
        temp.normals[i] = xf.q.apply(polygon_b.normals()[i]);
    }

    let radius = polygon_b.radius + edge_a.radius;

    let edge_axis = compute_edge_separation(&temp, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }

    let polygon_axis = compute_polygon_separation(&temp, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Hysteresis for jitter reduction.
    let k_relative_tol = ratio(49, 50);
    let k_absolute_tol = ratio(1, 1000);

    let mut primary_axis = if polygon_axis.separation - radius
        > k_relative_tol * (edge_axis.separation - radius) + k_absolute_tol
    {
        polygon_axis
    } else {
        edge_axis
    };

    if edge_a.one_sided {
        // Gauss map check against the neighbouring segments.
        let edge0 = (v1 - edge_a.vertex0).normalize();
        let normal0 = FixedVec2::new(edge0.y, -edge0.x);
        let convex1 = edge0.cross(edge1) >= FixedNum::ZERO;

        let edge2 = (edge_a.vertex3 - v2).normalize();
        let normal2 = FixedVec2::new(edge2.y, -edge2.x);
        let convex2 = edge1.cross(edge2) >= FixedNum::ZERO;

        let sin_tol = ratio(1, 10);
        let side1 = primary_axis.normal.dot(edge1) <= FixedNum::ZERO;

        if side1 {
            if convex1 {
                if primary_axis.normal.cross(normal0) > sin_tol {
                    // Skip region
                    return manifold;
                }
            } else {
                // Snap region
                primary_axis = edge_axis;
            }
        } else if convex2 {
            if normal2.cross(primary_axis.normal) > sin_tol {
                return manifold;
            }
        } else {
            primary_axis = edge_axis;
        }
    }

    let (clip_points, mut reference) = match primary_axis.kind {
        AxisKind::EdgeA => {
            manifold.kind = ManifoldType::FaceA;

            // Polygon normal most anti-parallel to the edge normal.
            let mut best_index = 0;
            let mut best_value = primary_axis.normal.dot(temp.normals[0]);
            for i in 1..temp.count {
                let value = primary_axis.normal.dot(temp.normals[i]);
                if value < best_value {
                    best_value = value;
                    best_index = i;
                }
            }

            let i1 = best_index;
            let i2 = if i1 + 1 < temp.count { i1 + 1 } else { 0 };
            let feature = |index_b: usize| ContactFeature {
                index_a: 0,
                index_b: index_b as u8,
                type_a: FeatureType::Face,
                type_b: FeatureType::Vertex,
            };
            let clip_points = [
                ClipVertex { v: temp.vertices[i1], id: feature(i1) },
                ClipVertex { v: temp.vertices[i2], id: feature(i2) },
            ];
            let reference = ReferenceFace {
                i1: 0,
                i2: 1,
                v1,
                v2,
                normal: primary_axis.normal,
                side_normal1: -edge1,
                side_offset1: FixedNum::ZERO,
                side_normal2: edge1,
                side_offset2: FixedNum::ZERO,
            };
            (clip_points, reference)
        }
        AxisKind::EdgeB => {
            manifold.kind = ManifoldType::FaceB;

            let feature = |index_a: u8| ContactFeature {
                index_a,
                index_b: primary_axis.index as u8,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            };
            let clip_points = [
                ClipVertex { v: v2, id: feature(1) },
                ClipVertex { v: v1, id: feature(0) },
            ];

            let i1 = primary_axis.index;
            let i2 = if i1 + 1 < temp.count { i1 + 1 } else { 0 };
            let normal = temp.normals[i1];
            // CCW winding
            let side_normal1 = FixedVec2::new(normal.y, -normal.x);
            let reference = ReferenceFace {
                i1,
                i2,
                v1: temp.vertices[i1],
                v2: temp.vertices[i2],
                normal,
                side_normal1,
                side_offset1: FixedNum::ZERO,
                side_normal2: -side_normal1,
                side_offset2: FixedNum::ZERO,
            };
            (clip_points, reference)
        }
    };

    reference.side_offset1 = reference.side_normal1.dot(reference.v1);
    reference.side_offset2 = reference.side_normal2.dot(reference.v2);

    // Clip the incident edge against the reference face side planes.
    let clip_points1 =
        clip_segment_to_line(&clip_points, reference.side_normal1, reference.side_offset1, reference.i1);
    if clip_points1.len() < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    let clip_points2 = clip_segment_to_line(
        &[clip_points1[0], clip_points1[1]],
        reference.side_normal2,
        reference.side_offset2,
        reference.i2,
    );
    if clip_points2.len() < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    match primary_axis.kind {
        AxisKind::EdgeA => {
            manifold.local_normal = reference.normal;
            manifold.local_point = reference.v1;
        }
        AxisKind::EdgeB => {
            manifold.local_normal = polygon_b.normals()[reference.i1];
            manifold.local_point = polygon_b.vertices()[reference.i1];
        }
    }

    let mut point_count = 0;
    for cv in clip_points2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = reference.normal.dot(cv.v - reference.v1);
        if separation <= radius {
            let cp = &mut manifold.points[point_count];
            match primary_axis.kind {
                AxisKind::EdgeA => {
                    cp.local_point = xf.apply_inv(cv.v);
                    cp.id = cv.id;
                }
                AxisKind::EdgeB => {
                    cp.local_point = cv.v;
                    cp.id = cv.id.swapped();
                }
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_edge() -> EdgeShape {
        // Right-hand normal of (1,0)->(-1,0) points up.
        EdgeShape::one_sided(
            FixedVec2::from_int(2, 0),
            FixedVec2::from_int(1, 0),
            FixedVec2::from_int(-1, 0),
            FixedVec2::from_int(-2, 0),
        )
    }

    #[test]
    fn test_edge_and_circle_face_and_vertex_regions() {
        let edge = EdgeShape::two_sided(FixedVec2::from_int(-1, 0), FixedVec2::from_int(1, 0));
        let circle = CircleShape::new(FixedVec2::ZERO, ratio(1, 2));

        let above = Transform::new(FixedVec2::from_f32(0.0, 0.4), FixedNum::ZERO);
        let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &circle, &above);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, FixedVec2::UNIT_Y);

        let past_end = Transform::new(FixedVec2::from_f32(1.3, 0.0), FixedNum::ZERO);
        let m = collide_edge_and_circle(&edge, &Transform::IDENTITY, &circle, &past_end);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::Circles);
        assert_eq!(m.local_point, FixedVec2::from_int(1, 0));
    }

    #[test]
    fn test_one_sided_edge_rejects_back_side_circle() {
        let circle = CircleShape::new(FixedVec2::ZERO, ratio(1, 2));
        let below = Transform::new(FixedVec2::from_f32(0.0, -0.4), FixedNum::ZERO);
        let m = collide_edge_and_circle(&ground_edge(), &Transform::IDENTITY, &circle, &below);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_one_sided_edge() {
        let edge = ground_edge();
        let boxy = PolygonShape::new_box(ratio(1, 2), ratio(1, 2));
        let xf_b = Transform::new(FixedVec2::from_f32(0.0, 0.49), FixedNum::ZERO);
        let m = collide_edge_and_polygon(&edge, &Transform::IDENTITY, &boxy, &xf_b);
        assert_eq!(m.point_count, 2);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, FixedVec2::UNIT_Y);

        let far = Transform::new(FixedVec2::from_int(0, 3), FixedNum::ZERO);
        assert_eq!(collide_edge_and_polygon(&edge, &Transform::IDENTITY, &boxy, &far).point_count, 0);
    }
}
