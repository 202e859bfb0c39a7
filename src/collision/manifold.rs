//! Contact manifolds and the helpers shared by the narrow phase.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::fixed_math::{FixedNum, FixedVec2, Transform, EPSILON_SQUARED, HALF};
use crate::settings::MAX_MANIFOLD_POINTS;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Features that intersect to form a contact point. Used to match points
/// between steps for warm starting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    pub(crate) fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A contact point belonging to a manifold. `local_point` depends on the
/// manifold type:
/// - `Circles`: local center of circle B
/// - `FaceA`: local center of circle B or the clip point of polygon B
/// - `FaceB`: the clip point of polygon A
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifoldPoint {
    pub local_point: FixedVec2,
    pub normal_impulse: FixedNum,
    pub tangent_impulse: FixedNum,
    pub id: ContactFeature,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points for two touching convex shapes, stored in local
/// coordinates so they survive small motions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Not used for `Circles`.
    pub local_normal: FixedVec2,
    pub local_point: FixedVec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }
}

/// World-space view of a manifold, for reporting only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: FixedVec2,
    /// Midpoints between the two surfaces.
    pub points: [FixedVec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [FixedNum; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: FixedNum,
        xf_b: &Transform,
        radius_b: FixedNum,
    ) -> Self {
        let mut wm = WorldManifold::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                wm.normal = FixedVec2::UNIT_X;
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > EPSILON_SQUARED {
                    wm.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + wm.normal * radius_a;
                let c_b = point_b - wm.normal * radius_b;
                wm.points[0] = (c_a + c_b) * HALF;
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + wm.normal * (radius_a - (clip_point - plane_point).dot(wm.normal));
                    let c_b = clip_point - wm.normal * radius_b;
                    wm.points[i] = (c_a + c_b) * HALF;
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + normal * (radius_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * radius_a;
                    wm.points[i] = (c_a + c_b) * HALF;
                    wm.separations[i] = (c_a - c_b).dot(normal);
                }
                // Ensure the normal points from A to B.
                wm.normal = -normal;
            }
        }
        wm
    }
}

/// State of a contact point between two manifolds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Compare the ids of two manifolds. `state1` describes the points of
/// `manifold1` (persist or remove), `state2` those of `manifold2` (add or
/// persist).
pub fn get_point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p1) in manifold1.points().iter().enumerate() {
        state1[i] = if manifold2.points().iter().any(|p2| p2.id.key() == p1.id.key()) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (i, p2) in manifold2.points().iter().enumerate() {
        state2[i] = if manifold1.points().iter().any(|p1| p1.id.key() == p2.id.key()) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}

/// Vertex of a segment being clipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipVertex {
    pub v: FixedVec2,
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clipping of a segment against the half plane
/// `dot(normal, v) <= offset`.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: FixedVec2,
    offset: FixedNum,
    vertex_index_a: usize,
) -> SmallVec<[ClipVertex; 2]> {
    let mut v_out = SmallVec::new();

    // Distance of the end points to the line.
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= FixedNum::ZERO {
        v_out.push(v_in[0]);
    }
    if distance1 <= FixedNum::ZERO {
        v_out.push(v_in[1]);
    }

    // The points are on opposite sides of the plane.
    let straddles = (distance0 < FixedNum::ZERO && distance1 > FixedNum::ZERO)
        || (distance0 > FixedNum::ZERO && distance1 < FixedNum::ZERO);
    if straddles {
        let interp = distance0 / (distance0 - distance1);
        v_out.push(ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            // Vertex A is hitting edge B.
            id: ContactFeature {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        });
    }

    v_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    fn feature(a: u8, b: u8) -> ContactFeature {
        ContactFeature {
            index_a: a,
            index_b: b,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        }
    }

    #[test]
    fn test_clip_segment_keeps_inside_and_adds_intersection() {
        let v_in = [
            ClipVertex { v: FixedVec2::from_int(-1, 0), id: feature(0, 3) },
            ClipVertex { v: FixedVec2::from_int(3, 0), id: feature(0, 4) },
        ];
        let out = clip_segment_to_line(&v_in, FixedVec2::UNIT_X, int(1), 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].v, FixedVec2::from_int(-1, 0));
        assert_eq!(out[1].v, FixedVec2::from_int(1, 0));
        assert_eq!(out[1].id.index_a, 2);
        assert_eq!(out[1].id.index_b, 3);
        assert_eq!(out[1].id.type_b, FeatureType::Face);
    }

    #[test]
    fn test_clip_segment_fully_outside() {
        let v_in = [
            ClipVertex { v: FixedVec2::from_int(2, 0), id: feature(0, 0) },
            ClipVertex { v: FixedVec2::from_int(3, 0), id: feature(0, 1) },
        ];
        assert!(clip_segment_to_line(&v_in, FixedVec2::UNIT_X, int(1), 0).is_empty());
    }

    #[test]
    fn test_point_states() {
        let mut m1 = Manifold::default();
        m1.point_count = 2;
        m1.points[0].id = feature(1, 2);
        m1.points[1].id = feature(1, 3);
        let mut m2 = Manifold::default();
        m2.point_count = 2;
        m2.points[0].id = feature(1, 3);
        m2.points[1].id = feature(2, 0);

        let (s1, s2) = get_point_states(&m1, &m2);
        assert_eq!(s1, [PointState::Remove, PointState::Persist]);
        assert_eq!(s2, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn test_world_manifold_circles() {
        let mut m = Manifold::default();
        m.kind = ManifoldType::Circles;
        m.point_count = 1;
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(FixedVec2::from_f32(1.5, 0.0), FixedNum::ZERO);
        let wm = WorldManifold::new(&m, &xf_a, int(1), &xf_b, int(1));
        assert_eq!(wm.normal, FixedVec2::UNIT_X);
        assert_eq!(wm.separations[0], -ratio(1, 2));
        assert_eq!(wm.points[0], FixedVec2::new(ratio(3, 4), FixedNum::ZERO));
    }
}
