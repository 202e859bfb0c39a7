//! Narrow and broad phase collision detection.
//!
//! Everything in here is pure geometry over `FixedNum`: no bodies, no world.
//! The dynamics layer feeds transforms in and reads manifolds, distances and
//! times of impact out.

pub mod aabb;
pub mod broad_phase;
mod collide_circle;
mod collide_edge;
mod collide_polygon;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod shapes;
pub mod time_of_impact;

pub use aabb::Aabb;
pub use broad_phase::BroadPhase;
pub use collide_circle::{collide_circles, collide_polygon_and_circle};
pub use collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
pub use collide_polygon::collide_polygons;
pub use distance::{
    distance, shape_cast, DistanceInput, DistanceOutput, DistanceProxy, ShapeCastInput,
    ShapeCastOutput, SimplexCache,
};
pub use dynamic_tree::DynamicTree;
pub use manifold::{
    clip_segment_to_line, get_point_states, ClipVertex, ContactFeature, FeatureType, Manifold,
    ManifoldPoint, ManifoldType, PointState, WorldManifold,
};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiState};

use crate::fixed_math::{FixedNum, FixedVec2, Transform, EPSILON};

/// Ray from `p1` towards `p2`, clipped at `max_fraction` of the segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayCastInput {
    pub p1: FixedVec2,
    pub p2: FixedVec2,
    pub max_fraction: FixedNum,
}

/// Hit reported by a ray cast. The hit point is `p1 + fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayCastOutput {
    pub normal: FixedVec2,
    pub fraction: FixedNum,
}

/// Do two shape children overlap? Uses GJK with radii.
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::from_shape(shape_a, index_a),
        proxy_b: DistanceProxy::from_shape(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < EPSILON * FixedNum::from_num(10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;

    #[test]
    fn test_overlap_circles() {
        let a = Shape::Circle(CircleShape::new(FixedVec2::ZERO, int(1)));
        let b = Shape::Circle(CircleShape::new(FixedVec2::ZERO, int(1)));
        let xf_a = Transform::IDENTITY;
        let near = Transform::new(FixedVec2::from_f32(1.5, 0.0), FixedNum::ZERO);
        let far = Transform::new(FixedVec2::from_int(3, 0), FixedNum::ZERO);
        assert!(test_overlap(&a, 0, &b, 0, &xf_a, &near));
        assert!(!test_overlap(&a, 0, &b, 0, &xf_a, &far));
    }
}
