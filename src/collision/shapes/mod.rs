//! Convex shape primitives and the closed `Shape` enum the solver dispatches on.

mod chain;
mod circle;
mod edge;
mod polygon;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

use serde::{Deserialize, Serialize};

use super::{Aabb, RayCastInput, RayCastOutput};
use crate::fixed_math::{FixedNum, FixedVec2, Transform};

/// Mass properties of a shape or body. `inertia` is about the local origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassData {
    pub mass: FixedNum,
    pub center: FixedVec2,
    pub inertia: FixedNum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Circle(CircleShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius.
    pub fn radius(&self) -> FixedNum {
        match self {
            Shape::Circle(s) => s.radius,
            Shape::Edge(s) => s.radius,
            Shape::Polygon(s) => s.radius,
            Shape::Chain(s) => s.radius,
        }
    }

    pub(crate) fn set_skin_radius(&mut self, radius: FixedNum) {
        match self {
            Shape::Circle(_) => {}
            Shape::Edge(s) => s.radius = radius,
            Shape::Polygon(s) => s.radius = radius,
            Shape::Chain(s) => s.radius = radius,
        }
    }

    /// Number of convex children (chain segments), 1 for everything else.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(s) => s.child_count(),
            _ => 1,
        }
    }

    /// Point containment in world coordinates. Edges and chains have no area.
    pub fn test_point(&self, xf: &Transform, p: FixedVec2) -> bool {
        match self {
            Shape::Circle(s) => s.test_point(xf, p),
            Shape::Polygon(s) => s.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(s) => s.ray_cast(input, xf),
            Shape::Edge(s) => s.ray_cast(input, xf),
            Shape::Polygon(s) => s.ray_cast(input, xf),
            Shape::Chain(s) => s.ray_cast(input, xf, child_index),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        match self {
            Shape::Circle(s) => s.compute_aabb(xf),
            Shape::Edge(s) => s.compute_aabb(xf),
            Shape::Polygon(s) => s.compute_aabb(xf),
            Shape::Chain(s) => s.compute_aabb(xf, child_index),
        }
    }

    pub fn compute_mass(&self, density: FixedNum) -> MassData {
        match self {
            Shape::Circle(s) => s.compute_mass(density),
            Shape::Edge(s) => s.compute_mass(),
            Shape::Polygon(s) => s.compute_mass(density),
            Shape::Chain(_) => MassData::default(),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Shape::Circle(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Shape::Polygon(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Shape::Edge(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Shape::Chain(s)
    }
}
