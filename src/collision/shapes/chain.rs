use serde::{Deserialize, Serialize};

use super::EdgeShape;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::fixed_math::{FixedNum, FixedVec2, Transform};
use crate::settings::{DEFAULT_LINEAR_SLOP, DEFAULT_POLYGON_RADIUS};

/// Free-form sequence of line segments. Each segment is a child shape that
/// collides as a one-sided edge with its neighbours as ghost vertices, so
/// bodies slide across the joints without catching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainShape {
    vertices: Vec<FixedVec2>,
    prev_vertex: FixedVec2,
    next_vertex: FixedVec2,
    pub radius: FixedNum,
}

impl ChainShape {
    /// Closed loop. The first vertex is repeated at the end internally.
    pub fn new_loop(vertices: &[FixedVec2]) -> Result<Self, PhysicsError> {
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidShape {
                reason: "chain loop needs at least 3 vertices",
            });
        }
        check_spacing(vertices)?;

        let count = vertices.len();
        let mut closed = Vec::with_capacity(count + 1);
        closed.extend_from_slice(vertices);
        closed.push(vertices[0]);

        Ok(Self {
            prev_vertex: closed[count - 1],
            next_vertex: closed[1],
            vertices: closed,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    /// Open chain with explicit ghost vertices before the first and after
    /// the last vertex.
    pub fn new_chain(
        vertices: &[FixedVec2],
        prev_vertex: FixedVec2,
        next_vertex: FixedVec2,
    ) -> Result<Self, PhysicsError> {
        if vertices.len() < 2 {
            return Err(PhysicsError::InvalidShape {
                reason: "chain needs at least 2 vertices",
            });
        }
        check_spacing(vertices)?;

        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex,
            next_vertex,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    pub fn vertices(&self) -> &[FixedVec2] {
        &self.vertices
    }

    pub fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// One-sided edge for segment `index`.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());
        let count = self.vertices.len();
        let v0 = if index > 0 {
            self.vertices[index - 1]
        } else {
            self.prev_vertex
        };
        let v3 = if index + 2 < count {
            self.vertices[index + 2]
        } else {
            self.next_vertex
        };
        let mut edge = EdgeShape::one_sided(v0, self.vertices[index], self.vertices[index + 1], v3);
        edge.radius = self.radius;
        edge
    }

    /// Segments are hit from both sides by rays.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child_index: usize) -> Option<RayCastOutput> {
        let i1 = child_index;
        let i2 = if child_index + 1 == self.vertices.len() { 0 } else { child_index + 1 };
        EdgeShape::two_sided(self.vertices[i1], self.vertices[i2]).ray_cast(input, xf)
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        let i1 = child_index;
        let i2 = if child_index + 1 == self.vertices.len() { 0 } else { child_index + 1 };
        let v1 = xf.apply(self.vertices[i1]);
        let v2 = xf.apply(self.vertices[i2]);
        Aabb::new(v1.min(v2), v1.max(v2)).fattened(self.radius)
    }
}

fn check_spacing(vertices: &[FixedVec2]) -> Result<(), PhysicsError> {
    let min_squared = DEFAULT_LINEAR_SLOP * DEFAULT_LINEAR_SLOP;
    for pair in vertices.windows(2) {
        if pair[0].distance_squared(pair[1]) <= min_squared {
            return Err(PhysicsError::InvalidShape {
                reason: "chain vertices are too close together",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<FixedVec2> {
        vec![
            FixedVec2::from_int(0, 0),
            FixedVec2::from_int(1, 0),
            FixedVec2::from_int(1, 1),
            FixedVec2::from_int(0, 1),
        ]
    }

    #[test]
    fn test_loop_children_wrap_around() {
        let chain = ChainShape::new_loop(&square()).unwrap();
        assert_eq!(chain.child_count(), 4);

        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, FixedVec2::from_int(0, 1));
        assert_eq!(first.vertex1, FixedVec2::from_int(0, 0));
        assert_eq!(first.vertex2, FixedVec2::from_int(1, 0));
        assert_eq!(first.vertex3, FixedVec2::from_int(1, 1));

        let last = chain.child_edge(3);
        assert_eq!(last.vertex1, FixedVec2::from_int(0, 1));
        assert_eq!(last.vertex2, FixedVec2::from_int(0, 0));
        assert_eq!(last.vertex3, FixedVec2::from_int(1, 0));
        assert!(last.one_sided);
    }

    #[test]
    fn test_open_chain_uses_ghosts() {
        let vs = [FixedVec2::from_int(0, 0), FixedVec2::from_int(1, 0), FixedVec2::from_int(2, 0)];
        let chain = ChainShape::new_chain(&vs, FixedVec2::from_int(-1, 0), FixedVec2::from_int(3, 0)).unwrap();
        assert_eq!(chain.child_count(), 2);
        assert_eq!(chain.child_edge(0).vertex0, FixedVec2::from_int(-1, 0));
        assert_eq!(chain.child_edge(1).vertex3, FixedVec2::from_int(3, 0));
    }

    #[test]
    fn test_duplicate_vertices_rejected() {
        let vs = [FixedVec2::from_int(0, 0), FixedVec2::from_int(0, 0), FixedVec2::from_int(2, 0)];
        assert!(ChainShape::new_chain(&vs, FixedVec2::ZERO, FixedVec2::ZERO).is_err());
        assert!(ChainShape::new_loop(&vs[..2]).is_err());
    }
}
