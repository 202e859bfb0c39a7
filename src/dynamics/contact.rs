//! Contacts between two fixture children whose fat AABBs overlap.
//!
//! A contact exists while the broad phase keeps the pair alive; it is only
//! *touching* while the narrow phase produces manifold points (or, for
//! sensors, while the shapes overlap).

use serde::{Deserialize, Serialize};

use super::arena::{BodyHandle, FixtureHandle};
use super::fixture::Fixture;
use crate::collision::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons, test_overlap, Manifold, Shape, ShapeType,
};
use crate::fixed_math::{sqrt, FixedNum, Transform};

/// Narrow-phase routine for a pair of shape types. Fixture A always holds
/// the first shape named.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactKind {
    Circle,
    PolygonAndCircle,
    Polygon,
    EdgeAndCircle,
    EdgeAndPolygon,
    ChainAndCircle,
    ChainAndPolygon,
}

impl ContactKind {
    /// Kind for the ordered pair, and whether the fixtures must be swapped
    /// to match it. `None` for pairs that never collide (edge/chain against
    /// edge/chain).
    pub fn for_shapes(a: ShapeType, b: ShapeType) -> Option<(ContactKind, bool)> {
        use ShapeType::*;
        let entry = match (a, b) {
            (Circle, Circle) => (ContactKind::Circle, false),
            (Polygon, Circle) => (ContactKind::PolygonAndCircle, false),
            (Circle, Polygon) => (ContactKind::PolygonAndCircle, true),
            (Polygon, Polygon) => (ContactKind::Polygon, false),
            (Edge, Circle) => (ContactKind::EdgeAndCircle, false),
            (Circle, Edge) => (ContactKind::EdgeAndCircle, true),
            (Edge, Polygon) => (ContactKind::EdgeAndPolygon, false),
            (Polygon, Edge) => (ContactKind::EdgeAndPolygon, true),
            (Chain, Circle) => (ContactKind::ChainAndCircle, false),
            (Circle, Chain) => (ContactKind::ChainAndCircle, true),
            (Chain, Polygon) => (ContactKind::ChainAndPolygon, false),
            (Polygon, Chain) => (ContactKind::ChainAndPolygon, true),
            (Edge | Chain, Edge | Chain) => return None,
        };
        Some(entry)
    }

    fn evaluate(
        self,
        shape_a: &Shape,
        child_index_a: usize,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        linear_slop: FixedNum,
    ) -> Manifold {
        match (self, shape_a, shape_b) {
            (ContactKind::Circle, Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (ContactKind::PolygonAndCircle, Shape::Polygon(a), Shape::Circle(b)) => {
                collide_polygon_and_circle(a, xf_a, b, xf_b)
            }
            (ContactKind::Polygon, Shape::Polygon(a), Shape::Polygon(b)) => {
                collide_polygons(a, xf_a, b, xf_b, linear_slop)
            }
            (ContactKind::EdgeAndCircle, Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (ContactKind::EdgeAndPolygon, Shape::Edge(a), Shape::Polygon(b)) => {
                collide_edge_and_polygon(a, xf_a, b, xf_b)
            }
            (ContactKind::ChainAndCircle, Shape::Chain(a), Shape::Circle(b)) => {
                collide_edge_and_circle(&a.child_edge(child_index_a), xf_a, b, xf_b)
            }
            (ContactKind::ChainAndPolygon, Shape::Chain(a), Shape::Polygon(b)) => {
                collide_edge_and_polygon(&a.child_edge(child_index_a), xf_a, b, xf_b)
            }
            // Kinds are chosen from the shape types at creation and shapes
            // never change type.
            _ => Manifold::default(),
        }
    }
}

/// Friction mixing: geometric mean, so a frictionless surface stays
/// frictionless against anything.
pub fn mix_friction(friction_a: FixedNum, friction_b: FixedNum) -> FixedNum {
    sqrt(friction_a * friction_b)
}

/// Restitution mixing: the bouncier surface wins.
pub fn mix_restitution(restitution_a: FixedNum, restitution_b: FixedNum) -> FixedNum {
    restitution_a.max(restitution_b)
}

pub fn mix_restitution_threshold(threshold_a: FixedNum, threshold_b: FixedNum) -> FixedNum {
    threshold_a.min(threshold_b)
}

/// Outcome of `Contact::update`, consumed by the contact manager to fire
/// listener events.
pub(crate) struct ContactUpdate {
    pub was_touching: bool,
    pub touching: bool,
    pub sensor: bool,
    pub old_manifold: Manifold,
}

#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) kind: ContactKind,
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_index_a: usize,
    pub(crate) child_index_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,

    pub(crate) touching: bool,
    /// Cleared by the user in `pre_solve`, restored on every update.
    pub(crate) enabled: bool,
    /// A fixture filter changed; re-run the contact filter.
    pub(crate) needs_filtering: bool,
    /// Cached time of impact for the current step, if computed.
    pub(crate) toi: Option<FixedNum>,
    pub(crate) toi_count: usize,

    pub(crate) friction: FixedNum,
    pub(crate) restitution: FixedNum,
    pub(crate) restitution_threshold: FixedNum,
    pub(crate) tangent_speed: FixedNum,
}

impl Contact {
    /// Fixtures must already be ordered for `kind`.
    pub(crate) fn new(
        kind: ContactKind,
        (handle_a, fixture_a, child_index_a): (FixtureHandle, &Fixture, usize),
        (handle_b, fixture_b, child_index_b): (FixtureHandle, &Fixture, usize),
    ) -> Self {
        Self {
            kind,
            fixture_a: handle_a,
            fixture_b: handle_b,
            child_index_a,
            child_index_b,
            body_a: fixture_a.body,
            body_b: fixture_b.body,
            manifold: Manifold::default(),
            touching: false,
            enabled: true,
            needs_filtering: false,
            toi: None,
            toi_count: 0,
            friction: mix_friction(fixture_a.friction, fixture_b.friction),
            restitution: mix_restitution(fixture_a.restitution, fixture_b.restitution),
            restitution_threshold: mix_restitution_threshold(
                fixture_a.restitution_threshold,
                fixture_b.restitution_threshold,
            ),
            tangent_speed: FixedNum::ZERO,
        }
    }

    pub fn kind(&self) -> ContactKind {
        self.kind
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_index_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_index_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Local-space manifold. Use `World::world_manifold` for world points.
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disable the contact for the current step. Only meaningful from
    /// `ContactListener::pre_solve`.
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    pub fn toi_count(&self) -> usize {
        self.toi_count
    }

    pub fn friction(&self) -> FixedNum {
        self.friction
    }

    /// Overrides the mixed friction until reset. Persists across steps.
    pub fn set_friction(&mut self, friction: FixedNum) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> FixedNum {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: FixedNum) {
        self.restitution = restitution;
    }

    pub fn restitution_threshold(&self) -> FixedNum {
        self.restitution_threshold
    }

    pub fn set_restitution_threshold(&mut self, threshold: FixedNum) {
        self.restitution_threshold = threshold;
    }

    /// Desired tangent speed for conveyor belts, in m/s.
    pub fn tangent_speed(&self) -> FixedNum {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: FixedNum) {
        self.tangent_speed = speed;
    }

    pub(crate) fn reset_material(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) {
        self.friction = mix_friction(fixture_a.friction, fixture_b.friction);
        self.restitution = mix_restitution(fixture_a.restitution, fixture_b.restitution);
        self.restitution_threshold =
            mix_restitution_threshold(fixture_a.restitution_threshold, fixture_b.restitution_threshold);
    }

    /// Recompute the manifold and carry impulses over to points whose
    /// feature ids persist.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        fixture_b: &Fixture,
        xf_a: &Transform,
        xf_b: &Transform,
        linear_slop: FixedNum,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;
        self.enabled = true;

        let was_touching = self.touching;
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;

        let touching = if sensor {
            self.manifold.point_count = 0;
            test_overlap(
                &fixture_a.shape,
                self.child_index_a,
                &fixture_b.shape,
                self.child_index_b,
                xf_a,
                xf_b,
            )
        } else {
            self.manifold = self.kind.evaluate(
                &fixture_a.shape,
                self.child_index_a,
                xf_a,
                &fixture_b.shape,
                xf_b,
                linear_slop,
            );

            let count = self.manifold.point_count;
            for mp2 in self.manifold.points[..count].iter_mut() {
                mp2.normal_impulse = FixedNum::ZERO;
                mp2.tangent_impulse = FixedNum::ZERO;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|mp1| mp1.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }
            count > 0
        };

        self.touching = touching;
        ContactUpdate {
            was_touching,
            touching,
            sensor,
            old_manifold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CircleShape, PolygonShape};
    use crate::dynamics::arena::ArenaHandle;
    use crate::dynamics::fixture::FixtureDef;
    use crate::fixed_math::{int, FixedVec2};
    use crate::settings::{DEFAULT_LINEAR_SLOP, DEFAULT_POLYGON_RADIUS};

    fn fixture(shape: Shape, friction: FixedNum) -> Fixture {
        let def = FixtureDef::new(shape).with_friction(friction);
        Fixture::new(BodyHandle::from_parts(0, 0), &def, DEFAULT_POLYGON_RADIUS)
    }

    #[test]
    fn test_kind_table_swaps_order() {
        assert_eq!(
            ContactKind::for_shapes(ShapeType::Circle, ShapeType::Polygon),
            Some((ContactKind::PolygonAndCircle, true))
        );
        assert_eq!(
            ContactKind::for_shapes(ShapeType::Chain, ShapeType::Polygon),
            Some((ContactKind::ChainAndPolygon, false))
        );
        assert_eq!(ContactKind::for_shapes(ShapeType::Edge, ShapeType::Chain), None);
    }

    #[test]
    fn test_mixing_rules() {
        assert_eq!(mix_friction(int(4), int(1)), int(2));
        assert_eq!(mix_friction(FixedNum::ZERO, int(9)), FixedNum::ZERO);
        assert_eq!(mix_restitution(FixedNum::from_num(0.25), FixedNum::from_num(0.5)), FixedNum::from_num(0.5));
        assert_eq!(mix_restitution_threshold(int(1), int(3)), int(1));
    }

    #[test]
    fn test_update_keeps_impulses_for_persistent_points() {
        let a = fixture(Shape::Polygon(PolygonShape::new_box(int(5), int(1))), int(1));
        let b = fixture(Shape::Polygon(PolygonShape::new_box(int(1), int(1))), int(1));
        let mut contact = Contact::new(
            ContactKind::Polygon,
            (FixtureHandle::from_parts(0, 0), &a, 0),
            (FixtureHandle::from_parts(1, 0), &b, 0),
        );

        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(FixedVec2::new(FixedNum::ZERO, FixedNum::from_num(1.99)), FixedNum::ZERO);

        let first = contact.update(&a, &b, &xf_a, &xf_b, DEFAULT_LINEAR_SLOP);
        assert!(!first.was_touching && first.touching);
        assert_eq!(contact.manifold.point_count, 2);

        contact.manifold.points[0].normal_impulse = int(3);
        contact.manifold.points[1].tangent_impulse = int(-1);

        let second = contact.update(&a, &b, &xf_a, &xf_b, DEFAULT_LINEAR_SLOP);
        assert!(second.was_touching && second.touching);
        assert_eq!(contact.manifold.points[0].normal_impulse, int(3));
        assert_eq!(contact.manifold.points[1].tangent_impulse, int(-1));
    }

    #[test]
    fn test_sensor_reports_overlap_without_points() {
        let mut def = FixtureDef::new(Shape::Circle(CircleShape::new(FixedVec2::ZERO, int(1))));
        def.is_sensor = true;
        let a = Fixture::new(BodyHandle::from_parts(0, 0), &def, DEFAULT_POLYGON_RADIUS);
        let b = fixture(Shape::Circle(CircleShape::new(FixedVec2::ZERO, int(1))), int(1));
        let mut contact = Contact::new(
            ContactKind::Circle,
            (FixtureHandle::from_parts(0, 0), &a, 0),
            (FixtureHandle::from_parts(1, 0), &b, 0),
        );
        let xf_b = Transform::new(FixedVec2::from_f32(1.5, 0.0), FixedNum::ZERO);
        let update = contact.update(&a, &b, &Transform::IDENTITY, &xf_b, DEFAULT_LINEAR_SLOP);
        assert!(update.sensor && update.touching);
        assert_eq!(contact.manifold.point_count, 0);
    }
}
