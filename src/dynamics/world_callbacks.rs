//! Hooks the application can install on a world.
//!
//! Callbacks run while the world is locked: they may read and tweak the
//! contact they are given, but creating or destroying bodies, fixtures or
//! joints from inside them fails with `PhysicsError::WorldLocked`.

use super::contact::Contact;
use super::fixture::Fixture;
use crate::collision::Manifold;
use crate::fixed_math::FixedNum;
use crate::settings::MAX_MANIFOLD_POINTS;

/// Impulses the solver applied to a contact, reported in `post_solve`.
/// Useful for breakage and damage thresholds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContactImpulse {
    pub normal_impulses: [FixedNum; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [FixedNum; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Decides whether two fixtures may generate a contact. Called when their
/// proxies start to overlap, and again for contacts flagged for refiltering.
pub trait ContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        fixture_a.filter().should_collide(fixture_b.filter())
    }
}

/// Category/mask/group filtering only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {}

/// Contact events. All methods default to no-ops.
pub trait ContactListener {
    /// Two fixtures began to touch.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching. Also called when a touching contact is
    /// destroyed.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// After the manifold update, before solving. `old_manifold` is the
    /// manifold of the previous step. The contact may be disabled or have
    /// its material changed here; the change lasts for this step only.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// After the solver ran. Not called for sensors or disabled contacts.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}
