//! Rigid bodies.
//!
//! A `Body` holds its kinematic state, mass properties and the handles of
//! what is attached to it. Anything that touches the broad phase or other
//! bodies (type changes, teleports, enabling) goes through `World`.

use serde::{Deserialize, Serialize};

use super::arena::{Arena, BodyHandle, ContactHandle, FixtureHandle, JointHandle};
use super::fixture::Fixture;
use crate::collision::MassData;
use crate::fixed_math::{inv_or_zero, FixedNum, FixedVec2, Rot, Sweep, Transform};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero mass, zero velocity, moved only by the user.
    #[default]
    Static,
    /// Zero mass, velocity set by the user, moved by the solver.
    Kinematic,
    /// Positive mass, velocity determined by forces and contacts.
    Dynamic,
}

/// Everything needed to create a body. Fixtures are attached afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: FixedVec2,
    pub angle: FixedNum,
    pub linear_velocity: FixedVec2,
    pub angular_velocity: FixedNum,
    pub linear_damping: FixedNum,
    pub angular_damping: FixedNum,
    /// Set false for bodies that should never fall asleep.
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Treat as a fast mover: continuous collision against dynamic bodies too.
    pub bullet: bool,
    pub enabled: bool,
    pub gravity_scale: FixedNum,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: FixedVec2::ZERO,
            angle: FixedNum::ZERO,
            linear_velocity: FixedVec2::ZERO,
            angular_velocity: FixedNum::ZERO,
            linear_damping: FixedNum::ZERO,
            angular_damping: FixedNum::ZERO,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: FixedNum::ONE,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn dynamic(position: FixedVec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    pub fn fixed(position: FixedVec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// Link from a body to a contact it takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEdge {
    pub other: BodyHandle,
    pub contact: ContactHandle,
}

/// Link from a body to a joint it takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointEdge {
    pub other: BodyHandle,
    pub joint: JointHandle,
    /// Copied from the joint so contact filtering needs no joint lookup.
    pub collide_connected: bool,
}

#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,

    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,

    /// Slot in the island currently being solved.
    pub(crate) island_index: usize,

    /// Body origin transform.
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: FixedVec2,
    pub(crate) angular_velocity: FixedNum,

    pub(crate) force: FixedVec2,
    pub(crate) torque: FixedNum,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,

    pub(crate) mass: FixedNum,
    pub(crate) inv_mass: FixedNum,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: FixedNum,
    pub(crate) inv_inertia: FixedNum,

    pub(crate) linear_damping: FixedNum,
    pub(crate) angular_damping: FixedNum,
    pub(crate) gravity_scale: FixedNum,

    pub(crate) sleep_time: FixedNum,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        debug_assert!(def.linear_damping >= FixedNum::ZERO);
        debug_assert!(def.angular_damping >= FixedNum::ZERO);

        let xf = Transform::new(def.position, def.angle);
        Self {
            body_type: def.body_type,
            awake: def.awake && def.body_type != BodyType::Static,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            island_index: 0,
            xf,
            sweep: Sweep {
                local_center: FixedVec2::ZERO,
                c0: def.position,
                c: def.position,
                a0: def.angle,
                a: def.angle,
                alpha0: FixedNum::ZERO,
            },
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: FixedVec2::ZERO,
            torque: FixedNum::ZERO,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            mass: FixedNum::ZERO,
            inv_mass: FixedNum::ZERO,
            inertia: FixedNum::ZERO,
            inv_inertia: FixedNum::ZERO,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: FixedNum::ZERO,
            user_data: def.user_data,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> Transform {
        self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> FixedVec2 {
        self.xf.p
    }

    pub fn angle(&self) -> FixedNum {
        self.sweep.a
    }

    pub fn world_center(&self) -> FixedVec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> FixedVec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> FixedVec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> FixedNum {
        self.angular_velocity
    }

    pub fn force(&self) -> FixedVec2 {
        self.force
    }

    pub fn torque(&self) -> FixedNum {
        self.torque
    }

    pub fn mass(&self) -> FixedNum {
        self.mass
    }

    pub fn inv_mass(&self) -> FixedNum {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> FixedNum {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn inv_inertia(&self) -> FixedNum {
        self.inv_inertia
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    pub fn linear_damping(&self) -> FixedNum {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> FixedNum {
        self.angular_damping
    }

    pub fn gravity_scale(&self) -> FixedNum {
        self.gravity_scale
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    pub fn sleep_time(&self) -> FixedNum {
        self.sleep_time
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn world_point(&self, local_point: FixedVec2) -> FixedVec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: FixedVec2) -> FixedVec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: FixedVec2) -> FixedVec2 {
        self.xf.apply_inv(world_point)
    }

    pub fn local_vector(&self, world_vector: FixedVec2) -> FixedVec2 {
        self.xf.q.apply_inv(world_vector)
    }

    pub fn linear_velocity_from_world_point(&self, world_point: FixedVec2) -> FixedVec2 {
        self.linear_velocity + FixedVec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: FixedVec2) -> FixedVec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    // ------------------------------------------------------------------
    // State that does not touch other bodies or the broad phase
    // ------------------------------------------------------------------

    /// Putting a body to sleep clears its velocity, force and torque.
    /// Static bodies ignore this.
    pub fn set_awake(&mut self, flag: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        self.sleep_time = FixedNum::ZERO;
        if flag {
            self.awake = true;
        } else {
            self.awake = false;
            self.linear_velocity = FixedVec2::ZERO;
            self.angular_velocity = FixedNum::ZERO;
            self.force = FixedVec2::ZERO;
            self.torque = FixedNum::ZERO;
        }
    }

    pub fn set_linear_velocity(&mut self, v: FixedVec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v != FixedVec2::ZERO {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: FixedNum) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w != FixedNum::ZERO {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn set_gravity_scale(&mut self, scale: FixedNum) {
        self.gravity_scale = scale;
    }

    pub fn set_linear_damping(&mut self, damping: FixedNum) {
        self.linear_damping = damping;
    }

    pub fn set_angular_damping(&mut self, damping: FixedNum) {
        self.angular_damping = damping;
    }

    /// Wakes the body unless `wake` is false, in which case a sleeping body
    /// ignores the call. Returns whether the body can receive the input.
    fn accepts_input(&mut self, wake: bool) -> bool {
        if self.body_type != BodyType::Dynamic {
            return false;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        self.awake
    }

    /// Force at a world point. Off-center forces also produce torque.
    pub fn apply_force(&mut self, force: FixedVec2, point: FixedVec2, wake: bool) {
        if self.accepts_input(wake) {
            self.force += force;
            self.torque += (point - self.sweep.c).cross(force);
        }
    }

    pub fn apply_force_to_center(&mut self, force: FixedVec2, wake: bool) {
        if self.accepts_input(wake) {
            self.force += force;
        }
    }

    pub fn apply_torque(&mut self, torque: FixedNum, wake: bool) {
        if self.accepts_input(wake) {
            self.torque += torque;
        }
    }

    /// Impulse at a world point. Changes velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: FixedVec2, point: FixedVec2, wake: bool) {
        if self.accepts_input(wake) {
            self.linear_velocity += impulse * self.inv_mass;
            self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
        }
    }

    pub fn apply_linear_impulse_to_center(&mut self, impulse: FixedVec2, wake: bool) {
        if self.accepts_input(wake) {
            self.linear_velocity += impulse * self.inv_mass;
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: FixedNum, wake: bool) {
        if self.accepts_input(wake) {
            self.angular_velocity += self.inv_inertia * impulse;
        }
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Recompute mass, center and inertia from the attached fixtures.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &Arena<FixtureHandle, Fixture>) {
        self.mass = FixedNum::ZERO;
        self.inv_mass = FixedNum::ZERO;
        self.inertia = FixedNum::ZERO;
        self.inv_inertia = FixedNum::ZERO;
        self.sweep.local_center = FixedVec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = FixedVec2::ZERO;
        for fixture in self.fixtures.iter().filter_map(|&h| fixtures.get(h)) {
            if fixture.density == FixedNum::ZERO {
                continue;
            }
            let md = fixture.mass_data();
            self.mass += md.mass;
            local_center += md.center * md.mass;
            self.inertia += md.inertia;
        }

        if self.mass > FixedNum::ZERO {
            self.inv_mass = inv_or_zero(self.mass);
            local_center = local_center * self.inv_mass;
        }

        if self.inertia > FixedNum::ZERO && !self.fixed_rotation {
            // Shift to the center of mass.
            self.inertia -= self.mass * local_center.length_squared();
            debug_assert!(self.inertia > FixedNum::ZERO);
            self.inv_inertia = inv_or_zero(self.inertia);
        } else {
            self.inertia = FixedNum::ZERO;
            self.inv_inertia = FixedNum::ZERO;
        }

        self.move_center(local_center);
    }

    /// Override the mass properties. Ignored for non-dynamic bodies.
    pub(crate) fn set_mass_data(&mut self, mass_data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.inertia = FixedNum::ZERO;
        self.inv_inertia = FixedNum::ZERO;

        self.mass = if mass_data.mass <= FixedNum::ZERO {
            FixedNum::ONE
        } else {
            mass_data.mass
        };
        self.inv_mass = inv_or_zero(self.mass);

        if mass_data.inertia > FixedNum::ZERO && !self.fixed_rotation {
            self.inertia = mass_data.inertia - self.mass * mass_data.center.length_squared();
            debug_assert!(self.inertia > FixedNum::ZERO);
            self.inv_inertia = inv_or_zero(self.inertia);
        }

        self.move_center(mass_data.center);
    }

    /// Move the center of mass and keep the velocity of the origin.
    fn move_center(&mut self, local_center: FixedVec2) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;
        self.linear_velocity += FixedVec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Rebuild the origin transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Transform at the start of the sweep.
    pub(crate) fn sweep_start_transform(&self) -> Transform {
        let q = Rot::from_angle(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.apply(self.sweep.local_center),
            q,
        }
    }

    /// Advance to the new safe time. Does not sync the broad phase.
    pub(crate) fn advance(&mut self, alpha: FixedNum) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// At least one body must be dynamic, and a joint between the two may
    /// veto collision.
    pub(crate) fn should_collide(&self, other_handle: BodyHandle, other: &Body) -> bool {
        if self.body_type != BodyType::Dynamic && other.body_type != BodyType::Dynamic {
            return false;
        }
        !self
            .joint_edges
            .iter()
            .any(|edge| edge.other == other_handle && !edge.collide_connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::int;

    #[test]
    fn test_sleeping_clears_motion() {
        let mut body = Body::new(&BodyDef::dynamic(FixedVec2::ZERO));
        body.set_linear_velocity(FixedVec2::from_int(3, 0));
        body.apply_torque(int(2), true);
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), FixedVec2::ZERO);
        assert_eq!(body.torque(), FixedNum::ZERO);

        // Without wake, a sleeping body ignores forces.
        body.apply_force_to_center(FixedVec2::from_int(0, 10), false);
        assert_eq!(body.force(), FixedVec2::ZERO);
        body.apply_force_to_center(FixedVec2::from_int(0, 10), true);
        assert!(body.is_awake());
        assert_eq!(body.force(), FixedVec2::from_int(0, 10));
    }

    #[test]
    fn test_static_bodies_ignore_velocity() {
        let mut body = Body::new(&BodyDef::default());
        assert!(!body.is_awake());
        body.set_linear_velocity(FixedVec2::from_int(1, 1));
        assert_eq!(body.linear_velocity(), FixedVec2::ZERO);
    }

    #[test]
    fn test_set_mass_data_moves_center() {
        let mut body = Body::new(&BodyDef::dynamic(FixedVec2::from_int(1, 0)));
        body.set_mass_data(&MassData {
            mass: int(2),
            center: FixedVec2::from_int(0, 1),
            inertia: int(4),
        });
        assert_eq!(body.mass(), int(2));
        assert_eq!(body.world_center(), FixedVec2::from_int(1, 1));
        assert_eq!(body.inertia(), int(4));
        assert_eq!(body.inv_inertia(), FixedNum::from_num(0.5));
    }
}
