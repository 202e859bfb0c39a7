//! The world owns every body, fixture, joint and contact and drives the
//! step pipeline: narrow phase, island solve, continuous collision.
//!
//! Topology (bodies, fixtures, joints, body types) may only change between
//! steps. The world is locked while `step` runs and structural calls made
//! in that window fail with `PhysicsError::WorldLocked`.

use std::hash::Hasher;
use std::time::Instant;

use fixedbitset::FixedBitSet;
use rustc_hash::FxHasher;
use tracing::{debug, trace, warn};

use super::arena::{Arena, ArenaHandle, BodyHandle, ContactHandle, FixtureHandle, JointHandle};
use super::body::{Body, BodyDef, BodyType, JointEdge};
use super::contact::Contact;
use super::contact_manager::ContactManager;
use super::fixture::{Filter, Fixture, FixtureDef, ProxyKey};
use super::island::{Island, IslandContext};
use super::joints::{Joint, JointDef, JointKind};
use super::time_step::TimeStep;
use super::world_callbacks::{ContactFilter, ContactListener};
use crate::collision::{
    time_of_impact, Aabb, BroadPhase, DistanceProxy, MassData, RayCastInput, ToiInput, ToiState, WorldManifold,
};
use crate::error::PhysicsError;
use crate::fixed_math::{inv_or_zero, FixedNum, FixedVec2, Transform, EPSILON};
use crate::profiling::Profile;
#[cfg(feature = "perf_stats")]
use crate::profiling::ToiProfile;
use crate::settings::Settings;

/// Position iterations used by time of impact sub-steps.
const TOI_POSITION_ITERATIONS: usize = 20;

/// Move a body's proxies to cover its motion over the last step.
fn synchronize_fixtures(body: &Body, fixtures: &mut Arena<FixtureHandle, Fixture>, broad_phase: &mut BroadPhase<ProxyKey>) {
    let xf1 = body.sweep_start_transform();
    let xf2 = body.xf;
    for &handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle) {
            fixture.synchronize(broad_phase, &xf1, &xf2);
        }
    }
}

/// Flag every contact between `body_a` and `body_b` for refiltering.
fn flag_contacts_between(
    bodies: &Arena<BodyHandle, Body>,
    contacts: &mut Arena<ContactHandle, Contact>,
    body_a: BodyHandle,
    body_b: BodyHandle,
) {
    let Some(body) = bodies.get(body_b) else {
        return;
    };
    for edge in body.contact_edges.iter().filter(|edge| edge.other == body_a) {
        if let Some(contact) = contacts.get_mut(edge.contact) {
            contact.needs_filtering = true;
        }
    }
}

/// Island membership flags, indexed by arena slot.
#[derive(Default)]
struct IslandFlags {
    bodies: FixedBitSet,
    contacts: FixedBitSet,
    joints: FixedBitSet,
}

impl IslandFlags {
    fn reset(&mut self, bodies: usize, contacts: usize, joints: usize) {
        for (set, len) in [
            (&mut self.bodies, bodies),
            (&mut self.contacts, contacts),
            (&mut self.joints, joints),
        ] {
            set.clear();
            set.grow(len);
        }
    }
}

pub struct World {
    bodies: Arena<BodyHandle, Body>,
    fixtures: Arena<FixtureHandle, Fixture>,
    joints: Arena<JointHandle, Joint>,
    contact_manager: ContactManager,
    settings: Settings,
    gravity: FixedVec2,

    island: Island,
    flags: IslandFlags,
    stack: Vec<BodyHandle>,
    seeds: Vec<BodyHandle>,

    locked: bool,
    new_contacts: bool,
    /// False while sub-stepping has left part of the step unsolved.
    step_complete: bool,

    pub allow_sleeping: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    /// Solve one time of impact event per step. Debugging aid.
    pub sub_stepping: bool,
    pub auto_clear_forces: bool,

    /// `1 / dt` of the previous step, for warm-start scaling.
    inv_dt0: FixedNum,
    step_index: u64,
    profile: Profile,
    #[cfg(feature = "perf_stats")]
    toi_profile: ToiProfile,
}

impl World {
    pub fn new(gravity: FixedVec2) -> Self {
        Self::with_settings(gravity, Settings::default())
    }

    pub fn with_settings(gravity: FixedVec2, settings: Settings) -> Self {
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(&settings),
            settings,
            gravity,
            island: Island::default(),
            flags: IslandFlags::default(),
            stack: Vec::new(),
            seeds: Vec::new(),
            locked: false,
            new_contacts: false,
            step_complete: true,
            allow_sleeping: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
            inv_dt0: FixedNum::ZERO,
            step_index: 0,
            profile: Profile::default(),
            #[cfg(feature = "perf_stats")]
            toi_profile: ToiProfile::default(),
        }
    }

    fn ensure_unlocked(&self) -> Result<(), PhysicsError> {
        if self.locked {
            warn!("Rejected topology change while the world is stepping");
            return Err(PhysicsError::WorldLocked);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyHandle, PhysicsError> {
        self.ensure_unlocked()?;
        let handle = self.bodies.insert(Body::new(def));
        trace!("Created {:?} body {:?}", def.body_type, handle);
        Ok(handle)
    }

    /// Destroys the body with its fixtures, joints and contacts.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        let body = self.bodies.get(handle).ok_or(PhysicsError::InvalidBody)?;

        let joint_handles: Vec<JointHandle> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        for joint in joint_handles {
            // A gear joint may already be gone with the joint it coupled.
            if self.joints.contains(joint) {
                self.destroy_joint(joint)?;
            }
        }

        let contact_handles: Vec<ContactHandle> =
            self.bodies[handle].contact_edges.iter().map(|edge| edge.contact).collect();
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies, &self.fixtures);
        }

        if let Some(mut body) = self.bodies.remove(handle) {
            for fixture_handle in body.fixtures.drain(..) {
                if let Some(mut fixture) = self.fixtures.remove(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
        }
        trace!("Destroyed body {:?}", handle);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    /// Mutable access for velocities, forces, sleep and damping. Changes
    /// that affect the broad phase or mass go through the `World` setters.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    fn body_checked(&mut self, handle: BodyHandle) -> Result<&mut Body, PhysicsError> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)
    }

    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.body_type == body_type {
            return Ok(());
        }

        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = FixedVec2::ZERO;
            body.angular_velocity = FixedNum::ZERO;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.awake = false;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        let body = &mut self.bodies[handle];
        body.set_awake(true);
        body.force = FixedVec2::ZERO;
        body.torque = FixedNum::ZERO;

        // Contacts depend on the body types; rebuild them.
        let contact_handles: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies, &self.fixtures);
        }

        for &fixture in &self.bodies[handle].fixtures {
            if let Some(fixture) = self.fixtures.get(fixture) {
                fixture.touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        Ok(())
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: FixedVec2, angle: FixedNum) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;

        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        let xf = body.xf;
        for &fixture in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.new_contacts = true;
        Ok(())
    }

    /// A disabled body keeps its joints and fixtures but has no proxies,
    /// no contacts and is not simulated.
    pub fn set_enabled(&mut self, handle: BodyHandle, flag: bool) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.enabled == flag {
            return Ok(());
        }
        body.enabled = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.create_proxies(fixture_handle, &mut self.contact_manager.broad_phase, &xf);
                }
            }
            self.new_contacts = true;
        } else {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            let contact_handles: Vec<ContactHandle> = body.contact_edges.iter().map(|edge| edge.contact).collect();
            for contact in contact_handles {
                self.contact_manager.destroy(contact, &mut self.bodies, &self.fixtures);
            }
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, flag: bool) -> Result<(), PhysicsError> {
        let fixtures = &self.fixtures;
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.fixed_rotation == flag {
            return Ok(());
        }
        body.fixed_rotation = flag;
        body.angular_velocity = FixedNum::ZERO;
        body.reset_mass_data(fixtures);
        Ok(())
    }

    /// Override the mass computed from the fixtures. Ignored for static and
    /// kinematic bodies.
    pub fn set_mass_data(&mut self, handle: BodyHandle, mass_data: &MassData) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        self.body_checked(handle)?.set_mass_data(mass_data);
        Ok(())
    }

    /// Recompute mass from fixture densities, discarding `set_mass_data`.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let fixtures = &self.fixtures;
        self.bodies
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidBody)?
            .reset_mass_data(fixtures);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Attach a shape to a body. Polygon-like shapes take the world's
    /// polygon radius. A positive density updates the body mass.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> Result<FixtureHandle, PhysicsError> {
        self.ensure_unlocked()?;
        let body = self.bodies.get_mut(body_handle).ok_or(PhysicsError::InvalidBody)?;
        debug_assert!(def.density >= FixedNum::ZERO);

        let handle = self
            .fixtures
            .insert(Fixture::new(body_handle, def, self.settings.polygon_radius));
        if body.enabled {
            self.fixtures[handle].create_proxies(handle, &mut self.contact_manager.broad_phase, &body.xf);
        }
        body.fixtures.push(handle);

        if def.density > FixedNum::ZERO {
            body.reset_mass_data(&self.fixtures);
        }

        // Let the broad phase pick up the new proxies before the next step.
        self.new_contacts = true;
        trace!("Created fixture {:?} on body {:?}", handle, body_handle);
        Ok(handle)
    }

    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        let body_handle = self.fixtures.get(handle).ok_or(PhysicsError::InvalidFixture)?.body;

        let contact_handles: Vec<ContactHandle> = self.bodies[body_handle]
            .contact_edges
            .iter()
            .map(|edge| edge.contact)
            .filter(|&contact| {
                let contact = &self.contact_manager.contacts[contact];
                contact.fixture_a == handle || contact.fixture_b == handle
            })
            .collect();
        for contact in contact_handles {
            self.contact_manager.destroy(contact, &mut self.bodies, &self.fixtures);
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }

        let body = &mut self.bodies[body_handle];
        body.fixtures.retain(|&f| f != handle);
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    /// Material and user data. Use `set_filter_data` and `set_sensor` for
    /// changes that affect contacts.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle)
    }

    /// Change the collision filter. Existing contacts are re-filtered on the
    /// next step and new pairs are found through the broad phase.
    pub fn set_filter_data(&mut self, handle: FixtureHandle, filter: Filter) -> Result<(), PhysicsError> {
        let fixture = self.fixtures.get_mut(handle).ok_or(PhysicsError::InvalidFixture)?;
        fixture.filter = filter;
        self.refilter(handle);
        Ok(())
    }

    fn refilter(&mut self, handle: FixtureHandle) {
        let fixture = &self.fixtures[handle];
        if let Some(body) = self.bodies.get(fixture.body) {
            for edge in &body.contact_edges {
                let contact = &mut self.contact_manager.contacts[edge.contact];
                if contact.fixture_a == handle || contact.fixture_b == handle {
                    contact.needs_filtering = true;
                }
            }
        }
        fixture.touch_proxies(&mut self.contact_manager.broad_phase);
    }

    pub fn set_sensor(&mut self, handle: FixtureHandle, flag: bool) -> Result<(), PhysicsError> {
        let fixture = self.fixtures.get_mut(handle).ok_or(PhysicsError::InvalidFixture)?;
        if fixture.is_sensor != flag {
            fixture.is_sensor = flag;
            let body = fixture.body;
            self.body_checked(body)?.set_awake(true);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> Result<JointHandle, PhysicsError> {
        self.ensure_unlocked()?;
        let def = def.into();
        let joint = match Joint::from_def(&def, &self.bodies, &self.joints, &self.settings) {
            Ok(joint) => joint,
            Err(e) => {
                warn!("Rejected {:?} joint: {}", def.joint_type(), e);
                return Err(e);
            }
        };

        let (body_a, body_b, collide_connected) = (joint.body_a, joint.body_b, joint.collide_connected);
        let handle = self.joints.insert(joint);

        self.bodies[body_a].joint_edges.push(JointEdge {
            other: body_b,
            joint: handle,
            collide_connected,
        });
        self.bodies[body_b].joint_edges.push(JointEdge {
            other: body_a,
            joint: handle,
            collide_connected,
        });

        if !collide_connected {
            flag_contacts_between(&self.bodies, &mut self.contact_manager.contacts, body_a, body_b);
        }

        debug!("Created {:?} joint {:?}", def.joint_type(), handle);
        Ok(handle)
    }

    /// Destroys the joint and any gear joint coupling it. Wakes both bodies.
    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        if !self.joints.contains(handle) {
            return Err(PhysicsError::InvalidJoint);
        }

        let gears: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, joint)| match joint.kind() {
                JointKind::Gear(gear) => gear.joint1() == handle || gear.joint2() == handle,
                _ => false,
            })
            .map(|(gear, _)| gear)
            .collect();
        for gear in gears {
            self.remove_joint(gear);
        }

        self.remove_joint(handle);
        Ok(())
    }

    fn remove_joint(&mut self, handle: JointHandle) {
        let Some(joint) = self.joints.remove(handle) else {
            return;
        };
        let (body_a, body_b) = (joint.body_a, joint.body_b);

        for body_handle in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.set_awake(true);
                body.joint_edges.retain(|edge| edge.joint != handle);
            }
        }

        if !joint.collide_connected {
            flag_contacts_between(&self.bodies, &mut self.contact_manager.contacts, body_a, body_b);
        }
        debug!("Destroyed {:?} joint {:?}", joint.joint_type(), handle);
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    /// Mutable access to a joint. Both bodies are woken so motor, limit and
    /// target changes take effect.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        let joint = self.joints.get_mut(handle)?;
        for body_handle in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.set_awake(true);
            }
        }
        Some(joint)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    // ------------------------------------------------------------------
    // Contacts and callbacks
    // ------------------------------------------------------------------

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contacts.get(handle)
    }

    /// Friction, restitution and tangent speed overrides.
    pub fn contact_mut(&mut self, handle: ContactHandle) -> Option<&mut Contact> {
        self.contact_manager.contacts.get_mut(handle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contact_manager.contacts.iter()
    }

    /// World-space points and normal of a contact, for reporting only.
    pub fn world_manifold(&self, handle: ContactHandle) -> Option<WorldManifold> {
        let contact = self.contact_manager.contacts.get(handle)?;
        let fixture_a = self.fixtures.get(contact.fixture_a)?;
        let fixture_b = self.fixtures.get(contact.fixture_b)?;
        let body_a = self.bodies.get(contact.body_a)?;
        let body_b = self.bodies.get(contact.body_b)?;
        Some(WorldManifold::new(
            &contact.manifold,
            &body_a.xf,
            fixture_a.shape.radius(),
            &body_b.xf,
            fixture_b.shape.radius(),
        ))
    }

    /// Restore the mixed friction and restitution of the two fixtures.
    /// Returns false if the contact no longer exists.
    pub fn reset_contact_material(&mut self, handle: ContactHandle) -> bool {
        let Some(contact) = self.contact_manager.contacts.get_mut(handle) else {
            return false;
        };
        let (Some(fixture_a), Some(fixture_b)) = (self.fixtures.get(contact.fixture_a), self.fixtures.get(contact.fixture_b))
        else {
            return false;
        };
        contact.reset_material(fixture_a, fixture_b);
        true
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.contact_manager.contact_listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) -> Option<Box<dyn ContactListener>> {
        self.contact_manager.contact_listener.take()
    }

    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_manager.contact_filter = filter;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Every fixture child whose fat AABB overlaps `aabb`. The callback
    /// returns false to stop the query.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(FixtureHandle, &Fixture) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy_id| {
            let key = broad_phase.user_data(proxy_id);
            match self.fixtures.get(key.fixture) {
                Some(fixture) => callback(key.fixture, fixture),
                None => true,
            }
        });
    }

    /// Cast a ray from `p1` to `p2`. The callback gets the fixture, the hit
    /// point, the normal and the fraction, and returns -1 to ignore the
    /// fixture, 0 to stop, the fraction to clip the ray or 1 to go on.
    pub fn ray_cast<F>(&self, p1: FixedVec2, p2: FixedVec2, mut callback: F)
    where
        F: FnMut(FixtureHandle, &Fixture, FixedVec2, FixedVec2, FixedNum) -> FixedNum,
    {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: FixedNum::ONE,
        };
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.ray_cast(&input, |sub_input, proxy_id| {
            let key = broad_phase.user_data(proxy_id);
            let Some(fixture) = self.fixtures.get(key.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.ray_cast(sub_input, &body.xf, key.child_index) {
                Some(hit) => {
                    let point = p1 + (p2 - p1) * hit.fraction;
                    callback(key.fixture, fixture, point, hit.normal, hit.fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    // ------------------------------------------------------------------
    // World state
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gravity(&self) -> FixedVec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: FixedVec2) {
        self.gravity = gravity;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    pub fn tree_quality(&self) -> FixedNum {
        self.contact_manager.broad_phase.tree_quality()
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Timings of the last step.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Time of impact statistics accumulated since the world was created.
    #[cfg(feature = "perf_stats")]
    pub fn toi_profile(&self) -> &ToiProfile {
        &self.toi_profile
    }

    /// Shift the world origin. Useful for large worlds: the body positions
    /// become `position - new_origin`.
    pub fn shift_origin(&mut self, new_origin: FixedVec2) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.shift_origin(new_origin);
        }
        self.contact_manager.broad_phase.shift_origin(new_origin);
        Ok(())
    }

    /// Zero the accumulated forces and torques. Called after every step
    /// unless `auto_clear_forces` is off.
    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = FixedVec2::ZERO;
            body.torque = FixedNum::ZERO;
        }
    }

    /// Body transforms in body iteration order.
    pub fn transform_log(&self) -> Vec<Transform> {
        self.bodies.iter().map(|(_, body)| body.xf).collect()
    }

    /// Digest of the bincode-encoded transform log. Two runs of the same
    /// scenario produce the same value.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        match bincode::serialize(&self.transform_log()) {
            Ok(bytes) => hasher.write(&bytes),
            Err(e) => warn!("Failed to encode transform log: {}", e),
        }
        hasher.finish()
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: FixedNum, velocity_iterations: usize, position_iterations: usize) {
        let step_timer = Instant::now();
        self.profile = Profile::default();

        // New fixtures since the last step: find their contacts.
        if self.new_contacts {
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
            self.new_contacts = false;
        }

        self.locked = true;

        let inv_dt = if dt > FixedNum::ZERO { inv_or_zero(dt) } else { FixedNum::ZERO };
        let step = TimeStep {
            step_index: self.step_index,
            dt,
            inv_dt,
            dt_ratio: self.inv_dt0.saturating_mul(dt),
            velocity_iterations,
            position_iterations,
            warm_starting: self.warm_starting,
        };

        let timer = Instant::now();
        self.contact_manager
            .collide(&mut self.bodies, &self.fixtures, &self.settings);
        self.profile.collide = timer.elapsed();

        if self.step_complete && step.dt > FixedNum::ZERO {
            let timer = Instant::now();
            self.solve(&step);
            self.profile.solve = timer.elapsed();
        }

        if self.continuous_physics && step.dt > FixedNum::ZERO {
            let timer = Instant::now();
            self.solve_toi(&step);
            self.profile.solve_toi = timer.elapsed();
        }

        if step.dt > FixedNum::ZERO {
            self.inv_dt0 = step.inv_dt;
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;
        self.step_index += 1;
        self.profile.step = step_timer.elapsed();

        crate::profile_log!(
            step,
            "step {}: {} bodies, {} contacts, {} joints",
            step.step_index,
            self.bodies.len(),
            self.contact_manager.contact_count(),
            self.joints.len()
        );
    }

    /// Build islands by depth-first search over touching contacts and
    /// joints, solve each, then sync the broad phase.
    fn solve(&mut self, step: &TimeStep) {
        self.flags.reset(
            self.bodies.capacity(),
            self.contact_manager.contacts.capacity(),
            self.joints.capacity(),
        );

        let mut seeds = std::mem::take(&mut self.seeds);
        seeds.clear();
        seeds.extend(self.bodies.iter().map(|(handle, _)| handle));

        for &seed in &seeds {
            let body = &self.bodies[seed];
            if self.flags.bodies.contains(seed.index())
                || !body.awake
                || !body.enabled
                || body.body_type == BodyType::Static
            {
                continue;
            }

            self.build_island(seed);

            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut self.contact_manager.contact_listener,
                settings: &self.settings,
            };
            self.island
                .solve(&mut ctx, step, self.gravity, self.allow_sleeping, &mut self.profile);

            // Static bodies may take part in other islands.
            for &handle in &self.island.bodies {
                if self.bodies[handle].body_type == BodyType::Static {
                    self.flags.bodies.set(handle.index(), false);
                }
            }
        }

        let timer = Instant::now();
        // Bodies outside every island did not move.
        for &handle in &seeds {
            if !self.flags.bodies.contains(handle.index()) {
                continue;
            }
            let body = &self.bodies[handle];
            if body.body_type == BodyType::Static {
                continue;
            }
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        // Look for new contacts.
        self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
        self.profile.broadphase = timer.elapsed();

        self.seeds = seeds;
    }

    /// Collect the island reachable from `seed`. Static bodies join islands
    /// but do not propagate them.
    fn build_island(&mut self, seed: BodyHandle) {
        self.island.clear();
        self.stack.clear();
        self.stack.push(seed);
        self.flags.bodies.insert(seed.index());

        while let Some(handle) = self.stack.pop() {
            let body = &mut self.bodies[handle];
            debug_assert!(body.enabled);
            self.island.add_body(handle, body);

            if body.body_type == BodyType::Static {
                continue;
            }
            // Wake without resetting the sleep timer.
            body.awake = true;

            for i in 0..self.bodies[handle].contact_edges.len() {
                let edge = self.bodies[handle].contact_edges[i];
                if self.flags.contacts.contains(edge.contact.index()) {
                    continue;
                }
                let contact = &self.contact_manager.contacts[edge.contact];
                if !contact.enabled || !contact.touching {
                    continue;
                }
                let sensor = self.fixtures[contact.fixture_a].is_sensor || self.fixtures[contact.fixture_b].is_sensor;
                if sensor {
                    continue;
                }

                self.flags.contacts.insert(edge.contact.index());
                self.island.add_contact(edge.contact);

                if !self.flags.bodies.contains(edge.other.index()) {
                    self.flags.bodies.insert(edge.other.index());
                    self.stack.push(edge.other);
                }
            }

            for i in 0..self.bodies[handle].joint_edges.len() {
                let edge = self.bodies[handle].joint_edges[i];
                if self.flags.joints.contains(edge.joint.index()) {
                    continue;
                }
                // Joints to disabled bodies are not simulated.
                if !self.bodies[edge.other].enabled {
                    continue;
                }

                self.flags.joints.insert(edge.joint.index());
                self.island.add_joint(edge.joint);

                if !self.flags.bodies.contains(edge.other.index()) {
                    self.flags.bodies.insert(edge.other.index());
                    self.stack.push(edge.other);
                }
            }
        }
    }

    /// Earliest time of impact over all candidate contacts, computing and
    /// caching it where needed.
    fn find_min_toi(&mut self) -> Option<(ContactHandle, FixedNum)> {
        let settings = &self.settings;
        let mut min_contact = None;
        let mut min_alpha = FixedNum::ONE;

        for (handle, contact) in self.contact_manager.contacts.iter_mut() {
            if !contact.enabled || contact.toi_count > settings.max_sub_steps {
                continue;
            }

            let alpha = match contact.toi {
                Some(alpha) => alpha,
                None => {
                    let fixture_a = &self.fixtures[contact.fixture_a];
                    let fixture_b = &self.fixtures[contact.fixture_b];
                    if fixture_a.is_sensor || fixture_b.is_sensor {
                        continue;
                    }

                    let Some((body_a, body_b)) = self.bodies.get2_mut(contact.body_a, contact.body_b) else {
                        continue;
                    };
                    let active_a = body_a.awake && body_a.body_type != BodyType::Static;
                    let active_b = body_b.awake && body_b.body_type != BodyType::Static;
                    if !active_a && !active_b {
                        continue;
                    }

                    // Dynamic bodies only collide continuously with
                    // non-dynamic ones, unless one of them is a bullet.
                    let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
                    let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;
                    if !collide_a && !collide_b {
                        continue;
                    }

                    // Put the sweeps onto the same time interval.
                    let mut alpha0 = body_a.sweep.alpha0;
                    if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
                        alpha0 = body_b.sweep.alpha0;
                        body_a.sweep.advance(alpha0);
                    } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
                        alpha0 = body_a.sweep.alpha0;
                        body_b.sweep.advance(alpha0);
                    }
                    debug_assert!(alpha0 < FixedNum::ONE);

                    let input = ToiInput {
                        proxy_a: DistanceProxy::from_shape(&fixture_a.shape, contact.child_index_a),
                        proxy_b: DistanceProxy::from_shape(&fixture_b.shape, contact.child_index_b),
                        sweep_a: body_a.sweep,
                        sweep_b: body_b.sweep,
                        t_max: FixedNum::ONE,
                    };
                    let output = time_of_impact(&input, settings);
                    #[cfg(feature = "perf_stats")]
                    {
                        self.toi_profile
                            .record(output.iterations, output.root_iterations, output.max_root_iterations);
                        self.toi_profile.gjk.merge(&output.gjk);
                    }

                    // Beta is the fraction of the remaining portion of the step.
                    let alpha = if output.state == ToiState::Touching {
                        (alpha0 + (FixedNum::ONE - alpha0) * output.t).min(FixedNum::ONE)
                    } else {
                        FixedNum::ONE
                    };
                    contact.toi = Some(alpha);
                    alpha
                }
            };

            if alpha < min_alpha {
                min_contact = Some(handle);
                min_alpha = alpha;
            }
        }

        let cutoff = FixedNum::ONE - EPSILON * FixedNum::from_num(10);
        match min_contact {
            Some(handle) if min_alpha <= cutoff => Some((handle, min_alpha)),
            _ => None,
        }
    }

    /// Continuous collision: repeatedly find the earliest time of impact,
    /// advance the two bodies to it and solve a mini island around them.
    fn solve_toi(&mut self, step: &TimeStep) {
        let linear_slop = self.settings.linear_slop;

        if self.step_complete {
            for (_, body) in self.bodies.iter_mut() {
                body.sweep.alpha0 = FixedNum::ZERO;
            }
            for (_, contact) in self.contact_manager.contacts.iter_mut() {
                contact.toi = None;
                contact.toi_count = 0;
            }
            self.flags.reset(
                self.bodies.capacity(),
                self.contact_manager.contacts.capacity(),
                self.joints.capacity(),
            );
        } else {
            self.flags.bodies.grow(self.bodies.capacity());
            self.flags.contacts.grow(self.contact_manager.contacts.capacity());
        }

        loop {
            let Some((min_contact, min_alpha)) = self.find_min_toi() else {
                // No more TOI events. Done!
                self.step_complete = true;
                break;
            };

            let (handle_a, handle_b) = {
                let contact = &self.contact_manager.contacts[min_contact];
                (contact.body_a, contact.body_b)
            };

            // Advance the bodies to the TOI.
            let (backup_a, backup_b) = match self.bodies.get2_mut(handle_a, handle_b) {
                Some((body_a, body_b)) => {
                    let backup = (body_a.sweep, body_b.sweep);
                    body_a.advance(min_alpha);
                    body_b.advance(min_alpha);
                    backup
                }
                None => break,
            };

            // The TOI contact likely has some new contact points.
            self.contact_manager
                .update_contact(min_contact, &mut self.bodies, &self.fixtures, linear_slop);
            let contact = &mut self.contact_manager.contacts[min_contact];
            contact.toi = None;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.enabled || !contact.touching {
                // Restore the sweeps.
                contact.enabled = false;
                for (handle, backup) in [(handle_a, backup_a), (handle_b, backup_b)] {
                    let body = &mut self.bodies[handle];
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                continue;
            }

            self.bodies[handle_a].set_awake(true);
            self.bodies[handle_b].set_awake(true);

            // Build the island.
            self.island.clear();
            self.island.add_body(handle_a, &mut self.bodies[handle_a]);
            self.island.add_body(handle_b, &mut self.bodies[handle_b]);
            self.island.add_contact(min_contact);
            self.flags.bodies.insert(handle_a.index());
            self.flags.bodies.insert(handle_b.index());
            self.flags.contacts.insert(min_contact.index());

            // Get contacts on body A and body B.
            for handle in [handle_a, handle_b] {
                if self.bodies[handle].body_type == BodyType::Dynamic {
                    self.add_toi_neighbours(handle, min_alpha);
                }
            }

            let dt = (FixedNum::ONE - min_alpha) * step.dt;
            let sub_step = TimeStep {
                step_index: step.step_index,
                dt,
                inv_dt: inv_or_zero(dt),
                dt_ratio: FixedNum::ONE,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };

            let (index_a, index_b) = (self.bodies[handle_a].island_index, self.bodies[handle_b].island_index);
            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut self.contact_manager.contact_listener,
                settings: &self.settings,
            };
            self.island.solve_toi(&mut ctx, &sub_step, index_a, index_b);

            // Reset island flags and synchronize broad-phase proxies.
            for &handle in &self.island.bodies {
                self.flags.bodies.set(handle.index(), false);
                let body = &self.bodies[handle];
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);

                // Invalidate all contact TOIs on this displaced body.
                for edge in &body.contact_edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.toi = None;
                    }
                    self.flags.contacts.set(edge.contact.index(), false);
                }
            }

            // Also find new contacts since the bodies moved.
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
            self.flags.contacts.grow(self.contact_manager.contacts.capacity());

            if self.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
    }

    /// Pull the solid contacts of `handle` and the bodies behind them into
    /// the time of impact island, advancing those bodies to `min_alpha`.
    fn add_toi_neighbours(&mut self, handle: BodyHandle, min_alpha: FixedNum) {
        let max_contacts = self.settings.max_toi_contacts;
        let linear_slop = self.settings.linear_slop;

        for i in 0..self.bodies[handle].contact_edges.len() {
            if self.island.bodies.len() == 2 * max_contacts || self.island.contacts.len() == max_contacts {
                break;
            }

            let edge = self.bodies[handle].contact_edges[i];
            if self.flags.contacts.contains(edge.contact.index()) {
                continue;
            }

            // Only add static, kinematic, or bullet bodies.
            let (body, other) = (&self.bodies[handle], &self.bodies[edge.other]);
            if other.body_type == BodyType::Dynamic && !body.bullet && !other.bullet {
                continue;
            }

            let contact = &self.contact_manager.contacts[edge.contact];
            if self.fixtures[contact.fixture_a].is_sensor || self.fixtures[contact.fixture_b].is_sensor {
                continue;
            }

            // Tentatively advance the body to the TOI.
            let backup = other.sweep;
            if !self.flags.bodies.contains(edge.other.index()) {
                self.bodies[edge.other].advance(min_alpha);
            }

            // Update the contact points.
            self.contact_manager
                .update_contact(edge.contact, &mut self.bodies, &self.fixtures, linear_slop);

            let contact = &self.contact_manager.contacts[edge.contact];
            if !contact.enabled || !contact.touching {
                let other = &mut self.bodies[edge.other];
                other.sweep = backup;
                other.synchronize_transform();
                continue;
            }

            self.flags.contacts.insert(edge.contact.index());
            self.island.add_contact(edge.contact);

            if self.flags.bodies.contains(edge.other.index()) {
                continue;
            }
            self.flags.bodies.insert(edge.other.index());

            let other = &mut self.bodies[edge.other];
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            self.island.add_body(edge.other, other);
        }
    }
}
