//! Island solver.
//!
//! An island is a set of awake bodies connected through touching contacts
//! and joints. Islands are solved independently: integrate velocities,
//! iterate velocity constraints, integrate positions, iterate position
//! constraints, then decide whether the whole island may sleep.

use std::time::Instant;

use super::arena::{Arena, BodyHandle, ContactHandle, FixtureHandle, JointHandle};
use super::body::{Body, BodyType};
use super::contact::Contact;
use super::contact_solver::ContactSolver;
use super::fixture::Fixture;
use super::joints::Joint;
use super::time_step::{Position, SolverData, TimeStep, Velocity};
use super::world_callbacks::ContactListener;
use crate::fixed_math::{FixedNum, FixedVec2};
use crate::profiling::{profile, Profile};
use crate::settings::Settings;

/// World state an island solve reads and writes.
pub(crate) struct IslandContext<'a> {
    pub bodies: &'a mut Arena<BodyHandle, Body>,
    pub fixtures: &'a Arena<FixtureHandle, Fixture>,
    pub contacts: &'a mut Arena<ContactHandle, Contact>,
    pub joints: &'a mut Arena<JointHandle, Joint>,
    pub listener: &'a mut Option<Box<dyn ContactListener>>,
    pub settings: &'a Settings,
}

/// Reused between islands and steps so solving does not allocate once the
/// buffers have grown.
#[derive(Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyHandle>,
    pub contacts: Vec<ContactHandle>,
    pub joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contact_solver: ContactSolver,
}

/// Clamp the motion of one sub-step to the configured maxima. Lengths are
/// compared instead of squares so large velocities cannot overflow.
fn clamp_motion(v: &mut FixedVec2, w: &mut FixedNum, h: FixedNum, settings: &Settings) {
    let translation = (*v * h).length();
    if translation > settings.max_translation {
        *v *= settings.max_translation / translation;
    }

    let rotation = (h * *w).abs();
    if rotation > settings.max_rotation {
        *w *= settings.max_rotation / rotation;
    }
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    #[profile(2000)]
    pub fn solve(
        &mut self,
        ctx: &mut IslandContext,
        step: &TimeStep,
        gravity: FixedVec2,
        allow_sleep: bool,
        profile: &mut Profile,
    ) {
        let settings = ctx.settings;
        let h = step.dt;

        self.positions.clear();
        self.velocities.clear();

        // Integrate velocities and apply damping.
        for &handle in &self.bodies {
            let body = &mut ctx.bodies[handle];
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Store positions for continuous collision.
            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                let gravity_force = gravity * (body.gravity_scale * body.mass);
                v += (gravity_force + body.force) * (h * body.inv_mass);
                w += h * body.inv_inertia * body.torque;

                // Pade approximation of exp(-damping * h), stable for large damping.
                v *= FixedNum::ONE / (FixedNum::ONE + h * body.linear_damping);
                w *= FixedNum::ONE / (FixedNum::ONE + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        let timer = Instant::now();

        self.contact_solver.reset(step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);
        self.contact_solver
            .initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);
        if step.warm_starting {
            self.contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            settings,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for &handle in &self.joints {
            ctx.joints[handle].init_velocity_constraints(ctx.bodies, &mut data);
        }
        profile.solve_init += timer.elapsed();

        let timer = Instant::now();
        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                ctx.joints[handle].solve_velocity_constraints(&mut data);
            }
            self.contact_solver.solve_velocity_constraints(data.velocities);
        }
        self.contact_solver.store_impulses(ctx.contacts);
        profile.solve_velocity += timer.elapsed();

        // Integrate positions.
        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            clamp_motion(&mut velocity.v, &mut velocity.w, h, settings);
            position.c += velocity.v * h;
            position.a += h * velocity.w;
        }

        let timer = Instant::now();
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self.contact_solver.solve_position_constraints(data.positions, settings);

            let mut joints_okay = true;
            for &handle in &self.joints {
                let joint_okay = ctx.joints[handle].solve_position_constraints(&mut data);
                joints_okay = joints_okay && joint_okay;
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small.
                position_solved = true;
                break;
            }
        }

        // Copy state back to the bodies.
        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut ctx.bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
        profile.solve_position += timer.elapsed();

        self.report(ctx);

        if allow_sleep {
            self.update_sleep(ctx, h, position_solved);
        }
    }

    /// Accumulate sleep time and put the island to sleep once every body
    /// has been still for `time_to_sleep`.
    fn update_sleep(&self, ctx: &mut IslandContext, h: FixedNum, position_solved: bool) {
        let settings = ctx.settings;
        let mut min_sleep_time = FixedNum::MAX;

        for &handle in &self.bodies {
            let body = &mut ctx.bodies[handle];
            if body.body_type == BodyType::Static {
                continue;
            }

            if !body.auto_sleep
                || body.angular_velocity.abs() > settings.angular_sleep_tolerance
                || body.linear_velocity.length() > settings.linear_sleep_tolerance
            {
                body.sleep_time = FixedNum::ZERO;
                min_sleep_time = FixedNum::ZERO;
            } else {
                body.sleep_time = body.sleep_time.saturating_add(h);
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= settings.time_to_sleep && position_solved {
            for &handle in &self.bodies {
                ctx.bodies[handle].set_awake(false);
            }
        }
    }

    /// Sub-step after a time of impact event. Only the two bodies at
    /// `toi_index_a` and `toi_index_b` are moved by the position solve; the
    /// rest of the mini-island is treated as fixed.
    pub fn solve_toi(&mut self, ctx: &mut IslandContext, sub_step: &TimeStep, toi_index_a: usize, toi_index_b: usize) {
        let settings = ctx.settings;

        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &ctx.bodies[handle];
            self.positions.push(Position { c: body.sweep.c, a: body.sweep.a });
            self.velocities.push(Velocity { v: body.linear_velocity, w: body.angular_velocity });
        }

        self.contact_solver.reset(sub_step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);

        // Solve position constraints.
        for _ in 0..sub_step.position_iterations {
            if self
                .contact_solver
                .solve_toi_position_constraints(&mut self.positions, settings, toi_index_a, toi_index_b)
            {
                break;
            }
        }

        // Leap of faith to the new safe state.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut ctx.bodies[self.bodies[index]];
            body.sweep.c0 = self.positions[index].c;
            body.sweep.a0 = self.positions[index].a;
        }

        // No warm starting: the sub-step impulses are not stored.
        self.contact_solver
            .initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);
        for _ in 0..sub_step.velocity_iterations {
            self.contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        let h = sub_step.dt;
        for (i, &handle) in self.bodies.iter().enumerate() {
            let Velocity { mut v, mut w } = self.velocities[i];
            clamp_motion(&mut v, &mut w, h, settings);

            let position = &mut self.positions[i];
            position.c += v * h;
            position.a += h * w;
            self.velocities[i] = Velocity { v, w };

            let body = &mut ctx.bodies[handle];
            body.sweep.c = position.c;
            body.sweep.a = position.a;
            body.linear_velocity = v;
            body.angular_velocity = w;
            body.synchronize_transform();
        }

        self.report(ctx);
    }

    fn report(&self, ctx: &mut IslandContext) {
        let Some(listener) = ctx.listener.as_mut() else {
            return;
        };
        for (i, &handle) in self.contacts.iter().enumerate() {
            if let Some(contact) = ctx.contacts.get(handle) {
                listener.post_solve(contact, &self.contact_solver.impulse(i));
            }
        }
    }
}
