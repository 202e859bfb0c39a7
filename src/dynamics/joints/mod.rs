//! Joints constrain the relative motion of two bodies.
//!
//! Every joint follows the same three-phase protocol inside an island
//! solve: `init_velocity_constraints` once (effective masses, warm start),
//! `solve_velocity_constraints` once per velocity iteration, and
//! `solve_position_constraints` once per position iteration until it
//! reports convergence.

mod distance;
mod friction;
mod gear;
mod motor;
mod mouse;
mod prismatic;
mod pulley;
mod revolute;
mod weld;
mod wheel;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use motor::{MotorJoint, MotorJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};
pub use wheel::{WheelJoint, WheelJointDef};

use serde::{Deserialize, Serialize};

use super::arena::{Arena, BodyHandle, JointHandle};
use super::body::Body;
use super::time_step::SolverData;
use crate::error::PhysicsError;
use crate::fixed_math::{FixedNum, FixedVec2, TAU};
use crate::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Revolute,
    Prismatic,
    Distance,
    Pulley,
    Mouse,
    Gear,
    Wheel,
    Weld,
    Friction,
    Motor,
}

/// Joint definition. Bodies must be distinct; gear joints take their bodies
/// from the two joints they couple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Pulley(PulleyJointDef),
    Mouse(MouseJointDef),
    Weld(WeldJointDef),
    Friction(FrictionJointDef),
    Gear(GearJointDef),
    Wheel(WheelJointDef),
    Motor(MotorJointDef),
}

/// Fields shared by every joint definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointBase {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Let the two bodies collide with each other.
    pub collide_connected: bool,
    pub user_data: u64,
}

impl JointDef {
    pub fn base(&self) -> &JointBase {
        match self {
            JointDef::Distance(d) => &d.base,
            JointDef::Revolute(d) => &d.base,
            JointDef::Prismatic(d) => &d.base,
            JointDef::Pulley(d) => &d.base,
            JointDef::Mouse(d) => &d.base,
            JointDef::Weld(d) => &d.base,
            JointDef::Friction(d) => &d.base,
            JointDef::Gear(d) => &d.base,
            JointDef::Wheel(d) => &d.base,
            JointDef::Motor(d) => &d.base,
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self {
            JointDef::Distance(_) => JointType::Distance,
            JointDef::Revolute(_) => JointType::Revolute,
            JointDef::Prismatic(_) => JointType::Prismatic,
            JointDef::Pulley(_) => JointType::Pulley,
            JointDef::Mouse(_) => JointType::Mouse,
            JointDef::Weld(_) => JointType::Weld,
            JointDef::Friction(_) => JointType::Friction,
            JointDef::Gear(_) => JointType::Gear,
            JointDef::Wheel(_) => JointType::Wheel,
            JointDef::Motor(_) => JointType::Motor,
        }
    }
}

macro_rules! impl_from_def {
    ($($variant:ident => $def:ty),* $(,)?) => {
        $(impl From<$def> for JointDef {
            fn from(def: $def) -> Self {
                JointDef::$variant(def)
            }
        })*
    };
}

impl_from_def!(
    Distance => DistanceJointDef,
    Revolute => RevoluteJointDef,
    Prismatic => PrismaticJointDef,
    Pulley => PulleyJointDef,
    Mouse => MouseJointDef,
    Weld => WeldJointDef,
    Friction => FrictionJointDef,
    Gear => GearJointDef,
    Wheel => WheelJointDef,
    Motor => MotorJointDef,
);

/// Per-body solver inputs cached at `init_velocity_constraints`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SolverBody {
    pub index: usize,
    pub local_center: FixedVec2,
    pub inv_mass: FixedNum,
    pub inv_i: FixedNum,
}

impl SolverBody {
    pub fn of(body: &Body) -> Self {
        Self {
            index: body.island_index,
            local_center: body.sweep.local_center,
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
        }
    }
}

/// The solver protocol for two-body joints.
pub(crate) trait JointSolver {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData);
    fn solve_velocity_constraints(&mut self, data: &mut SolverData);
    /// Returns true when the position error is within tolerance.
    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool;
}

#[derive(Clone, Debug)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Pulley(PulleyJoint),
    Mouse(MouseJoint),
    Weld(WeldJoint),
    Friction(FrictionJoint),
    Gear(GearJoint),
    Wheel(WheelJoint),
    Motor(MotorJoint),
}

/// Dispatch to the joint types that share the `JointSolver` protocol.
/// Gear joints solve over four bodies and are handled separately.
macro_rules! two_body {
    ($kind:expr, $j:ident => $body:expr, gear $g:ident => $gear:expr) => {
        match $kind {
            JointKind::Distance($j) => $body,
            JointKind::Revolute($j) => $body,
            JointKind::Prismatic($j) => $body,
            JointKind::Pulley($j) => $body,
            JointKind::Mouse($j) => $body,
            JointKind::Weld($j) => $body,
            JointKind::Friction($j) => $body,
            JointKind::Wheel($j) => $body,
            JointKind::Motor($j) => $body,
            JointKind::Gear($g) => $gear,
        }
    };
}

#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) kind: JointKind,
    pub user_data: u64,
}

impl Joint {
    /// Build a joint from its definition. Validates the bodies; gear joints
    /// also validate the two joints they couple.
    pub(crate) fn from_def(
        def: &JointDef,
        bodies: &Arena<BodyHandle, Body>,
        joints: &Arena<JointHandle, Joint>,
        settings: &Settings,
    ) -> Result<Self, PhysicsError> {
        let base = *def.base();
        let body = |h: BodyHandle| bodies.get(h).ok_or(PhysicsError::InvalidBody);

        let kind = match def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d, settings)),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDef::Pulley(d) => {
                if d.ratio <= FixedNum::ZERO {
                    return Err(PhysicsError::InvalidConfiguration {
                        reason: "pulley ratio must be positive",
                    });
                }
                JointKind::Pulley(PulleyJoint::new(d))
            }
            JointDef::Mouse(d) => JointKind::Mouse(MouseJoint::new(d, body(base.body_b)?)),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
            JointDef::Friction(d) => JointKind::Friction(FrictionJoint::new(d)),
            JointDef::Gear(d) => {
                let joint1 = joints.get(d.joint1).ok_or(PhysicsError::InvalidJoint)?;
                let joint2 = joints.get(d.joint2).ok_or(PhysicsError::InvalidJoint)?;
                JointKind::Gear(GearJoint::new(d, joint1, joint2, bodies)?)
            }
            JointDef::Wheel(d) => JointKind::Wheel(WheelJoint::new(d)),
            JointDef::Motor(d) => JointKind::Motor(MotorJoint::new(d)),
        };

        let (body_a, body_b) = match &kind {
            JointKind::Gear(g) => g.bodies(),
            _ => (base.body_a, base.body_b),
        };
        body(body_a)?;
        body(body_b)?;
        if body_a == body_b {
            return Err(PhysicsError::SameBody);
        }

        Ok(Self {
            body_a,
            body_b,
            collide_connected: base.collide_connected,
            kind,
            user_data: base.user_data,
        })
    }

    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Pulley(_) => JointType::Pulley,
            JointKind::Mouse(_) => JointType::Mouse,
            JointKind::Weld(_) => JointType::Weld,
            JointKind::Friction(_) => JointType::Friction,
            JointKind::Gear(_) => JointType::Gear,
            JointKind::Wheel(_) => JointType::Wheel,
            JointKind::Motor(_) => JointType::Motor,
        }
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Anchor on body A in world coordinates.
    pub fn anchor_a(&self, body_a: &Body) -> FixedVec2 {
        match &self.kind {
            JointKind::Distance(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Revolute(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Prismatic(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Pulley(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Mouse(j) => j.target,
            JointKind::Weld(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Friction(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Gear(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Wheel(j) => body_a.world_point(j.local_anchor_a),
            JointKind::Motor(_) => body_a.position(),
        }
    }

    /// Anchor on body B in world coordinates.
    pub fn anchor_b(&self, body_b: &Body) -> FixedVec2 {
        match &self.kind {
            JointKind::Distance(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Revolute(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Prismatic(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Pulley(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Mouse(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Weld(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Friction(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Gear(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Wheel(j) => body_b.world_point(j.local_anchor_b),
            JointKind::Motor(_) => body_b.position(),
        }
    }

    /// Reaction force on body B at the anchor, in Newtons.
    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        match &self.kind {
            JointKind::Distance(j) => j.reaction_force(inv_dt),
            JointKind::Revolute(j) => j.reaction_force(inv_dt),
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Pulley(j) => j.reaction_force(inv_dt),
            JointKind::Mouse(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => j.reaction_force(inv_dt),
            JointKind::Friction(j) => j.reaction_force(inv_dt),
            JointKind::Gear(j) => j.reaction_force(inv_dt),
            JointKind::Wheel(j) => j.reaction_force(inv_dt),
            JointKind::Motor(j) => j.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, in N*m.
    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Pulley(_) | JointKind::Mouse(_) => FixedNum::ZERO,
            JointKind::Revolute(j) => j.reaction_torque(inv_dt),
            JointKind::Prismatic(j) => j.reaction_torque(inv_dt),
            JointKind::Weld(j) => j.reaction_torque(inv_dt),
            JointKind::Friction(j) => j.reaction_torque(inv_dt),
            JointKind::Gear(j) => j.reaction_torque(inv_dt),
            JointKind::Wheel(j) => j.reaction_torque(inv_dt),
            JointKind::Motor(j) => j.reaction_torque(inv_dt),
        }
    }

    /// Move points stored in world coordinates.
    pub(crate) fn shift_origin(&mut self, new_origin: FixedVec2) {
        match &mut self.kind {
            JointKind::Mouse(j) => j.target -= new_origin,
            JointKind::Pulley(j) => {
                j.ground_anchor_a -= new_origin;
                j.ground_anchor_b -= new_origin;
            }
            _ => {}
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, bodies: &Arena<BodyHandle, Body>, data: &mut SolverData) {
        let (body_a, body_b) = (&bodies[self.body_a], &bodies[self.body_b]);
        two_body!(&mut self.kind,
            j => j.init_velocity_constraints(body_a, body_b, data),
            gear g => g.init_velocity_constraints(bodies, data))
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        two_body!(&mut self.kind,
            j => j.solve_velocity_constraints(data),
            gear g => g.solve_velocity_constraints(data))
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        two_body!(&mut self.kind,
            j => j.solve_position_constraints(data),
            gear g => g.solve_position_constraints(data))
    }
}

fn reduced(a: FixedNum, b: FixedNum) -> FixedNum {
    if a > FixedNum::ZERO && b > FixedNum::ZERO {
        (a * b).checked_div(a + b).unwrap_or(FixedNum::ZERO)
    } else if a > FixedNum::ZERO {
        a
    } else {
        b
    }
}

/// Spring stiffness and damping for a linear soft constraint from a
/// frequency (Hz) and damping ratio, using the reduced mass of the bodies.
pub fn linear_stiffness(frequency_hz: FixedNum, damping_ratio: FixedNum, body_a: &Body, body_b: &Body) -> (FixedNum, FixedNum) {
    let mass = reduced(body_a.mass(), body_b.mass());
    let omega = TAU * frequency_hz;
    let stiffness = mass * omega * omega;
    let damping = FixedNum::from_num(2) * mass * damping_ratio * omega;
    (stiffness, damping)
}

/// Angular counterpart of `linear_stiffness`, using rotational inertia.
pub fn angular_stiffness(frequency_hz: FixedNum, damping_ratio: FixedNum, body_a: &Body, body_b: &Body) -> (FixedNum, FixedNum) {
    let inertia = reduced(body_a.inertia(), body_b.inertia());
    let omega = TAU * frequency_hz;
    let stiffness = inertia * omega * omega;
    let damping = FixedNum::from_num(2) * inertia * damping_ratio * omega;
    (stiffness, damping)
}

/// Apply equal and opposite linear impulse `p` plus angular impulses to the
/// velocity pair. Shared by the joints whose Jacobians split this way.
#[inline]
pub(crate) fn apply_impulse(
    data: &mut SolverData,
    a: &SolverBody,
    b: &SolverBody,
    p: FixedVec2,
    angular_a: FixedNum,
    angular_b: FixedNum,
) {
    let va = &mut data.velocities[a.index];
    va.v -= p * a.inv_mass;
    va.w -= a.inv_i * angular_a;
    let vb = &mut data.velocities[b.index];
    vb.v += p * b.inv_mass;
    vb.w += b.inv_i * angular_b;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::collision::MassData;
    use crate::fixed_math::int;

    #[test]
    fn test_linear_stiffness_uses_reduced_mass() {
        let mut a = Body::new(&BodyDef::dynamic(FixedVec2::ZERO));
        let mut b = Body::new(&BodyDef::dynamic(FixedVec2::ZERO));
        a.set_mass_data(&MassData { mass: int(2), center: FixedVec2::ZERO, inertia: int(1) });
        b.set_mass_data(&MassData { mass: int(2), center: FixedVec2::ZERO, inertia: int(1) });

        let (k, d) = linear_stiffness(int(1), FixedNum::ZERO, &a, &b);
        // Reduced mass 1, omega 2pi.
        let expected = 4.0 * std::f64::consts::PI * std::f64::consts::PI;
        assert!((k.to_num::<f64>() - expected).abs() < 1e-4);
        assert_eq!(d, FixedNum::ZERO);

        let ground = Body::new(&BodyDef::default());
        let (k_ground, _) = linear_stiffness(int(1), FixedNum::ZERO, &ground, &b);
        assert!((k_ground.to_num::<f64>() - 2.0 * expected).abs() < 1e-4);
    }
}
