//! Gear joint: couples two revolute or prismatic joints so that
//! `coordinate_1 + ratio * coordinate_2` stays constant.
//!
//! Each coupled joint contributes a "geared" body (its body B) and a
//! "ground" body (its body A). The gear joint's own bodies A and B are the
//! geared bodies; the ground bodies C and D only enter the solver.

use serde::{Deserialize, Serialize};

use super::{Joint, JointBase, JointKind, SolverBody};
use crate::dynamics::arena::{Arena, BodyHandle, JointHandle};
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::error::PhysicsError;
use crate::fixed_math::{inv_or_zero, FixedNum, FixedVec2, Rot};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearJointDef {
    /// `body_a` and `body_b` are taken from the coupled joints.
    pub base: JointBase,
    pub joint1: JointHandle,
    pub joint2: JointHandle,
    pub ratio: FixedNum,
}

impl Default for GearJointDef {
    fn default() -> Self {
        Self {
            base: JointBase::default(),
            joint1: JointHandle::default(),
            joint2: JointHandle::default(),
            ratio: FixedNum::ONE,
        }
    }
}

impl GearJointDef {
    pub fn new(joint1: JointHandle, joint2: JointHandle, ratio: FixedNum) -> Self {
        Self { joint1, joint2, ratio, ..Default::default() }
    }
}

/// Geometry of one coupled joint.
#[derive(Clone, Copy, Debug)]
struct GearSide {
    revolute: bool,
    local_anchor: FixedVec2,
    local_anchor_ground: FixedVec2,
    local_axis_ground: FixedVec2,
    reference_angle: FixedNum,
}

/// Jacobian row of one side plus its current coordinate.
struct SideJacobian {
    jv: FixedVec2,
    jw: FixedNum,
    jw_ground: FixedNum,
    inv_mass: FixedNum,
    coordinate: FixedNum,
}

impl GearSide {
    fn from_joint(joint: &Joint) -> Result<Self, PhysicsError> {
        match &joint.kind {
            JointKind::Revolute(j) => Ok(Self {
                revolute: true,
                local_anchor: j.local_anchor_b,
                local_anchor_ground: j.local_anchor_a,
                local_axis_ground: FixedVec2::ZERO,
                reference_angle: j.reference_angle,
            }),
            JointKind::Prismatic(j) => Ok(Self {
                revolute: false,
                local_anchor: j.local_anchor_b,
                local_anchor_ground: j.local_anchor_a,
                local_axis_ground: j.local_x_axis_a,
                reference_angle: j.reference_angle,
            }),
            _ => Err(PhysicsError::InvalidJoint),
        }
    }

    fn jacobian(&self, body: &SolverBody, ground: &SolverBody, p: Position, p_ground: Position) -> SideJacobian {
        if self.revolute {
            return SideJacobian {
                jv: FixedVec2::ZERO,
                jw: FixedNum::ONE,
                jw_ground: FixedNum::ONE,
                inv_mass: body.inv_i + ground.inv_i,
                coordinate: p.a - p_ground.a - self.reference_angle,
            };
        }

        let (q, q_ground) = (Rot::from_angle(p.a), Rot::from_angle(p_ground.a));
        let u = q_ground.apply(self.local_axis_ground);
        let r_ground = q_ground.apply(self.local_anchor_ground - ground.local_center);
        let r = q.apply(self.local_anchor - body.local_center);
        let jw_ground = r_ground.cross(u);
        let jw = r.cross(u);

        let anchor_ground = self.local_anchor_ground - ground.local_center;
        let anchor = q_ground.apply_inv(r + (p.c - p_ground.c));

        SideJacobian {
            jv: u,
            jw,
            jw_ground,
            inv_mass: ground.inv_mass + body.inv_mass + ground.inv_i * jw_ground * jw_ground + body.inv_i * jw * jw,
            coordinate: (anchor - anchor_ground).dot(self.local_axis_ground),
        }
    }
}

fn position_of(body: &Body) -> Position {
    Position { c: body.sweep.c, a: body.sweep.a }
}

#[derive(Clone, Debug)]
pub struct GearJoint {
    joint1: JointHandle,
    joint2: JointHandle,
    body_a: BodyHandle,
    body_b: BodyHandle,
    body_c: BodyHandle,
    body_d: BodyHandle,
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    side_a: GearSide,
    side_b: GearSide,
    ratio: FixedNum,
    constant: FixedNum,

    impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    c: SolverBody,
    d: SolverBody,
    jv_ac: FixedVec2,
    jv_bd: FixedVec2,
    jw_a: FixedNum,
    jw_b: FixedNum,
    jw_c: FixedNum,
    jw_d: FixedNum,
    mass: FixedNum,
}

impl GearJoint {
    /// Fails with `InvalidJoint` unless both joints are revolute or prismatic.
    pub(crate) fn new(
        def: &GearJointDef,
        joint1: &Joint,
        joint2: &Joint,
        bodies: &Arena<BodyHandle, Body>,
    ) -> Result<Self, PhysicsError> {
        let side_a = GearSide::from_joint(joint1)?;
        let side_b = GearSide::from_joint(joint2)?;

        let (body_a, body_c) = (joint1.body_b, joint1.body_a);
        let (body_b, body_d) = (joint2.body_b, joint2.body_a);
        let get = |h: BodyHandle| bodies.get(h).ok_or(PhysicsError::InvalidBody);
        let (ba, bb, bc, bd) = (get(body_a)?, get(body_b)?, get(body_c)?, get(body_d)?);

        let ja = side_a.jacobian(&SolverBody::of(ba), &SolverBody::of(bc), position_of(ba), position_of(bc));
        let jb = side_b.jacobian(&SolverBody::of(bb), &SolverBody::of(bd), position_of(bb), position_of(bd));

        Ok(Self {
            joint1: def.joint1,
            joint2: def.joint2,
            body_a,
            body_b,
            body_c,
            body_d,
            local_anchor_a: side_a.local_anchor,
            local_anchor_b: side_b.local_anchor,
            side_a,
            side_b,
            ratio: def.ratio,
            constant: ja.coordinate + def.ratio * jb.coordinate,
            impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            c: SolverBody::default(),
            d: SolverBody::default(),
            jv_ac: FixedVec2::ZERO,
            jv_bd: FixedVec2::ZERO,
            jw_a: FixedNum::ZERO,
            jw_b: FixedNum::ZERO,
            jw_c: FixedNum::ZERO,
            jw_d: FixedNum::ZERO,
            mass: FixedNum::ZERO,
        })
    }

    pub(crate) fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    pub fn joint1(&self) -> JointHandle {
        self.joint1
    }

    pub fn joint2(&self) -> JointHandle {
        self.joint2
    }

    pub fn ratio(&self) -> FixedNum {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: FixedNum) {
        self.ratio = ratio;
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        self.jv_ac * (inv_dt * self.impulse)
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.impulse * self.jw_a
    }

    fn update_jacobians(&mut self, positions: &[Position]) -> (FixedNum, FixedNum) {
        let ja = self.side_a.jacobian(&self.a, &self.c, positions[self.a.index], positions[self.c.index]);
        let jb = self.side_b.jacobian(&self.b, &self.d, positions[self.b.index], positions[self.d.index]);

        self.jv_ac = ja.jv;
        self.jw_a = ja.jw;
        self.jw_c = ja.jw_ground;
        self.jv_bd = jb.jv * self.ratio;
        self.jw_b = self.ratio * jb.jw;
        self.jw_d = self.ratio * jb.jw_ground;

        let inv_mass = ja.inv_mass + self.ratio * self.ratio * jb.inv_mass;
        let coordinate = ja.coordinate + self.ratio * jb.coordinate;
        (inv_mass, coordinate)
    }

    pub(crate) fn init_velocity_constraints(&mut self, bodies: &Arena<BodyHandle, Body>, data: &mut SolverData) {
        self.a = SolverBody::of(&bodies[self.body_a]);
        self.b = SolverBody::of(&bodies[self.body_b]);
        self.c = SolverBody::of(&bodies[self.body_c]);
        self.d = SolverBody::of(&bodies[self.body_d]);

        let (inv_mass, _) = self.update_jacobians(&*data.positions);
        self.mass = inv_or_zero(inv_mass);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply_velocity(data, self.impulse);
        } else {
            self.impulse = FixedNum::ZERO;
        }
    }

    fn apply_velocity(&self, data: &mut SolverData, impulse: FixedNum) {
        let rows = [
            (&self.a, self.jv_ac, self.jw_a, impulse),
            (&self.b, self.jv_bd, self.jw_b, impulse),
            (&self.c, self.jv_ac, self.jw_c, -impulse),
            (&self.d, self.jv_bd, self.jw_d, -impulse),
        ];
        for (body, jv, jw, lambda) in rows {
            let v = &mut data.velocities[body.index];
            v.v += jv * (body.inv_mass * lambda);
            v.w += body.inv_i * lambda * jw;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (va, vb) = (data.velocities[self.a.index], data.velocities[self.b.index]);
        let (vc, vd) = (data.velocities[self.c.index], data.velocities[self.d.index]);

        let c_dot = self.jv_ac.dot(va.v - vc.v)
            + self.jv_bd.dot(vb.v - vd.v)
            + (self.jw_a * va.w - self.jw_c * vc.w)
            + (self.jw_b * vb.w - self.jw_d * vd.w);

        let impulse = -self.mass * c_dot;
        self.impulse += impulse;
        self.apply_velocity(data, impulse);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (inv_mass, coordinate) = self.update_jacobians(&*data.positions);
        let c = coordinate - self.constant;
        let impulse = if inv_mass > FixedNum::ZERO {
            (-c).checked_div(inv_mass).unwrap_or(FixedNum::ZERO)
        } else {
            FixedNum::ZERO
        };

        let rows = [
            (self.a, self.jv_ac, self.jw_a, impulse),
            (self.b, self.jv_bd, self.jw_b, impulse),
            (self.c, self.jv_ac, self.jw_c, -impulse),
            (self.d, self.jv_bd, self.jw_d, -impulse),
        ];
        for (body, jv, jw, lambda) in rows {
            let p = &mut data.positions[body.index];
            p.c += jv * (body.inv_mass * lambda);
            p.a += body.inv_i * lambda * jw;
        }

        // The gear never blocks convergence of the island.
        true
    }
}
