use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::SolverData;
use crate::fixed_math::{clamp, inv_or_zero, FixedNum, FixedVec2, Mat22, Rot};

/// Top-down friction: resists relative linear and angular motion up to a
/// maximum force and torque.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrictionJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    pub max_force: FixedNum,
    pub max_torque: FixedNum,
}

impl FrictionJointDef {
    pub fn new((handle_a, body_a): (BodyHandle, &Body), (handle_b, body_b): (BodyHandle, &Body), anchor: FixedVec2) -> Self {
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, ..Default::default() },
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrictionJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    max_force: FixedNum,
    max_torque: FixedNum,

    linear_impulse: FixedVec2,
    angular_impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    r_a: FixedVec2,
    r_b: FixedVec2,
    linear_mass: Mat22,
    angular_mass: FixedNum,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force.max(FixedNum::ZERO),
            max_torque: def.max_torque.max(FixedNum::ZERO),
            linear_impulse: FixedVec2::ZERO,
            angular_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            linear_mass: Mat22::ZERO,
            angular_mass: FixedNum::ZERO,
        }
    }

    pub fn max_force(&self) -> FixedNum {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: FixedNum) {
        self.max_force = force.max(FixedNum::ZERO);
    }

    pub fn max_torque(&self) -> FixedNum {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: FixedNum) {
        self.max_torque = torque.max(FixedNum::ZERO);
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        self.linear_impulse * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.angular_impulse
    }
}

impl JointSolver for FrictionJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let q_a = Rot::from_angle(data.positions[self.a.index].a);
        let q_b = Rot::from_angle(data.positions[self.b.index].a);
        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let off = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k = Mat22::new(
            FixedVec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, off),
            FixedVec2::new(off, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
        );
        self.linear_mass = k.inverse();
        self.angular_mass = inv_or_zero(i_a + i_b);

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;
            let p = self.linear_impulse;
            apply_impulse(data, &self.a, &self.b, p, r_a.cross(p) + self.angular_impulse, r_b.cross(p) + self.angular_impulse);
        } else {
            self.linear_impulse = FixedVec2::ZERO;
            self.angular_impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let h = data.step.dt;

        // Angular friction.
        {
            let c_dot = data.velocities[self.b.index].w - data.velocities[self.a.index].w;
            let impulse = -self.angular_mass * c_dot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = clamp(old + impulse, -max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;
            apply_impulse(data, &self.a, &self.b, FixedVec2::ZERO, impulse, impulse);
        }

        // Linear friction.
        {
            let va = data.velocities[self.a.index];
            let vb = data.velocities[self.b.index];
            let c_dot = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b) - va.v - FixedVec2::scalar_cross(va.w, self.r_a);

            let impulse = -self.linear_mass.mul_vec(c_dot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            let (dir, length) = self.linear_impulse.normalize_with_length();
            if length > max_impulse {
                self.linear_impulse = dir * max_impulse;
            }

            let impulse = self.linear_impulse - old;
            apply_impulse(data, &self.a, &self.b, impulse, self.r_a.cross(impulse), self.r_b.cross(impulse));
        }
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData) -> bool {
        true
    }
}
