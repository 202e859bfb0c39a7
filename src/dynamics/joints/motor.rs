use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{clamp, inv_or_zero, ratio, FixedNum, FixedVec2, Mat22, Rot};

/// Drives body B towards a target offset relative to body A, limited by a
/// maximum force and torque.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorJointDef {
    pub base: JointBase,
    /// Target position of body B in body A's frame.
    pub linear_offset: FixedVec2,
    /// Target `angle_b - angle_a`.
    pub angular_offset: FixedNum,
    pub max_force: FixedNum,
    pub max_torque: FixedNum,
    /// Position correction factor in `[0, 1]`.
    pub correction_factor: FixedNum,
}

impl Default for MotorJointDef {
    fn default() -> Self {
        Self {
            base: JointBase::default(),
            linear_offset: FixedVec2::ZERO,
            angular_offset: FixedNum::ZERO,
            max_force: FixedNum::ONE,
            max_torque: FixedNum::ONE,
            correction_factor: ratio(3, 10),
        }
    }
}

impl MotorJointDef {
    /// Offsets that hold the bodies in their current relative pose.
    pub fn new((handle_a, body_a): (BodyHandle, &Body), (handle_b, body_b): (BodyHandle, &Body)) -> Self {
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, ..Default::default() },
            linear_offset: body_a.local_point(body_b.position()),
            angular_offset: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct MotorJoint {
    linear_offset: FixedVec2,
    angular_offset: FixedNum,
    max_force: FixedNum,
    max_torque: FixedNum,
    correction_factor: FixedNum,

    linear_impulse: FixedVec2,
    angular_impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    r_a: FixedVec2,
    r_b: FixedVec2,
    linear_error: FixedVec2,
    angular_error: FixedNum,
    linear_mass: Mat22,
    angular_mass: FixedNum,
}

impl MotorJoint {
    pub(crate) fn new(def: &MotorJointDef) -> Self {
        Self {
            linear_offset: def.linear_offset,
            angular_offset: def.angular_offset,
            max_force: def.max_force.max(FixedNum::ZERO),
            max_torque: def.max_torque.max(FixedNum::ZERO),
            correction_factor: clamp(def.correction_factor, FixedNum::ZERO, FixedNum::ONE),
            linear_impulse: FixedVec2::ZERO,
            angular_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            linear_error: FixedVec2::ZERO,
            angular_error: FixedNum::ZERO,
            linear_mass: Mat22::ZERO,
            angular_mass: FixedNum::ZERO,
        }
    }

    pub fn linear_offset(&self) -> FixedVec2 {
        self.linear_offset
    }

    pub fn set_linear_offset(&mut self, offset: FixedVec2) {
        self.linear_offset = offset;
    }

    pub fn angular_offset(&self) -> FixedNum {
        self.angular_offset
    }

    pub fn set_angular_offset(&mut self, offset: FixedNum) {
        self.angular_offset = offset;
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

    pub fn correction_factor(&self) -> FixedNum {
        self.correction_factor
    }

    pub fn set_correction_factor(&mut self, factor: FixedNum) {
        self.correction_factor = clamp(factor, FixedNum::ZERO, FixedNum::ONE);
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        self.linear_impulse * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.angular_impulse
    }
}

impl JointSolver for MotorJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        // Body B's origin is the anchor.
        self.r_a = q_a.apply(self.linear_offset - self.a.local_center);
        self.r_b = q_b.apply(-self.b.local_center);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let off = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k = Mat22::new(
            FixedVec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, off),
            FixedVec2::new(off, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
        );
        self.linear_mass = k.inverse();
        self.angular_mass = inv_or_zero(i_a + i_b);

        self.linear_error = c_b + r_b - c_a - r_a;
        self.angular_error = a_b - a_a - self.angular_offset;

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
        let inv_h = data.step.inv_dt;

        {
            let c_dot = data.velocities[self.b.index].w - data.velocities[self.a.index].w
                + inv_h * self.correction_factor * self.angular_error;
            let impulse = -self.angular_mass * c_dot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = clamp(old + impulse, -max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;
            apply_impulse(data, &self.a, &self.b, FixedVec2::ZERO, impulse, impulse);
        }

        {
            let va = data.velocities[self.a.index];
            let vb = data.velocities[self.b.index];
            let c_dot = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b) - va.v - FixedVec2::scalar_cross(va.w, self.r_a)
                + self.linear_error * (inv_h * self.correction_factor);

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
