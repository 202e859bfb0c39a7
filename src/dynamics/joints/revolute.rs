use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{clamp, inv_or_zero, FixedNum, FixedVec2, Mat22, Rot, TWO};

/// Pins two bodies together at a shared point, leaving rotation free.
/// Supports an angle range and a motor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevoluteJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    /// `angle_b - angle_a` in the reference pose.
    pub reference_angle: FixedNum,
    pub enable_limit: bool,
    pub lower_angle: FixedNum,
    pub upper_angle: FixedNum,
    pub enable_motor: bool,
    pub motor_speed: FixedNum,
    pub max_motor_torque: FixedNum,
}

impl RevoluteJointDef {
    /// Anchors and reference angle from the bodies' current poses.
    pub fn new((handle_a, body_a): (BodyHandle, &Body), (handle_b, body_b): (BodyHandle, &Body), anchor: FixedVec2) -> Self {
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, ..Default::default() },
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            reference_angle: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    pub(crate) reference_angle: FixedNum,
    enable_limit: bool,
    lower_angle: FixedNum,
    upper_angle: FixedNum,
    enable_motor: bool,
    motor_speed: FixedNum,
    max_motor_torque: FixedNum,

    impulse: FixedVec2,
    motor_impulse: FixedNum,
    lower_impulse: FixedNum,
    upper_impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    r_a: FixedVec2,
    r_b: FixedVec2,
    k: Mat22,
    angle: FixedNum,
    axial_mass: FixedNum,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle.min(def.upper_angle),
            upper_angle: def.upper_angle.max(def.lower_angle),
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: FixedVec2::ZERO,
            motor_impulse: FixedNum::ZERO,
            lower_impulse: FixedNum::ZERO,
            upper_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            k: Mat22::ZERO,
            angle: FixedNum::ZERO,
            axial_mass: FixedNum::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> FixedVec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> FixedVec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> FixedNum {
        self.reference_angle
    }

    /// Current joint angle relative to the reference pose.
    pub fn joint_angle(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        body_b.sweep.a - body_a.sweep.a - self.reference_angle
    }

    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        body_b.angular_velocity - body_a.angular_velocity
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
    }

    pub fn lower_limit(&self) -> FixedNum {
        self.lower_angle
    }

    pub fn upper_limit(&self) -> FixedNum {
        self.upper_angle
    }

    pub fn set_limits(&mut self, lower: FixedNum, upper: FixedNum) {
        if lower != self.lower_angle || upper != self.upper_angle {
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
            self.lower_angle = lower.min(upper);
            self.upper_angle = upper.max(lower);
        }
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> FixedNum {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: FixedNum) {
        self.motor_speed = speed;
    }

    pub fn max_motor_torque(&self) -> FixedNum {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: FixedNum) {
        self.max_motor_torque = torque;
    }

    pub fn motor_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.motor_impulse
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        self.impulse * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * (self.motor_impulse + self.lower_impulse - self.upper_impulse)
    }

    fn point_mass(&self, r_a: FixedVec2, r_b: FixedVec2) -> Mat22 {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let off = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        Mat22::new(
            FixedVec2::new(m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b, off),
            FixedVec2::new(off, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b),
        )
    }

    fn apply_angular(&self, data: &mut SolverData, impulse: FixedNum) {
        data.velocities[self.a.index].w -= self.a.inv_i * impulse;
        data.velocities[self.b.index].w += self.b.inv_i * impulse;
    }
}

impl JointSolver for RevoluteJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let a_a = data.positions[self.a.index].a;
        let a_b = data.positions[self.b.index].a;
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        self.k = self.point_mass(self.r_a, self.r_b);

        let inv_axial = self.a.inv_i + self.b.inv_i;
        let fixed_rotation = inv_axial == FixedNum::ZERO;
        self.axial_mass = inv_or_zero(inv_axial);
        self.angle = a_b - a_a - self.reference_angle;

        if !self.enable_limit || fixed_rotation {
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = FixedNum::ZERO;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse;
            apply_impulse(data, &self.a, &self.b, p, self.r_a.cross(p) + axial, self.r_b.cross(p) + axial);
        } else {
            self.impulse = FixedVec2::ZERO;
            self.motor_impulse = FixedNum::ZERO;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let fixed_rotation = self.a.inv_i + self.b.inv_i == FixedNum::ZERO;

        if self.enable_motor && !fixed_rotation {
            let c_dot = data.velocities[self.b.index].w - data.velocities[self.a.index].w - self.motor_speed;
            let impulse = -self.axial_mass * c_dot;
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = clamp(old + impulse, -max_impulse, max_impulse);
            self.apply_angular(data, self.motor_impulse - old);
        }

        if self.enable_limit && !fixed_rotation {
            let inv_dt = data.step.inv_dt;

            // Lower limit.
            {
                let c = self.angle - self.lower_angle;
                let c_dot = data.velocities[self.b.index].w - data.velocities[self.a.index].w;
                let impulse = -self.axial_mass * (c_dot + c.max(FixedNum::ZERO) * inv_dt);
                let old = self.lower_impulse;
                self.lower_impulse = (old + impulse).max(FixedNum::ZERO);
                self.apply_angular(data, self.lower_impulse - old);
            }

            // Upper limit. The sign flips so the impulse stays non-negative.
            {
                let c = self.upper_angle - self.angle;
                let c_dot = data.velocities[self.a.index].w - data.velocities[self.b.index].w;
                let impulse = -self.axial_mass * (c_dot + c.max(FixedNum::ZERO) * inv_dt);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(FixedNum::ZERO);
                self.apply_angular(data, -(self.upper_impulse - old));
            }
        }

        // Point to point.
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        let c_dot = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b) - va.v - FixedVec2::scalar_cross(va.w, self.r_a);
        let impulse = self.k.solve(-c_dot);
        self.impulse += impulse;
        apply_impulse(data, &self.a, &self.b, impulse, self.r_a.cross(impulse), self.r_b.cross(impulse));
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let settings = data.settings;

        let mut angular_error = FixedNum::ZERO;
        let fixed_rotation = self.a.inv_i + self.b.inv_i == FixedNum::ZERO;

        if self.enable_limit && !fixed_rotation {
            let angle = a_b - a_a - self.reference_angle;
            let max_correction = settings.max_angular_correction;
            let c = if (self.upper_angle - self.lower_angle).abs() < TWO * settings.angular_slop {
                clamp(angle - self.lower_angle, -max_correction, max_correction)
            } else if angle <= self.lower_angle {
                clamp(angle - self.lower_angle + settings.angular_slop, -max_correction, FixedNum::ZERO)
            } else if angle >= self.upper_angle {
                clamp(angle - self.upper_angle - settings.angular_slop, FixedNum::ZERO, max_correction)
            } else {
                FixedNum::ZERO
            };

            let limit_impulse = -self.axial_mass * c;
            a_a -= self.a.inv_i * limit_impulse;
            a_b += self.b.inv_i * limit_impulse;
            angular_error = c.abs();
        }

        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);

        let c = c_b + r_b - c_a - r_a;
        let position_error = c.length();

        let impulse = -self.point_mass(r_a, r_b).solve(c);
        c_a -= impulse * self.a.inv_mass;
        a_a -= self.a.inv_i * r_a.cross(impulse);
        c_b += impulse * self.b.inv_mass;
        a_b += self.b.inv_i * r_b.cross(impulse);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        position_error <= settings.linear_slop && angular_error <= settings.angular_slop
    }
}
