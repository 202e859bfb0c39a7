use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{clamp, inv_or_zero, FixedNum, FixedVec2, Rot, TWO};

/// Point-to-line constraint with a suspension spring along the axis and a
/// rotational motor. Body B is the wheel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    /// Suspension axis in body A.
    pub local_axis_a: FixedVec2,
    pub enable_limit: bool,
    pub lower_translation: FixedNum,
    pub upper_translation: FixedNum,
    pub enable_motor: bool,
    pub max_motor_torque: FixedNum,
    pub motor_speed: FixedNum,
    /// Suspension stiffness in N/m.
    pub stiffness: FixedNum,
    pub damping: FixedNum,
}

impl Default for WheelJointDef {
    fn default() -> Self {
        Self {
            base: JointBase::default(),
            local_anchor_a: FixedVec2::ZERO,
            local_anchor_b: FixedVec2::ZERO,
            local_axis_a: FixedVec2::UNIT_X,
            enable_limit: false,
            lower_translation: FixedNum::ZERO,
            upper_translation: FixedNum::ZERO,
            enable_motor: false,
            max_motor_torque: FixedNum::ZERO,
            motor_speed: FixedNum::ZERO,
            stiffness: FixedNum::ZERO,
            damping: FixedNum::ZERO,
        }
    }
}

impl WheelJointDef {
    pub fn new(
        (handle_a, body_a): (BodyHandle, &Body),
        (handle_b, body_b): (BodyHandle, &Body),
        anchor: FixedVec2,
        axis: FixedVec2,
    ) -> Self {
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, ..Default::default() },
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            local_axis_a: body_a.local_vector(axis),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct WheelJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    local_x_axis_a: FixedVec2,
    local_y_axis_a: FixedVec2,
    enable_limit: bool,
    lower_translation: FixedNum,
    upper_translation: FixedNum,
    enable_motor: bool,
    max_motor_torque: FixedNum,
    motor_speed: FixedNum,
    stiffness: FixedNum,
    damping: FixedNum,

    impulse: FixedNum,
    motor_impulse: FixedNum,
    spring_impulse: FixedNum,
    lower_impulse: FixedNum,
    upper_impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    ax: FixedVec2,
    ay: FixedVec2,
    s_ax: FixedNum,
    s_bx: FixedNum,
    s_ay: FixedNum,
    s_by: FixedNum,
    mass: FixedNum,
    motor_mass: FixedNum,
    axial_mass: FixedNum,
    spring_mass: FixedNum,
    translation: FixedNum,
    bias: FixedNum,
    gamma: FixedNum,
}

impl WheelJoint {
    pub(crate) fn new(def: &WheelJointDef) -> Self {
        let x_axis = def.local_axis_a.normalize();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: x_axis,
            local_y_axis_a: FixedVec2::scalar_cross(FixedNum::ONE, x_axis),
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation.min(def.upper_translation),
            upper_translation: def.upper_translation.max(def.lower_translation),
            enable_motor: def.enable_motor,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: FixedNum::ZERO,
            motor_impulse: FixedNum::ZERO,
            spring_impulse: FixedNum::ZERO,
            lower_impulse: FixedNum::ZERO,
            upper_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            ax: FixedVec2::ZERO,
            ay: FixedVec2::ZERO,
            s_ax: FixedNum::ZERO,
            s_bx: FixedNum::ZERO,
            s_ay: FixedNum::ZERO,
            s_by: FixedNum::ZERO,
            mass: FixedNum::ZERO,
            motor_mass: FixedNum::ZERO,
            axial_mass: FixedNum::ZERO,
            spring_mass: FixedNum::ZERO,
            translation: FixedNum::ZERO,
            bias: FixedNum::ZERO,
            gamma: FixedNum::ZERO,
        }
    }

    pub fn local_axis_a(&self) -> FixedVec2 {
        self.local_x_axis_a
    }

    pub fn joint_translation(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        (p_b - p_a).dot(body_a.world_vector(self.local_x_axis_a))
    }

    /// Angular speed of the wheel relative to body A.
    pub fn joint_angular_speed(&self, body_a: &Body, body_b: &Body) -> FixedNum {
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
        self.lower_translation
    }

    pub fn upper_limit(&self) -> FixedNum {
        self.upper_translation
    }

    pub fn set_limits(&mut self, lower: FixedNum, upper: FixedNum) {
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower.min(upper);
            self.upper_translation = upper.max(lower);
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
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

    pub fn stiffness(&self) -> FixedNum {
        self.stiffness
    }

    pub fn set_stiffness(&mut self, stiffness: FixedNum) {
        self.stiffness = stiffness;
    }

    pub fn damping(&self) -> FixedNum {
        self.damping
    }

    pub fn set_damping(&mut self, damping: FixedNum) {
        self.damping = damping;
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        let axial = self.spring_impulse + self.lower_impulse - self.upper_impulse;
        (self.ay * self.impulse + self.ax * axial) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.motor_impulse
    }

    fn axial_speed(&self, data: &SolverData) -> FixedNum {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        self.ax.dot(vb.v - va.v) + self.s_bx * vb.w - self.s_ax * va.w
    }

    fn apply_axial(&self, data: &mut SolverData, impulse: FixedNum) {
        apply_impulse(data, &self.a, &self.b, self.ax * impulse, impulse * self.s_ax, impulse * self.s_bx);
    }
}

impl JointSolver for WheelJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = c_b + r_b - c_a - r_a;

        // Point to line.
        self.ay = q_a.apply(self.local_y_axis_a);
        self.s_ay = (d + r_a).cross(self.ay);
        self.s_by = r_b.cross(self.ay);
        self.mass = inv_or_zero(m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by);

        // Spring along the axis.
        self.ax = q_a.apply(self.local_x_axis_a);
        self.s_ax = (d + r_a).cross(self.ax);
        self.s_bx = r_b.cross(self.ax);

        let inv_mass = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
        self.axial_mass = inv_or_zero(inv_mass);

        self.spring_mass = FixedNum::ZERO;
        self.bias = FixedNum::ZERO;
        self.gamma = FixedNum::ZERO;
        if self.stiffness > FixedNum::ZERO && inv_mass > FixedNum::ZERO {
            let c = d.dot(self.ax);
            let h = data.step.dt;
            self.gamma = inv_or_zero(h * (self.damping + h * self.stiffness));
            self.bias = c * h * self.stiffness * self.gamma;
            self.spring_mass = inv_or_zero(inv_mass + self.gamma);
        } else {
            self.spring_impulse = FixedNum::ZERO;
        }

        if self.enable_limit {
            self.translation = self.ax.dot(d);
        } else {
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }

        if self.enable_motor {
            self.motor_mass = inv_or_zero(i_a + i_b);
        } else {
            self.motor_mass = FixedNum::ZERO;
            self.motor_impulse = FixedNum::ZERO;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.spring_impulse *= ratio;
            self.motor_impulse *= ratio;

            let axial = self.spring_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.ay * self.impulse + self.ax * axial;
            let l_a = self.impulse * self.s_ay + axial * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + axial * self.s_bx + self.motor_impulse;
            apply_impulse(data, &self.a, &self.b, p, l_a, l_b);
        } else {
            self.impulse = FixedNum::ZERO;
            self.spring_impulse = FixedNum::ZERO;
            self.motor_impulse = FixedNum::ZERO;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        // Spring.
        {
            let c_dot = self.axial_speed(data);
            let impulse = -self.spring_mass * (c_dot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;
            self.apply_axial(data, impulse);
        }

        // Rotational motor.
        {
            let c_dot = data.velocities[self.b.index].w - data.velocities[self.a.index].w - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = clamp(old + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;
            apply_impulse(data, &self.a, &self.b, FixedVec2::ZERO, impulse, impulse);
        }

        if self.enable_limit {
            let inv_dt = data.step.inv_dt;

            // Lower limit.
            {
                let c = self.translation - self.lower_translation;
                let c_dot = self.axial_speed(data);
                let impulse = -self.axial_mass * (c_dot + c.max(FixedNum::ZERO) * inv_dt);
                let old = self.lower_impulse;
                self.lower_impulse = (old + impulse).max(FixedNum::ZERO);
                self.apply_axial(data, self.lower_impulse - old);
            }

            // Upper limit.
            {
                let c = self.upper_translation - self.translation;
                let c_dot = -self.axial_speed(data);
                let impulse = -self.axial_mass * (c_dot + c.max(FixedNum::ZERO) * inv_dt);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(FixedNum::ZERO);
                self.apply_axial(data, -(self.upper_impulse - old));
            }
        }

        // Point to line.
        {
            let va = data.velocities[self.a.index];
            let vb = data.velocities[self.b.index];
            let c_dot = self.ay.dot(vb.v - va.v) + self.s_by * vb.w - self.s_ay * va.w;
            let impulse = -self.mass * c_dot;
            self.impulse += impulse;
            apply_impulse(data, &self.a, &self.b, self.ay * impulse, impulse * self.s_ay, impulse * self.s_by);
        }
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let settings = data.settings;

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let mut linear_error = FixedNum::ZERO;

        if self.enable_limit {
            let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
            let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
            let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
            let d = c_b - c_a + r_b - r_a;

            let ax = q_a.apply(self.local_x_axis_a);
            let s_ax = (d + r_a).cross(ax);
            let s_bx = r_b.cross(ax);

            let translation = ax.dot(d);
            let c = if (self.upper_translation - self.lower_translation).abs() < TWO * settings.linear_slop {
                translation
            } else if translation <= self.lower_translation {
                (translation - self.lower_translation).min(FixedNum::ZERO)
            } else if translation >= self.upper_translation {
                (translation - self.upper_translation).max(FixedNum::ZERO)
            } else {
                FixedNum::ZERO
            };

            if c != FixedNum::ZERO {
                let inv_mass = m_a + m_b + i_a * s_ax * s_ax + i_b * s_bx * s_bx;
                let impulse = (-c).checked_div(inv_mass).unwrap_or(FixedNum::ZERO);

                let p = ax * impulse;
                c_a -= p * m_a;
                a_a -= i_a * impulse * s_ax;
                c_b += p * m_b;
                a_b += i_b * impulse * s_bx;

                linear_error = c.abs();
            }
        }

        // Point to line, recomputed after the limit correction.
        {
            let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
            let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
            let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
            let d = c_b - c_a + r_b - r_a;

            let ay = q_a.apply(self.local_y_axis_a);
            let s_ay = (d + r_a).cross(ay);
            let s_by = r_b.cross(ay);

            let c = d.dot(ay);
            let inv_mass = m_a + m_b + i_a * s_ay * s_ay + i_b * s_by * s_by;
            let impulse = (-c).checked_div(inv_mass).unwrap_or(FixedNum::ZERO);

            let p = ay * impulse;
            c_a -= p * m_a;
            a_a -= i_a * impulse * s_ay;
            c_b += p * m_b;
            a_b += i_b * impulse * s_by;

            linear_error = linear_error.max(c.abs());
        }

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        linear_error <= settings.linear_slop
    }
}
