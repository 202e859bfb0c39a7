use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{clamp, inv_or_zero, FixedNum, FixedVec2, FixedVec3, Mat22, Mat33, Rot, TWO};

/// One translational degree of freedom along an axis fixed in body A.
/// Relative rotation is locked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrismaticJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    /// Translation axis in body A. Normalized on creation.
    pub local_axis_a: FixedVec2,
    pub reference_angle: FixedNum,
    pub enable_limit: bool,
    pub lower_translation: FixedNum,
    pub upper_translation: FixedNum,
    pub enable_motor: bool,
    pub max_motor_force: FixedNum,
    pub motor_speed: FixedNum,
}

impl Default for PrismaticJointDef {
    fn default() -> Self {
        Self {
            base: JointBase::default(),
            local_anchor_a: FixedVec2::ZERO,
            local_anchor_b: FixedVec2::ZERO,
            local_axis_a: FixedVec2::UNIT_X,
            reference_angle: FixedNum::ZERO,
            enable_limit: false,
            lower_translation: FixedNum::ZERO,
            upper_translation: FixedNum::ZERO,
            enable_motor: false,
            max_motor_force: FixedNum::ZERO,
            motor_speed: FixedNum::ZERO,
        }
    }
}

impl PrismaticJointDef {
    /// Anchor and world axis from the bodies' current poses.
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
            reference_angle: body_b.angle() - body_a.angle(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    pub(crate) local_x_axis_a: FixedVec2,
    local_y_axis_a: FixedVec2,
    pub(crate) reference_angle: FixedNum,
    enable_limit: bool,
    lower_translation: FixedNum,
    upper_translation: FixedNum,
    enable_motor: bool,
    max_motor_force: FixedNum,
    motor_speed: FixedNum,

    impulse: FixedVec2,
    motor_impulse: FixedNum,
    lower_impulse: FixedNum,
    upper_impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    axis: FixedVec2,
    perp: FixedVec2,
    s1: FixedNum,
    s2: FixedNum,
    a1: FixedNum,
    a2: FixedNum,
    k: Mat22,
    translation: FixedNum,
    axial_mass: FixedNum,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let x_axis = def.local_axis_a.normalize();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: x_axis,
            local_y_axis_a: FixedVec2::scalar_cross(FixedNum::ONE, x_axis),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation.min(def.upper_translation),
            upper_translation: def.upper_translation.max(def.lower_translation),
            enable_motor: def.enable_motor,
            max_motor_force: def.max_motor_force,
            motor_speed: def.motor_speed,
            impulse: FixedVec2::ZERO,
            motor_impulse: FixedNum::ZERO,
            lower_impulse: FixedNum::ZERO,
            upper_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            axis: FixedVec2::ZERO,
            perp: FixedVec2::ZERO,
            s1: FixedNum::ZERO,
            s2: FixedNum::ZERO,
            a1: FixedNum::ZERO,
            a2: FixedNum::ZERO,
            k: Mat22::ZERO,
            translation: FixedNum::ZERO,
            axial_mass: FixedNum::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> FixedVec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> FixedVec2 {
        self.local_anchor_b
    }

    pub fn local_axis_a(&self) -> FixedVec2 {
        self.local_x_axis_a
    }

    pub fn reference_angle(&self) -> FixedNum {
        self.reference_angle
    }

    /// Anchor separation measured along the axis.
    pub fn joint_translation(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        let axis = body_a.world_vector(self.local_x_axis_a);
        (p_b - p_a).dot(axis)
    }

    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        let r_a = body_a.xf.q.apply(self.local_anchor_a - body_a.sweep.local_center);
        let r_b = body_b.xf.q.apply(self.local_anchor_b - body_b.sweep.local_center);
        let p1 = body_a.sweep.c + r_a;
        let p2 = body_b.sweep.c + r_b;
        let d = p2 - p1;
        let axis = body_a.xf.q.apply(self.local_x_axis_a);

        let (v_a, v_b) = (body_a.linear_velocity, body_b.linear_velocity);
        let (w_a, w_b) = (body_a.angular_velocity, body_b.angular_velocity);
        d.dot(FixedVec2::scalar_cross(w_a, axis))
            + axis.dot(v_b + FixedVec2::scalar_cross(w_b, r_b) - v_a - FixedVec2::scalar_cross(w_a, r_a))
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

    pub fn max_motor_force(&self) -> FixedNum {
        self.max_motor_force
    }

    pub fn set_max_motor_force(&mut self, force: FixedNum) {
        self.max_motor_force = force;
    }

    pub fn motor_force(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.motor_impulse
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
        (self.perp * self.impulse.x + self.axis * axial) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.impulse.y
    }

    /// Impulse along the axis with the cached Jacobian.
    fn apply_axial(&self, data: &mut SolverData, impulse: FixedNum) {
        let p = self.axis * impulse;
        apply_impulse(data, &self.a, &self.b, p, impulse * self.a1, impulse * self.a2);
    }

    fn axial_speed(&self, data: &SolverData) -> FixedNum {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w
    }
}

impl JointSolver for PrismaticJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = (c_b - c_a) + r_b - r_a;

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        // Motor and limit Jacobian.
        self.axis = q_a.apply(self.local_x_axis_a);
        self.a1 = (d + r_a).cross(self.axis);
        self.a2 = r_b.cross(self.axis);
        self.axial_mass = inv_or_zero(m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2);

        // Point to line and angle.
        self.perp = q_a.apply(self.local_y_axis_a);
        self.s1 = (d + r_a).cross(self.perp);
        self.s2 = r_b.cross(self.perp);

        let k11 = m_a + m_b + i_a * self.s1 * self.s1 + i_b * self.s2 * self.s2;
        let k12 = i_a * self.s1 + i_b * self.s2;
        let mut k22 = i_a + i_b;
        if k22 == FixedNum::ZERO {
            // Both bodies have fixed rotation.
            k22 = FixedNum::ONE;
        }
        self.k = Mat22::new(FixedVec2::new(k11, k12), FixedVec2::new(k12, k22));

        if self.enable_limit {
            self.translation = self.axis.dot(d);
        } else {
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
        if !self.enable_motor {
            self.motor_impulse = FixedNum::ZERO;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;
            apply_impulse(data, &self.a, &self.b, p, l_a, l_b);
        } else {
            self.impulse = FixedVec2::ZERO;
            self.motor_impulse = FixedNum::ZERO;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        if self.enable_motor {
            let c_dot = self.axial_speed(data);
            let impulse = self.axial_mass * (self.motor_speed - c_dot);
            let old = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_force;
            self.motor_impulse = clamp(old + impulse, -max_impulse, max_impulse);
            self.apply_axial(data, self.motor_impulse - old);
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

            // Upper limit, with the signs flipped.
            {
                let c = self.upper_translation - self.translation;
                let c_dot = -self.axial_speed(data);
                let impulse = -self.axial_mass * (c_dot + c.max(FixedNum::ZERO) * inv_dt);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(FixedNum::ZERO);
                self.apply_axial(data, -(self.upper_impulse - old));
            }
        }

        // Point to line and angle as a 2x2 block.
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        let c_dot = FixedVec2::new(
            self.perp.dot(vb.v - va.v) + self.s2 * vb.w - self.s1 * va.w,
            vb.w - va.w,
        );
        let df = self.k.solve(-c_dot);
        self.impulse += df;

        let p = self.perp * df.x;
        let l_a = df.x * self.s1 + df.y;
        let l_b = df.x * self.s2 + df.y;
        apply_impulse(data, &self.a, &self.b, p, l_a, l_b);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
        let settings = data.settings;

        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = c_b + r_b - c_a - r_a;

        let axis = q_a.apply(self.local_x_axis_a);
        let a1 = (d + r_a).cross(axis);
        let a2 = r_b.cross(axis);
        let perp = q_a.apply(self.local_y_axis_a);
        let s1 = (d + r_a).cross(perp);
        let s2 = r_b.cross(perp);

        let c1 = FixedVec2::new(perp.dot(d), a_b - a_a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut c2 = None;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < TWO * settings.linear_slop {
                linear_error = linear_error.max(translation.abs());
                c2 = Some(translation);
            } else if translation <= self.lower_translation {
                linear_error = linear_error.max(self.lower_translation - translation);
                c2 = Some((translation - self.lower_translation).min(FixedNum::ZERO));
            } else if translation >= self.upper_translation {
                linear_error = linear_error.max(translation - self.upper_translation);
                c2 = Some((translation - self.upper_translation).max(FixedNum::ZERO));
            }
        }

        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let mut k22 = i_a + i_b;
        if k22 == FixedNum::ZERO {
            k22 = FixedNum::ONE;
        }

        let impulse = match c2 {
            Some(c2) => {
                let k13 = i_a * s1 * a1 + i_b * s2 * a2;
                let k23 = i_a * a1 + i_b * a2;
                let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
                let k = Mat33 {
                    ex: FixedVec3::new(k11, k12, k13),
                    ey: FixedVec3::new(k12, k22, k23),
                    ez: FixedVec3::new(k13, k23, k33),
                };
                k.solve33(-FixedVec3::new(c1.x, c1.y, c2))
            }
            None => {
                let k = Mat22::new(FixedVec2::new(k11, k12), FixedVec2::new(k12, k22));
                let impulse1 = k.solve(-c1);
                FixedVec3::new(impulse1.x, impulse1.y, FixedNum::ZERO)
            }
        };

        let p = perp * impulse.x + axis * impulse.z;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        c_a -= p * m_a;
        a_a -= i_a * l_a;
        c_b += p * m_b;
        a_b += i_b * l_b;

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        linear_error <= settings.linear_slop && angular_error <= settings.angular_slop
    }
}
