use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{inv_or_zero, safe_mul, FixedNum, FixedVec2, Rot, EPSILON};
use crate::settings::Settings;

/// Keeps two anchor points at a rest length, optionally as a spring and
/// optionally with a minimum and maximum length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    /// Rest length.
    pub length: FixedNum,
    pub min_length: FixedNum,
    pub max_length: FixedNum,
    /// Linear stiffness in N/m. Zero makes the joint rigid.
    pub stiffness: FixedNum,
    /// Linear damping in N*s/m.
    pub damping: FixedNum,
}

impl Default for DistanceJointDef {
    fn default() -> Self {
        Self {
            base: JointBase::default(),
            local_anchor_a: FixedVec2::ZERO,
            local_anchor_b: FixedVec2::ZERO,
            length: FixedNum::ONE,
            min_length: FixedNum::ZERO,
            max_length: FixedNum::MAX,
            stiffness: FixedNum::ZERO,
            damping: FixedNum::ZERO,
        }
    }
}

impl DistanceJointDef {
    /// Rest length (and both limits) from two world anchors.
    pub fn new(
        (handle_a, body_a): (BodyHandle, &Body),
        (handle_b, body_b): (BodyHandle, &Body),
        anchor_a: FixedVec2,
        anchor_b: FixedVec2,
    ) -> Self {
        let length = (anchor_b - anchor_a).length();
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, ..Default::default() },
            local_anchor_a: body_a.local_point(anchor_a),
            local_anchor_b: body_b.local_point(anchor_b),
            length,
            min_length: length,
            max_length: length,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    length: FixedNum,
    min_length: FixedNum,
    max_length: FixedNum,
    stiffness: FixedNum,
    damping: FixedNum,
    linear_slop: FixedNum,

    impulse: FixedNum,
    lower_impulse: FixedNum,
    upper_impulse: FixedNum,

    // Solver temporaries.
    a: SolverBody,
    b: SolverBody,
    u: FixedVec2,
    r_a: FixedVec2,
    r_b: FixedVec2,
    current_length: FixedNum,
    bias: FixedNum,
    gamma: FixedNum,
    mass: FixedNum,
    soft_mass: FixedNum,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef, settings: &Settings) -> Self {
        let slop = settings.linear_slop;
        let length = def.length.max(slop);
        let min_length = def.min_length.max(slop);
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length,
            min_length,
            max_length: def.max_length.max(min_length),
            stiffness: def.stiffness,
            damping: def.damping,
            linear_slop: slop,
            impulse: FixedNum::ZERO,
            lower_impulse: FixedNum::ZERO,
            upper_impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u: FixedVec2::ZERO,
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            current_length: FixedNum::ZERO,
            bias: FixedNum::ZERO,
            gamma: FixedNum::ZERO,
            mass: FixedNum::ZERO,
            soft_mass: FixedNum::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> FixedVec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> FixedVec2 {
        self.local_anchor_b
    }

    pub fn length(&self) -> FixedNum {
        self.length
    }

    /// Sets the rest length, clamped to at least the linear slop. Returns the
    /// clamped value.
    pub fn set_length(&mut self, length: FixedNum) -> FixedNum {
        self.impulse = FixedNum::ZERO;
        self.length = length.max(self.linear_slop);
        self.length
    }

    pub fn min_length(&self) -> FixedNum {
        self.min_length
    }

    pub fn set_min_length(&mut self, min_length: FixedNum) -> FixedNum {
        self.lower_impulse = FixedNum::ZERO;
        self.min_length = min_length.max(self.linear_slop).min(self.max_length);
        self.min_length
    }

    pub fn max_length(&self) -> FixedNum {
        self.max_length
    }

    pub fn set_max_length(&mut self, max_length: FixedNum) -> FixedNum {
        self.upper_impulse = FixedNum::ZERO;
        self.max_length = max_length.max(self.min_length);
        self.max_length
    }

    /// Distance between the anchors for the given body poses.
    pub fn current_length(&self, body_a: &Body, body_b: &Body) -> FixedNum {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        (p_b - p_a).length()
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
        self.u * (inv_dt * (self.impulse + self.lower_impulse - self.upper_impulse))
    }

    fn has_range(&self) -> bool {
        self.min_length < self.max_length
    }

    fn apply(&self, data: &mut SolverData, impulse: FixedNum) {
        let p = self.u * impulse;
        apply_impulse(data, &self.a, &self.b, p, self.r_a.cross(p), self.r_b.cross(p));
    }

    /// Relative velocity of the anchors along `u`.
    fn separation_speed(&self, data: &SolverData) -> FixedNum {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        let vp_a = va.v + FixedVec2::scalar_cross(va.w, self.r_a);
        let vp_b = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b);
        self.u.dot(vp_b - vp_a)
    }
}

impl JointSolver for DistanceJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = c_b + self.r_b - c_a - self.r_a;

        self.current_length = d.length();
        if self.current_length > data.settings.linear_slop {
            self.u = d.normalize();
        } else {
            self.u = FixedVec2::ZERO;
            self.mass = FixedNum::ZERO;
            self.impulse = FixedNum::ZERO;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }

        let cr_au = self.r_a.cross(self.u);
        let cr_bu = self.r_b.cross(self.u);
        let mut inv_mass = self.a.inv_mass + self.a.inv_i * cr_au * cr_au + self.b.inv_mass + self.b.inv_i * cr_bu * cr_bu;
        self.mass = inv_or_zero(inv_mass);

        if self.stiffness > FixedNum::ZERO && self.has_range() {
            // Soft: implicit spring with damping.
            let c = self.current_length - self.length;
            let h = data.step.dt;
            self.gamma = inv_or_zero(h * (self.damping + h * self.stiffness));
            self.bias = c * h * self.stiffness * self.gamma;

            inv_mass += self.gamma;
            self.soft_mass = inv_or_zero(inv_mass);
        } else {
            self.gamma = FixedNum::ZERO;
            self.bias = FixedNum::ZERO;
            self.soft_mass = self.mass;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;
            self.apply(data, self.impulse + self.lower_impulse - self.upper_impulse);
        } else {
            self.impulse = FixedNum::ZERO;
            self.lower_impulse = FixedNum::ZERO;
            self.upper_impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        if !self.has_range() {
            // Rigid.
            let c_dot = self.separation_speed(data);
            let impulse = -self.mass * c_dot;
            self.impulse += impulse;
            self.apply(data, impulse);
            return;
        }

        if self.stiffness > FixedNum::ZERO {
            let c_dot = self.separation_speed(data);
            let impulse = -self.soft_mass * (c_dot + self.bias + self.gamma * self.impulse);
            self.impulse += impulse;
            self.apply(data, impulse);
        }

        let inv_dt = data.step.inv_dt;

        // Lower limit.
        {
            let c = self.current_length - self.min_length;
            let bias = safe_mul(c.max(FixedNum::ZERO), inv_dt);
            let c_dot = self.separation_speed(data);
            let impulse = safe_mul(-self.mass, c_dot.saturating_add(bias));
            let old = self.lower_impulse;
            self.lower_impulse = self.lower_impulse.saturating_add(impulse).max(FixedNum::ZERO);
            self.apply(data, self.lower_impulse - old);
        }

        // Upper limit. `max_length` may be unbounded.
        {
            let c = self.max_length - self.current_length;
            let bias = safe_mul(c.max(FixedNum::ZERO), inv_dt);
            let c_dot = -self.separation_speed(data);
            let impulse = safe_mul(-self.mass, c_dot.saturating_add(bias));
            let old = self.upper_impulse;
            self.upper_impulse = self.upper_impulse.saturating_add(impulse).max(FixedNum::ZERO);
            self.apply(data, -(self.upper_impulse - old));
        }
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let (u, length) = (c_b + r_b - c_a - r_a).normalize_with_length();

        let c = if (self.min_length - self.max_length).abs() < EPSILON || length < self.min_length {
            length - self.min_length
        } else if self.max_length < length {
            length - self.max_length
        } else {
            return true;
        };

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * self.a.inv_mass;
        a_a -= self.a.inv_i * r_a.cross(p);
        c_b += p * self.b.inv_mass;
        a_b += self.b.inv_i * r_b.cross(p);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        c.abs() < data.settings.linear_slop
    }
}
