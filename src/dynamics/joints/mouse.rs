use serde::{Deserialize, Serialize};

use super::{JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::SolverData;
use crate::fixed_math::{inv_or_zero, ratio, FixedNum, FixedVec2, Mat22, Rot};

/// Soft constraint pulling a point on body B towards a world target, with a
/// force cap. Body A only anchors the joint in the island graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseJointDef {
    pub base: JointBase,
    /// Initial target in world coordinates. Also fixes the anchor on body B.
    pub target: FixedVec2,
    pub max_force: FixedNum,
    /// Linear stiffness in N/m.
    pub stiffness: FixedNum,
    pub damping: FixedNum,
}

#[derive(Clone, Debug)]
pub struct MouseJoint {
    pub(crate) local_anchor_b: FixedVec2,
    pub(crate) target: FixedVec2,
    max_force: FixedNum,
    stiffness: FixedNum,
    damping: FixedNum,

    impulse: FixedVec2,

    b: SolverBody,
    r_b: FixedVec2,
    mass: Mat22,
    c: FixedVec2,
    beta: FixedNum,
    gamma: FixedNum,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef, body_b: &Body) -> Self {
        Self {
            local_anchor_b: body_b.local_point(def.target),
            target: def.target,
            max_force: def.max_force,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: FixedVec2::ZERO,
            b: SolverBody::default(),
            r_b: FixedVec2::ZERO,
            mass: Mat22::ZERO,
            c: FixedVec2::ZERO,
            beta: FixedNum::ZERO,
            gamma: FixedNum::ZERO,
        }
    }

    pub fn target(&self) -> FixedVec2 {
        self.target
    }

    /// Move the target. The world wakes body B when this is set through it.
    pub fn set_target(&mut self, target: FixedVec2) {
        self.target = target;
    }

    pub fn max_force(&self) -> FixedNum {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: FixedNum) {
        self.max_force = force;
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
        self.impulse * inv_dt
    }
}

impl JointSolver for MouseJoint {
    fn init_velocity_constraints(&mut self, _body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.b = SolverBody::of(body_b);
        let (m_b, i_b) = (self.b.inv_mass, self.b.inv_i);

        let c_b = data.positions[self.b.index].c;
        let q_b = Rot::from_angle(data.positions[self.b.index].a);

        let h = data.step.dt;
        self.gamma = inv_or_zero(h * (self.damping + h * self.stiffness));
        self.beta = h * self.stiffness * self.gamma;

        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let r_b = self.r_b;

        let off = -i_b * r_b.x * r_b.y;
        let k = Mat22::new(
            FixedVec2::new(m_b + i_b * r_b.y * r_b.y + self.gamma, off),
            FixedVec2::new(off, m_b + i_b * r_b.x * r_b.x + self.gamma),
        );
        self.mass = k.inverse();

        self.c = (c_b + r_b - self.target) * self.beta;

        let vb = &mut data.velocities[self.b.index];
        // Light angular damping keeps a dragged body from spinning up.
        vb.w *= ratio(49, 50);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            vb.v += self.impulse * m_b;
            vb.w += i_b * r_b.cross(self.impulse);
        } else {
            self.impulse = FixedVec2::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let vb = &mut data.velocities[self.b.index];

        let c_dot = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b);
        let impulse = self.mass.mul_vec(-(c_dot + self.c + self.impulse * self.gamma));

        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        let (dir, length) = self.impulse.normalize_with_length();
        if length > max_impulse {
            self.impulse = dir * max_impulse;
        }
        let impulse = self.impulse - old;

        vb.v += impulse * self.b.inv_mass;
        vb.w += self.b.inv_i * self.r_b.cross(impulse);
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData) -> bool {
        true
    }
}
