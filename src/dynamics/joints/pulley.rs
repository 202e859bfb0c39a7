use serde::{Deserialize, Serialize};

use super::{JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{inv_or_zero, FixedNum, FixedVec2, Rot};

/// Connects two bodies to fixed ground points so that
/// `length_a + ratio * length_b` stays constant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulleyJointDef {
    pub base: JointBase,
    /// Ground anchors in world coordinates.
    pub ground_anchor_a: FixedVec2,
    pub ground_anchor_b: FixedVec2,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    pub length_a: FixedNum,
    pub length_b: FixedNum,
    /// Must be positive.
    pub ratio: FixedNum,
}

impl Default for PulleyJointDef {
    fn default() -> Self {
        Self {
            base: JointBase { collide_connected: true, ..Default::default() },
            ground_anchor_a: FixedVec2::new(-FixedNum::ONE, FixedNum::ONE),
            ground_anchor_b: FixedVec2::new(FixedNum::ONE, FixedNum::ONE),
            local_anchor_a: FixedVec2::new(-FixedNum::ONE, FixedNum::ZERO),
            local_anchor_b: FixedVec2::new(FixedNum::ONE, FixedNum::ZERO),
            length_a: FixedNum::ZERO,
            length_b: FixedNum::ZERO,
            ratio: FixedNum::ONE,
        }
    }
}

impl PulleyJointDef {
    /// Lengths from the current anchor positions.
    pub fn new(
        (handle_a, body_a): (BodyHandle, &Body),
        (handle_b, body_b): (BodyHandle, &Body),
        ground_anchors: (FixedVec2, FixedVec2),
        anchors: (FixedVec2, FixedVec2),
        ratio: FixedNum,
    ) -> Self {
        Self {
            base: JointBase { body_a: handle_a, body_b: handle_b, collide_connected: true, user_data: 0 },
            ground_anchor_a: ground_anchors.0,
            ground_anchor_b: ground_anchors.1,
            local_anchor_a: body_a.local_point(anchors.0),
            local_anchor_b: body_b.local_point(anchors.1),
            length_a: (anchors.0 - ground_anchors.0).length(),
            length_b: (anchors.1 - ground_anchors.1).length(),
            ratio,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PulleyJoint {
    pub(crate) ground_anchor_a: FixedVec2,
    pub(crate) ground_anchor_b: FixedVec2,
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    length_a: FixedNum,
    length_b: FixedNum,
    ratio: FixedNum,
    constant: FixedNum,

    impulse: FixedNum,

    a: SolverBody,
    b: SolverBody,
    u_a: FixedVec2,
    u_b: FixedVec2,
    r_a: FixedVec2,
    r_b: FixedVec2,
    mass: FixedNum,
}

/// Rope direction from the ground anchor, zero when the rope is too short
/// to define one.
fn rope_direction(anchor: FixedVec2, ground: FixedVec2, linear_slop: FixedNum) -> (FixedVec2, FixedNum) {
    let (dir, length) = (anchor - ground).normalize_with_length();
    if length > linear_slop * FixedNum::from_num(10) {
        (dir, length)
    } else {
        (FixedVec2::ZERO, length)
    }
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Self {
        Self {
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            ratio: def.ratio,
            constant: def.length_a + def.ratio * def.length_b,
            impulse: FixedNum::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u_a: FixedVec2::ZERO,
            u_b: FixedVec2::ZERO,
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            mass: FixedNum::ZERO,
        }
    }

    pub fn ground_anchor_a(&self) -> FixedVec2 {
        self.ground_anchor_a
    }

    pub fn ground_anchor_b(&self) -> FixedVec2 {
        self.ground_anchor_b
    }

    /// Rest length of segment A.
    pub fn length_a(&self) -> FixedNum {
        self.length_a
    }

    pub fn length_b(&self) -> FixedNum {
        self.length_b
    }

    pub fn ratio(&self) -> FixedNum {
        self.ratio
    }

    pub fn current_length_a(&self, body_a: &Body) -> FixedNum {
        (body_a.world_point(self.local_anchor_a) - self.ground_anchor_a).length()
    }

    pub fn current_length_b(&self, body_b: &Body) -> FixedNum {
        (body_b.world_point(self.local_anchor_b) - self.ground_anchor_b).length()
    }

    pub fn reaction_force(&self, inv_dt: FixedNum) -> FixedVec2 {
        self.u_b * (inv_dt * self.impulse)
    }

    fn apply(&self, data: &mut SolverData, impulse: FixedNum) {
        let p_a = self.u_a * -impulse;
        let p_b = self.u_b * (-self.ratio * impulse);
        let va = &mut data.velocities[self.a.index];
        va.v += p_a * self.a.inv_mass;
        va.w += self.a.inv_i * self.r_a.cross(p_a);
        let vb = &mut data.velocities[self.b.index];
        vb.v += p_b * self.b.inv_mass;
        vb.w += self.b.inv_i * self.r_b.cross(p_b);
    }

    fn effective_mass(&self, r_a: FixedVec2, r_b: FixedVec2, u_a: FixedVec2, u_b: FixedVec2) -> FixedNum {
        let ru_a = r_a.cross(u_a);
        let ru_b = r_b.cross(u_b);
        let m_a = self.a.inv_mass + self.a.inv_i * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_i * ru_b * ru_b;
        inv_or_zero(m_a + self.ratio * self.ratio * m_b)
    }
}

impl JointSolver for PulleyJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);

        let slop = data.settings.linear_slop;
        self.u_a = rope_direction(c_a + self.r_a, self.ground_anchor_a, slop).0;
        self.u_b = rope_direction(c_b + self.r_b, self.ground_anchor_b, slop).0;
        self.mass = self.effective_mass(self.r_a, self.r_b, self.u_a, self.u_b);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply(data, self.impulse);
        } else {
            self.impulse = FixedNum::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        let vp_a = va.v + FixedVec2::scalar_cross(va.w, self.r_a);
        let vp_b = vb.v + FixedVec2::scalar_cross(vb.w, self.r_b);

        let c_dot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;
        self.apply(data, impulse);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
        let slop = data.settings.linear_slop;

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let (u_a, length_a) = rope_direction(c_a + r_a, self.ground_anchor_a, slop);
        let (u_b, length_b) = rope_direction(c_b + r_b, self.ground_anchor_b, slop);
        let mass = self.effective_mass(r_a, r_b, u_a, u_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;
        let p_a = u_a * -impulse;
        let p_b = u_b * (-self.ratio * impulse);

        c_a += p_a * self.a.inv_mass;
        a_a += self.a.inv_i * r_a.cross(p_a);
        c_b += p_b * self.b.inv_mass;
        a_b += self.b.inv_i * r_b.cross(p_b);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        linear_error < slop
    }
}
