use serde::{Deserialize, Serialize};

use super::{apply_impulse, JointBase, JointSolver, SolverBody};
use crate::dynamics::arena::BodyHandle;
use crate::dynamics::body::Body;
use crate::dynamics::time_step::{Position, SolverData};
use crate::fixed_math::{inv_or_zero, FixedNum, FixedVec2, FixedVec3, Mat33, Rot};

/// Glues two bodies together. A positive angular stiffness turns the
/// rotational part into a spring.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeldJointDef {
    pub base: JointBase,
    pub local_anchor_a: FixedVec2,
    pub local_anchor_b: FixedVec2,
    pub reference_angle: FixedNum,
    /// Rotational stiffness in N*m. Zero makes the weld rigid.
    pub stiffness: FixedNum,
    pub damping: FixedNum,
}

impl WeldJointDef {
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
pub struct WeldJoint {
    pub(crate) local_anchor_a: FixedVec2,
    pub(crate) local_anchor_b: FixedVec2,
    reference_angle: FixedNum,
    stiffness: FixedNum,
    damping: FixedNum,

    impulse: FixedVec3,

    a: SolverBody,
    b: SolverBody,
    r_a: FixedVec2,
    r_b: FixedVec2,
    mass: Mat33,
    bias: FixedNum,
    gamma: FixedNum,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: FixedVec3::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: FixedVec2::ZERO,
            r_b: FixedVec2::ZERO,
            mass: Mat33::ZERO,
            bias: FixedNum::ZERO,
            gamma: FixedNum::ZERO,
        }
    }

    pub fn reference_angle(&self) -> FixedNum {
        self.reference_angle
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
        self.impulse.xy() * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: FixedNum) -> FixedNum {
        inv_dt * self.impulse.z
    }

    fn stiffness_matrix(&self, r_a: FixedVec2, r_b: FixedVec2) -> Mat33 {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let xx = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
        let xy = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let xz = -r_a.y * i_a - r_b.y * i_b;
        let yy = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
        let yz = r_a.x * i_a + r_b.x * i_b;
        let zz = i_a + i_b;
        Mat33 {
            ex: FixedVec3::new(xx, xy, xz),
            ey: FixedVec3::new(xy, yy, yz),
            ez: FixedVec3::new(xz, yz, zz),
        }
    }

    fn point_speed(&self, data: &SolverData) -> FixedVec2 {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        vb.v + FixedVec2::scalar_cross(vb.w, self.r_b) - va.v - FixedVec2::scalar_cross(va.w, self.r_a)
    }

    fn apply(&self, data: &mut SolverData, p: FixedVec2, angular: FixedNum) {
        apply_impulse(data, &self.a, &self.b, p, self.r_a.cross(p) + angular, self.r_b.cross(p) + angular);
    }
}

impl JointSolver for WeldJoint {
    fn init_velocity_constraints(&mut self, body_a: &Body, body_b: &Body, data: &mut SolverData) {
        self.a = SolverBody::of(body_a);
        self.b = SolverBody::of(body_b);

        let a_a = data.positions[self.a.index].a;
        let a_b = data.positions[self.b.index].a;
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));

        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let k = self.stiffness_matrix(self.r_a, self.r_b);

        if self.stiffness > FixedNum::ZERO {
            self.mass = k.inverse22();

            let c = a_b - a_a - self.reference_angle;
            let h = data.step.dt;
            self.gamma = inv_or_zero(h * (self.damping + h * self.stiffness));
            self.bias = c * h * self.stiffness * self.gamma;

            let inv_m = self.a.inv_i + self.b.inv_i + self.gamma;
            self.mass.ez.z = inv_or_zero(inv_m);
        } else if k.ez.z == FixedNum::ZERO {
            self.mass = k.inverse22();
            self.gamma = FixedNum::ZERO;
            self.bias = FixedNum::ZERO;
        } else {
            self.mass = k.sym_inverse33();
            self.gamma = FixedNum::ZERO;
            self.bias = FixedNum::ZERO;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            self.apply(data, self.impulse.xy(), self.impulse.z);
        } else {
            self.impulse = FixedVec3::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (ia, ib) = (self.a.index, self.b.index);

        if self.stiffness > FixedNum::ZERO {
            let c_dot2 = data.velocities[ib].w - data.velocities[ia].w;
            let impulse2 = -self.mass.ez.z * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            self.apply(data, FixedVec2::ZERO, impulse2);

            let c_dot1 = self.point_speed(data);
            let impulse1 = -self.mass.mul_vec22(c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;
            self.apply(data, impulse1, FixedNum::ZERO);
        } else {
            let c_dot1 = self.point_speed(data);
            let c_dot2 = data.velocities[ib].w - data.velocities[ia].w;
            let impulse = -self.mass.mul_vec(FixedVec3::new(c_dot1.x, c_dot1.y, c_dot2));
            self.impulse += impulse;
            self.apply(data, impulse.xy(), impulse.z);
        }
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];
        let (q_a, q_b) = (Rot::from_angle(a_a), Rot::from_angle(a_b));
        let settings = data.settings;

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let k = self.stiffness_matrix(r_a, r_b);

        let c1 = c_b + r_b - c_a - r_a;
        let position_error = c1.length();
        let mut angular_error = FixedNum::ZERO;

        let impulse = if self.stiffness > FixedNum::ZERO {
            let p = -k.solve22(c1);
            FixedVec3::new(p.x, p.y, FixedNum::ZERO)
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            angular_error = c2.abs();
            if k.ez.z > FixedNum::ZERO {
                -k.solve33(FixedVec3::new(c1.x, c1.y, c2))
            } else {
                let p = -k.solve22(c1);
                FixedVec3::new(p.x, p.y, FixedNum::ZERO)
            }
        };

        let p = impulse.xy();
        c_a -= p * self.a.inv_mass;
        a_a -= self.a.inv_i * (r_a.cross(p) + impulse.z);
        c_b += p * self.b.inv_mass;
        a_b += self.b.inv_i * (r_b.cross(p) + impulse.z);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        position_error <= settings.linear_slop && angular_error <= settings.angular_slop
    }
}
