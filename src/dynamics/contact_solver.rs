//! Sequential-impulse contact solver.
//!
//! Velocity constraints are built once per island solve from the contact
//! manifolds, warm started with last step's impulses, and iterated. The
//! position pass nudges bodies apart with a clamped Baumgarte correction.

use super::arena::{Arena, BodyHandle, ContactHandle, FixtureHandle};
use super::body::Body;
use super::contact::Contact;
use super::fixture::Fixture;
use super::time_step::{Position, TimeStep, Velocity};
use super::world_callbacks::ContactImpulse;
use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::fixed_math::{clamp, safe_mul, FixedNum, FixedVec2, Mat22, Rot, Transform, HALF};
use crate::settings::{Settings, MAX_MANIFOLD_POINTS};

/// Condition number bound for the 2-point block solver. Above it the
/// manifold is reduced to one point.
const MAX_CONDITION_NUMBER: i32 = 1000;

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraintPoint {
    r_a: FixedVec2,
    r_b: FixedVec2,
    normal_impulse: FixedNum,
    tangent_impulse: FixedNum,
    normal_mass: FixedNum,
    tangent_mass: FixedNum,
    velocity_bias: FixedNum,
}

#[derive(Clone, Debug)]
pub(crate) struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: FixedVec2,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: FixedNum,
    inv_mass_b: FixedNum,
    inv_i_a: FixedNum,
    inv_i_b: FixedNum,
    friction: FixedNum,
    restitution: FixedNum,
    threshold: FixedNum,
    tangent_speed: FixedNum,
    point_count: usize,
    pub(crate) contact: ContactHandle,
}

#[derive(Clone, Debug)]
struct ContactPositionConstraint {
    local_points: [FixedVec2; MAX_MANIFOLD_POINTS],
    local_normal: FixedVec2,
    local_point: FixedVec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: FixedNum,
    inv_mass_b: FixedNum,
    local_center_a: FixedVec2,
    local_center_b: FixedVec2,
    inv_i_a: FixedNum,
    inv_i_b: FixedNum,
    kind: ManifoldType,
    radius_a: FixedNum,
    radius_b: FixedNum,
    point_count: usize,
}

/// Normal, point and separation of one manifold point at the current
/// island positions.
fn position_solver_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Transform,
    xf_b: &Transform,
    index: usize,
) -> (FixedVec2, FixedVec2, FixedNum) {
    match pc.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize();
            let point = (point_a + point_b) * HALF;
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Point from A to B.
            (-normal, clip_point, separation)
        }
    }
}

fn body_transform(c: FixedVec2, a: FixedNum, local_center: FixedVec2) -> Transform {
    let q = Rot::from_angle(a);
    Transform {
        p: c - q.apply(local_center),
        q,
    }
}

/// Reusable constraint storage, owned by the island.
#[derive(Default)]
pub(crate) struct ContactSolver {
    pub(crate) velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    /// Build constraints for `handles`. Every contact must be touching and
    /// enabled, so its manifold has at least one point.
    pub(crate) fn reset(
        &mut self,
        step: &TimeStep,
        handles: &[ContactHandle],
        contacts: &Arena<ContactHandle, Contact>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        bodies: &Arena<BodyHandle, Body>,
    ) {
        self.velocity_constraints.clear();
        self.position_constraints.clear();

        for &handle in handles {
            let contact = &contacts[handle];
            let radius_a = fixtures[contact.fixture_a].shape.radius();
            let radius_b = fixtures[contact.fixture_b].shape.radius();
            let body_a = &bodies[contact.body_a];
            let body_b = &bodies[contact.body_b];
            let manifold = &contact.manifold;

            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: FixedVec2::ZERO,
                normal_mass: Mat22::ZERO,
                k: Mat22::ZERO,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                threshold: contact.restitution_threshold,
                tangent_speed: contact.tangent_speed,
                point_count,
                contact: handle,
            };

            let mut pc = ContactPositionConstraint {
                local_points: [FixedVec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                kind: manifold.kind,
                radius_a,
                radius_b,
                point_count,
            };

            for (j, cp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * cp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * cp.tangent_impulse;
                }
                pc.local_points[j] = cp.local_point;
            }

            self.velocity_constraints.push(vc);
            self.position_constraints.push(pc);
        }
    }

    /// Anchors, effective masses and restitution bias from the current
    /// island positions.
    pub(crate) fn initialize_velocity_constraints(
        &mut self,
        contacts: &Arena<ContactHandle, Contact>,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for (vc, pc) in self.velocity_constraints.iter_mut().zip(&self.position_constraints) {
            let manifold: &Manifold = &contacts[vc.contact].manifold;

            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let Position { c: c_a, a: a_a } = positions[vc.index_a];
            let Velocity { v: v_a, w: w_a } = velocities[vc.index_a];
            let Position { c: c_b, a: a_b } = positions[vc.index_b];
            let Velocity { v: v_b, w: w_b } = velocities[vc.index_b];

            let xf_a = body_transform(c_a, a_a, pc.local_center_a);
            let xf_b = body_transform(c_b, a_b, pc.local_center_b);

            let wm = WorldManifold::new(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = wm.normal;
            let tangent = vc.normal.cross_scalar(FixedNum::ONE);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > FixedNum::ZERO {
                    FixedNum::ONE.checked_div(k_normal).unwrap_or(FixedNum::ZERO)
                } else {
                    FixedNum::ZERO
                };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > FixedNum::ZERO {
                    FixedNum::ONE.checked_div(k_tangent).unwrap_or(FixedNum::ZERO)
                } else {
                    FixedNum::ZERO
                };

                // Restitution bias.
                vcp.velocity_bias = FixedNum::ZERO;
                let v_rel = vc.normal.dot(
                    v_b + FixedVec2::scalar_cross(w_b, vcp.r_b) - v_a - FixedVec2::scalar_cross(w_a, vcp.r_a),
                );
                if v_rel < -vc.threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = vcp1.r_a.cross(vc.normal);
                let rn1_b = vcp1.r_b.cross(vc.normal);
                let rn2_a = vcp2.r_a.cross(vc.normal);
                let rn2_b = vcp2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                let det = safe_mul(k11, k22) - safe_mul(k12, k12);
                if safe_mul(k11, k11) < safe_mul(FixedNum::from_num(MAX_CONDITION_NUMBER), det) {
                    // K is safe to invert.
                    vc.k = Mat22::new(FixedVec2::new(k11, k12), FixedVec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // Redundant constraints: use one point only.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub(crate) fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(FixedNum::ONE);

            for vcp in &vc.points[..vc.point_count] {
                let p = normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                w_a -= i_a * vcp.r_a.cross(p);
                v_a -= p * m_a;
                w_b += i_b * vcp.r_b.cross(p);
                v_b += p * m_b;
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in self.velocity_constraints.iter_mut() {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(FixedNum::ONE);
            let friction = vc.friction;

            debug_assert!(vc.point_count == 1 || vc.point_count == 2);

            // Tangent first: non-penetration matters more than friction.
            for vcp in vc.points[..vc.point_count].iter_mut() {
                let dv = v_b + FixedVec2::scalar_cross(w_b, vcp.r_b) - v_a - FixedVec2::scalar_cross(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = clamp(vcp.tangent_impulse + lambda, -max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                for vcp in vc.points[..vc.point_count].iter_mut() {
                    let dv =
                        v_b + FixedVec2::scalar_cross(w_b, vcp.r_b) - v_a - FixedVec2::scalar_cross(w_a, vcp.r_a);

                    let vn = dv.dot(normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    let new_impulse = (vcp.normal_impulse + lambda).max(FixedNum::ZERO);
                    let lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;

                    let p = normal * lambda;
                    v_a -= p * m_a;
                    w_a -= i_a * vcp.r_a.cross(p);
                    v_b += p * m_b;
                    w_b += i_b * vcp.r_b.cross(p);
                }
            } else {
                // Block solver for two points (Catto, "Solving the LCP").
                // Total impulse x solves K * x + b = vn' with x >= 0,
                // vn' >= 0 and x_i * vn'_i = 0. Try each active set in turn.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);

                let a = FixedVec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= FixedNum::ZERO && a.y >= FixedNum::ZERO);

                let dv1 = v_b + FixedVec2::scalar_cross(w_b, cp1.r_b) - v_a - FixedVec2::scalar_cross(w_a, cp1.r_a);
                let dv2 = v_b + FixedVec2::scalar_cross(w_b, cp2.r_b) - v_a - FixedVec2::scalar_cross(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b = FixedVec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul_vec(a);

                let zero = FixedNum::ZERO;
                let solution = {
                    // Both points active.
                    let x = -vc.normal_mass.mul_vec(b);
                    if x.x >= zero && x.y >= zero {
                        Some(x)
                    } else {
                        // Only point 1 active.
                        let x = FixedVec2::new(-cp1.normal_mass * b.x, zero);
                        let vn2 = vc.k.ex.y * x.x + b.y;
                        if x.x >= zero && vn2 >= zero {
                            Some(x)
                        } else {
                            // Only point 2 active.
                            let x = FixedVec2::new(zero, -cp2.normal_mass * b.y);
                            let vn1 = vc.k.ey.x * x.y + b.x;
                            if x.y >= zero && vn1 >= zero {
                                Some(x)
                            } else if b.x >= zero && b.y >= zero {
                                // Neither active.
                                Some(FixedVec2::ZERO)
                            } else {
                                // No solution: leave the impulses alone.
                                None
                            }
                        }
                    }
                };

                if let Some(x) = solution {
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Write accumulated impulses back into the manifolds for next step's
    /// warm start.
    pub(crate) fn store_impulses(&self, contacts: &mut Arena<ContactHandle, Contact>) {
        for vc in &self.velocity_constraints {
            if let Some(contact) = contacts.get_mut(vc.contact) {
                for (mp, vcp) in contact.manifold.points.iter_mut().zip(&vc.points).take(vc.point_count) {
                    mp.normal_impulse = vcp.normal_impulse;
                    mp.tangent_impulse = vcp.tangent_impulse;
                }
            }
        }
    }

    /// Impulses of constraint `index`, for `post_solve`.
    pub(crate) fn impulse(&self, index: usize) -> ContactImpulse {
        let vc = &self.velocity_constraints[index];
        let mut impulse = ContactImpulse {
            count: vc.point_count,
            ..Default::default()
        };
        for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
            impulse.normal_impulses[j] = vcp.normal_impulse;
            impulse.tangent_impulses[j] = vcp.tangent_impulse;
        }
        impulse
    }

    /// Baumgarte position correction. Returns true when the deepest
    /// penetration is within `3 * linear_slop`.
    pub(crate) fn solve_position_constraints(&self, positions: &mut [Position], settings: &Settings) -> bool {
        let min_separation = self.solve_positions(positions, settings, settings.baumgarte, None);
        min_separation >= settings.linear_slop * FixedNum::from_num(-3)
    }

    /// Position correction for a time of impact sub-step. Only the two TOI
    /// bodies are moved; everything else acts as if static.
    pub(crate) fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        settings: &Settings,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation =
            self.solve_positions(positions, settings, settings.toi_baumgarte, Some((toi_index_a, toi_index_b)));
        // Resolve down to 1.5 slop so the next step starts separated.
        min_separation >= -(settings.linear_slop + settings.linear_slop * HALF)
    }

    fn solve_positions(
        &self,
        positions: &mut [Position],
        settings: &Settings,
        baumgarte: FixedNum,
        toi_bodies: Option<(usize, usize)>,
    ) -> FixedNum {
        let mut min_separation = FixedNum::ZERO;

        for pc in &self.position_constraints {
            let (index_a, index_b) = (pc.index_a, pc.index_b);

            let movable = |index: usize| match toi_bodies {
                Some((toi_a, toi_b)) => index == toi_a || index == toi_b,
                None => true,
            };
            let (m_a, i_a) = if movable(index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (FixedNum::ZERO, FixedNum::ZERO)
            };
            let (m_b, i_b) = if movable(index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (FixedNum::ZERO, FixedNum::ZERO)
            };

            let Position { c: mut c_a, a: mut a_a } = positions[index_a];
            let Position { c: mut c_b, a: mut a_b } = positions[index_b];

            for j in 0..pc.point_count {
                let xf_a = body_transform(c_a, a_a, pc.local_center_a);
                let xf_b = body_transform(c_b, a_b, pc.local_center_b);

                let (normal, point, separation) = position_solver_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - c_a;
                let r_b = point - c_b;

                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop.
                let c = clamp(
                    baumgarte * (separation + settings.linear_slop),
                    -settings.max_linear_correction,
                    FixedNum::ZERO,
                );

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                let impulse = if k > FixedNum::ZERO {
                    (-c).checked_div(k).unwrap_or(FixedNum::ZERO)
                } else {
                    FixedNum::ZERO
                };

                let p = normal * impulse;

                c_a -= p * m_a;
                a_a -= i_a * r_a.cross(p);
                c_b += p * m_b;
                a_b += i_b * r_b.cross(p);
            }

            positions[index_a] = Position { c: c_a, a: a_a };
            positions[index_b] = Position { c: c_b, a: a_b };
        }

        min_separation
    }
}
