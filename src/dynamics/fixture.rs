//! Fixtures attach a shape and its material to a body.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::arena::{BodyHandle, FixtureHandle};
use crate::collision::{Aabb, BroadPhase, MassData, RayCastInput, RayCastOutput, Shape};
use crate::fixed_math::{FixedNum, FixedVec2, Transform};

/// Collision filtering data.
///
/// Two fixtures with the same non-zero `group_index` always collide
/// (positive) or never collide (negative). Otherwise each fixture's
/// `category_bits` must be accepted by the other's `mask_bits`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDef {
    /// Cloned into the fixture. Polygon-like shapes get the world's skin
    /// radius on attach.
    pub shape: Shape,
    /// Usually kg/m^2.
    pub density: FixedNum,
    pub friction: FixedNum,
    /// Elasticity, usually in `[0, 1]`.
    pub restitution: FixedNum,
    /// Relative speed (m/s) above which collisions bounce.
    pub restitution_threshold: FixedNum,
    pub is_sensor: bool,
    pub filter: Filter,
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            density: FixedNum::ZERO,
            friction: FixedNum::from_bits(858_993_459), // 0.2
            restitution: FixedNum::ZERO,
            restitution_threshold: FixedNum::ONE,
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_density(mut self, density: FixedNum) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: FixedNum) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: FixedNum) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }
}

/// What the broad phase stores per proxy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyKey {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

/// One broad-phase proxy per shape child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixtureProxy {
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: usize,
}

#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) density: FixedNum,
    pub(crate) friction: FixedNum,
    pub(crate) restitution: FixedNum,
    pub(crate) restitution_threshold: FixedNum,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: SmallVec<[FixtureProxy; 1]>,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef, skin_radius: FixedNum) -> Self {
        let mut shape = def.shape.clone();
        shape.set_skin_radius(skin_radius);
        Self {
            body,
            shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            restitution_threshold: def.restitution_threshold,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: SmallVec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> FixedNum {
        self.density
    }

    pub fn friction(&self) -> FixedNum {
        self.friction
    }

    pub fn restitution(&self) -> FixedNum {
        self.restitution
    }

    pub fn restitution_threshold(&self) -> FixedNum {
        self.restitution_threshold
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Changing friction only affects contacts created afterwards.
    pub fn set_friction(&mut self, friction: FixedNum) {
        self.friction = friction;
    }

    pub fn set_restitution(&mut self, restitution: FixedNum) {
        self.restitution = restitution;
    }

    pub fn set_restitution_threshold(&mut self, threshold: FixedNum) {
        self.restitution_threshold = threshold;
    }

    /// Changing density needs `World::reset_mass_data` to take effect.
    pub fn set_density(&mut self, density: FixedNum) {
        debug_assert!(density >= FixedNum::ZERO);
        self.density = density;
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    pub fn test_point(&self, xf: &Transform, p: FixedVec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child_index: usize) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    /// Fat AABB of a child as last synchronized.
    pub fn aabb(&self, child_index: usize) -> Option<Aabb> {
        self.proxies.get(child_index).map(|p| p.aabb)
    }

    pub(crate) fn create_proxies(
        &mut self,
        handle: FixtureHandle,
        broad_phase: &mut BroadPhase<ProxyKey>,
        xf: &Transform,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(
                &aabb,
                ProxyKey {
                    fixture: handle,
                    child_index,
                },
            );
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyKey>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Cover the swept shape from `xf1` to `xf2` and move the proxies.
    pub(crate) fn synchronize(&mut self, broad_phase: &mut BroadPhase<ProxyKey>, xf1: &Transform, xf2: &Transform) {
        for proxy in self.proxies.iter_mut() {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = Aabb::combine(&aabb1, &aabb2);
            let displacement = aabb2.center() - aabb1.center();
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<ProxyKey>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_groups_override_masks() {
        let a = Filter {
            group_index: -3,
            ..Default::default()
        };
        assert!(!a.should_collide(&a));

        let b = Filter {
            group_index: 2,
            mask_bits: 0,
            ..Default::default()
        };
        assert!(b.should_collide(&b));
    }

    #[test]
    fn test_filter_category_mask() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0xFFFF & !0x0002,
            group_index: 0,
        };
        let wall = Filter::default();
        assert!(player.should_collide(&wall));
        assert!(!player.should_collide(&player));
    }
}
