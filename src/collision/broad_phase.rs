//! Broad phase: tracks moved proxies and reports new overlapping pairs.

use super::dynamic_tree::{DynamicTree, NULL_NODE};
use super::{Aabb, RayCastInput};
use crate::fixed_math::{FixedNum, FixedVec2};

/// Wraps a `DynamicTree` with a move buffer. Only proxies that moved (or
/// were touched) since the last `update_pairs` are queried for new pairs.
#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    proxy_count: usize,
    move_buffer: Vec<usize>,
    pair_buffer: Vec<(usize, usize)>,
}

impl<T: Copy + Default> BroadPhase<T> {
    pub fn new(aabb_extension: FixedNum, aabb_multiplier: FixedNum) -> Self {
        Self {
            tree: DynamicTree::new(aabb_extension, aabb_multiplier),
            proxy_count: 0,
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Create a proxy with an initial AABB. Pairs are not reported until
    /// `update_pairs` is called.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(proxy_id);
        proxy_id
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        self.unbuffer_move(proxy_id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(proxy_id);
    }

    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: FixedVec2) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Force pair re-evaluation for this proxy on the next `update_pairs`.
    pub fn touch_proxy(&mut self, proxy_id: usize) {
        self.buffer_move(proxy_id);
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    pub fn user_data(&self, proxy_id: usize) -> T {
        self.tree.user_data(proxy_id)
    }

    pub fn test_overlap(&self, proxy_a: usize, proxy_b: usize) -> bool {
        self.tree.fat_aabb(proxy_a).overlaps(&self.tree.fat_aabb(proxy_b))
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    fn buffer_move(&mut self, proxy_id: usize) {
        self.move_buffer.push(proxy_id);
    }

    fn unbuffer_move(&mut self, proxy_id: usize) {
        for slot in self.move_buffer.iter_mut().filter(|slot| **slot == proxy_id) {
            *slot = NULL_NODE;
        }
    }

    /// Report every new potentially overlapping pair to `callback`, once
    /// each, in ascending proxy id order.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        let tree = &self.tree;
        let pair_buffer = &mut self.pair_buffer;

        // Query the tree with every moved proxy.
        for &query_proxy_id in &self.move_buffer {
            if query_proxy_id == NULL_NODE {
                continue;
            }

            let fat_aabb = tree.fat_aabb(query_proxy_id);
            tree.query(&fat_aabb, |proxy_id| {
                // A proxy cannot form a pair with itself.
                if proxy_id == query_proxy_id {
                    return true;
                }

                // Both moved: only the lower id reports the pair.
                if tree.was_moved(proxy_id) && proxy_id > query_proxy_id {
                    return true;
                }

                pair_buffer.push((proxy_id.min(query_proxy_id), proxy_id.max(query_proxy_id)));
                true
            });
        }

        // A proxy buffered twice would report its pairs twice.
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            callback(self.tree.user_data(a), self.tree.user_data(b));
        }

        for &proxy_id in &self.move_buffer {
            if proxy_id != NULL_NODE {
                self.tree.clear_moved(proxy_id);
            }
        }
        self.move_buffer.clear();
    }

    pub fn query<F: FnMut(usize) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F: FnMut(&RayCastInput, usize) -> FixedNum>(&self, input: &RayCastInput, callback: F) {
        self.tree.ray_cast(input, callback);
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> FixedNum {
        self.tree.area_ratio()
    }

    pub fn shift_origin(&mut self, new_origin: FixedVec2) {
        self.tree.shift_origin(new_origin);
    }

    #[cfg(test)]
    pub(crate) fn validate(&self) {
        self.tree.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    fn aabb(x: f32, y: f32, w: f32) -> Aabb {
        Aabb::new(FixedVec2::from_f32(x, y), FixedVec2::from_f32(x + w, y + w))
    }

    #[test]
    fn test_new_pairs_reported_once() {
        let mut bp: BroadPhase<u32> = BroadPhase::new(ratio(1, 10), int(4));
        bp.create_proxy(&aabb(0.0, 0.0, 1.0), 10);
        bp.create_proxy(&aabb(0.5, 0.0, 1.0), 20);
        bp.create_proxy(&aabb(5.0, 0.0, 1.0), 30);

        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a, b)));
        assert_eq!(pairs, vec![(10, 20)]);

        // Nothing moved, nothing reported.
        pairs.clear();
        bp.update_pairs(|a, b| pairs.push((a, b)));
        assert!(pairs.is_empty());
        bp.validate();
    }

    #[test]
    fn test_touch_and_move_report_again() {
        let mut bp: BroadPhase<u32> = BroadPhase::new(ratio(1, 10), int(4));
        let a = bp.create_proxy(&aabb(0.0, 0.0, 1.0), 1);
        let c = bp.create_proxy(&aabb(5.0, 0.0, 1.0), 3);
        bp.update_pairs(|_, _| {});

        bp.touch_proxy(a);
        bp.touch_proxy(a);
        let mut pairs = Vec::new();
        bp.update_pairs(|x, y| pairs.push((x, y)));
        assert!(pairs.is_empty());

        bp.move_proxy(c, &aabb(0.2, 0.0, 1.0), FixedVec2::from_f32(-4.8, 0.0));
        bp.update_pairs(|x, y| pairs.push((x, y)));
        assert_eq!(pairs, vec![(1, 3)]);
        assert!(bp.test_overlap(a, c));
    }

    #[test]
    fn test_destroyed_proxy_not_reported() {
        let mut bp: BroadPhase<u32> = BroadPhase::new(ratio(1, 10), int(4));
        bp.create_proxy(&aabb(0.0, 0.0, 1.0), 1);
        let b = bp.create_proxy(&aabb(0.5, 0.0, 1.0), 2);
        bp.destroy_proxy(b);
        let mut pairs = Vec::new();
        bp.update_pairs(|x, y| pairs.push((x, y)));
        assert!(pairs.is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }
}
