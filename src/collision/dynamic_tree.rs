//! Dynamic AABB tree for broad-phase pruning.
//!
//! # Purpose
//!
//! Keeps a bounding volume hierarchy of "fat" AABBs, one leaf per proxy. A
//! fat AABB is the shape's tight AABB grown by `aabb_extension` and stretched
//! along the predicted displacement, so most frame-to-frame motion does not
//! touch the tree at all.
//!
//! # Architecture
//!
//! - Nodes live in a `Vec` addressed by index; freed nodes go on a free list
//!   and are reused, so proxy ids stay small and dense.
//! - Insertion picks a sibling by the surface area heuristic (perimeter in 2D).
//! - After every insert/remove the path to the root is re-balanced with AVL
//!   style rotations, keeping the height close to `log2(n)`.
//!
//! The payload `T` is a small `Copy` value stored on each leaf.

use smallvec::SmallVec;

use super::{Aabb, RayCastInput};
use crate::fixed_math::{FixedNum, FixedVec2};

/// Sentinel for "no node".
pub const NULL_NODE: usize = usize::MAX;

const HUGE_AABB_FACTOR: i32 = 4;

#[derive(Clone, Debug)]
struct TreeNode<T> {
    /// Enlarged AABB
    aabb: Aabb,
    user_data: T,
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1
    height: i32,
    moved: bool,
}

impl<T: Default> TreeNode<T> {
    fn free() -> Self {
        Self {
            aabb: Aabb::default(),
            user_data: T::default(),
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            moved: false,
        }
    }

    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

type NodeStack = SmallVec<[usize; 64]>;

#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    root: usize,
    nodes: Vec<TreeNode<T>>,
    free_list: Vec<usize>,
    node_count: usize,
    insertion_count: u64,
    aabb_extension: FixedNum,
    aabb_multiplier: FixedNum,
}

impl<T: Copy + Default> DynamicTree<T> {
    pub fn new(aabb_extension: FixedNum, aabb_multiplier: FixedNum) -> Self {
        Self {
            root: NULL_NODE,
            nodes: Vec::with_capacity(16),
            free_list: Vec::new(),
            node_count: 0,
            insertion_count: 0,
            aabb_extension,
            aabb_multiplier,
        }
    }

    fn allocate_node(&mut self) -> usize {
        self.node_count += 1;
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = TreeNode::free();
            self.nodes[id].height = 0;
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode::free());
        self.nodes[id].height = 0;
        id
    }

    fn free_node(&mut self, id: usize) {
        debug_assert!(self.node_count > 0);
        self.nodes[id] = TreeNode::free();
        self.free_list.push(id);
        self.node_count -= 1;
    }

    /// Create a proxy for `aabb` and return its id. The stored AABB is fattened.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        let id = self.allocate_node();

        let node = &mut self.nodes[id];
        node.aabb = aabb.fattened(self.aabb_extension);
        node.user_data = user_data;
        node.height = 0;
        node.moved = true;

        self.insert_leaf(id);
        id
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        debug_assert!(proxy_id < self.nodes.len());
        debug_assert!(self.nodes[proxy_id].is_leaf());
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
    }

    /// Update a proxy after its shape moved by `displacement`. Returns `true`
    /// when the proxy was re-inserted, meaning new pairs may exist.
    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: FixedVec2) -> bool {
        debug_assert!(self.nodes[proxy_id].is_leaf());

        let mut fat_aabb = aabb.fattened(self.aabb_extension);

        // Predict AABB movement.
        let d = displacement * self.aabb_multiplier;
        if d.x < FixedNum::ZERO {
            fat_aabb.lower.x += d.x;
        } else {
            fat_aabb.upper.x += d.x;
        }
        if d.y < FixedNum::ZERO {
            fat_aabb.lower.y += d.y;
        } else {
            fat_aabb.upper.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id].aabb;
        if tree_aabb.contains(aabb) {
            // Still contained, but the tree AABB may be much too large, for
            // example after a fast body fell asleep.
            let huge_aabb = fat_aabb.fattened(self.aabb_extension * FixedNum::from_num(HUGE_AABB_FACTOR));
            if huge_aabb.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id].aabb = fat_aabb;
        self.insert_leaf(proxy_id);
        self.nodes[proxy_id].moved = true;
        true
    }

    pub fn user_data(&self, proxy_id: usize) -> T {
        self.nodes[proxy_id].user_data
    }

    pub fn was_moved(&self, proxy_id: usize) -> bool {
        self.nodes[proxy_id].moved
    }

    pub fn clear_moved(&mut self, proxy_id: usize) {
        self.nodes[proxy_id].moved = false;
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.nodes[proxy_id].aabb
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`. The callback returns
    /// `false` to stop the query.
    pub fn query<F: FnMut(usize) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let mut stack = NodeStack::new();
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[node_id];
            if node.aabb.overlaps(aabb) {
                if node.is_leaf() {
                    if !callback(node_id) {
                        return;
                    }
                } else {
                    stack.push(node.child1);
                    stack.push(node.child2);
                }
            }
        }
    }

    /// Cast a ray against the proxies. The callback receives the current
    /// (possibly clipped) input and the proxy id and returns the new max
    /// fraction: 0 terminates, a negative value ignores the proxy, a
    /// positive value clips the ray.
    pub fn ray_cast<F: FnMut(&RayCastInput, usize) -> FixedNum>(&self, input: &RayCastInput, mut callback: F) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        if r == FixedVec2::ZERO {
            return;
        }

        // v is perpendicular to the segment.
        let v = FixedVec2::scalar_cross(FixedNum::ONE, r);
        let abs_v = v.abs();

        // Separating axis for segment (Gino, p80).
        // |dot(v, p1 - c)| > dot(|v|, h)

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |max_fraction: FixedNum| {
            let t = p1 + (p2 - p1) * max_fraction;
            Aabb::new(p1.min(t), p1.max(t))
        };
        let mut segment = segment_aabb(max_fraction);

        let mut stack = NodeStack::new();
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(&segment) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > FixedNum::ZERO {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput { p1, p2, max_fraction };
                let value = callback(&sub_input, node_id);

                if value == FixedNum::ZERO {
                    // The client has terminated the ray cast.
                    return;
                }

                if value > FixedNum::ZERO {
                    max_fraction = value;
                    segment = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        self.insertion_count += 1;

        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling for this node.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            let area = self.nodes[index].aabb.perimeter();
            let combined_area = Aabb::combine(&self.nodes[index].aabb, &leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf.
            let cost = combined_area + combined_area;

            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = (combined_area - area) * FixedNum::from_num(2);

            let descend_cost = |child: usize| {
                let node = &self.nodes[child];
                let new_area = Aabb::combine(&leaf_aabb, &node.aabb).perimeter();
                if node.is_leaf() {
                    new_area + inheritance_cost
                } else {
                    (new_area - node.aabb.perimeter()) + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Create a new parent.
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_aabb = self.nodes[sibling].aabb;
            let sibling_height = self.nodes[sibling].height;
            let node = &mut self.nodes[new_parent];
            node.parent = old_parent;
            node.aabb = Aabb::combine(&leaf_aabb, &sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            // The sibling was not the root.
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            // The sibling was the root.
            self.root = new_parent;
        }

        // Walk back up the tree fixing heights and AABBs.
        self.refit_from(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy the parent and connect the sibling to the grandparent.
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);

            self.refit_from(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    /// Re-balance and refit every node from `index` up to the root.
    fn refit_from(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            let aabb = Aabb::combine(&self.nodes[child1].aabb, &self.nodes[child2].aabb);
            self.nodes[index].height = height;
            self.nodes[index].aabb = aabb;

            index = self.nodes[index].parent;
        }
    }

    /// Perform a left or right rotation if node `i_a` is imbalanced.
    /// Returns the new root of the subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        debug_assert!(i_a != NULL_NODE);

        if self.nodes[i_a].is_leaf() || self.nodes[i_a].height < 2 {
            return i_a;
        }

        let i_b = self.nodes[i_a].child1;
        let i_c = self.nodes[i_a].child2;

        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            // Rotate C up
            self.rotate_up(i_a, i_c, i_b, false)
        } else if balance < -1 {
            // Rotate B up
            self.rotate_up(i_a, i_b, i_c, true)
        } else {
            i_a
        }
    }

    /// Lift child `i_up` of `i_a` into `i_a`'s place. `i_other` is `i_a`'s
    /// other child. `up_is_child1` tells which slot of `i_a` `i_up` came from.
    fn rotate_up(&mut self, i_a: usize, i_up: usize, i_other: usize, up_is_child1: bool) -> usize {
        let i_f = self.nodes[i_up].child1;
        let i_g = self.nodes[i_up].child2;

        // Swap A and the lifted node.
        self.nodes[i_up].child1 = i_a;
        self.nodes[i_up].parent = self.nodes[i_a].parent;
        self.nodes[i_a].parent = i_up;

        // A's old parent should point to the lifted node.
        let up_parent = self.nodes[i_up].parent;
        if up_parent != NULL_NODE {
            if self.nodes[up_parent].child1 == i_a {
                self.nodes[up_parent].child1 = i_up;
            } else {
                debug_assert!(self.nodes[up_parent].child2 == i_a);
                self.nodes[up_parent].child2 = i_up;
            }
        } else {
            self.root = i_up;
        }

        // The taller grandchild stays with the lifted node.
        let (keep, give) = if self.nodes[i_f].height > self.nodes[i_g].height {
            (i_f, i_g)
        } else {
            (i_g, i_f)
        };

        self.nodes[i_up].child2 = keep;
        if up_is_child1 {
            self.nodes[i_a].child1 = give;
        } else {
            self.nodes[i_a].child2 = give;
        }
        self.nodes[give].parent = i_a;

        self.nodes[i_a].aabb = Aabb::combine(&self.nodes[i_other].aabb, &self.nodes[give].aabb);
        self.nodes[i_up].aabb = Aabb::combine(&self.nodes[i_a].aabb, &self.nodes[keep].aabb);

        self.nodes[i_a].height = 1 + self.nodes[i_other].height.max(self.nodes[give].height);
        self.nodes[i_up].height = 1 + self.nodes[i_a].height.max(self.nodes[keep].height);

        i_up
    }

    /// Height of the tree, zero when empty.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            return 0;
        }
        self.nodes[self.root].height
    }

    /// Maximum height difference between the two children of any node.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|node| node.height > 1)
            .map(|node| (self.nodes[node.child2].height - self.nodes[node.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters over the root perimeter.
    pub fn area_ratio(&self) -> FixedNum {
        if self.root == NULL_NODE {
            return FixedNum::ZERO;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: FixedNum = self
            .nodes
            .iter()
            .filter(|node| node.height >= 0)
            .map(|node| node.aabb.perimeter())
            .sum();
        total_area.checked_div(root_area).unwrap_or(FixedNum::ZERO)
    }

    pub fn proxy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.height == 0).count()
    }

    /// Translate every node by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: FixedVec2) {
        for node in &mut self.nodes {
            node.aabb = node.aabb.shifted(new_origin);
        }
    }

    /// Check structure, metrics, and the free list. Panics on corruption;
    /// meant for tests and debug builds.
    pub fn validate(&self) {
        self.validate_structure(self.root);
        self.validate_metrics(self.root);

        for &id in &self.free_list {
            assert!(id < self.nodes.len());
            assert_eq!(self.nodes[id].height, -1);
        }
        assert_eq!(self.height(), self.compute_height(self.root));
        assert_eq!(self.node_count + self.free_list.len(), self.nodes.len());
    }

    fn compute_height(&self, id: usize) -> i32 {
        if id == NULL_NODE {
            return 0;
        }
        let node = &self.nodes[id];
        if node.is_leaf() {
            return 0;
        }
        1 + self.compute_height(node.child1).max(self.compute_height(node.child2))
    }

    fn validate_structure(&self, index: usize) {
        if index == NULL_NODE {
            return;
        }
        if index == self.root {
            assert_eq!(self.nodes[index].parent, NULL_NODE);
        }

        let node = &self.nodes[index];
        if node.is_leaf() {
            assert_eq!(node.child2, NULL_NODE);
            assert_eq!(node.height, 0);
            return;
        }

        assert_eq!(self.nodes[node.child1].parent, index);
        assert_eq!(self.nodes[node.child2].parent, index);
        self.validate_structure(node.child1);
        self.validate_structure(node.child2);
    }

    fn validate_metrics(&self, index: usize) {
        if index == NULL_NODE {
            return;
        }
        let node = &self.nodes[index];
        if node.is_leaf() {
            return;
        }

        let c1 = &self.nodes[node.child1];
        let c2 = &self.nodes[node.child2];
        assert_eq!(node.height, 1 + c1.height.max(c2.height));
        assert_eq!(node.aabb, Aabb::combine(&c1.aabb, &c2.aabb));

        self.validate_metrics(node.child1);
        self.validate_metrics(node.child2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_math::{int, ratio};

    fn tree() -> DynamicTree<u32> {
        DynamicTree::new(ratio(1, 10), int(4))
    }

    fn unit_at(x: i32, y: i32) -> Aabb {
        Aabb::new(FixedVec2::from_int(x, y), FixedVec2::from_int(x + 1, y + 1))
    }

    #[test]
    fn test_insert_query_and_balance() {
        let mut t = tree();
        let mut ids = Vec::new();
        for i in 0..64 {
            ids.push(t.create_proxy(&unit_at(i * 3, 0), i as u32));
        }
        t.validate();
        assert_eq!(t.proxy_count(), 64);
        assert!(t.height() <= 12, "height {}", t.height());

        let mut hits = Vec::new();
        t.query(&unit_at(30, 0), |id| {
            hits.push(t.user_data(id));
            true
        });
        assert_eq!(hits, vec![10]);

        for id in ids.iter().step_by(2) {
            t.destroy_proxy(*id);
        }
        t.validate();
        assert_eq!(t.proxy_count(), 32);
    }

    #[test]
    fn test_move_proxy_only_reinserts_when_needed() {
        let mut t = tree();
        let id = t.create_proxy(&unit_at(0, 0), 7);
        let small = Aabb::new(FixedVec2::from_f32(0.05, 0.0), FixedVec2::from_f32(1.05, 1.0));
        assert!(!t.move_proxy(id, &small, FixedVec2::from_f32(0.05, 0.0)));
        assert!(t.move_proxy(id, &unit_at(5, 0), FixedVec2::from_int(5, 0)));
        // Displacement prediction stretches the fat AABB forward.
        assert!(t.fat_aabb(id).upper.x > int(26));
        t.validate();
    }

    #[test]
    fn test_ray_cast_visits_hit_proxies() {
        let mut t = tree();
        t.create_proxy(&unit_at(5, 0), 1);
        t.create_proxy(&unit_at(10, 5), 2);
        let input = RayCastInput {
            p1: FixedVec2::from_f32(0.0, 0.5),
            p2: FixedVec2::from_f32(20.0, 0.5),
            max_fraction: FixedNum::ONE,
        };
        let mut seen = Vec::new();
        t.ray_cast(&input, |sub, id| {
            seen.push(t.user_data(id));
            sub.max_fraction
        });
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_shift_origin() {
        let mut t = tree();
        let id = t.create_proxy(&unit_at(10, 10), 0);
        t.shift_origin(FixedVec2::from_int(10, 10));
        let fat = t.fat_aabb(id);
        assert!(fat.contains(&unit_at(0, 0)));
    }
}
