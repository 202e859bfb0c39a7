//! Performance profiling utilities
//!
//! Counters here are diagnostics only; nothing in the solver reads them back.
//! The world accumulates the GJK/TOI counters only when the `perf_stats`
//! feature is enabled.

use std::time::Duration;

// Re-export the profile macro
pub use detbox_macros::profile;

/// GJK call statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GjkProfile {
    pub calls: u64,
    pub iterations: u64,
    pub max_iterations: usize,
}

impl GjkProfile {
    pub fn record(&mut self, iterations: usize) {
        self.calls += 1;
        self.iterations += iterations as u64;
        self.max_iterations = self.max_iterations.max(iterations);
    }

    pub fn merge(&mut self, other: &GjkProfile) {
        self.calls += other.calls;
        self.iterations += other.iterations;
        self.max_iterations = self.max_iterations.max(other.max_iterations);
    }
}

/// Time of impact statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToiProfile {
    pub calls: u64,
    pub iterations: u64,
    pub max_iterations: usize,
    pub root_iterations: u64,
    pub max_root_iterations: usize,
    pub gjk: GjkProfile,
}

impl ToiProfile {
    pub fn record(&mut self, iterations: usize, root_iterations: usize, max_root_iterations: usize) {
        self.calls += 1;
        self.iterations += iterations as u64;
        self.max_iterations = self.max_iterations.max(iterations);
        self.root_iterations += root_iterations as u64;
        self.max_root_iterations = self.max_root_iterations.max(max_root_iterations);
    }
}

/// Wall-clock timings of the last `World::step`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub step: Duration,
    pub collide: Duration,
    pub solve: Duration,
    pub solve_init: Duration,
    pub solve_velocity: Duration,
    pub solve_position: Duration,
    pub broadphase: Duration,
    pub solve_toi: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gjk_profile_accumulates() {
        let mut a = GjkProfile::default();
        a.record(3);
        a.record(5);
        let mut b = GjkProfile::default();
        b.record(7);
        a.merge(&b);
        assert_eq!(a.calls, 3);
        assert_eq!(a.iterations, 15);
        assert_eq!(a.max_iterations, 7);
    }
}
