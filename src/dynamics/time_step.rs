//! Per-step solver inputs and the island's position/velocity scratch rows.

use crate::fixed_math::{FixedNum, FixedVec2};
use crate::settings::Settings;

/// Everything the solvers need to know about the current (sub-)step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeStep {
    /// Index of the world step this belongs to. Drives periodic perf logging.
    pub step_index: u64,
    pub dt: FixedNum,
    /// `1 / dt`, zero when `dt` is zero.
    pub inv_dt: FixedNum,
    /// `dt * inv_dt0`, scales warm-start impulses after a variable time step.
    pub dt_ratio: FixedNum,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

/// Center of mass and angle of one island body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub c: FixedVec2,
    pub a: FixedNum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    pub v: FixedVec2,
    pub w: FixedNum,
}

/// Borrowed island state handed to joints.
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub settings: &'a Settings,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}
