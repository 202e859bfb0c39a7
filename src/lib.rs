//! Deterministic 2D rigid-body physics on fixed-point arithmetic.
//!
//! Every quantity the solver touches is a `FixedNum` (Q32.32), so the same
//! sequence of world operations produces bit-identical results on every
//! machine. Floats only appear at the configuration boundary.

pub mod collision;
pub mod dynamics;
pub mod error;
pub mod fixed_math;
pub mod profiling;
pub mod settings;

pub mod prelude {
    pub use crate::collision::{Aabb, ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape};
    pub use crate::dynamics::{
        BodyDef, BodyHandle, BodyType, ContactListener, Filter, FixtureDef, FixtureHandle, JointDef, JointHandle,
        World,
    };
    pub use crate::error::PhysicsError;
    pub use crate::fixed_math::{int, ratio, FixedNum, FixedVec2, Rot, Transform};
    pub use crate::settings::{Settings, SettingsConfig};
}

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a message every 100th step when the `perf_stats` feature is enabled.
///
/// Without `perf_stats` this expands to nothing and the arguments are not
/// evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(step, "{} contacts", world.contact_count());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($step:expr, $($arg:tt)*) => {
        if $step.step_index % 100 == 0 {
            ::tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($step:expr, $($arg:tt)*) => {};
}
