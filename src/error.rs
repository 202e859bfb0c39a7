//! Error type for structural world operations and configuration loading.
//!
//! Numerical degeneracy never surfaces here; it is handled where it occurs.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// Topology was changed while the world is stepping.
    WorldLocked,
    /// Handle does not refer to a live body.
    InvalidBody,
    /// Handle does not refer to a live fixture.
    InvalidFixture,
    /// Handle does not refer to a live joint, or the joint definition is
    /// unusable (e.g. a gear joint over unsupported joint types).
    InvalidJoint,
    /// A joint was asked to connect a body to itself.
    SameBody,
    InvalidShape {
        reason: &'static str,
    },
    InvalidConfiguration {
        reason: &'static str,
    },
    /// Reading or parsing a settings file failed.
    Config(String),
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldLocked => write!(f, "world is locked during a step"),
            Self::InvalidBody => write!(f, "invalid body handle"),
            Self::InvalidFixture => write!(f, "invalid fixture handle"),
            Self::InvalidJoint => write!(f, "invalid joint"),
            Self::SameBody => write!(f, "joint connects a body to itself"),
            Self::InvalidShape { reason } => write!(f, "invalid shape: {reason}"),
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::Config(message) => write!(f, "config error: {message}"),
        }
    }
}

impl std::error::Error for PhysicsError {}
