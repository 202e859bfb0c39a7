//! Tuning constants for the solver.
//!
//! `SettingsConfig` is the editable, float-valued form read from RON (or any
//! serde format). It is converted once into `Settings`, the fixed-point values
//! the world reads while stepping. Changing settings mid-simulation breaks
//! replay determinism, so a world keeps its `Settings` for its lifetime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;
use crate::fixed_math::{FixedNum, PI};

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Default collision tolerance (0.005 m). Shapes built outside a world use it
/// for vertex welding.
pub const DEFAULT_LINEAR_SLOP: FixedNum = FixedNum::from_bits(21_474_836);

/// Default polygon skin radius, `2 * DEFAULT_LINEAR_SLOP`.
pub const DEFAULT_POLYGON_RADIUS: FixedNum = FixedNum::from_bits(42_949_672);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    /// Collision and constraint tolerance (meters).
    pub linear_slop: f64,
    /// Collision and constraint tolerance (degrees).
    pub angular_slop_degrees: f64,
    /// Fattening applied to broad-phase AABBs (meters).
    pub aabb_extension: f64,
    /// Scale applied to displacement when predicting AABB movement.
    pub aabb_multiplier: f64,
    pub max_sub_steps: usize,
    pub max_toi_contacts: usize,
    pub max_linear_correction: f64,
    pub max_angular_correction_degrees: f64,
    pub max_translation: f64,
    /// Fraction of a half turn.
    pub max_rotation_half_turns: f64,
    pub baumgarte: f64,
    pub toi_baumgarte: f64,
    /// Seconds a body must be still before it may sleep.
    pub time_to_sleep: f64,
    pub linear_sleep_tolerance: f64,
    pub angular_sleep_tolerance_degrees: f64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            linear_slop: 0.005,
            angular_slop_degrees: 2.0,
            aabb_extension: 0.1,
            aabb_multiplier: 4.0,
            max_sub_steps: 8,
            max_toi_contacts: 32,
            max_linear_correction: 0.2,
            max_angular_correction_degrees: 8.0,
            max_translation: 2.0,
            max_rotation_half_turns: 0.5,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance_degrees: 2.0,
        }
    }
}

impl SettingsConfig {
    pub fn from_ron_str(contents: &str) -> Result<Self, PhysicsError> {
        ron::from_str(contents).map_err(|e| PhysicsError::Config(e.to_string()))
    }

    /// Load settings from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PhysicsError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_ron_str(&contents)?;
        tracing::info!("Loaded solver settings from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.linear_slop <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "linear_slop must be positive",
            });
        }
        if self.max_sub_steps == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_sub_steps must be at least 1",
            });
        }
        if self.max_toi_contacts == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_toi_contacts must be at least 1",
            });
        }
        if self.aabb_extension < 0.0 || self.aabb_multiplier < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "aabb margins must not be negative",
            });
        }
        if !(0.0..=1.0).contains(&self.baumgarte) || !(0.0..=1.0).contains(&self.toi_baumgarte) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "baumgarte factors must be in [0, 1]",
            });
        }
        Ok(())
    }
}

/// Fixed-point solver settings, immutable while a world exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub linear_slop: FixedNum,
    pub angular_slop: FixedNum,
    /// Skin thickness of polygons, always `2 * linear_slop`.
    pub polygon_radius: FixedNum,
    pub aabb_extension: FixedNum,
    pub aabb_multiplier: FixedNum,
    pub max_sub_steps: usize,
    pub max_toi_contacts: usize,
    pub max_linear_correction: FixedNum,
    pub max_angular_correction: FixedNum,
    pub max_translation: FixedNum,
    pub max_translation_squared: FixedNum,
    pub max_rotation: FixedNum,
    pub max_rotation_squared: FixedNum,
    pub baumgarte: FixedNum,
    pub toi_baumgarte: FixedNum,
    pub time_to_sleep: FixedNum,
    pub linear_sleep_tolerance: FixedNum,
    pub angular_sleep_tolerance: FixedNum,
}

fn from_degrees(deg: f64) -> FixedNum {
    FixedNum::from_num(deg) * PI / FixedNum::from_num(180)
}

impl From<&SettingsConfig> for Settings {
    fn from(config: &SettingsConfig) -> Self {
        let linear_slop = FixedNum::from_num(config.linear_slop);
        let max_translation = FixedNum::from_num(config.max_translation);
        let max_rotation = FixedNum::from_num(config.max_rotation_half_turns) * PI;
        Self {
            linear_slop,
            angular_slop: from_degrees(config.angular_slop_degrees),
            polygon_radius: linear_slop * FixedNum::from_num(2),
            aabb_extension: FixedNum::from_num(config.aabb_extension),
            aabb_multiplier: FixedNum::from_num(config.aabb_multiplier),
            max_sub_steps: config.max_sub_steps,
            max_toi_contacts: config.max_toi_contacts,
            max_linear_correction: FixedNum::from_num(config.max_linear_correction),
            max_angular_correction: from_degrees(config.max_angular_correction_degrees),
            max_translation,
            max_translation_squared: max_translation * max_translation,
            max_rotation,
            max_rotation_squared: max_rotation * max_rotation,
            baumgarte: FixedNum::from_num(config.baumgarte),
            toi_baumgarte: FixedNum::from_num(config.toi_baumgarte),
            time_to_sleep: FixedNum::from_num(config.time_to_sleep),
            linear_sleep_tolerance: FixedNum::from_num(config.linear_sleep_tolerance),
            angular_sleep_tolerance: from_degrees(config.angular_sleep_tolerance_degrees),
        }
    }
}

impl TryFrom<SettingsConfig> for Settings {
    type Error = PhysicsError;

    fn try_from(config: SettingsConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        Ok(Settings::from(&config))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from(&SettingsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_reference_values() {
        let s = Settings::default();
        assert_eq!(s.polygon_radius, s.linear_slop * FixedNum::from_num(2));
        assert_eq!(s.max_sub_steps, 8);
        assert_eq!(s.max_toi_contacts, 32);
        assert!((s.max_rotation.to_num::<f64>() - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((s.angular_slop.to_num::<f64>() - 2.0_f64.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn test_default_constants_match_config() {
        let s = Settings::default();
        assert!((s.linear_slop - DEFAULT_LINEAR_SLOP).abs() <= FixedNum::from_bits(1));
        assert!((s.polygon_radius - DEFAULT_POLYGON_RADIUS).abs() <= FixedNum::from_bits(2));
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = SettingsConfig::from_ron_str("(linear_slop: 0.01, max_sub_steps: 4)").unwrap();
        assert_eq!(config.linear_slop, 0.01);
        assert_eq!(config.max_sub_steps, 4);
        assert_eq!(config.baumgarte, 0.2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SettingsConfig {
            max_sub_steps: 0,
            ..Default::default()
        };
        assert!(matches!(
            Settings::try_from(config),
            Err(PhysicsError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            SettingsConfig::from_ron_str("(linear_slop: \"oops\")"),
            Err(PhysicsError::Config(_))
        ));
    }
}
