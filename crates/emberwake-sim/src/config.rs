//! Simulation configuration and design constants.

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Hard cap on total cooldown reduction.
pub const MAX_COOLDOWN_REDUCTION: f32 = 0.8;
/// No cooldown is ever shorter than this, whatever the reduction.
pub const MIN_COOLDOWN: f32 = 0.1;
/// Upper bound on armor/resist mitigation.
pub const MAX_MITIGATION: f32 = 0.9;
/// Armor or resist value that yields 50% mitigation.
pub const MITIGATION_CONSTANT: f32 = 100.0;

/// Wave pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveTuning {
    /// Seconds between wave starts.
    pub interval: f32,
    /// Enemies in the first wave.
    pub base_count: u32,
    /// Extra enemies per subsequent wave.
    pub growth: u32,
    /// Enemies spawn on a ring of this radius around the player.
    pub spawn_radius: f32,
    /// Probability that a spawned enemy rolls an elite modifier.
    pub elite_chance: f32,
}

impl Default for WaveTuning {
    fn default() -> Self {
        Self {
            interval: 20.0,
            base_count: 4,
            growth: 2,
            spawn_radius: 12.0,
            elite_chance: 0.1,
        }
    }
}

/// Top-level configuration for one game session.
///
/// Missing JSON fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds per frame. Must be positive and finite.
    pub fixed_dt: f32,
    /// Seed for every RNG stream in the session.
    pub seed: u64,
    /// Seconds between automatic profile saves.
    pub autosave_interval: f32,
    pub wave: WaveTuning,
}

impl Default for SimConfig {
    /// 60 Hz, seed 0, autosave every 30 s.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            seed: 0,
            autosave_interval: 30.0,
            wave: WaveTuning::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(SimError::Config(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )));
        }
        if !(self.autosave_interval > 0.0) {
            return Err(SimError::Config(format!(
                "autosave_interval must be positive, got {}",
                self.autosave_interval
            )));
        }
        if !(0.0..=1.0).contains(&self.wave.elite_chance) {
            return Err(SimError::Config(format!(
                "wave.elite_chance must be within [0, 1], got {}",
                self.wave.elite_chance
            )));
        }
        if !(self.wave.interval > 0.0) {
            return Err(SimError::Config("wave.interval must be positive".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_60hz() {
        let config = SimConfig::default();
        assert!((config.fixed_dt - 1.0 / 60.0).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = SimConfig::from_json_str(r#"{ "seed": 42, "wave": { "base_count": 9 } }"#).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.wave.base_count, 9);
        assert_eq!(config.wave.growth, WaveTuning::default().growth);
        assert_eq!(config.autosave_interval, 30.0);
    }

    #[test]
    fn rejects_bad_dt() {
        let err = SimConfig::from_json_str(r#"{ "fixed_dt": 0.0 }"#).unwrap_err();
        assert!(err.to_string().contains("fixed_dt must be positive"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            SimConfig::from_json_str("{ not json"),
            Err(SimError::Config(_))
        ));
    }
}
