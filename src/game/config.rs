use serde::{Deserialize, Serialize};

use super::progression::LevelThresholds;
use super::state::{Millis, StateError};
use super::stimulus::{CycleKind, CyclePeriods, CycleUnlocks};
use super::warnings::WarningPolicy;

/// Session tuning. Every field has a default, so partial JSON is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub thresholds: LevelThresholds,
    /// Poll interval of the browser ticker driving [`crate::game::Session::catch_up`].
    pub tick_interval_ms: Millis,
    pub periods: CyclePeriods,
    pub unlocks: CycleUnlocks,
    /// A combo notification fires every this many consecutive valid presses.
    pub combo_step: u32,
    pub warnings: WarningPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            thresholds: LevelThresholds::default(),
            tick_interval_ms: 100,
            periods: CyclePeriods::default(),
            unlocks: CycleUnlocks::default(),
            combo_step: 5,
            warnings: WarningPolicy::default(),
            rng_seed: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let config: GameConfig = serde_json::from_str(json)
            .map_err(|error| StateError::invalid("config", error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), StateError> {
        if self.thresholds.fallback == 0 {
            return Err(StateError::invalid(
                "thresholds.fallback",
                "must require at least one press",
            ));
        }
        let empty_level = self
            .thresholds
            .table
            .iter()
            .find_map(|(level, required)| (*required == 0).then_some(*level));
        if let Some(level) = empty_level {
            return Err(StateError::invalid(
                "thresholds.table",
                format!("level {level} must require at least one press"),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(StateError::invalid("tick_interval_ms", "must be positive"));
        }
        if let Some(kind) = CycleKind::ALL
            .into_iter()
            .find(|kind| self.periods.period(*kind) == 0)
        {
            return Err(StateError::invalid(
                "periods",
                format!("{kind:?} cycle period must be positive"),
            ));
        }
        if self.warnings.danger_pct > 100 || self.warnings.caution_pct > 100 {
            return Err(StateError::invalid("warnings", "percentages must be within 0..=100"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_game() {
        let config = GameConfig::default();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.periods.color_ms, 2_500);
        assert_eq!(config.periods.symbol_ms, 3_500);
        assert_eq!(config.periods.pulse_ms, 3_000);
        assert_eq!(config.unlocks.color, 3);
        assert_eq!(config.unlocks.pulse, 10);
        assert_eq!(config.thresholds.required_for(1), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = GameConfig::from_json(
            r#"{"combo_step": 3, "periods": {"color_ms": 1000}, "rng_seed": 11}"#,
        )
        .expect("valid config");
        assert_eq!(config.combo_step, 3);
        assert_eq!(config.periods.color_ms, 1_000);
        assert_eq!(config.periods.pulse_ms, 3_000);
        assert_eq!(config.rng_seed, Some(11));
        assert_eq!(config.thresholds, LevelThresholds::default());
    }

    #[test]
    fn threshold_table_accepts_string_keys() {
        let json = r#"{"thresholds": {"table": {"1": 2}, "fallback": 4}}"#;
        let config = GameConfig::from_json(json).expect("valid config");
        assert_eq!(config.thresholds.required_for(1), 2);
        assert_eq!(config.thresholds.required_for(2), 4);
    }

    #[test]
    fn zero_values_are_rejected() {
        let zero_period = GameConfig::from_json(r#"{"periods": {"pulse_ms": 0}}"#);
        assert!(matches!(zero_period, Err(StateError::InvalidArgument { .. })));

        let zero_threshold = GameConfig::from_json(r#"{"thresholds": {"table": {"3": 0}}}"#);
        assert!(zero_threshold.is_err());

        let zero_tick = GameConfig::from_json(r#"{"tick_interval_ms": 0}"#);
        assert!(zero_tick.is_err());
    }

    #[test]
    fn malformed_json_is_invalid_argument() {
        let err = GameConfig::from_json("{not json").expect_err("must fail");
        match err {
            StateError::InvalidArgument { argument, .. } => assert_eq!(argument, "config"),
        }
    }

    #[test]
    fn with_seed_sets_seed() {
        assert_eq!(GameConfig::default().with_seed(5).rng_seed, Some(5));
    }
}
