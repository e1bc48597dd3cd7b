use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::Rule;
use super::rules::RuleEngine;
use super::state::{GameState, Level, Millis, StateError};
use super::stimulus::{CycleKind, StimulusScheduler};

/// Presses required on any level the table does not list.
pub const FALLBACK_THRESHOLD: u32 = 100;

const STANDARD_THRESHOLDS: [(Level, u32); 20] = [
    (1, 5),
    (2, 7),
    (3, 10),
    (4, 12),
    (5, 15),
    (6, 18),
    (7, 22),
    (8, 25),
    (9, 30),
    (10, 35),
    (11, 40),
    (12, 45),
    (13, 50),
    (14, 55),
    (15, 60),
    (16, 65),
    (17, 70),
    (18, 75),
    (19, 80),
    (20, 100),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelThresholds {
    pub table: BTreeMap<Level, u32>,
    pub fallback: u32,
}

impl LevelThresholds {
    pub fn required_for(&self, level: Level) -> u32 {
        self.table.get(&level).copied().unwrap_or(self.fallback)
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            table: STANDARD_THRESHOLDS.into_iter().collect(),
            fallback: FALLBACK_THRESHOLD,
        }
    }
}

/// What changed when a level opened.
#[derive(Debug, Clone, Serialize)]
pub struct LevelUp {
    pub level: Level,
    pub required_presses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unlocked: Vec<CycleKind>,
}

#[derive(Debug, Clone, Default)]
pub struct LevelProgression {
    thresholds: LevelThresholds,
}

impl LevelProgression {
    pub fn new(thresholds: LevelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &LevelThresholds {
        &self.thresholds
    }

    pub fn required_for(&self, level: Level) -> u32 {
        self.thresholds.required_for(level)
    }

    /// Opens level 1 of a fresh session.
    pub fn begin(
        &self,
        state: &mut GameState,
        engine: &mut RuleEngine,
        scheduler: &mut StimulusScheduler,
    ) -> Result<LevelUp, StateError> {
        self.open_level(1, state, engine, scheduler)
    }

    /// Counts an accepted press and levels up once the threshold is met.
    pub fn record_valid_press(
        &self,
        state: &mut GameState,
        timestamp: Millis,
        engine: &mut RuleEngine,
        scheduler: &mut StimulusScheduler,
    ) -> Result<Option<LevelUp>, StateError> {
        state.record_press(timestamp)?;
        if state.presses_this_level < state.presses_required_for_level {
            return Ok(None);
        }
        self.level_up(state, engine, scheduler).map(Some)
    }

    pub fn level_up(
        &self,
        state: &mut GameState,
        engine: &mut RuleEngine,
        scheduler: &mut StimulusScheduler,
    ) -> Result<LevelUp, StateError> {
        let next = state.current_level.saturating_add(1);
        let opened = self.open_level(next, state, engine, scheduler)?;
        log::info!(
            "level {} reached after {} presses",
            opened.level,
            state.total_presses
        );
        Ok(opened)
    }

    fn open_level(
        &self,
        level: Level,
        state: &mut GameState,
        engine: &mut RuleEngine,
        scheduler: &mut StimulusScheduler,
    ) -> Result<LevelUp, StateError> {
        let required_presses = self.required_for(level);
        state.reset_for_level(required_presses)?;
        state.current_level = level;

        let rule = engine.activate_rule(level).cloned();
        scheduler.set_symbol_pool(
            engine
                .active_symbols()
                .into_iter()
                .map(|entry| entry.symbol)
                .collect(),
        );
        let unlocked = scheduler.unlock_for_level(level);

        Ok(LevelUp {
            level,
            required_presses,
            rule,
            unlocked,
        })
    }
}
