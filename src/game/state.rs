use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds on the session clock. The origin is session start.
pub type Millis = u64;
/// Level number, starting at 1.
pub type Level = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GameStatus {
    #[default]
    Idle,
    Playing,
    Over,
}

/// Glow color of the buzzer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuzzerColor {
    #[default]
    Neutral,
    Green,
    Red,
    Yellow,
}

/// Symbols that can be shown on the buzzer face.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Duck,
    Rocket,
    Star,
    Fire,
    Cat,
    Lightning,
    Diamond,
    Skull,
    Bomb,
    Crown,
    Alien,
    Moon,
    Ghost,
}

impl Symbol {
    pub const ALL: [Symbol; 13] = [
        Symbol::Duck,
        Symbol::Rocket,
        Symbol::Star,
        Symbol::Fire,
        Symbol::Cat,
        Symbol::Lightning,
        Symbol::Diamond,
        Symbol::Skull,
        Symbol::Bomb,
        Symbol::Crown,
        Symbol::Alien,
        Symbol::Moon,
        Symbol::Ghost,
    ];

    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Duck => "🦆",
            Symbol::Rocket => "🚀",
            Symbol::Star => "⭐",
            Symbol::Fire => "🔥",
            Symbol::Cat => "🐱",
            Symbol::Lightning => "⚡",
            Symbol::Diamond => "💎",
            Symbol::Skull => "💀",
            Symbol::Bomb => "💣",
            Symbol::Crown => "👑",
            Symbol::Alien => "👽",
            Symbol::Moon => "🌙",
            Symbol::Ghost => "👻",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationDirection {
    Clockwise,
    CounterClockwise,
}

/// Visual attributes of the buzzer that rules can condition on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Stimulus {
    #[serde(default)]
    pub color: BuzzerColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_set_at: Option<Millis>,
    #[serde(default)]
    pub pulsing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationDirection>,
}

impl Stimulus {
    /// Applies a partial update. Writing a symbol (even the same one) restarts
    /// its reaction clock at `now`; clearing it clears the stamp.
    pub fn apply(&mut self, patch: StimulusPatch, now: Millis) {
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
            self.symbol_set_at = symbol.map(|_| now);
        }
        if let Some(pulsing) = patch.pulsing {
            self.pulsing = pulsing;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
    }

    /// Milliseconds the current symbol has been showing, if one is showing.
    pub fn symbol_age(&self, now: Millis) -> Option<Millis> {
        self.symbol
            .and(self.symbol_set_at)
            .map(|set_at| now.saturating_sub(set_at))
    }
}

/// Partial stimulus update. `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StimulusPatch {
    #[serde(default)]
    pub color: Option<BuzzerColor>,
    #[serde(default)]
    pub symbol: Option<Option<Symbol>>,
    #[serde(default)]
    pub pulsing: Option<bool>,
    #[serde(default)]
    pub rotation: Option<Option<RotationDirection>>,
}

impl StimulusPatch {
    pub fn color(color: BuzzerColor) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn symbol(symbol: Option<Symbol>) -> Self {
        Self {
            symbol: Some(symbol),
            ..Self::default()
        }
    }

    pub fn pulsing(pulsing: bool) -> Self {
        Self {
            pulsing: Some(pulsing),
            ..Self::default()
        }
    }

    pub fn rotation(rotation: Option<RotationDirection>) -> Self {
        Self {
            rotation: Some(rotation),
            ..Self::default()
        }
    }
}

/// Caller-visible contract violations on state mutators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum StateError {
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl StateError {
    pub fn invalid(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        StateError::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }
}

/// Everything a rule predicate may examine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub status: GameStatus,
    pub current_level: Level,
    pub total_presses: u32,
    pub presses_this_level: u32,
    pub presses_required_for_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_press_time: Option<Millis>,
    pub elapsed: Millis,
    /// Latest instant observed on the session clock. While a press is being
    /// judged this is the instant of that press.
    pub now: Millis,
    #[serde(default)]
    pub stimulus: Stimulus,
    pub combo_count: u32,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.status == GameStatus::Playing
    }

    /// Immutable copy handed to rule predicates.
    pub fn snapshot(&self) -> GameState {
        self.clone()
    }

    /// Whole seconds shown on the session timer.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed / 1000
    }

    /// Milliseconds between the previous accepted press and `now`.
    pub fn since_last_press(&self) -> Option<Millis> {
        self.last_press_time
            .map(|last| self.now.saturating_sub(last))
    }

    /// Marks the instant of the press about to be judged. The press may not
    /// precede anything already observed on the session clock.
    pub fn begin_press(&mut self, timestamp: Millis) -> Result<(), StateError> {
        self.ensure_press_order(timestamp)?;
        self.now = timestamp;
        Ok(())
    }

    /// Counts an accepted press.
    pub fn record_press(&mut self, timestamp: Millis) -> Result<(), StateError> {
        self.ensure_press_order(timestamp)?;
        self.now = timestamp;
        self.last_press_time = Some(timestamp);
        self.total_presses = self.total_presses.saturating_add(1);
        self.presses_this_level = self.presses_this_level.saturating_add(1);
        self.combo_count = self.combo_count.saturating_add(1);
        Ok(())
    }

    pub fn advance_elapsed(&mut self, delta_ms: i64) -> Result<(), StateError> {
        if delta_ms < 0 {
            return Err(StateError::invalid(
                "delta_ms",
                format!("duration must not be negative, got {delta_ms}"),
            ));
        }
        self.elapsed = self.elapsed.saturating_add(delta_ms as Millis);
        self.now = self.now.max(self.elapsed);
        Ok(())
    }

    pub fn set_stimulus(&mut self, patch: StimulusPatch) {
        self.stimulus.apply(patch, self.now);
    }

    pub fn reset_for_level(&mut self, required: u32) -> Result<(), StateError> {
        if required == 0 {
            return Err(StateError::invalid(
                "required",
                "a level needs at least one press",
            ));
        }
        self.presses_this_level = 0;
        self.presses_required_for_level = required;
        Ok(())
    }

    pub fn break_combo(&mut self) {
        self.combo_count = 0;
    }

    pub fn reset_session(&mut self) {
        *self = Self::default();
    }

    fn ensure_press_order(&self, timestamp: Millis) -> Result<(), StateError> {
        if let Some(last) = self.last_press_time.filter(|last| timestamp < *last) {
            return Err(StateError::invalid(
                "timestamp",
                format!("press at {timestamp} ms precedes the previous press at {last} ms"),
            ));
        }
        let now = self.now;
        if timestamp < now {
            return Err(StateError::invalid(
                "timestamp",
                format!("press at {timestamp} ms precedes the session clock at {now} ms"),
            ));
        }
        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            status: GameStatus::Idle,
            current_level: 1,
            total_presses: 0,
            presses_this_level: 0,
            presses_required_for_level: 0,
            last_press_time: None,
            elapsed: 0,
            now: 0,
            stimulus: Stimulus::default(),
            combo_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_duration_is_rejected_without_mutation() {
        let mut state = GameState::new();
        state.advance_elapsed(250).expect("positive delta");
        let before = state.clone();

        let err = state
            .advance_elapsed(-1)
            .expect_err("negative delta must fail");

        assert!(matches!(err, StateError::InvalidArgument { .. }));
        assert_eq!(state, before, "rejected call must not touch state");
    }

    #[test]
    fn elapsed_pulls_now_forward() {
        let mut state = GameState::new();
        state.advance_elapsed(1_200).expect("delta");
        assert_eq!(state.elapsed, 1_200);
        assert_eq!(state.now, 1_200);
        assert_eq!(state.elapsed_seconds(), 1);
    }

    #[test]
    fn press_before_previous_press_is_rejected() {
        let mut state = GameState::new();
        state.record_press(2_000).expect("first press");

        assert!(state.begin_press(1_500).is_err());
        assert!(state.record_press(1_999).is_err());
        assert_eq!(state.total_presses, 1);
        assert_eq!(state.last_press_time, Some(2_000));
    }

    #[test]
    fn press_behind_session_clock_is_rejected() {
        let mut state = GameState::new();
        state.advance_elapsed(5_000).expect("delta");
        state.set_stimulus(StimulusPatch::symbol(Some(Symbol::Lightning)));
        let before = state.clone();

        assert!(matches!(
            state.begin_press(4_000),
            Err(StateError::InvalidArgument { .. })
        ));
        assert!(state.record_press(4_999).is_err());
        assert_eq!(state, before, "now never moves backwards");
        assert_eq!(state.stimulus.symbol_age(state.now), Some(0));

        state.begin_press(5_000).expect("press at the clock edge");
        assert_eq!(state.now, 5_000);
    }

    #[test]
    fn record_press_bumps_all_counters() {
        let mut state = GameState::new();
        state.reset_for_level(5).expect("threshold");
        state.record_press(100).expect("press");
        state.record_press(1_300).expect("press");

        assert_eq!(state.total_presses, 2);
        assert_eq!(state.presses_this_level, 2);
        assert_eq!(state.combo_count, 2);
        assert_eq!(state.since_last_press(), Some(0));

        state.break_combo();
        assert_eq!(state.combo_count, 0);
        assert_eq!(state.total_presses, 2, "score survives a broken combo");
    }

    #[test]
    fn symbol_change_stamps_reaction_clock() {
        let mut state = GameState::new();
        state.advance_elapsed(700).expect("delta");
        state.set_stimulus(StimulusPatch::symbol(Some(Symbol::Lightning)));

        assert_eq!(state.stimulus.symbol_set_at, Some(700));
        assert_eq!(state.stimulus.symbol_age(1_000), Some(300));

        state.set_stimulus(StimulusPatch::color(BuzzerColor::Red));
        assert_eq!(state.stimulus.symbol, Some(Symbol::Lightning));
        assert_eq!(state.stimulus.color, BuzzerColor::Red);

        state.set_stimulus(StimulusPatch::symbol(None));
        assert_eq!(state.stimulus.symbol_set_at, None);
        assert_eq!(state.stimulus.symbol_age(1_000), None);
    }

    #[test]
    fn zero_threshold_is_invalid() {
        let mut state = GameState::new();
        assert!(state.reset_for_level(0).is_err());
        assert_eq!(state.presses_required_for_level, 0);
    }

    #[test]
    fn reset_session_restores_idle_defaults() {
        let mut state = GameState::new();
        state.status = GameStatus::Over;
        state.current_level = 7;
        state.reset_for_level(22).expect("threshold");
        state.record_press(9_000).expect("press");
        state.advance_elapsed(12_000).expect("delta");
        state.set_stimulus(StimulusPatch {
            color: Some(BuzzerColor::Yellow),
            symbol: Some(Some(Symbol::Moon)),
            pulsing: Some(true),
            rotation: Some(Some(RotationDirection::Clockwise)),
        });

        state.reset_session();

        assert_eq!(state, GameState::default());
        assert_eq!(state.status, GameStatus::Idle);
    }

    #[test]
    fn state_json_uses_lowercase_stimulus_tokens() {
        let mut state = GameState::new();
        state.set_stimulus(StimulusPatch::symbol(Some(Symbol::Duck)));
        let json = serde_json::to_string(&state).expect("serialize");
        assert!(json.contains("\"symbol\":\"duck\""));
        assert!(json.contains("\"color\":\"neutral\""));
    }
}
