//! The standard rule table: one rule per level, each a pure predicate over a
//! [`GameState`] snapshot.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{BuzzerColor, GameState, Level, Millis, Symbol};

/// Rule identifier. Exactly one rule is introduced per level, so it equals the level.
pub type RuleId = u32;

/// Pure rule check. `Ok(false)` is a violation; `Err` is a fault and is also
/// treated as a violation by the engine.
pub type Predicate = fn(&GameState) -> Result<bool, RuleFault>;

pub const MIN_GAP_MS: Millis = 1_000;
pub const RELAXED_GAP_MS: Millis = 2_000;
pub const LIGHTNING_WINDOW_MS: Millis = 600;
pub const BOMB_WINDOW_MS: Millis = 500;
pub const CROWN_HOLD_MS: Millis = 3_000;
pub const MOON_CADENCE_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    Timing,
    TimingPattern,
    Visual,
    VisualPattern,
    VisualAvoidance,
    VisualTiming,
    Reaction,
    Chaos,
}

/// Multi-press pattern a rule asks for when its symbol appears.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PressPattern {
    Single,
    Double,
    Triple,
}

/// Timing window attached to a rule, read by the warning heuristics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TimingConstraint {
    MinGap { ms: Millis },
    ReactionWindow { symbol: Symbol, ms: Millis },
    HoldAfterSymbol { symbol: Symbol, ms: Millis },
}

/// A predicate could not reach a verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleFault {
    #[error("required field `{field}` is not set")]
    Unset { field: String },
    #[error("rule check failed: {reason}")]
    Failed { reason: String },
    #[error("rule check panicked: {message}")]
    Panicked { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: RuleId,
    pub level: Level,
    pub description: String,
    pub icon: String,
    pub category: RuleCategory,
    pub violation_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press_pattern: Option<PressPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingConstraint>,
    #[serde(skip)]
    predicate: Predicate,
}

impl Rule {
    pub fn new(
        level: Level,
        description: impl Into<String>,
        icon: impl Into<String>,
        category: RuleCategory,
        violation_message: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            id: level,
            level,
            description: description.into(),
            icon: icon.into(),
            category,
            violation_message: violation_message.into(),
            symbol: None,
            press_pattern: None,
            timing: None,
            predicate,
        }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_press_pattern(mut self, pattern: PressPattern) -> Self {
        self.press_pattern = Some(pattern);
        self
    }

    pub fn with_timing(mut self, timing: TimingConstraint) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn evaluate(&self, state: &GameState) -> Result<bool, RuleFault> {
        (self.predicate)(state)
    }
}

/// Immutable rule table ordered by level.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

static STANDARD_CATALOG: Lazy<Arc<RuleCatalog>> =
    Lazy::new(|| Arc::new(RuleCatalog::new(standard_rules())));

impl RuleCatalog {
    /// Builds a catalog ordered by level. When two rules share a level the
    /// first one wins.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| rule.level);
        rules.dedup_by_key(|rule| rule.level);
        Self { rules }
    }

    /// The twenty-level table shipped with the game.
    pub fn standard() -> Arc<RuleCatalog> {
        Arc::clone(&STANDARD_CATALOG)
    }

    pub fn by_level(&self, level: Level) -> Option<&Rule> {
        self.rules
            .binary_search_by_key(&level, |rule| rule.level)
            .ok()
            .map(|index| &self.rules[index])
    }

    pub fn by_id(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn max_level(&self) -> Level {
        self.rules.last().map(|rule| rule.level).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every symbol any rule in the table can show.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.rules.iter().filter_map(|rule| rule.symbol).collect()
    }
}

fn min_gap_respected(state: &GameState, gap: Millis) -> bool {
    state.since_last_press().map_or(true, |since| since >= gap)
}

fn symbol_absent(state: &GameState, symbol: Symbol) -> bool {
    state.stimulus.symbol != Some(symbol)
}

fn reacted_within(state: &GameState, symbol: Symbol, window: Millis) -> bool {
    state.stimulus.symbol == Some(symbol)
        && state
            .stimulus
            .symbol_age(state.now)
            .map_or(false, |age| age <= window)
}

fn wait_between_presses(state: &GameState) -> Result<bool, RuleFault> {
    Ok(min_gap_respected(state, MIN_GAP_MS))
}

// Multi-press patterns are announced to the player but not enforced.
fn duck_double_press(_state: &GameState) -> Result<bool, RuleFault> {
    Ok(true)
}

fn only_green(state: &GameState) -> Result<bool, RuleFault> {
    Ok(state.stimulus.color == BuzzerColor::Green)
}

fn odd_seconds(state: &GameState) -> Result<bool, RuleFault> {
    Ok(state.elapsed_seconds() % 2 == 1)
}

fn avoid_rocket(state: &GameState) -> Result<bool, RuleFault> {
    Ok(symbol_absent(state, Symbol::Rocket))
}

fn slow_down(state: &GameState) -> Result<bool, RuleFault> {
    Ok(min_gap_respected(state, RELAXED_GAP_MS))
}

fn star_triple_press(_state: &GameState) -> Result<bool, RuleFault> {
    Ok(true)
}

fn even_seconds(state: &GameState) -> Result<bool, RuleFault> {
    Ok(state.elapsed_seconds() % 2 == 0)
}

fn avoid_fire(state: &GameState) -> Result<bool, RuleFault> {
    Ok(symbol_absent(state, Symbol::Fire))
}

fn only_pulsing(state: &GameState) -> Result<bool, RuleFault> {
    Ok(state.stimulus.pulsing)
}

fn avoid_cat(state: &GameState) -> Result<bool, RuleFault> {
    Ok(symbol_absent(state, Symbol::Cat))
}

fn lightning_reaction(state: &GameState) -> Result<bool, RuleFault> {
    Ok(reacted_within(state, Symbol::Lightning, LIGHTNING_WINDOW_MS))
}

fn diamond_single_press(_state: &GameState) -> Result<bool, RuleFault> {
    Ok(true)
}

fn avoid_skull(state: &GameState) -> Result<bool, RuleFault> {
    Ok(symbol_absent(state, Symbol::Skull))
}

fn red_or_yellow(state: &GameState) -> Result<bool, RuleFault> {
    Ok(matches!(
        state.stimulus.color,
        BuzzerColor::Red | BuzzerColor::Yellow
    ))
}

fn bomb_reaction(state: &GameState) -> Result<bool, RuleFault> {
    Ok(reacted_within(state, Symbol::Bomb, BOMB_WINDOW_MS))
}

fn crown_patience(state: &GameState) -> Result<bool, RuleFault> {
    if state.stimulus.symbol != Some(Symbol::Crown) {
        return Ok(true);
    }
    Ok(state
        .stimulus
        .symbol_age(state.now)
        .map_or(true, |age| age >= CROWN_HOLD_MS))
}

fn alien_single_press(_state: &GameState) -> Result<bool, RuleFault> {
    Ok(true)
}

fn moon_cadence(state: &GameState) -> Result<bool, RuleFault> {
    if state.stimulus.symbol != Some(Symbol::Moon) {
        return Ok(true);
    }
    Ok(state.elapsed_seconds() % MOON_CADENCE_SECS == 0)
}

fn ghost_reversal(_state: &GameState) -> Result<bool, RuleFault> {
    Ok(true)
}

fn standard_rules() -> Vec<Rule> {
    use RuleCategory::*;

    vec![
        Rule::new(
            1,
            "Wait at least 1 second between presses",
            "⏱️",
            Timing,
            "Too quick! You must wait at least 1 second between presses.",
            wait_between_presses,
        )
        .with_timing(TimingConstraint::MinGap { ms: MIN_GAP_MS }),
        Rule::new(
            2,
            "Press TWICE quickly (within 1s) when you see 🦆",
            "🦆",
            VisualPattern,
            "Duck alert! You must press TWICE quickly when 🦆 appears!",
            duck_double_press,
        )
        .with_symbol(Symbol::Duck)
        .with_press_pattern(PressPattern::Double),
        Rule::new(
            3,
            "Press only when buzzer is GREEN",
            "🟢",
            Visual,
            "Wrong color! Buzzer must be GREEN when you press.",
            only_green,
        ),
        Rule::new(
            4,
            "Press only when the timer shows an ODD number",
            "🔢",
            TimingPattern,
            "Wrong timing! Press only during odd seconds (1, 3, 5, 7...).",
            odd_seconds,
        ),
        Rule::new(
            5,
            "DON'T press when you see 🚀",
            "🚀",
            VisualAvoidance,
            "Rocket alert! Never press when 🚀 is showing!",
            avoid_rocket,
        )
        .with_symbol(Symbol::Rocket),
        Rule::new(
            6,
            "Don't press more than once every 2 seconds",
            "🚫",
            Timing,
            "Too fast! You must wait at least 2 seconds between presses.",
            slow_down,
        )
        .with_timing(TimingConstraint::MinGap { ms: RELAXED_GAP_MS }),
        Rule::new(
            7,
            "Press THREE times rapidly when you see ⭐",
            "⭐",
            VisualPattern,
            "Star power! Press THREE times quickly when ⭐ appears!",
            star_triple_press,
        )
        .with_symbol(Symbol::Star)
        .with_press_pattern(PressPattern::Triple),
        Rule::new(
            8,
            "Press only when timer shows EVEN numbers",
            "2️⃣",
            TimingPattern,
            "Wrong timing! Press only during even seconds (0, 2, 4, 6...).",
            even_seconds,
        ),
        Rule::new(
            9,
            "NEVER press when you see 🔥",
            "🔥",
            VisualAvoidance,
            "Too hot! Never press when 🔥 is burning!",
            avoid_fire,
        )
        .with_symbol(Symbol::Fire),
        Rule::new(
            10,
            "Press only when buzzer is PULSING",
            "💫",
            Visual,
            "Wait for the pulse! Buzzer must be pulsing when you press.",
            only_pulsing,
        ),
        Rule::new(
            11,
            "DON'T press when you see 🐱",
            "🐱",
            VisualAvoidance,
            "Cat crossing! Don't press when 🐱 appears!",
            avoid_cat,
        )
        .with_symbol(Symbol::Cat),
        Rule::new(
            12,
            "Press within 0.6 seconds of seeing ⚡",
            "⚡",
            Reaction,
            "Too slow! Press within 0.6s of seeing ⚡!",
            lightning_reaction,
        )
        .with_symbol(Symbol::Lightning)
        .with_timing(TimingConstraint::ReactionWindow {
            symbol: Symbol::Lightning,
            ms: LIGHTNING_WINDOW_MS,
        }),
        Rule::new(
            13,
            "Press EXACTLY ONCE when 💎 appears (then wait for it to disappear)",
            "💎",
            VisualPattern,
            "One diamond, one press! Don't press 💎 multiple times!",
            diamond_single_press,
        )
        .with_symbol(Symbol::Diamond)
        .with_press_pattern(PressPattern::Single),
        Rule::new(
            14,
            "NEVER press when 💀 appears",
            "💀",
            VisualAvoidance,
            "Deadly mistake! Never press when 💀 is showing!",
            avoid_skull,
        )
        .with_symbol(Symbol::Skull),
        Rule::new(
            15,
            "Press only when buzzer is RED or YELLOW",
            "🌈",
            Visual,
            "Wrong color! Must be RED or YELLOW only!",
            red_or_yellow,
        ),
        Rule::new(
            16,
            "Press within 0.5s when 💣 appears",
            "💣",
            Reaction,
            "Bomb exploded! Press within 0.5s of seeing 💣!",
            bomb_reaction,
        )
        .with_symbol(Symbol::Bomb)
        .with_timing(TimingConstraint::ReactionWindow {
            symbol: Symbol::Bomb,
            ms: BOMB_WINDOW_MS,
        }),
        Rule::new(
            17,
            "When 👑 shows, wait at least 3 seconds before pressing",
            "👑",
            VisualTiming,
            "Royal patience! Wait 3 seconds after 👑 appears!",
            crown_patience,
        )
        .with_symbol(Symbol::Crown)
        .with_timing(TimingConstraint::HoldAfterSymbol {
            symbol: Symbol::Crown,
            ms: CROWN_HOLD_MS,
        }),
        Rule::new(
            18,
            "Press ONCE only when 👽 appears (no double presses)",
            "👽",
            VisualPattern,
            "Alien confusion! Press 👽 only once!",
            alien_single_press,
        )
        .with_symbol(Symbol::Alien)
        .with_press_pattern(PressPattern::Single),
        Rule::new(
            19,
            "Press 🌙 only when timer is divisible by 5",
            "🌙",
            VisualTiming,
            "Moon phase! Press 🌙 only at 5-second intervals!",
            moon_cadence,
        )
        .with_symbol(Symbol::Moon),
        Rule::new(
            20,
            "👻 reverses ALL rules temporarily!",
            "👻",
            Chaos,
            "Ghost chaos! Everything is reversed with 👻!",
            ghost_reversal,
        )
        .with_symbol(Symbol::Ghost),
    ]
}
