//! Buzzer game core: state, rule table, validation, stimulus cycles and level
//! progression, tied together by [`Session`].

pub mod catalog;
pub mod clock;
pub mod config;
pub mod progression;
pub mod random;
pub mod rules;
pub mod session;
pub mod state;
pub mod stimulus;
pub mod warnings;

pub use catalog::{
    Predicate, PressPattern, Rule, RuleCatalog, RuleCategory, RuleFault, RuleId, TimingConstraint,
};
pub use clock::{BrowserClock, Clock, ManualClock};
pub use config::GameConfig;
pub use progression::{LevelProgression, LevelThresholds, LevelUp, FALLBACK_THRESHOLD};
pub use random::{RandomSource, SeededRandom};
pub use rules::{ActiveSymbol, RuleEngine, Validation};
pub use session::{PressKind, PressResolution, Session, SessionEvent, SessionObserver};
pub use state::{
    BuzzerColor, GameState, GameStatus, Level, Millis, RotationDirection, StateError, Stimulus,
    StimulusPatch, Symbol,
};
pub use stimulus::{CycleKind, CyclePeriods, CycleUnlocks, StimulusScheduler};
pub use warnings::{RuleWarning, WarningPolicy, WarningSeverity};
