use serde::Serialize;

use super::catalog::{Rule, RuleId};
use super::clock::Clock;
use super::config::GameConfig;
use super::progression::{LevelProgression, LevelUp};
use super::random::{RandomSource, SeededRandom};
use super::rules::{RuleEngine, Validation};
use super::state::{GameState, GameStatus, Level, Millis, StateError, Stimulus};
use super::stimulus::{CycleKind, StimulusScheduler};
use super::warnings::RuleWarning;

/// Notifications for the presentation layer (sound, animation, HUD).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStarted {
        level: Level,
        required_presses: u32,
    },
    PressAccepted {
        total_presses: u32,
        presses_this_level: u32,
        required_presses: u32,
    },
    ComboReached {
        count: u32,
    },
    LevelUp {
        level: Level,
        required_presses: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule: Option<Rule>,
    },
    CycleStarted {
        cycle: CycleKind,
    },
    StimulusChanged {
        cycles: Vec<CycleKind>,
        stimulus: Stimulus,
    },
    GameOver {
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_id: Option<RuleId>,
        level: Level,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        total_presses: u32,
    },
    SessionReset,
}

/// Receives every verdict and event. Calls are fire-and-forget.
pub trait SessionObserver {
    fn on_validation(&mut self, _validation: &Validation, _state: &GameState) {}

    fn on_event(&mut self, event: &SessionEvent);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PressKind {
    /// The press opened a new session and was not judged.
    Started,
    /// The session is over; the press did nothing.
    Ignored,
    Accepted,
    Violated,
}

#[derive(Debug, Clone, Serialize)]
pub struct PressResolution {
    pub kind: PressKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    pub events: Vec<SessionEvent>,
    pub state: GameState,
}

/// One play-through: owns the state and everything that mutates it.
pub struct Session {
    config: GameConfig,
    state: GameState,
    engine: RuleEngine,
    progression: LevelProgression,
    scheduler: StimulusScheduler,
    rng: Box<dyn RandomSource>,
    last_violation: Option<Validation>,
    observer: Option<Box<dyn SessionObserver>>,
}

impl Session {
    pub fn new(config: GameConfig) -> Result<Self, StateError> {
        config.validate()?;
        Ok(Self {
            state: GameState::new(),
            engine: RuleEngine::new().with_warning_policy(config.warnings),
            progression: LevelProgression::new(config.thresholds.clone()),
            scheduler: StimulusScheduler::new(config.periods, config.unlocks),
            rng: Box::new(SeededRandom::from_seed(config.rng_seed)),
            last_violation: None,
            observer: None,
            config,
        })
    }

    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn SessionObserver>>) {
        self.observer = observer;
    }

    /// Opens level 1. Starting from `Over` clears the finished session first;
    /// starting while already playing does nothing.
    pub fn start_session(&mut self) -> Result<Vec<SessionEvent>, StateError> {
        if self.state.is_playing() {
            return Ok(Vec::new());
        }
        self.clear();
        let opened = self
            .progression
            .begin(&mut self.state, &mut self.engine, &mut self.scheduler)?;
        self.state.status = GameStatus::Playing;
        log::info!(
            "session started, {} presses to clear level 1",
            opened.required_presses
        );

        let mut events = vec![SessionEvent::SessionStarted {
            level: opened.level,
            required_presses: opened.required_presses,
        }];
        events.extend(Self::cycle_events(&opened));
        self.notify(&events);
        Ok(events)
    }

    pub fn handle_press(&mut self, timestamp: Millis) -> Result<PressResolution, StateError> {
        match self.state.status {
            GameStatus::Idle => {
                let events = self.start_session()?;
                Ok(self.resolution(PressKind::Started, None, events))
            }
            GameStatus::Over => Ok(self.resolution(PressKind::Ignored, None, Vec::new())),
            GameStatus::Playing => self.judge_press(timestamp),
        }
    }

    /// Presses at the clock's current instant. A clock that lags the session
    /// clock is read as the session clock.
    pub fn press_now(&mut self, clock: &impl Clock) -> Result<PressResolution, StateError> {
        self.handle_press(clock.now().max(self.state.now))
    }

    fn judge_press(&mut self, timestamp: Millis) -> Result<PressResolution, StateError> {
        self.state.begin_press(timestamp)?;
        let snapshot = self.state.snapshot();
        let validation = self.engine.validate(&snapshot);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_validation(&validation, &snapshot);
        }

        if !validation.valid {
            let events = vec![self.end_session(&validation)];
            self.notify(&events);
            return Ok(self.resolution(PressKind::Violated, Some(validation), events));
        }

        let opened = self.progression.record_valid_press(
            &mut self.state,
            timestamp,
            &mut self.engine,
            &mut self.scheduler,
        )?;

        let mut events = vec![SessionEvent::PressAccepted {
            total_presses: self.state.total_presses,
            presses_this_level: self.state.presses_this_level,
            required_presses: self.state.presses_required_for_level,
        }];
        let combo = self.state.combo_count;
        if self.config.combo_step > 0 && combo > 0 && combo % self.config.combo_step == 0 {
            events.push(SessionEvent::ComboReached { count: combo });
        }
        if let Some(opened) = opened {
            events.push(SessionEvent::LevelUp {
                level: opened.level,
                required_presses: opened.required_presses,
                rule: opened.rule.clone(),
            });
            events.extend(Self::cycle_events(&opened));
        }
        self.notify(&events);
        Ok(self.resolution(PressKind::Accepted, Some(validation), events))
    }

    fn end_session(&mut self, validation: &Validation) -> SessionEvent {
        self.state.status = GameStatus::Over;
        self.scheduler.stop_all();
        self.state.break_combo();
        self.last_violation = Some(validation.clone());
        log::info!(
            "game over at level {} after {} presses: {}",
            self.state.current_level,
            self.state.total_presses,
            validation.message().unwrap_or("rule violated")
        );
        SessionEvent::GameOver {
            rule_id: validation.violated_id(),
            level: self.state.current_level,
            message: validation.message().map(str::to_owned),
            total_presses: self.state.total_presses,
        }
    }

    /// Advances the session clock and fires due stimulus cycles. Outside a
    /// running session this only checks its argument.
    pub fn tick(&mut self, delta_ms: i64) -> Result<Vec<SessionEvent>, StateError> {
        if delta_ms < 0 {
            return Err(StateError::invalid(
                "delta_ms",
                format!("duration must not be negative, got {delta_ms}"),
            ));
        }
        if !self.state.is_playing() {
            return Ok(Vec::new());
        }
        self.state.advance_elapsed(delta_ms)?;
        let fired = self.scheduler.advance(
            delta_ms.unsigned_abs(),
            self.state.now,
            &mut self.state.stimulus,
            self.rng.as_mut(),
        );
        if fired.is_empty() {
            return Ok(Vec::new());
        }
        let events = vec![SessionEvent::StimulusChanged {
            cycles: fired,
            stimulus: self.state.stimulus.clone(),
        }];
        self.notify(&events);
        Ok(events)
    }

    /// Ticks by however much `clock` has moved past the elapsed timer, so the
    /// timer tracks wall time even when callbacks arrive late or not at all.
    pub fn catch_up(&mut self, clock: &impl Clock) -> Result<Vec<SessionEvent>, StateError> {
        let behind = clock.now().saturating_sub(self.state.elapsed);
        self.tick(i64::try_from(behind).unwrap_or(i64::MAX))
    }

    /// Returns to `Idle` with no active rules and no running cycles.
    pub fn restart_session(&mut self) -> Vec<SessionEvent> {
        self.clear();
        log::info!("session reset");
        let events = vec![SessionEvent::SessionReset];
        self.notify(&events);
        events
    }

    fn clear(&mut self) {
        self.engine.reset();
        self.scheduler.reset();
        self.state.reset_session();
        self.last_violation = None;
    }

    fn cycle_events(opened: &LevelUp) -> impl Iterator<Item = SessionEvent> + '_ {
        opened
            .unlocked
            .iter()
            .map(|cycle| SessionEvent::CycleStarted { cycle: *cycle })
    }

    fn notify(&mut self, events: &[SessionEvent]) {
        if let Some(observer) = self.observer.as_mut() {
            for event in events {
                observer.on_event(event);
            }
        }
    }

    fn resolution(
        &self,
        kind: PressKind,
        validation: Option<Validation>,
        events: Vec<SessionEvent>,
    ) -> PressResolution {
        PressResolution {
            kind,
            validation,
            events,
            state: self.state.clone(),
        }
    }

    pub fn level(&self) -> Level {
        self.state.current_level
    }

    pub fn score(&self) -> u32 {
        self.state.total_presses
    }

    pub fn active_rules(&self) -> &[Rule] {
        self.engine.active_rules()
    }

    pub fn last_violation(&self) -> Option<&Validation> {
        self.last_violation.as_ref()
    }

    pub fn last_violation_message(&self) -> Option<&str> {
        self.last_violation.as_ref().and_then(Validation::message)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn warnings(&self) -> Vec<RuleWarning> {
        self.engine.warnings(&self.state).collect()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn running_cycles(&self) -> Vec<CycleKind> {
        self.scheduler.running()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::game::clock::ManualClock;
    use crate::game::state::BuzzerColor;

    fn session() -> Session {
        Session::new(GameConfig::default().with_seed(7)).expect("default config is valid")
    }

    fn playing() -> Session {
        let mut session = session();
        session.start_session().expect("session starts");
        session
    }

    fn press(session: &mut Session, timestamp: Millis) -> PressResolution {
        session.handle_press(timestamp).expect("press in order")
    }

    fn any_event(events: &[SessionEvent], check: impl Fn(&SessionEvent) -> bool) -> bool {
        events.iter().any(check)
    }

    /// Clears levels 1 and 2 with presses one second apart, ending at 11 s.
    fn at_level_three() -> Session {
        let mut session = playing();
        for second in 0..12 {
            let outcome = press(&mut session, second * 1_000);
            assert_eq!(outcome.kind, PressKind::Accepted, "press at {second} s");
        }
        assert_eq!(session.level(), 3);
        session
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<SessionEvent>>>,
        verdicts: Rc<RefCell<Vec<bool>>>,
    }

    impl SessionObserver for Recorder {
        fn on_validation(&mut self, validation: &Validation, _state: &GameState) {
            self.verdicts.borrow_mut().push(validation.valid);
        }

        fn on_event(&mut self, event: &SessionEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn first_press_starts_without_counting() {
        let mut session = session();
        let outcome = press(&mut session, 4_000);

        assert_eq!(outcome.kind, PressKind::Started);
        assert!(outcome.validation.is_none());
        assert_eq!(outcome.state.status, GameStatus::Playing);
        assert_eq!(session.score(), 0);
        assert_eq!(session.state().presses_required_for_level, 5);
        assert_eq!(session.active_rules().len(), 1);
    }

    #[test]
    fn presses_one_second_apart_are_accepted() {
        let mut session = playing();
        assert_eq!(press(&mut session, 0).kind, PressKind::Accepted);
        assert_eq!(press(&mut session, 1_000).kind, PressKind::Accepted);
        assert_eq!(session.score(), 2);
    }

    #[test]
    fn press_inside_gap_ends_the_session() {
        let mut session = playing();
        press(&mut session, 0);
        let outcome = press(&mut session, 500);

        assert_eq!(outcome.kind, PressKind::Violated);
        let validation = outcome.validation.expect("verdict");
        assert_eq!(validation.violated_id(), Some(1));
        assert_eq!(session.state().status, GameStatus::Over);
        assert_eq!(session.score(), 1, "violating press is not counted");
        assert_eq!(session.state().combo_count, 0);
        assert_eq!(
            session.last_violation_message(),
            Some("Too quick! You must wait at least 1 second between presses.")
        );
        assert!(matches!(
            outcome.events.as_slice(),
            [SessionEvent::GameOver { rule_id: Some(1), level: 1, .. }]
        ));
    }

    #[test]
    fn presses_after_game_over_are_ignored() {
        let mut session = playing();
        press(&mut session, 0);
        press(&mut session, 100);
        let before = session.state().clone();

        let outcome = press(&mut session, 5_000);
        assert_eq!(outcome.kind, PressKind::Ignored);
        assert!(outcome.events.is_empty());
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn out_of_order_press_is_rejected() {
        let mut session = playing();
        press(&mut session, 3_000);
        let err = session.handle_press(2_000).expect_err("earlier than last press");
        assert!(matches!(err, StateError::InvalidArgument { .. }));
        assert!(session.state().is_playing());
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn press_behind_elapsed_timer_is_rejected() {
        let mut session = playing();
        session.tick(5_000).expect("tick");
        let before = session.state().clone();

        let err = session.handle_press(4_000).expect_err("press before the timer");
        assert!(matches!(err, StateError::InvalidArgument { .. }));
        assert_eq!(session.state(), &before);

        assert_eq!(press(&mut session, 5_000).kind, PressKind::Accepted);
        assert_eq!(session.state().last_press_time, Some(5_000));
    }

    #[test]
    fn lagging_clock_presses_at_session_clock() {
        let mut session = playing();
        session.tick(5_000).expect("tick");
        let clock = ManualClock::new(3_000);

        let outcome = session.press_now(&clock).expect("clamped press");
        assert_eq!(outcome.kind, PressKind::Accepted);
        assert_eq!(session.state().last_press_time, Some(5_000));
    }

    #[test]
    fn catch_up_tracks_wall_clock() {
        let mut session = at_level_three();
        let clock = ManualClock::new(0);

        clock.advance(3_000);
        session.catch_up(&clock).expect("catch up");
        assert_eq!(session.state().elapsed, 3_000);
        assert_eq!(session.state().stimulus.color, BuzzerColor::Green);

        assert!(session.catch_up(&clock).expect("no time passed").is_empty());
        assert_eq!(session.state().elapsed, 3_000, "no double counting");

        clock.advance(2_000);
        session.catch_up(&clock).expect("catch up");
        assert_eq!(session.state().elapsed, 5_000);
        assert_eq!(session.state().elapsed_seconds(), 5);
        assert_eq!(session.state().stimulus.color, BuzzerColor::Red);
    }

    #[test]
    fn huge_tick_is_applied_at_once() {
        let mut session = at_level_three();
        let events = session.tick(2_000_000_000_000).expect("tick");
        assert_eq!(session.state().elapsed, 2_000_000_000_000);
        assert!(matches!(events.as_slice(), [SessionEvent::StimulusChanged { .. }]));
        assert_eq!(session.state().stimulus.color, BuzzerColor::Red);
    }

    #[test]
    fn fifth_press_reaches_level_two() {
        let mut session = playing();
        for second in 0..4 {
            press(&mut session, second * 1_000);
        }
        let outcome = press(&mut session, 4_000);

        assert_eq!(session.level(), 2);
        assert_eq!(session.state().presses_this_level, 0);
        assert_eq!(session.state().presses_required_for_level, 7);
        assert_eq!(session.active_rules().len(), 2);
        let events = &outcome.events;
        assert!(any_event(events, |event| {
            matches!(event, SessionEvent::LevelUp { level: 2, required_presses: 7, .. })
        }));
        assert!(any_event(events, |event| {
            matches!(event, SessionEvent::ComboReached { count: 5 })
        }));
        assert!(any_event(events, |event| {
            matches!(event, SessionEvent::CycleStarted { cycle: CycleKind::Symbol })
        }));
    }

    #[test]
    fn level_three_demands_green() {
        let mut session = at_level_three();
        assert_eq!(session.running_cycles(), vec![CycleKind::Color, CycleKind::Symbol]);

        session.tick(2_500).expect("tick");
        assert_eq!(session.state().stimulus.color, BuzzerColor::Green);
        assert_eq!(press(&mut session, 13_000).kind, PressKind::Accepted);

        session.tick(2_500).expect("tick");
        assert_eq!(session.state().stimulus.color, BuzzerColor::Red);
        let outcome = press(&mut session, 15_000);

        assert_eq!(outcome.kind, PressKind::Violated);
        let violated = outcome
            .validation
            .and_then(|validation| validation.violated)
            .expect("rule 3 blamed");
        assert_eq!(violated.level, 3);
        assert_eq!(
            violated.violation_message,
            "Wrong color! Buzzer must be GREEN when you press."
        );
    }

    #[test]
    fn no_cycle_fires_after_game_over() {
        let mut session = at_level_three();
        session.tick(5_000).expect("tick");
        press(&mut session, 15_000);
        assert_eq!(session.state().status, GameStatus::Over);
        assert!(session.running_cycles().is_empty());

        let frozen = session.state().clone();
        let events = session.tick(60_000).expect("tick after game over");
        assert!(events.is_empty());
        assert_eq!(session.state(), &frozen);
    }

    #[test]
    fn tick_is_inert_before_start_but_checks_delta() {
        let mut session = session();
        assert!(session.tick(1_000).expect("idle tick").is_empty());
        assert_eq!(session.state().elapsed, 0);
        assert!(session.tick(-5).is_err());
    }

    #[test]
    fn tick_reports_stimulus_changes() {
        let mut session = at_level_three();
        let events = session.tick(3_500).expect("tick");
        match events.as_slice() {
            [SessionEvent::StimulusChanged { cycles, stimulus }] => {
                assert_eq!(cycles, &vec![CycleKind::Color, CycleKind::Symbol]);
                assert_eq!(stimulus.color, BuzzerColor::Green);
                assert!(stimulus.symbol.is_some());
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn restart_restores_a_clean_idle_session() {
        let mut session = at_level_three();
        session.tick(5_000).expect("tick");
        press(&mut session, 15_000);
        assert!(session.last_violation().is_some());

        let events = session.restart_session();
        assert!(matches!(events.as_slice(), [SessionEvent::SessionReset]));
        assert_eq!(session.state(), &GameState::default());
        assert!(session.active_rules().is_empty());
        assert!(session.running_cycles().is_empty());
        assert!(session.last_violation().is_none());
        assert!(session.warnings().is_empty());
    }

    #[test]
    fn start_after_game_over_begins_fresh() {
        let mut session = playing();
        press(&mut session, 0);
        press(&mut session, 10);
        session.start_session().expect("restart");

        assert!(session.state().is_playing());
        assert_eq!(session.score(), 0);
        assert_eq!(session.state().last_press_time, None);
        assert_eq!(press(&mut session, 0).kind, PressKind::Accepted);
    }

    #[test]
    fn observer_sees_verdicts_and_events() {
        let recorder = Recorder::default();
        let mut session = session().with_observer(recorder.clone());
        let clock = ManualClock::new(0);

        session.press_now(&clock).expect("starts");
        session.press_now(&clock).expect("accepted");
        clock.advance(200);
        session.press_now(&clock).expect("violated");

        assert_eq!(recorder.verdicts.borrow().as_slice(), &[true, false]);
        let events = recorder.events.borrow();
        assert!(matches!(
            events.as_slice(),
            [
                SessionEvent::SessionStarted { level: 1, required_presses: 5 },
                SessionEvent::PressAccepted { total_presses: 1, .. },
                SessionEvent::GameOver { rule_id: Some(1), .. },
            ]
        ));
    }

    #[test]
    fn combo_step_is_configurable() {
        let mut config = GameConfig::default().with_seed(1);
        config.combo_step = 2;
        let mut session = Session::new(config).expect("valid config");
        session.start_session().expect("start");

        press(&mut session, 0);
        let outcome = press(&mut session, 1_000);
        assert!(any_event(&outcome.events, |event| {
            matches!(event, SessionEvent::ComboReached { count: 2 })
        }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = GameConfig::default();
        config.periods.color_ms = 0;
        assert!(Session::new(config).is_err());
    }

    #[test]
    fn resolution_serializes_with_event_tags() {
        let mut session = playing();
        let outcome = press(&mut session, 0);
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains("\"kind\":\"accepted\""));
        assert!(json.contains("\"type\":\"PressAccepted\""));
    }
}
