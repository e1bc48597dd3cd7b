pub mod game;
pub mod logging;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo_timers::callback::Interval;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;
use web_sys::js_sys::Function;

pub use game::{
    BrowserClock, BuzzerColor, CycleKind, GameConfig, GameState, GameStatus, Level, Millis,
    PressKind, PressResolution, Rule, RuleCatalog, RuleEngine, RuleFault, RuleWarning, Session,
    SessionEvent, SessionObserver, StateError, Stimulus, Symbol, Validation,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init_logging();
}

fn to_js_error(error: StateError) -> JsValue {
    to_value(&error)
        .unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn millis_from_js(argument: &str, value: f64) -> Result<Millis, JsValue> {
    if !value.is_finite() || value < 0.0 {
        return Err(to_js_error(StateError::invalid(
            argument,
            format!("expected a non-negative number of milliseconds, got {value}"),
        )));
    }
    Ok(value as Millis)
}

type EventQueue = Rc<RefCell<Vec<SessionEvent>>>;
type Listener = Rc<RefCell<Option<Function>>>;

/// Buffers session events until the session is no longer borrowed, so the JS
/// listener may call back into the game.
struct QueueObserver {
    queue: EventQueue,
}

impl SessionObserver for QueueObserver {
    fn on_event(&mut self, event: &SessionEvent) {
        self.queue.borrow_mut().push(event.clone());
    }
}

fn dispatch(queue: &EventQueue, listener: &Listener) {
    let events: Vec<SessionEvent> = queue.borrow_mut().drain(..).collect();
    let Some(callback) = listener.borrow().clone() else {
        return;
    };
    for event in events {
        let payload = match to_value(&event) {
            Ok(payload) => payload,
            Err(error) => {
                log::warn!("session event could not be converted: {error}");
                continue;
            }
        };
        if let Err(error) = callback.call1(&JsValue::NULL, &payload) {
            log::warn!("session listener threw: {error:?}");
        }
    }
}

#[wasm_bindgen]
pub struct BuzzerGame {
    session: Rc<RefCell<Session>>,
    clock: Rc<Cell<BrowserClock>>,
    ticker: Option<Interval>,
    queue: EventQueue,
    listener: Listener,
}

#[wasm_bindgen]
impl BuzzerGame {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<BuzzerGame, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(to_js_error)?,
            None => GameConfig::default(),
        };
        let queue = EventQueue::default();
        let session = Session::new(config)
            .map_err(to_js_error)?
            .with_observer(QueueObserver {
                queue: queue.clone(),
            });
        Ok(BuzzerGame {
            session: Rc::new(RefCell::new(session)),
            clock: Rc::new(Cell::new(BrowserClock::new())),
            ticker: None,
            queue,
            listener: Listener::default(),
        })
    }

    /// Starts a session and returns the emitted events as JSON.
    pub fn start(&mut self) -> Result<String, JsValue> {
        if !self.session.borrow().state().is_playing() {
            self.restart_clock();
        }
        let events = self
            .session
            .borrow_mut()
            .start_session()
            .map_err(to_js_error)?;
        self.flush();
        to_json(&events)
    }

    /// Presses the buzzer now.
    pub fn press(&mut self) -> Result<String, JsValue> {
        if self.session.borrow().state().status == GameStatus::Idle {
            self.restart_clock();
        }
        let clock = self.clock.get();
        let resolution = self
            .session
            .borrow_mut()
            .press_now(&clock)
            .map_err(to_js_error)?;
        self.after_press(resolution)
    }

    /// Presses the buzzer at an explicit session-clock instant.
    pub fn press_at(&mut self, timestamp_ms: f64) -> Result<String, JsValue> {
        let timestamp = millis_from_js("timestamp_ms", timestamp_ms)?;
        let resolution = self
            .session
            .borrow_mut()
            .handle_press(timestamp)
            .map_err(to_js_error)?;
        self.after_press(resolution)
    }

    /// Advances the session clock by hand. Use instead of the ticker.
    pub fn tick(&mut self, delta_ms: f64) -> Result<String, JsValue> {
        if !delta_ms.is_finite() {
            return Err(to_js_error(StateError::invalid(
                "delta_ms",
                "duration must be a finite number",
            )));
        }
        let events = self
            .session
            .borrow_mut()
            .tick(delta_ms as i64)
            .map_err(to_js_error)?;
        self.flush();
        to_json(&events)
    }

    pub fn restart(&mut self) -> Result<String, JsValue> {
        self.stop_ticker();
        let events = self.session.borrow_mut().restart_session();
        self.restart_clock();
        self.flush();
        to_json(&events)
    }

    /// Polls the browser clock at the configured rate. Each callback catches
    /// the session up to wall time, so late or throttled callbacks lose nothing.
    pub fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let interval_ms = self.session.borrow().config().tick_interval_ms;
        let period = u32::try_from(interval_ms).unwrap_or(u32::MAX);
        let session = Rc::clone(&self.session);
        let clock = Rc::clone(&self.clock);
        let queue = Rc::clone(&self.queue);
        let listener = Rc::clone(&self.listener);
        self.ticker = Some(Interval::new(period, move || {
            let Ok(mut session) = session.try_borrow_mut() else {
                return;
            };
            if let Err(error) = session.catch_up(&clock.get()) {
                log::warn!("tick rejected: {error}");
            }
            drop(session);
            dispatch(&queue, &listener);
        }));
        log::debug!("ticker started every {period} ms");
    }

    pub fn stop_ticker(&mut self) {
        if self.ticker.take().is_some() {
            log::debug!("ticker stopped");
        }
    }

    /// Registers a callback receiving every session event; `undefined` removes it.
    pub fn set_listener(&mut self, callback: Option<Function>) {
        *self.listener.borrow_mut() = callback;
    }

    pub fn level(&self) -> Level {
        self.session.borrow().level()
    }

    pub fn score(&self) -> u32 {
        self.session.borrow().score()
    }

    /// JSON of the verdict that ended the session, if any.
    pub fn last_violation(&self) -> Result<Option<String>, JsValue> {
        self.session
            .borrow()
            .last_violation()
            .map(to_json)
            .transpose()
    }

    pub fn last_violation_message(&self) -> Option<String> {
        self.session
            .borrow()
            .last_violation_message()
            .map(str::to_owned)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(self.session.borrow().state())
    }

    pub fn active_rules_json(&self) -> Result<String, JsValue> {
        to_json(self.session.borrow().active_rules())
    }

    pub fn warnings_json(&self) -> Result<String, JsValue> {
        to_json(&self.session.borrow().warnings())
    }

    fn after_press(&mut self, resolution: PressResolution) -> Result<String, JsValue> {
        if resolution.kind == PressKind::Violated {
            self.stop_ticker();
        }
        self.flush();
        to_json(&resolution)
    }

    fn restart_clock(&self) {
        let mut clock = self.clock.get();
        clock.restart();
        self.clock.set(clock);
    }

    fn flush(&self) {
        dispatch(&self.queue, &self.listener);
    }
}

/// Every rule of the standard catalog, in level order.
#[wasm_bindgen(js_name = "ruleCatalog")]
pub fn rule_catalog() -> Result<String, JsValue> {
    to_json(RuleCatalog::standard().rules())
}

#[wasm_bindgen(js_name = "defaultConfig")]
pub fn default_config() -> Result<String, JsValue> {
    to_json(&GameConfig::default())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
