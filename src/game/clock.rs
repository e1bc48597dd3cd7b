use std::cell::Cell;

use web_sys::js_sys::Date;

use super::state::Millis;

/// Monotonic millisecond clock on the session time base.
pub trait Clock {
    fn now(&self) -> Millis;
}

/// `Date.now()` anchored at session start. Only usable inside a browser.
#[derive(Debug, Clone, Copy)]
pub struct BrowserClock {
    anchor: f64,
}

impl BrowserClock {
    pub fn new() -> Self {
        Self { anchor: Date::now() }
    }

    /// Moves the origin to the current instant.
    pub fn restart(&mut self) {
        self.anchor = Date::now();
    }
}

impl Default for BrowserClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BrowserClock {
    fn now(&self) -> Millis {
        (Date::now() - self.anchor).max(0.0) as Millis
    }
}

/// Clock advanced by hand, for headless drivers and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, delta: Millis) {
        self.now.set(self.now.get().saturating_add(delta));
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now.max(self.now.get()));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_never_runs_backwards() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now(), 150);
        clock.set(120);
        assert_eq!(clock.now(), 150);
        clock.set(400);
        assert_eq!(clock.now(), 400);
    }
}
