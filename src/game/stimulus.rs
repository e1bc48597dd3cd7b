//! Periodic stimulus cycles. Each cycle accumulates tick time and fires once per
//! elapsed period, writing only the `stimulus` part of the game state. Several
//! firings inside one tick collapse into their net effect.

use serde::{Deserialize, Serialize};

use super::random::RandomSource;
use super::state::{BuzzerColor, Level, Millis, RotationDirection, Stimulus, StimulusPatch, Symbol};

pub const COLOR_PALETTE: [BuzzerColor; 3] =
    [BuzzerColor::Green, BuzzerColor::Red, BuzzerColor::Yellow];

const ROTATIONS: [RotationDirection; 2] = [
    RotationDirection::Clockwise,
    RotationDirection::CounterClockwise,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Color,
    Symbol,
    Pulse,
    Rotation,
}

impl CycleKind {
    /// Firing order within a single tick.
    pub const ALL: [CycleKind; 4] = [
        CycleKind::Color,
        CycleKind::Symbol,
        CycleKind::Pulse,
        CycleKind::Rotation,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CyclePeriods {
    pub color_ms: Millis,
    pub symbol_ms: Millis,
    pub pulse_ms: Millis,
    pub rotation_ms: Millis,
}

impl CyclePeriods {
    pub fn period(&self, kind: CycleKind) -> Millis {
        match kind {
            CycleKind::Color => self.color_ms,
            CycleKind::Symbol => self.symbol_ms,
            CycleKind::Pulse => self.pulse_ms,
            CycleKind::Rotation => self.rotation_ms,
        }
    }
}

impl Default for CyclePeriods {
    fn default() -> Self {
        Self {
            color_ms: 2_500,
            symbol_ms: 3_500,
            pulse_ms: 3_000,
            rotation_ms: 4_000,
        }
    }
}

/// Level at which each cycle switches on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CycleUnlocks {
    pub symbol: Level,
    pub color: Level,
    pub pulse: Level,
    pub rotation: Level,
}

impl CycleUnlocks {
    pub fn level(&self, kind: CycleKind) -> Level {
        match kind {
            CycleKind::Color => self.color,
            CycleKind::Symbol => self.symbol,
            CycleKind::Pulse => self.pulse,
            CycleKind::Rotation => self.rotation,
        }
    }
}

impl Default for CycleUnlocks {
    fn default() -> Self {
        Self {
            symbol: 2,
            color: 3,
            pulse: 10,
            rotation: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Cycle {
    period: Millis,
    accumulator: Millis,
    step: u64,
    running: bool,
    unlocked: bool,
}

impl Cycle {
    fn new(period: Millis) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }

    fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.accumulator = 0;
        }
    }

    fn stop(&mut self) {
        self.running = false;
        self.accumulator = 0;
    }

    fn due(&mut self, delta: Millis) -> u64 {
        if !self.running || self.period == 0 {
            return 0;
        }
        self.accumulator = self.accumulator.saturating_add(delta);
        let firings = self.accumulator / self.period;
        self.accumulator %= self.period;
        firings
    }
}

#[derive(Debug, Clone)]
pub struct StimulusScheduler {
    unlocks: CycleUnlocks,
    color: Cycle,
    symbol: Cycle,
    pulse: Cycle,
    rotation: Cycle,
    symbol_pool: Vec<Symbol>,
}

impl StimulusScheduler {
    pub fn new(periods: CyclePeriods, unlocks: CycleUnlocks) -> Self {
        Self {
            unlocks,
            color: Cycle::new(periods.color_ms),
            symbol: Cycle::new(periods.symbol_ms),
            pulse: Cycle::new(periods.pulse_ms),
            rotation: Cycle::new(periods.rotation_ms),
            symbol_pool: Vec::new(),
        }
    }

    fn cycle(&self, kind: CycleKind) -> &Cycle {
        match kind {
            CycleKind::Color => &self.color,
            CycleKind::Symbol => &self.symbol,
            CycleKind::Pulse => &self.pulse,
            CycleKind::Rotation => &self.rotation,
        }
    }

    fn cycle_mut(&mut self, kind: CycleKind) -> &mut Cycle {
        match kind {
            CycleKind::Color => &mut self.color,
            CycleKind::Symbol => &mut self.symbol,
            CycleKind::Pulse => &mut self.pulse,
            CycleKind::Rotation => &mut self.rotation,
        }
    }

    pub fn start(&mut self, kind: CycleKind) {
        self.cycle_mut(kind).start();
    }

    /// Cancels a cycle. The stimulus keeps whatever value it last set.
    pub fn stop(&mut self, kind: CycleKind) {
        self.cycle_mut(kind).stop();
    }

    pub fn stop_all(&mut self) {
        for kind in CycleKind::ALL {
            self.stop(kind);
        }
    }

    pub fn is_running(&self, kind: CycleKind) -> bool {
        self.cycle(kind).running
    }

    pub fn is_unlocked(&self, kind: CycleKind) -> bool {
        self.cycle(kind).unlocked
    }

    pub fn running(&self) -> Vec<CycleKind> {
        CycleKind::ALL
            .into_iter()
            .filter(|kind| self.is_running(*kind))
            .collect()
    }

    /// Stops every cycle and forgets unlocks, step counters and the symbol pool.
    pub fn reset(&mut self) {
        for kind in CycleKind::ALL {
            let cycle = self.cycle_mut(kind);
            *cycle = Cycle::new(cycle.period);
        }
        self.symbol_pool.clear();
    }

    pub fn set_symbol_pool(&mut self, symbols: Vec<Symbol>) {
        self.symbol_pool = symbols;
    }

    pub fn symbol_pool(&self) -> &[Symbol] {
        &self.symbol_pool
    }

    /// Starts every cycle whose unlock level has been reached. A cycle unlocks
    /// at most once per session; the symbol cycle also waits for a non-empty
    /// pool. Returns the cycles started by this call.
    pub fn unlock_for_level(&mut self, level: Level) -> Vec<CycleKind> {
        let mut started = Vec::new();
        for kind in CycleKind::ALL {
            if self.cycle(kind).unlocked || level < self.unlocks.level(kind) {
                continue;
            }
            if kind == CycleKind::Symbol && self.symbol_pool.is_empty() {
                continue;
            }
            let cycle = self.cycle_mut(kind);
            cycle.unlocked = true;
            cycle.start();
            log::debug!("stimulus cycle {kind:?} unlocked at level {level}");
            started.push(kind);
        }
        started
    }

    /// Feeds `delta` ms to every running cycle and applies each firing to
    /// `stimulus` at instant `now`. Returns the cycles that fired.
    pub fn advance(
        &mut self,
        delta: Millis,
        now: Millis,
        stimulus: &mut Stimulus,
        rng: &mut dyn RandomSource,
    ) -> Vec<CycleKind> {
        let mut fired = Vec::new();
        for kind in CycleKind::ALL {
            let firings = self.cycle_mut(kind).due(delta);
            if firings == 0 {
                continue;
            }
            if let Some(patch) = self.fire(kind, firings, rng) {
                stimulus.apply(patch, now);
            }
            fired.push(kind);
        }
        fired
    }

    /// Patch left behind by the last of `firings` consecutive firings.
    fn fire(
        &mut self,
        kind: CycleKind,
        firings: u64,
        rng: &mut dyn RandomSource,
    ) -> Option<StimulusPatch> {
        let step = self.cycle(kind).step;
        let last = step.wrapping_add(firings - 1);
        let patch = match kind {
            CycleKind::Color => StimulusPatch::color(palette_color(last)),
            CycleKind::Pulse => StimulusPatch::pulsing(last % 2 == 0),
            CycleKind::Symbol => {
                if self.symbol_pool.is_empty() {
                    return None;
                }
                let index = if self.symbol_pool.len() > 1 {
                    rng.pick(self.symbol_pool.len())
                } else {
                    0
                };
                StimulusPatch::symbol(self.symbol_pool.get(index).copied())
            }
            CycleKind::Rotation => {
                StimulusPatch::rotation(ROTATIONS.get(rng.pick(ROTATIONS.len())).copied())
            }
        };
        self.cycle_mut(kind).step = step.wrapping_add(firings);
        Some(patch)
    }
}

fn palette_color(step: u64) -> BuzzerColor {
    let len = COLOR_PALETTE.len() as u64;
    COLOR_PALETTE
        .get((step % len) as usize)
        .copied()
        .unwrap_or_default()
}

impl Default for StimulusScheduler {
    fn default() -> Self {
        Self::new(CyclePeriods::default(), CycleUnlocks::default())
    }
}
