//! Near-violation hints for the presentation layer. Nothing here feeds back into
//! validation.

use serde::{Deserialize, Serialize};

use super::catalog::{Rule, RuleId, TimingConstraint};
use super::state::{GameState, Level, Millis};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Caution,
    Danger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleWarning {
    pub rule_id: RuleId,
    pub level: Level,
    pub severity: WarningSeverity,
    /// Time until the window opens (gaps, holds) or closes (reactions).
    pub margin_ms: Millis,
}

/// Thresholds, in percent of a rule's timing window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WarningPolicy {
    /// Below this share of a wait, pressing is flagged as danger rather than caution.
    pub danger_pct: u8,
    /// Past this share of a reaction window, the closing window is flagged.
    pub caution_pct: u8,
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self {
            danger_pct: 50,
            caution_pct: 70,
        }
    }
}

impl WarningPolicy {
    fn below_share(&self, part: Millis, whole: Millis, pct: u8) -> bool {
        u128::from(part) * 100 < u128::from(whole) * u128::from(pct)
    }

    fn waiting_severity(&self, waited: Millis, required: Millis) -> WarningSeverity {
        if self.below_share(waited, required, self.danger_pct) {
            WarningSeverity::Danger
        } else {
            WarningSeverity::Caution
        }
    }
}

/// Lazily assesses `rules` against `state`; a fresh call recomputes everything.
pub fn warnings<'a>(
    rules: &'a [Rule],
    state: &'a GameState,
    policy: WarningPolicy,
) -> impl Iterator<Item = RuleWarning> + 'a {
    rules
        .iter()
        .filter_map(move |rule| assess(rule, state, &policy))
}

fn assess(rule: &Rule, state: &GameState, policy: &WarningPolicy) -> Option<RuleWarning> {
    let (severity, margin_ms) = match rule.timing? {
        TimingConstraint::MinGap { ms } => {
            let since = state.since_last_press()?;
            if since >= ms {
                return None;
            }
            (policy.waiting_severity(since, ms), ms - since)
        }
        TimingConstraint::HoldAfterSymbol { symbol, ms } => {
            if state.stimulus.symbol != Some(symbol) {
                return None;
            }
            let age = state.stimulus.symbol_age(state.now)?;
            if age >= ms {
                return None;
            }
            (policy.waiting_severity(age, ms), ms - age)
        }
        TimingConstraint::ReactionWindow { symbol, ms } => {
            if state.stimulus.symbol != Some(symbol) {
                return None;
            }
            let age = state.stimulus.symbol_age(state.now)?;
            if age > ms {
                (WarningSeverity::Danger, 0)
            } else if !policy.below_share(age, ms, policy.caution_pct) {
                (WarningSeverity::Caution, ms - age)
            } else {
                return None;
            }
        }
    };

    Some(RuleWarning {
        rule_id: rule.id,
        level: rule.level,
        severity,
        margin_ms,
    })
}
