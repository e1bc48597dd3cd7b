use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use super::catalog::{PressPattern, Rule, RuleCatalog, RuleCategory, RuleFault, RuleId};
use super::state::{GameState, Level, Symbol};
use super::warnings::{self, RuleWarning, WarningPolicy};

/// Verdict for one press.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violated: Option<Rule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<RuleFault>,
}

impl Validation {
    pub fn passed() -> Self {
        Self {
            valid: true,
            violated: None,
            fault: None,
        }
    }

    fn violation(rule: &Rule, fault: Option<RuleFault>) -> Self {
        Self {
            valid: false,
            violated: Some(rule.clone()),
            fault,
        }
    }

    pub fn violated_id(&self) -> Option<RuleId> {
        self.violated.as_ref().map(|rule| rule.id)
    }

    pub fn message(&self) -> Option<&str> {
        self.violated
            .as_ref()
            .map(|rule| rule.violation_message.as_str())
    }
}

/// Symbol the stimulus cycle may show, and what its rule expects.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ActiveSymbol {
    pub symbol: Symbol,
    pub rule_id: RuleId,
    pub category: RuleCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press_pattern: Option<PressPattern>,
}

/// Owns the active rule set and judges presses against it.
pub struct RuleEngine {
    catalog: Arc<RuleCatalog>,
    active: Vec<Rule>,
    warning_policy: WarningPolicy,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_catalog(RuleCatalog::standard())
    }

    pub fn with_catalog(catalog: Arc<RuleCatalog>) -> Self {
        Self {
            catalog,
            active: Vec::new(),
            warning_policy: WarningPolicy::default(),
        }
    }

    pub fn with_warning_policy(mut self, policy: WarningPolicy) -> Self {
        self.warning_policy = policy;
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Activates the catalog rule for `level`. Unknown levels and rules that
    /// are already active are left alone. Returns the rule if it was newly
    /// activated.
    pub fn activate_rule(&mut self, level: Level) -> Option<&Rule> {
        let rule = self.catalog.by_level(level)?;
        if self.is_active(rule.id) {
            return None;
        }
        let position = self
            .active
            .partition_point(|active| active.level < rule.level);
        self.active.insert(position, rule.clone());
        log::debug!("rule {} activated: {}", rule.id, rule.description);
        self.active.get(position)
    }

    pub fn is_active(&self, id: RuleId) -> bool {
        self.active.iter().any(|rule| rule.id == id)
    }

    /// Checks active rules in ascending level order and blames the first one
    /// that fails. Faults count as failures of the faulting rule.
    pub fn validate(&self, state: &GameState) -> Validation {
        for rule in &self.active {
            match Self::evaluate_guarded(rule, state) {
                Ok(true) => continue,
                Ok(false) => return Validation::violation(rule, None),
                Err(fault) => {
                    log::warn!(
                        "rule {} could not be evaluated, treating as violated: {fault}",
                        rule.id
                    );
                    return Validation::violation(rule, Some(fault));
                }
            }
        }
        Validation::passed()
    }

    /// Panics become faults only where panics unwind; under `panic = "abort"`
    /// (release builds, wasm32) a panicking predicate aborts instead.
    fn evaluate_guarded(rule: &Rule, state: &GameState) -> Result<bool, RuleFault> {
        match panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(state))) {
            Ok(verdict) => verdict,
            Err(payload) => Err(RuleFault::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Advisory hints only; [`RuleEngine::validate`] alone decides outcomes.
    pub fn warnings<'a>(
        &'a self,
        state: &'a GameState,
    ) -> impl Iterator<Item = RuleWarning> + 'a {
        warnings::warnings(&self.active, state, self.warning_policy)
    }

    pub fn reset(&mut self) {
        self.active.clear();
    }

    pub fn active_rules(&self) -> &[Rule] {
        &self.active
    }

    pub fn latest_rule(&self) -> Option<&Rule> {
        self.active.last()
    }

    pub fn active_symbols(&self) -> Vec<ActiveSymbol> {
        self.active
            .iter()
            .filter_map(|rule| {
                rule.symbol.map(|symbol| ActiveSymbol {
                    symbol,
                    rule_id: rule.id,
                    category: rule.category,
                    press_pattern: rule.press_pattern,
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
