//! Recovery manager: the escalation ladder out of stuck states.
//!
//! Re-entered on every EmergencyProtocol/ResetCondition tick or softlock
//! event. Four steps, each with a success check before moving on: in-place
//! fix, navigate to safety, reload the latest checkpoint, full reset. After
//! the configured number of full-ladder traversals the ladder jumps straight
//! to reset; persistent reset failure surfaces
//! [`RecoveryError::ManualInterventionRequired`], the one terminal error.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};
use crate::collab::MenuCommand;
use crate::confidence::EscalationTier;
use crate::error::RecoveryError;
use crate::goal::TravelMode;
use crate::softlock::SoftlockKind;

/// The four ladder steps, mildest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecoveryStep {
    InPlaceFix,
    NavigateToSafety,
    ReloadCheckpoint,
    FullReset,
}

impl RecoveryStep {
    /// The next rung, or `None` past the top.
    pub fn next(&self) -> Option<RecoveryStep> {
        match self {
            Self::InPlaceFix => Some(Self::NavigateToSafety),
            Self::NavigateToSafety => Some(Self::ReloadCheckpoint),
            Self::ReloadCheckpoint => Some(Self::FullReset),
            Self::FullReset => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InPlaceFix => "in-place-fix",
            Self::NavigateToSafety => "navigate-to-safety",
            Self::ReloadCheckpoint => "reload-checkpoint",
            Self::FullReset => "full-reset",
        }
    }
}

impl std::fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What pulled the recovery manager in.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryTrigger {
    Escalation(EscalationTier),
    Softlock(SoftlockKind),
    StateCorruption { severe: bool },
}

impl RecoveryTrigger {
    /// Minimum ladder rung this trigger warrants.
    fn entry_step(&self) -> RecoveryStep {
        match self {
            Self::StateCorruption { severe: true } => RecoveryStep::FullReset,
            Self::StateCorruption { severe: false } => RecoveryStep::ReloadCheckpoint,
            _ => RecoveryStep::InPlaceFix,
        }
    }
}

impl std::fmt::Display for RecoveryTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Escalation(tier) => write!(f, "escalation:{tier}"),
            Self::Softlock(kind) => write!(f, "softlock:{kind}"),
            Self::StateCorruption { severe: true } => f.write_str("state-corruption:severe"),
            Self::StateCorruption { severe: false } => f.write_str("state-corruption:major"),
        }
    }
}

/// One recorded engagement, for the `status()` audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub step: RecoveryStep,
    pub trigger: String,
    pub at: f64,
    /// `None` until the next tick's success check lands.
    pub cleared: Option<bool>,
}

/// Ladder tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Full-ladder traversals before jumping straight to reset.
    pub max_traversals: u32,
    /// Destination for the navigate-to-safety step.
    pub safe_location: String,
    /// Audit-trail ring size.
    pub recent_bound: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_traversals: 5,
            safe_location: "safe-haven".into(),
            recent_bound: 16,
        }
    }
}

/// The step to perform and, for input-level steps, its action list.
///
/// Reload and reset carry no actions: the core performs those through the
/// persistence collaborator directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPlan {
    pub step: RecoveryStep,
    pub actions: Vec<Action>,
}

/// Linear escalation ladder with a bounded traversal count.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    step: RecoveryStep,
    traversals: u32,
    engaged: bool,
    recent: VecDeque<RecoveryAttempt>,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            step: RecoveryStep::InPlaceFix,
            traversals: 0,
            engaged: false,
            recent: VecDeque::new(),
        }
    }

    /// Whether an engagement is waiting on its success check.
    pub fn engaged(&self) -> bool {
        self.engaged
    }

    /// Completed full-ladder traversals so far.
    pub fn traversals(&self) -> u32 {
        self.traversals
    }

    /// Recent attempts, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &RecoveryAttempt> {
        self.recent.iter()
    }

    /// Engage the ladder for a trigger, returning the step to perform.
    ///
    /// Errors with the terminal `ManualInterventionRequired` once the
    /// traversal budget is spent and the reset step itself keeps failing.
    pub fn engage(&mut self, trigger: &RecoveryTrigger, now: f64) -> Result<RecoveryPlan, RecoveryError> {
        if self.traversals > self.config.max_traversals {
            return Err(RecoveryError::ManualInterventionRequired {
                traversals: self.traversals,
            });
        }

        // Corruption can demand a higher entry rung than where the ladder sits.
        if trigger.entry_step() > self.step {
            self.step = trigger.entry_step();
        }

        self.engaged = true;
        tracing::info!(step = %self.step, %trigger, "recovery step engaged");
        self.recent.push_back(RecoveryAttempt {
            step: self.step,
            trigger: trigger.to_string(),
            at: now,
            cleared: None,
        });
        if self.recent.len() > self.config.recent_bound {
            self.recent.pop_front();
        }

        Ok(RecoveryPlan {
            step: self.step,
            actions: self.step_actions(trigger),
        })
    }

    /// Success check for the last engaged step: did the trigger clear?
    ///
    /// Clearing resets the ladder; failure falls through to the next step,
    /// wrapping into a new traversal (or a forced reset once the budget is
    /// spent).
    pub fn note_outcome(&mut self, cleared: bool) {
        if let Some(last) = self.recent.back_mut() {
            last.cleared = Some(cleared);
        }
        if cleared {
            tracing::info!(step = %self.step, "recovery succeeded, ladder reset");
            self.step = RecoveryStep::InPlaceFix;
            self.engaged = false;
            return;
        }
        match self.step.next() {
            Some(next) => {
                self.step = next;
            }
            None => {
                self.traversals += 1;
                self.step = if self.traversals >= self.config.max_traversals {
                    RecoveryStep::FullReset
                } else {
                    RecoveryStep::InPlaceFix
                };
                tracing::warn!(
                    traversals = self.traversals,
                    next = %self.step,
                    "full ladder traversal failed"
                );
            }
        }
    }

    /// Input-level actions for the current step.
    fn step_actions(&self, trigger: &RecoveryTrigger) -> Vec<Action> {
        match self.step {
            RecoveryStep::InPlaceFix => in_place_fix(trigger),
            RecoveryStep::NavigateToSafety => vec![Action::new(ActionKind::Navigate {
                destination: self.config.safe_location.clone(),
                mode: TravelMode::Cautious,
            })],
            // Performed by the core through the persistence collaborator.
            RecoveryStep::ReloadCheckpoint | RecoveryStep::FullReset => Vec::new(),
        }
    }
}

/// Kind-specific in-place fix: cancel spam for menu/dialogue stalls, an
/// alternate-direction probe for position deadlock, cancel-then-wait
/// otherwise.
fn in_place_fix(trigger: &RecoveryTrigger) -> Vec<Action> {
    match trigger {
        RecoveryTrigger::Softlock(SoftlockKind::PositionDeadlock) => vec![
            Action::new(ActionKind::Delegate {
                task: "alternate-direction probe".into(),
            }),
        ],
        RecoveryTrigger::Softlock(SoftlockKind::MenuLoop)
        | RecoveryTrigger::Softlock(SoftlockKind::DialogueSpam) => vec![
            Action::new(ActionKind::MenuOp { command: MenuCommand::Cancel }),
            Action::new(ActionKind::MenuOp { command: MenuCommand::Cancel }),
            Action::new(ActionKind::MenuOp { command: MenuCommand::Cancel }),
        ],
        _ => vec![
            Action::new(ActionKind::MenuOp { command: MenuCommand::Cancel }),
            Action::new(ActionKind::Wait { secs: 1.0 }).optional(),
        ],
    }
}
