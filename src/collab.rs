//! External collaborator interfaces.
//!
//! The core consumes perception, navigation, combat, inventory, and
//! persistence through these traits and never reaches past them. All calls
//! are synchronous with explicit timeouts supplied by the caller; a call that
//! exceeds its timeout must return [`CollabError::Timeout`], never hang. The
//! concrete implementations live outside the core (emulator bindings, test
//! scripts, the bundled simulator).

use miette::Diagnostic;
use thiserror::Error;

use crate::goal::{Goal, TravelMode};
use crate::snapshot::{BattleObservation, Position, ResourceSummary};

/// Errors surfaced by collaborator calls.
#[derive(Debug, Error, Diagnostic)]
pub enum CollabError {
    #[error("collaborator call timed out: {operation} after {timeout_secs}s")]
    #[diagnostic(
        code(volition::collab::timeout),
        help(
            "The call exceeded its budget and is treated as a failed action. \
             If this repeats, the repair policy will retry once and then \
             skip or abort per the action's optionality."
        )
    )]
    Timeout { operation: String, timeout_secs: f64 },

    #[error("collaborator unavailable: {operation} — {message}")]
    #[diagnostic(
        code(volition::collab::unavailable),
        help("The subsystem is not ready. Check that the emulator/driver side is running.")
    )]
    Unavailable { operation: String, message: String },

    #[error("collaborator rejected {operation}: {message}")]
    #[diagnostic(
        code(volition::collab::rejected),
        help("The request was understood but refused (blocked path, missing item, locked menu).")
    )]
    Rejected { operation: String, message: String },
}

/// Convenience alias for collaborator call results.
pub type CollabResult<T> = std::result::Result<T, CollabError>;

/// A menu manipulation the input driver understands.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MenuCommand {
    /// Open a named top-level menu.
    Open(String),
    /// Select a named entry in the open menu.
    Select(String),
    /// Use a named item, optionally on a party member.
    UseItem { item: String, target: Option<String> },
    /// Back out one menu level.
    Cancel,
}

impl std::fmt::Display for MenuCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(name) => write!(f, "open {name}"),
            Self::Select(name) => write!(f, "select {name}"),
            Self::UseItem { item, target: Some(t) } => write!(f, "use {item} on {t}"),
            Self::UseItem { item, target: None } => write!(f, "use {item}"),
            Self::Cancel => f.write_str("cancel"),
        }
    }
}

/// Overworld movement.
pub trait Navigator {
    /// Move to a named destination. Blocks until arrival, failure, or timeout.
    fn navigate(&mut self, destination: &str, mode: TravelMode, timeout_secs: f64) -> CollabResult<()>;

    /// Current overworld position.
    fn current_position(&self) -> Position;
}

/// Battle system access.
pub trait Combat {
    /// Latest battle observation, if a battle is in progress.
    fn battle_outcome(&self) -> Option<BattleObservation>;

    /// Opaque failure probability in [0, 1] for a goal. The estimator
    /// (party-strength deltas and the rest) lives entirely on this side of
    /// the boundary.
    fn estimate_failure_probability(&self, goal: &Goal) -> f64;
}

/// Inventory and resource queries.
pub trait InventoryProvider {
    /// Aggregate resource figures.
    fn resources(&self) -> ResourceSummary;

    /// Count of a named item.
    fn item_count(&self, item: &str) -> u32;
}

/// Perception-side state queries.
pub trait PerceptionFeed {
    fn latest_menu_state(&self) -> Option<String>;
    fn latest_dialogue(&self) -> Option<String>;
    fn latest_battle_state(&self) -> Option<BattleObservation>;
}

/// Checkpointing and system reset. Persisted layout is owned by the
/// implementor; the core only calls these opaquely.
pub trait Persistence {
    /// Save a checkpoint, returning its id.
    fn save_checkpoint(&mut self) -> CollabResult<String>;

    /// Restore a checkpoint by id.
    fn load_checkpoint(&mut self, id: &str) -> CollabResult<()>;

    /// Most recent checkpoint id, if any exist.
    fn latest_checkpoint(&self) -> Option<String>;

    /// Full system reset.
    fn reset_system(&mut self) -> CollabResult<()>;
}

/// Low-level input execution for everything that is not navigation.
pub trait InputDriver {
    /// Interact with a named object or NPC in front of the agent.
    fn interact(&mut self, object: &str, timeout_secs: f64) -> CollabResult<()>;

    /// Perform one menu manipulation.
    fn menu_op(&mut self, command: &MenuCommand, timeout_secs: f64) -> CollabResult<()>;

    /// Idle for the given duration.
    fn wait(&mut self, secs: f64) -> CollabResult<()>;

    /// Hand a named task to an external routine (pathfinder macro,
    /// shop script) and block on its completion.
    fn delegate(&mut self, task: &str, timeout_secs: f64) -> CollabResult<()>;
}

/// The full set of collaborators the core needs, bundled for ownership.
pub struct CollaboratorSet {
    pub navigator: Box<dyn Navigator>,
    pub combat: Box<dyn Combat>,
    pub inventory: Box<dyn InventoryProvider>,
    pub perception: Box<dyn PerceptionFeed>,
    pub persistence: Box<dyn Persistence>,
    pub input: Box<dyn InputDriver>,
}

impl std::fmt::Debug for CollaboratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_command_display() {
        assert_eq!(MenuCommand::Open("ITEMS".into()).to_string(), "open ITEMS");
        assert_eq!(
            MenuCommand::UseItem {
                item: "potion".into(),
                target: Some("lead".into())
            }
            .to_string(),
            "use potion on lead"
        );
        assert_eq!(MenuCommand::Cancel.to_string(), "cancel");
    }

    #[test]
    fn timeout_error_carries_budget() {
        let err = CollabError::Timeout {
            operation: "navigate".into(),
            timeout_secs: 5.0,
        };
        assert!(format!("{err}").contains("navigate"));
    }
}
