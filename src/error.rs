//! Rich diagnostic error types for the volition core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know exactly what went wrong
//! and how to fix it. Only [`RecoveryError::ManualInterventionRequired`] is
//! terminal; every other condition is recovered inside the core.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the volition core.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collab(#[from] crate::collab::CollabError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Goal errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GoalError {
    #[error("illegal status transition for {goal_id}: {from} → {to}")]
    #[diagnostic(
        code(volition::goal::illegal_transition),
        help(
            "Goals move Pending → InProgress → Completed/Failed only. \
             Re-activate a finished goal by pushing a fresh copy instead."
        )
    )]
    IllegalTransition {
        goal_id: u64,
        from: String,
        to: String,
    },
}

// ---------------------------------------------------------------------------
// Goal-graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("prerequisite edge {prerequisite} → {dependent} would create a cycle")]
    #[diagnostic(
        code(volition::graph::cycle_rejected),
        help(
            "The goal graph must stay acyclic. The edge was rejected and the \
             graph is unchanged — check the catalog's prerequisite lists for \
             mutually-dependent goals."
        )
    )]
    CycleRejected { prerequisite: u64, dependent: u64 },

    #[error("goal not found in the graph: {goal_id}")]
    #[diagnostic(
        code(volition::graph::goal_not_found),
        help("Push the goal first, or check the id against `GoalGraph::iter()`.")
    )]
    GoalNotFound { goal_id: u64 },
}

// ---------------------------------------------------------------------------
// Planning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("goal {goal_id} has no action mapping (category: {category})")]
    #[diagnostic(
        code(volition::plan::unmappable_goal),
        help(
            "Freeform goals must be classified into a concrete category before \
             they can be executed. The goal is marked Failed; classify injected \
             quest text at the dialogue boundary."
        )
    )]
    UnmappableGoal { goal_id: u64, category: String },
}

// ---------------------------------------------------------------------------
// Recovery errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RecoveryError {
    #[error("manual intervention required: recovery ladder exhausted after {traversals} traversals")]
    #[diagnostic(
        code(volition::recovery::manual_intervention),
        help(
            "Every automated recovery step, including a full system reset, \
             failed to clear the triggering condition. A human must inspect \
             the emulator/world state before the agent can continue."
        )
    )]
    ManualInterventionRequired { traversals: u32 },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(volition::config::io),
        help("Check that the path exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(volition::config::parse),
        help("The file must be valid TOML matching the CoreConfig schema.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(volition::config::invalid),
        help("Check the CoreConfig field ranges. {message}")
    )]
    Invalid { message: String },
}

/// Convenience alias for functions returning volition results.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_core_error() {
        let err = GraphError::CycleRejected {
            prerequisite: 1,
            dependent: 2,
        };
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Graph(GraphError::CycleRejected { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = PlanError::UnmappableGoal {
            goal_id: 42,
            category: "freeform".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("42"));
        assert!(msg.contains("freeform"));
    }

    #[test]
    fn manual_intervention_reports_traversals() {
        let err = RecoveryError::ManualInterventionRequired { traversals: 5 };
        assert!(format!("{err}").contains('5'));
    }
}
