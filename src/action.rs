//! Goal-to-action mapping and the execution engine.
//!
//! Mapping is a pure decomposition keyed by [`GoalCategory`]: an exhaustive
//! match, no search. Execution runs the list sequentially through the
//! collaborator set with per-action timeouts and the repair policy: retry the
//! failing action once, skip it if optional, otherwise abort the goal. Skips
//! and aborts carry goal id, action index, and failure reason so the
//! confidence engine's inconsistency counter has something to chew on.

use serde::{Deserialize, Serialize};

use crate::collab::{CollabResult, CollaboratorSet, MenuCommand};
use crate::confidence::ConfidenceEngine;
use crate::error::PlanError;
use crate::goal::{Goal, GoalCategory, GoalId, TravelMode};

/// One concrete command for a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    Navigate { destination: String, mode: TravelMode },
    Interact { object: String },
    MenuOp { command: MenuCommand },
    Wait { secs: f64 },
    Delegate { task: String },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Interact { .. } => "interact",
            Self::MenuOp { .. } => "menu-op",
            Self::Wait { .. } => "wait",
            Self::Delegate { .. } => "delegate",
        }
    }
}

/// An executable step with its repair metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Skipped (after the one retry) instead of aborting the goal.
    pub optional: bool,
    pub timeout_secs: f64,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        let timeout_secs = match &kind {
            ActionKind::Navigate { .. } => 30.0,
            ActionKind::Interact { .. } => 5.0,
            ActionKind::MenuOp { .. } => 3.0,
            ActionKind::Wait { secs } => secs + 1.0,
            ActionKind::Delegate { .. } => 60.0,
        };
        Self {
            kind,
            optional: false,
            timeout_secs,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

fn navigate(destination: &str, mode: TravelMode) -> Action {
    Action::new(ActionKind::Navigate {
        destination: destination.into(),
        mode,
    })
}

fn interact(object: &str) -> Action {
    Action::new(ActionKind::Interact { object: object.into() })
}

fn menu(command: MenuCommand) -> Action {
    Action::new(ActionKind::MenuOp { command })
}

fn delegate(task: String) -> Action {
    Action::new(ActionKind::Delegate { task })
}

/// Decompose a goal into its ordered action list.
///
/// Exhaustive over [`GoalCategory`]; `Freeform` has no mapping and fails
/// immediately with [`PlanError::UnmappableGoal`].
pub fn map_goal(goal: &Goal) -> Result<Vec<Action>, PlanError> {
    let actions = match &goal.category {
        GoalCategory::Travel { destination, mode } => {
            vec![navigate(destination, *mode)]
        }
        GoalCategory::Battle { opponent } => vec![
            navigate(opponent, TravelMode::Direct),
            interact(opponent),
            delegate(format!("battle {opponent}")),
        ],
        GoalCategory::Acquire { item, quantity } => vec![
            navigate("mart", TravelMode::Direct),
            interact("clerk"),
            menu(MenuCommand::Open("BUY".into())),
            delegate(format!("purchase {quantity}x {item}")),
        ],
        GoalCategory::Heal { location } => vec![
            navigate(
                location.as_deref().unwrap_or("free-heal"),
                TravelMode::Cautious,
            ),
            interact("attendant"),
            Action::new(ActionKind::Wait { secs: 2.0 }).optional(),
        ],
        GoalCategory::Train { target_level } => vec![
            navigate("training-route", TravelMode::Direct),
            delegate(format!("train lead to level {target_level}")),
        ],
        GoalCategory::Liquidate { keep_essentials } => vec![
            navigate("mart", TravelMode::Direct),
            interact("clerk"),
            menu(MenuCommand::Open("SELL".into())),
            delegate(if *keep_essentials {
                "sell non-essential items".into()
            } else {
                "sell entire inventory".into()
            }),
        ],
        GoalCategory::Conserve { resource } => {
            vec![delegate(format!("enable {resource} conservation"))]
        }
        GoalCategory::Regroup => vec![
            navigate("safe-haven", TravelMode::Cautious),
            interact("attendant"),
            delegate("reorganize party roster".into()),
        ],
        GoalCategory::Checkpoint => vec![
            menu(MenuCommand::Open("SAVE".into())),
            menu(MenuCommand::Select("CONFIRM".into())),
        ],
        GoalCategory::Freeform { .. } => {
            return Err(PlanError::UnmappableGoal {
                goal_id: goal.id.get(),
                category: goal.category.key().into(),
            });
        }
    };
    Ok(actions)
}

// ---------------------------------------------------------------------------
// Execution engine
// ---------------------------------------------------------------------------

/// Why an execution run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecOutcome {
    /// Every non-skipped action completed.
    Completed,
    /// A required action failed after its retry; the goal is abandoned.
    Aborted { action_index: usize, reason: String },
    /// A higher-severity emergency pre-empted the list at an action boundary.
    Cancelled { action_index: usize, reason: String },
}

/// What happened when an action list ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub goal_id: Option<GoalId>,
    /// Actions that completed successfully.
    pub completed: usize,
    /// Indices skipped under the repair policy.
    pub skipped: Vec<usize>,
    pub outcome: ExecOutcome,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == ExecOutcome::Completed
    }
}

/// Sequential action runner with the retry/skip/abort repair policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Run `actions` in order against the collaborator set.
    ///
    /// `cancel_check` runs at every action boundary (never mid-action); a
    /// `Some` return abandons the rest of the list. Outcomes and a final
    /// progress sample are recorded into the confidence engine.
    pub fn execute(
        &self,
        collab: &mut CollaboratorSet,
        goal_id: Option<GoalId>,
        actions: &[Action],
        now: f64,
        confidence: &mut ConfidenceEngine,
        cancel_check: &dyn Fn(&CollaboratorSet) -> Option<String>,
    ) -> ExecutionReport {
        let mut completed = 0usize;
        let mut skipped = Vec::new();
        let mut outcome = ExecOutcome::Completed;

        for (index, action) in actions.iter().enumerate() {
            if let Some(reason) = cancel_check(collab) {
                tracing::warn!(index, %reason, "action list cancelled at boundary");
                outcome = ExecOutcome::Cancelled {
                    action_index: index,
                    reason,
                };
                break;
            }

            match Self::run_with_retry(collab, action) {
                Ok(()) => {
                    confidence.record_action(now, true);
                    completed += 1;
                }
                Err(err) => {
                    confidence.record_action(now, false);
                    if action.optional {
                        tracing::warn!(
                            index,
                            kind = action.kind.label(),
                            %err,
                            "optional action failed twice, skipping"
                        );
                        skipped.push(index);
                    } else {
                        tracing::warn!(
                            index,
                            kind = action.kind.label(),
                            %err,
                            "required action failed twice, aborting goal"
                        );
                        outcome = ExecOutcome::Aborted {
                            action_index: index,
                            reason: err.to_string(),
                        };
                        break;
                    }
                }
            }
        }

        if !actions.is_empty() {
            confidence.record_progress(now, completed as f32 / actions.len() as f32);
        }

        ExecutionReport {
            goal_id,
            completed,
            skipped,
            outcome,
        }
    }

    /// One attempt plus one retry.
    fn run_with_retry(collab: &mut CollaboratorSet, action: &Action) -> CollabResult<()> {
        match Self::dispatch(collab, action) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::debug!(kind = action.kind.label(), %first, "retrying failed action");
                Self::dispatch(collab, action)
            }
        }
    }

    fn dispatch(collab: &mut CollaboratorSet, action: &Action) -> CollabResult<()> {
        match &action.kind {
            ActionKind::Navigate { destination, mode } => {
                collab.navigator.navigate(destination, *mode, action.timeout_secs)
            }
            ActionKind::Interact { object } => collab.input.interact(object, action.timeout_secs),
            ActionKind::MenuOp { command } => collab.input.menu_op(command, action.timeout_secs),
            ActionKind::Wait { secs } => collab.input.wait(*secs),
            ActionKind::Delegate { task } => collab.input.delegate(task, action.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{
        CollabError, Combat, InputDriver, InventoryProvider, Navigator, PerceptionFeed, Persistence,
    };
    use crate::goal::GoalTier;
    use crate::snapshot::{BattleObservation, Position, ResourceSummary};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared scripted state for the mock collaborators.
    #[derive(Default)]
    struct MockState {
        /// Fail the next N required calls.
        fail_next: u32,
        calls: Vec<String>,
    }

    #[derive(Clone)]
    struct Mock(Rc<RefCell<MockState>>);

    impl Mock {
        fn attempt(&self, label: &str) -> CollabResult<()> {
            let mut state = self.0.borrow_mut();
            state.calls.push(label.to_string());
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(CollabError::Rejected {
                    operation: label.into(),
                    message: "scripted failure".into(),
                });
            }
            Ok(())
        }
    }

    impl Navigator for Mock {
        fn navigate(&mut self, destination: &str, _: TravelMode, _: f64) -> CollabResult<()> {
            self.attempt(&format!("navigate:{destination}"))
        }
        fn current_position(&self) -> Position {
            Position { x: 0, y: 0, map_id: 0 }
        }
    }

    impl Combat for Mock {
        fn battle_outcome(&self) -> Option<BattleObservation> {
            None
        }
        fn estimate_failure_probability(&self, _: &Goal) -> f64 {
            0.0
        }
    }

    impl InventoryProvider for Mock {
        fn resources(&self) -> ResourceSummary {
            ResourceSummary::default()
        }
        fn item_count(&self, _: &str) -> u32 {
            0
        }
    }

    impl PerceptionFeed for Mock {
        fn latest_menu_state(&self) -> Option<String> {
            None
        }
        fn latest_dialogue(&self) -> Option<String> {
            None
        }
        fn latest_battle_state(&self) -> Option<BattleObservation> {
            None
        }
    }

    impl Persistence for Mock {
        fn save_checkpoint(&mut self) -> CollabResult<String> {
            Ok("cp-0".into())
        }
        fn load_checkpoint(&mut self, _: &str) -> CollabResult<()> {
            Ok(())
        }
        fn latest_checkpoint(&self) -> Option<String> {
            Some("cp-0".into())
        }
        fn reset_system(&mut self) -> CollabResult<()> {
            Ok(())
        }
    }

    impl InputDriver for Mock {
        fn interact(&mut self, object: &str, _: f64) -> CollabResult<()> {
            self.attempt(&format!("interact:{object}"))
        }
        fn menu_op(&mut self, command: &MenuCommand, _: f64) -> CollabResult<()> {
            self.attempt(&format!("menu:{command}"))
        }
        fn wait(&mut self, _: f64) -> CollabResult<()> {
            self.attempt("wait")
        }
        fn delegate(&mut self, task: &str, _: f64) -> CollabResult<()> {
            self.attempt(&format!("delegate:{task}"))
        }
    }

    fn mock_set() -> (CollaboratorSet, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        let mock = Mock(state.clone());
        let set = CollaboratorSet {
            navigator: Box::new(mock.clone()),
            combat: Box::new(mock.clone()),
            inventory: Box::new(mock.clone()),
            perception: Box::new(mock.clone()),
            persistence: Box::new(mock.clone()),
            input: Box::new(mock),
        };
        (set, state)
    }

    fn goal(category: GoalCategory) -> Goal {
        Goal::new(GoalId::new(1).unwrap(), GoalTier::ShortTerm, "test", category)
    }

    fn no_cancel(_: &CollaboratorSet) -> Option<String> {
        None
    }

    #[test]
    fn mapping_is_exhaustive_for_concrete_categories() {
        let concrete = [
            GoalCategory::Travel {
                destination: "cove-town".into(),
                mode: TravelMode::Direct,
            },
            GoalCategory::Battle { opponent: "rival".into() },
            GoalCategory::Acquire { item: "potion".into(), quantity: 3 },
            GoalCategory::Heal { location: None },
            GoalCategory::Train { target_level: 20 },
            GoalCategory::Liquidate { keep_essentials: true },
            GoalCategory::Conserve {
                resource: crate::snapshot::ResourceKind::Money,
            },
            GoalCategory::Regroup,
            GoalCategory::Checkpoint,
        ];
        for category in concrete {
            let actions = map_goal(&goal(category)).unwrap();
            assert!(!actions.is_empty());
        }
    }

    #[test]
    fn freeform_goals_are_unmappable() {
        let err = map_goal(&goal(GoalCategory::Freeform { text: "???".into() })).unwrap_err();
        assert!(matches!(err, PlanError::UnmappableGoal { goal_id: 1, .. }));
    }

    #[test]
    fn clean_run_completes_all_actions() {
        let (mut set, _) = mock_set();
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = map_goal(&goal(GoalCategory::Heal { location: None })).unwrap();

        let report = Executor::new().execute(
            &mut set,
            Some(GoalId::new(1).unwrap()),
            &actions,
            1.0,
            &mut confidence,
            &no_cancel,
        );
        assert!(report.succeeded());
        assert_eq!(report.completed, actions.len());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let (mut set, state) = mock_set();
        state.borrow_mut().fail_next = 1;
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = vec![Action::new(ActionKind::Interact { object: "sign".into() })];

        let report = Executor::new().execute(
            &mut set,
            None,
            &actions,
            1.0,
            &mut confidence,
            &no_cancel,
        );
        assert!(report.succeeded());
        // First attempt failed, retry succeeded: two calls recorded.
        assert_eq!(state.borrow().calls.len(), 2);
    }

    #[test]
    fn optional_action_is_skipped_after_retry() {
        let (mut set, state) = mock_set();
        state.borrow_mut().fail_next = 2;
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = vec![
            Action::new(ActionKind::Wait { secs: 1.0 }).optional(),
            Action::new(ActionKind::Interact { object: "sign".into() }),
        ];

        let report = Executor::new().execute(
            &mut set,
            None,
            &actions,
            1.0,
            &mut confidence,
            &no_cancel,
        );
        assert!(report.succeeded());
        assert_eq!(report.skipped, vec![0]);
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn required_failure_aborts_with_detail() {
        let (mut set, state) = mock_set();
        state.borrow_mut().fail_next = 2;
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = vec![
            Action::new(ActionKind::Interact { object: "door".into() }),
            Action::new(ActionKind::Wait { secs: 1.0 }),
        ];

        let report = Executor::new().execute(
            &mut set,
            Some(GoalId::new(7).unwrap()),
            &actions,
            1.0,
            &mut confidence,
            &no_cancel,
        );
        match &report.outcome {
            ExecOutcome::Aborted { action_index, reason } => {
                assert_eq!(*action_index, 0);
                assert!(reason.contains("scripted failure"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        // The second action never ran.
        assert_eq!(report.completed, 0);
    }

    #[test]
    fn cancellation_happens_at_action_boundaries() {
        let (mut set, state) = mock_set();
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = vec![
            Action::new(ActionKind::Wait { secs: 1.0 }),
            Action::new(ActionKind::Wait { secs: 1.0 }),
        ];

        // Cancel as soon as one call has gone through.
        let cancel = move |_: &CollaboratorSet| -> Option<String> {
            (!state.borrow().calls.is_empty()).then(|| "hp crashed".to_string())
        };
        let report = Executor::new().execute(
            &mut set,
            None,
            &actions,
            1.0,
            &mut confidence,
            &cancel,
        );
        assert_eq!(
            report.outcome,
            ExecOutcome::Cancelled {
                action_index: 1,
                reason: "hp crashed".into()
            }
        );
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn failed_actions_depress_confidence() {
        let (mut set, state) = mock_set();
        state.borrow_mut().fail_next = 4;
        let mut confidence = ConfidenceEngine::new(60.0);
        let actions = vec![Action::new(ActionKind::Interact { object: "wall".into() })];

        Executor::new().execute(&mut set, None, &actions, 1.0, &mut confidence, &no_cancel);
        assert!(confidence.score(1.0) < 100.0);
    }
}
