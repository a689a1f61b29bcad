//! Core facade: the single tick-driven entry point.
//!
//! `Core` owns every subsystem and runs the per-tick pipeline in the
//! documented order: sampling (validator, softlock, spiral) → tier
//! computation → recovery pre-emption → reactive scan → layered planning.
//! The returned action list is executed either by the caller's own machinery
//! or by [`Core::execute`], which runs the action engine against the owned
//! collaborator set and feeds outcomes back into the confidence engine. No
//! panic or raw error crosses the `tick()` boundary; the only unrecoverable
//! result is `ManualInterventionRequired`.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ExecOutcome, ExecutionReport, Executor};
use crate::collab::CollaboratorSet;
use crate::config::CoreConfig;
use crate::confidence::{ConfidenceEngine, EscalationTier, Severity};
use crate::error::CoreResult;
use crate::goal::{Goal, GoalCatalog, GoalId, GoalStatus};
use crate::graph::GoalGraph;
use crate::planner::{reactive, ActiveLayer, Emergency, HierarchicalPlanner};
use crate::priority::PriorityCalculator;
use crate::recovery::{RecoveryAttempt, RecoveryManager, RecoveryStep, RecoveryTrigger};
use crate::snapshot::{ResourceKind, WorldSnapshot};
use crate::softlock::{SoftlockDetector, SoftlockEvent};
use crate::spiral::{intervention, DeathSpiralDetector, SpiralAlert};
use crate::validate::StateValidator;

/// High-severity validator findings in one snapshot that count as state
/// corruption; double that is severe corruption.
const CORRUPTION_FINDINGS: usize = 2;

/// What produced this tick's action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanSource {
    Reactive,
    Operational,
    Recovery(RecoveryStep),
    Idle,
}

impl std::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reactive => f.write_str("reactive"),
            Self::Operational => f.write_str("operational"),
            Self::Recovery(step) => write!(f, "recovery:{step}"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// One tick's result: the actions to execute and how the core got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub confidence: f64,
    pub tier: EscalationTier,
    pub source: PlanSource,
    pub goal_id: Option<GoalId>,
    pub actions: Vec<Action>,
    pub emergencies: Vec<Emergency>,
    pub softlocks: Vec<SoftlockEvent>,
    pub spirals: Vec<SpiralAlert>,
}

/// Compact view of one stacked goal for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalBrief {
    pub id: GoalId,
    pub description: String,
    pub status: String,
    pub base_priority: f64,
}

/// Diagnostic query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub confidence: f64,
    pub tier: EscalationTier,
    pub active_goal_stack: Vec<GoalBrief>,
    pub recent_recoveries: Vec<RecoveryAttempt>,
}

/// The goal-oriented planning and resilience core.
pub struct Core {
    catalog: Box<dyn GoalCatalog>,
    collab: CollaboratorSet,
    graph: GoalGraph,
    priority: PriorityCalculator,
    planner: HierarchicalPlanner,
    confidence: ConfidenceEngine,
    validator: StateValidator,
    softlock: SoftlockDetector,
    spiral: DeathSpiralDetector,
    recovery: RecoveryManager,
    executor: Executor,
    tick_count: u64,
    last_confidence: f64,
}

impl Core {
    /// Build a core from a validated configuration, a goal catalog, and the
    /// collaborator set.
    pub fn new(
        config: CoreConfig,
        catalog: Box<dyn GoalCatalog>,
        collab: CollaboratorSet,
    ) -> CoreResult<Self> {
        config.validate()?;
        tracing::info!(
            window = config.confidence_window_secs,
            stack_bound = config.goal_stack_bound,
            "initializing volition core"
        );
        Ok(Self {
            catalog,
            collab,
            graph: GoalGraph::with_capacity(config.goal_stack_bound),
            priority: PriorityCalculator::new(),
            planner: HierarchicalPlanner::new(config.planner),
            confidence: ConfidenceEngine::new(config.confidence_window_secs),
            validator: StateValidator::new(),
            softlock: SoftlockDetector::new(config.softlock),
            spiral: DeathSpiralDetector::new(config.spiral),
            recovery: RecoveryManager::new(config.recovery),
            executor: Executor::new(),
            tick_count: 0,
            last_confidence: 100.0,
        })
    }

    /// Push a goal from outside (quest detection, operator commands).
    ///
    /// Immediate-tier goals go through the reactive queue; everything else
    /// lands on the goal stack for the layered planner.
    pub fn inject_goal(&mut self, goal: Goal) {
        if goal.tier == crate::goal::GoalTier::Immediate {
            self.planner.inject(goal);
        } else {
            self.graph.push(goal);
        }
    }

    /// The single per-perception-cycle entry point.
    ///
    /// Returns the action list to execute and the current escalation tier.
    /// The only error that ever crosses this boundary is the terminal
    /// `ManualInterventionRequired`.
    pub fn tick(&mut self, snapshot: &WorldSnapshot) -> CoreResult<TickReport> {
        let now = snapshot.timestamp;
        self.tick_count += 1;
        self.sweep_finished_goals();

        // ── Sampling: validator → softlock → spiral ─────────────────────
        let findings = self.validator.validate(snapshot);
        for finding in &findings {
            tracing::warn!(severity = %finding.severity, detail = %finding.detail, "inconsistency");
            self.confidence.record_inconsistency(now, finding.severity);
        }
        let high_findings = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();

        self.softlock.record_position(now, snapshot.position);
        if let Some(menu) = self.collab.perception.latest_menu_state() {
            self.softlock.record_menu(now, menu);
        }
        if let Some(dialogue) = self.collab.perception.latest_dialogue() {
            self.softlock.record_dialogue(now, dialogue);
        }
        if let Some(battle) = self.collab.perception.latest_battle_state() {
            self.softlock.record_battle(now, battle);
        }
        let softlocks = self.softlock.detect(now);
        for _ in &softlocks {
            self.confidence.record_inconsistency(now, Severity::High);
        }

        self.spiral
            .sample(now, ResourceKind::Money, snapshot.resources.money as f64);
        self.spiral.sample(
            now,
            ResourceKind::Consumables,
            f64::from(snapshot.resources.consumables),
        );
        self.spiral.sample(
            now,
            ResourceKind::MoveUses,
            f64::from(snapshot.resources.move_uses),
        );
        self.spiral.sample(
            now,
            ResourceKind::MeanHealth,
            f64::from(snapshot.mean_health()) * 100.0,
        );
        let spirals = self.spiral.detect();
        for alert in &spirals {
            self.planner.inject(intervention(alert));
        }

        // ── Tier ────────────────────────────────────────────────────────
        let (score, tier) = self.confidence.update(now);
        self.last_confidence = score;

        // ── Recovery success check and pre-emption ──────────────────────
        if self.recovery.engaged() {
            let cleared = !tier.triggers_recovery() && softlocks.is_empty();
            self.recovery.note_outcome(cleared);
        }

        let trigger = if high_findings >= CORRUPTION_FINDINGS {
            Some(RecoveryTrigger::StateCorruption {
                severe: high_findings >= CORRUPTION_FINDINGS * 2,
            })
        } else if let Some(event) = softlocks.first() {
            Some(RecoveryTrigger::Softlock(event.kind))
        } else if tier.triggers_recovery() {
            Some(RecoveryTrigger::Escalation(tier))
        } else {
            None
        };

        if let Some(trigger) = trigger {
            let plan = self.recovery.engage(&trigger, now)?;
            self.perform_persistence_step(plan.step, now);
            return Ok(TickReport {
                tick: self.tick_count,
                confidence: score,
                tier,
                source: PlanSource::Recovery(plan.step),
                goal_id: None,
                actions: plan.actions,
                emergencies: Vec::new(),
                softlocks,
                spirals,
            });
        }

        // ── Planning: Reactive first, then the layered stack ────────────
        let output = self.planner.plan(
            self.tick_count,
            now,
            snapshot,
            &mut self.graph,
            self.catalog.as_ref(),
            &self.priority,
            self.collab.combat.as_ref(),
            self.collab.inventory.as_ref(),
            tier,
        );

        let source = match output.layer {
            ActiveLayer::Reactive => PlanSource::Reactive,
            ActiveLayer::Operational => PlanSource::Operational,
            ActiveLayer::Idle => PlanSource::Idle,
        };
        Ok(TickReport {
            tick: self.tick_count,
            confidence: score,
            tier,
            source,
            goal_id: output.goal_id,
            actions: output.actions,
            emergencies: output.emergencies,
            softlocks,
            spirals,
        })
    }

    /// Run a tick's action list through the execution engine.
    ///
    /// Outcomes update the goal's status, the per-category success history,
    /// and the confidence engine. A mid-list emergency cancels at the next
    /// action boundary and leaves the goal in progress.
    pub fn execute(&mut self, goal_id: Option<GoalId>, actions: &[Action], now: f64) -> ExecutionReport {
        let report = self.executor.execute(
            &mut self.collab,
            goal_id,
            actions,
            now,
            &mut self.confidence,
            &|collab| reactive::live_emergency(collab.inventory.as_ref(), collab.perception.as_ref()),
        );

        if let Some(id) = goal_id {
            match &report.outcome {
                ExecOutcome::Completed => self.settle_goal(id, true, "completed", now),
                ExecOutcome::Aborted { action_index, reason } => {
                    tracing::warn!(goal = %id, action_index, %reason, "goal aborted");
                    self.confidence.record_inconsistency(now, Severity::Medium);
                    self.settle_goal(id, false, reason, now);
                }
                ExecOutcome::Cancelled { .. } => {}
            }
        }
        report
    }

    /// Feedback channel for callers running actions through their own
    /// machinery instead of [`Core::execute`].
    pub fn report_outcome(&mut self, goal_id: GoalId, success: bool, detail: &str, now: f64) {
        self.confidence.record_action(now, success);
        self.settle_goal(goal_id, success, detail, now);
    }

    /// Diagnostic summary: confidence, tier, stack, recent recoveries.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            confidence: self.last_confidence,
            tier: self.confidence.tier(),
            active_goal_stack: self
                .graph
                .iter()
                .filter(|g| !g.status.is_terminal())
                .map(|g| GoalBrief {
                    id: g.id,
                    description: g.description.clone(),
                    status: g.status.label().into(),
                    base_priority: g.base_priority,
                })
                .collect(),
            recent_recoveries: self.recovery.recent().cloned().collect(),
        }
    }

    /// Serializable success history, for persistence by the caller.
    pub fn success_history(&self) -> &crate::priority::SuccessHistory {
        &self.priority.history
    }

    /// Resolve a goal's outcome: status transition, success history, progress.
    fn settle_goal(&mut self, id: GoalId, success: bool, detail: &str, now: f64) {
        let Some(goal) = self.graph.get_mut(id) else {
            return;
        };
        let key = goal.category.key();
        self.priority.history.record(key, success);

        if goal.status == GoalStatus::Pending {
            let _ = goal.start();
        }
        let result = if success {
            self.confidence.record_progress(now, 1.0);
            goal.complete()
        } else {
            goal.fail(detail)
        };
        if let Err(err) = result {
            tracing::debug!(goal = %id, %err, "goal already settled");
        }
    }

    /// Reload/reset steps go straight through the persistence collaborator;
    /// the outcome lands in the confidence window like any other action.
    fn perform_persistence_step(&mut self, step: RecoveryStep, now: f64) {
        match step {
            RecoveryStep::ReloadCheckpoint => {
                let result = match self.collab.persistence.latest_checkpoint() {
                    Some(id) => self.collab.persistence.load_checkpoint(&id),
                    None => {
                        tracing::warn!("no checkpoint available to reload");
                        Err(crate::collab::CollabError::Unavailable {
                            operation: "load_checkpoint".into(),
                            message: "no checkpoint recorded".into(),
                        })
                    }
                };
                match result {
                    Ok(()) => self.confidence.record_action(now, true),
                    Err(err) => {
                        tracing::error!(%err, "checkpoint reload failed");
                        self.confidence.record_action(now, false);
                    }
                }
            }
            RecoveryStep::FullReset => match self.collab.persistence.reset_system() {
                Ok(()) => self.confidence.record_action(now, true),
                Err(err) => {
                    tracing::error!(%err, "full reset failed");
                    self.confidence.record_action(now, false);
                }
            },
            RecoveryStep::InPlaceFix | RecoveryStep::NavigateToSafety => {}
        }
    }

    /// Completed and failed goals are popped from the stack each tick.
    fn sweep_finished_goals(&mut self) {
        let finished: Vec<GoalId> = self
            .graph
            .iter()
            .filter(|g| g.status.is_terminal())
            .map(|g| g.id)
            .collect();
        for id in finished {
            self.graph.remove(id);
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("tick_count", &self.tick_count)
            .field("confidence", &self.last_confidence)
            .field("goals", &self.graph.len())
            .finish_non_exhaustive()
    }
}
