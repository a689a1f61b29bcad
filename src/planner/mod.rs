//! Hierarchical planner: four layers, four cadences, one output.
//!
//! Strategic (~1000 ticks) orders milestones along the critical path;
//! Tactical (tens of ticks) expands the active milestone into sub-goals;
//! Operational (every few ticks) turns the top-priority goal into actions;
//! Reactive (every tick) pre-empts everything when an emergency predicate
//! fires. The escalation tier gates how much of the stack is allowed to run:
//! PlanSimplification drops strategic re-planning and lookahead,
//! EmergencyProtocol leaves only Reactive plus one fixed recovery goal, and
//! ResetCondition yields the tick to the recovery manager entirely.

pub mod reactive;
pub mod strategic;
pub mod tactical;

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::action::{map_goal, Action};
use crate::collab::{Combat, InventoryProvider};
use crate::confidence::EscalationTier;
use crate::goal::{Goal, GoalCatalog, GoalCategory, GoalId, GoalStatus, GoalTier};
use crate::graph::GoalGraph;
use crate::priority::{total_order, PriorityCalculator, ScoreContext};
use crate::snapshot::WorldSnapshot;

pub use reactive::{Emergency, EmergencyKind};

/// Id of the single fixed recovery goal permitted at EmergencyProtocol.
const EMERGENCY_GOAL_RAW: u64 = 0xC001;

/// Re-planning cadences, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub strategic_cadence: u64,
    pub tactical_cadence: u64,
    pub operational_cadence: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            strategic_cadence: 1000,
            tactical_cadence: 50,
            operational_cadence: 10,
        }
    }
}

/// Which layer produced this tick's actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLayer {
    Reactive,
    Operational,
    /// Nothing to do (no goals, or planning disabled at this tier).
    Idle,
}

impl ActiveLayer {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reactive => "reactive",
            Self::Operational => "operational",
            Self::Idle => "idle",
        }
    }
}

impl std::fmt::Display for ActiveLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One tick's planning result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub layer: ActiveLayer,
    pub goal_id: Option<GoalId>,
    pub actions: Vec<Action>,
    /// Emergency predicates that fired this tick.
    pub emergencies: Vec<Emergency>,
}

impl PlanOutput {
    fn idle(emergencies: Vec<Emergency>) -> Self {
        Self {
            layer: ActiveLayer::Idle,
            goal_id: None,
            actions: Vec::new(),
            emergencies,
        }
    }
}

/// The four-layer planner.
#[derive(Debug)]
pub struct HierarchicalPlanner {
    config: PlannerConfig,
    /// Reactive-layer goals injected from outside (spiral interventions,
    /// quest detection). Drained one per tick ahead of operational planning.
    injected: VecDeque<Goal>,
    milestones: Vec<GoalId>,
    /// Milestones already expanded tactically.
    expanded: BTreeSet<GoalId>,
    last_strategic: Option<u64>,
    last_tactical: Option<u64>,
    last_operational: Option<u64>,
}

impl HierarchicalPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            injected: VecDeque::new(),
            milestones: Vec::new(),
            expanded: BTreeSet::new(),
            last_strategic: None,
            last_tactical: None,
            last_operational: None,
        }
    }

    /// Queue a goal for the reactive layer (interventions, injected quests).
    pub fn inject(&mut self, goal: Goal) {
        tracing::info!(goal = %goal.id, desc = %goal.description, "goal injected");
        self.injected.push_back(goal);
    }

    /// Current strategic milestone ordering (diagnostics).
    pub fn milestones(&self) -> &[GoalId] {
        &self.milestones
    }

    /// Run one planning pass. Reactive always goes first; the remaining
    /// layers run only as their cadence comes due and the tier permits.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        &mut self,
        tick: u64,
        now: f64,
        snapshot: &WorldSnapshot,
        graph: &mut GoalGraph,
        catalog: &dyn GoalCatalog,
        priority: &PriorityCalculator,
        combat: &dyn Combat,
        inventory: &dyn InventoryProvider,
        tier: EscalationTier,
    ) -> PlanOutput {
        // ── Reactive ────────────────────────────────────────────────────
        let emergencies = reactive::scan(snapshot);
        if !emergencies.is_empty() {
            tracing::warn!(kind = %emergencies[0].kind, "reactive interrupt");
            let actions = reactive::interrupt_actions(&emergencies);
            return PlanOutput {
                layer: ActiveLayer::Reactive,
                goal_id: None,
                actions,
                emergencies,
            };
        }

        // ── Tier gating ─────────────────────────────────────────────────
        if !tier.allows_operational() {
            return PlanOutput::idle(emergencies);
        }

        // Injected reactive goals run at every tier that still plans at all.
        if let Some(output) = self.drain_injected(graph) {
            return output;
        }
        if tier == EscalationTier::EmergencyProtocol {
            return self.fixed_recovery_goal(graph);
        }

        // ── Strategic ───────────────────────────────────────────────────
        if tier.allows_strategic() && self.due(self.last_strategic, tick, self.config.strategic_cadence) {
            graph.resolve_dependencies(catalog);
            self.milestones = strategic::plan_milestones(graph);
            self.last_strategic = Some(tick);
        }

        // ── Tactical ────────────────────────────────────────────────────
        if tier.allows_lookahead() && self.due(self.last_tactical, tick, self.config.tactical_cadence) {
            self.expand_active_milestone(snapshot, graph, inventory);
            self.last_tactical = Some(tick);
        }

        // ── Operational ─────────────────────────────────────────────────
        if !self.due(self.last_operational, tick, self.config.operational_cadence) {
            return PlanOutput::idle(emergencies);
        }
        self.last_operational = Some(tick);
        self.select_and_map(now, graph, priority, combat)
    }

    fn due(&self, last: Option<u64>, tick: u64, cadence: u64) -> bool {
        match last {
            None => true,
            Some(last) => tick.saturating_sub(last) >= cadence,
        }
    }

    /// Push and plan the oldest injected goal, if any.
    fn drain_injected(&mut self, graph: &mut GoalGraph) -> Option<PlanOutput> {
        while let Some(goal) = self.injected.pop_front() {
            let id = goal.id;
            // A finished earlier injection with the same id would swallow the
            // merge; clear it so the fresh intervention gets a clean slate.
            if graph.get(id).is_some_and(|g| g.status.is_terminal()) {
                graph.remove(id);
            }
            graph.push(goal);
            if let Some(goal) = graph.get_mut(id) {
                if goal.status == GoalStatus::Pending {
                    if let Err(err) = goal.start() {
                        tracing::warn!(goal = %id, %err, "injected goal could not start");
                        continue;
                    }
                }
            }
            match graph.get(id).map(map_goal) {
                Some(Ok(actions)) => {
                    return Some(PlanOutput {
                        layer: ActiveLayer::Reactive,
                        goal_id: Some(id),
                        actions,
                        emergencies: Vec::new(),
                    });
                }
                Some(Err(err)) => {
                    tracing::warn!(goal = %id, %err, "injected goal unmappable");
                    if let Some(goal) = graph.get_mut(id) {
                        let _ = goal.fail("no action mapping");
                    }
                }
                // Evicted on push; try the next injection.
                None => continue,
            }
        }
        None
    }

    /// EmergencyProtocol: everything off except Reactive plus this one goal.
    fn fixed_recovery_goal(&mut self, graph: &mut GoalGraph) -> PlanOutput {
        let Some(id) = GoalId::new(EMERGENCY_GOAL_RAW) else {
            return PlanOutput::idle(Vec::new());
        };
        let goal = Goal::new(
            id,
            GoalTier::Immediate,
            "stabilize at a free heal",
            GoalCategory::Heal { location: None },
        )
        .with_priority(99.0);
        graph.push(goal);
        if let Some(goal) = graph.get_mut(id) {
            if goal.status == GoalStatus::Pending {
                let _ = goal.start();
            }
        }
        match graph.get(id).map(map_goal) {
            Some(Ok(actions)) => PlanOutput {
                layer: ActiveLayer::Operational,
                goal_id: Some(id),
                actions,
                emergencies: Vec::new(),
            },
            _ => PlanOutput::idle(Vec::new()),
        }
    }

    /// Expand the first still-open milestone that has not been expanded yet.
    fn expand_active_milestone(
        &mut self,
        snapshot: &WorldSnapshot,
        graph: &mut GoalGraph,
        inventory: &dyn InventoryProvider,
    ) {
        let active = self
            .milestones
            .iter()
            .copied()
            .find(|id| graph.get(*id).is_some_and(|g| !g.status.is_terminal()));
        let Some(milestone_id) = active else {
            return;
        };
        if self.expanded.contains(&milestone_id) {
            return;
        }
        let Some(milestone) = graph.get(milestone_id).cloned() else {
            return;
        };

        let sub_goals = tactical::expand(&milestone, snapshot, inventory);
        for sub in sub_goals {
            let sub_id = sub.id;
            graph.push(sub);
            if let Err(err) = graph.add_prerequisite(sub_id, milestone_id) {
                tracing::warn!(%sub_id, %milestone_id, %err, "sub-goal edge rejected");
            }
        }
        self.expanded.insert(milestone_id);
    }

    /// Operational selection: score, rank, map. Unmappable candidates are
    /// failed and the next one tried.
    fn select_and_map(
        &mut self,
        now: f64,
        graph: &mut GoalGraph,
        priority: &PriorityCalculator,
        combat: &dyn Combat,
    ) -> PlanOutput {
        let open: Vec<Goal> = graph
            .iter()
            .filter(|g| !g.status.is_terminal())
            .cloned()
            .collect();
        let mut candidates: Vec<(f64, Goal)> = open
            .into_iter()
            .filter(|g| !graph.is_blocked(g.id))
            .map(|g| {
                let ctx = ScoreContext {
                    now,
                    dependent_count: graph.dependents_of(g.id),
                    failure_probability: combat.estimate_failure_probability(&g),
                };
                (priority.score(&g, &ctx), g)
            })
            .collect();
        candidates.sort_by(|a, b| total_order(a.0, &a.1, b.0, &b.1));

        for (score, candidate) in candidates {
            match map_goal(&candidate) {
                Ok(actions) => {
                    let id = candidate.id;
                    if let Some(goal) = graph.get_mut(id) {
                        if goal.status == GoalStatus::Pending {
                            if let Err(err) = goal.start() {
                                tracing::warn!(goal = %id, %err, "could not start goal");
                                continue;
                            }
                        }
                    }
                    tracing::debug!(goal = %id, score, "operational goal selected");
                    return PlanOutput {
                        layer: ActiveLayer::Operational,
                        goal_id: Some(id),
                        actions,
                        emergencies: Vec::new(),
                    };
                }
                Err(err) => {
                    tracing::warn!(goal = %candidate.id, %err, "goal unmappable, marking failed");
                    if let Some(goal) = graph.get_mut(candidate.id) {
                        if goal.status == GoalStatus::Pending {
                            let _ = goal.start();
                        }
                        let _ = goal.fail("no action mapping");
                    }
                }
            }
        }
        PlanOutput::idle(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::StaticCatalog;
    use crate::snapshot::{BattleObservation, PartyMember, Position, ResourceSummary};
    use std::collections::BTreeMap;

    struct CalmWorld;

    impl Combat for CalmWorld {
        fn battle_outcome(&self) -> Option<BattleObservation> {
            None
        }
        fn estimate_failure_probability(&self, _: &Goal) -> f64 {
            0.0
        }
    }

    impl InventoryProvider for CalmWorld {
        fn resources(&self) -> ResourceSummary {
            ResourceSummary {
                money: 2000,
                consumables: 5,
                move_uses: 80,
                badges: 0,
            }
        }
        fn item_count(&self, _: &str) -> u32 {
            0
        }
    }

    fn gid(raw: u64) -> GoalId {
        GoalId::new(raw).unwrap()
    }

    fn snapshot(mean_health: f32) -> WorldSnapshot {
        WorldSnapshot {
            timestamp: 1.0,
            position: Position { x: 0, y: 0, map_id: 0 },
            party: vec![PartyMember {
                name: "lead".into(),
                level: 12,
                health_fraction: mean_health,
                status_afflicted: false,
            }],
            resources: ResourceSummary {
                money: 2000,
                consumables: 5,
                move_uses: 80,
                badges: 0,
            },
            inventory: BTreeMap::new(),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: vec![],
        }
    }

    fn battle_goal(raw: u64, priority: f64) -> Goal {
        Goal::new(
            gid(raw),
            GoalTier::MediumTerm,
            format!("defeat gatekeeper {raw}"),
            GoalCategory::Battle {
                opponent: format!("gatekeeper {raw}"),
            },
        )
        .with_priority(priority)
    }

    fn plan_once(
        planner: &mut HierarchicalPlanner,
        graph: &mut GoalGraph,
        snapshot: &WorldSnapshot,
        tier: EscalationTier,
    ) -> PlanOutput {
        planner.plan(
            1,
            snapshot.timestamp,
            snapshot,
            graph,
            &StaticCatalog::default(),
            &PriorityCalculator::new(),
            &CalmWorld,
            &CalmWorld,
            tier,
        )
    }

    #[test]
    fn reactive_interrupt_pre_empts_everything() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 90.0));

        let output = plan_once(&mut planner, &mut graph, &snapshot(0.1), EscalationTier::Normal);
        assert_eq!(output.layer, ActiveLayer::Reactive);
        assert!(!output.actions.is_empty());
        assert!(!output.emergencies.is_empty());
    }

    #[test]
    fn normal_tier_runs_the_full_stack() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 70.0));

        // Battered but not critical: tactical expansion adds a heal prep
        // sub-goal, which blocks the milestone and gets picked first.
        let output = plan_once(&mut planner, &mut graph, &snapshot(0.45), EscalationTier::Normal);
        assert_eq!(output.layer, ActiveLayer::Operational);
        let chosen = graph.get(output.goal_id.unwrap()).unwrap();
        assert!(matches!(chosen.category, GoalCategory::Heal { .. }));
        assert!(graph.is_blocked(gid(1)));
        assert_eq!(planner.milestones(), &[gid(1)]);
    }

    #[test]
    fn plan_simplification_skips_lookahead() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 70.0));

        let output = plan_once(
            &mut planner,
            &mut graph,
            &snapshot(0.45),
            EscalationTier::PlanSimplification,
        );
        // No tactical expansion happened: the milestone itself was chosen.
        assert_eq!(output.goal_id, Some(gid(1)));
        assert_eq!(graph.len(), 1);
        assert!(planner.milestones().is_empty());
    }

    #[test]
    fn emergency_protocol_yields_the_fixed_recovery_goal() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 95.0));

        let output = plan_once(
            &mut planner,
            &mut graph,
            &snapshot(0.9),
            EscalationTier::EmergencyProtocol,
        );
        let goal = graph.get(output.goal_id.unwrap()).unwrap();
        assert!(matches!(goal.category, GoalCategory::Heal { .. }));
        assert_eq!(goal.id.get(), EMERGENCY_GOAL_RAW);
    }

    #[test]
    fn reset_condition_plans_nothing() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 95.0));

        let output = plan_once(
            &mut planner,
            &mut graph,
            &snapshot(0.9),
            EscalationTier::ResetCondition,
        );
        assert_eq!(output.layer, ActiveLayer::Idle);
        assert!(output.actions.is_empty());
    }

    #[test]
    fn injected_goals_run_ahead_of_operational() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(battle_goal(1, 95.0));

        planner.inject(
            Goal::new(
                gid(200),
                GoalTier::Immediate,
                "liquidate non-essential inventory",
                GoalCategory::Liquidate { keep_essentials: true },
            )
            .with_priority(95.0),
        );

        let output = plan_once(&mut planner, &mut graph, &snapshot(0.9), EscalationTier::Normal);
        assert_eq!(output.layer, ActiveLayer::Reactive);
        assert_eq!(output.goal_id, Some(gid(200)));
        assert_eq!(
            graph.get(gid(200)).unwrap().status,
            GoalStatus::InProgress
        );
    }

    #[test]
    fn unmappable_goals_are_failed_and_skipped() {
        let mut planner = HierarchicalPlanner::new(PlannerConfig::default());
        let mut graph = GoalGraph::new();
        graph.push(
            Goal::new(
                gid(1),
                GoalTier::Immediate,
                "mystery quest text",
                GoalCategory::Freeform {
                    text: "???".into(),
                },
            )
            .with_priority(99.0),
        );
        graph.push(battle_goal(2, 10.0));

        let output = plan_once(&mut planner, &mut graph, &snapshot(0.9), EscalationTier::Normal);
        assert_eq!(output.goal_id, Some(gid(2)));
        assert!(matches!(
            graph.get(gid(1)).unwrap().status,
            GoalStatus::Failed { .. }
        ));
    }
}
