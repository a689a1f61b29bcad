//! Goal representation: units of intent with tier, category, and status.
//!
//! Goals are the currency of the planner. Each carries a closed, typed
//! [`GoalCategory`] instead of free-text dispatch, so the action mapper can be
//! an exhaustive match. Status transitions are enforced:
//! `Pending → InProgress → {Completed, Failed}`.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::snapshot::ResourceKind;

/// Unique, niche-optimized identifier for a goal.
///
/// Uses `NonZeroU64` so that `Option<GoalId>` is the same size as `GoalId`
/// (the niche optimization lets the compiler use 0 as the `None` discriminant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GoalId(NonZeroU64);

impl GoalId {
    /// Create a `GoalId` from a raw `u64`. Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(GoalId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "goal:{}", self.0)
    }
}

/// Time horizon a goal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalTier {
    Immediate,
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl GoalTier {
    /// All tiers in urgency order (most urgent first).
    pub const ALL: [GoalTier; 4] = [
        GoalTier::Immediate,
        GoalTier::ShortTerm,
        GoalTier::MediumTerm,
        GoalTier::LongTerm,
    ];

    /// Urgency rank: lower ranks win ties (Immediate = 0).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Immediate => 0,
            Self::ShortTerm => 1,
            Self::MediumTerm => 2,
            Self::LongTerm => 3,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::ShortTerm => "short-term",
            Self::MediumTerm => "medium-term",
            Self::LongTerm => "long-term",
        }
    }
}

impl std::fmt::Display for GoalTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed { reason: String },
}

impl GoalStatus {
    /// Whether the goal has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Short label without the failure reason.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// How the agent should travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelMode {
    /// Shortest route, encounters accepted.
    Direct,
    /// Avoid encounters and hazards where the route allows it.
    Cautious,
}

/// Closed set of goal categories, each with its typed parameter payload.
///
/// The action mapper matches exhaustively on this enum; `Freeform` is the one
/// category without a mapping (raw injected quest text awaiting
/// classification at the dialogue boundary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GoalCategory {
    /// Move to a named destination.
    Travel { destination: String, mode: TravelMode },
    /// Fight a named opponent.
    Battle { opponent: String },
    /// Obtain `quantity` of a named item.
    Acquire { item: String, quantity: u32 },
    /// Restore the party, at a named location or the nearest free one.
    Heal { location: Option<String> },
    /// Raise the lead party member to a target level.
    Train { target_level: u32 },
    /// Sell off non-essential inventory for currency.
    Liquidate { keep_essentials: bool },
    /// Reduce consumption of a resource (softer intervention).
    Conserve { resource: ResourceKind },
    /// Accept losses, fall back, and rebuild the roster.
    Regroup,
    /// Persist progress through the persistence collaborator.
    Checkpoint,
    /// Raw externally-injected intent with no action mapping yet.
    Freeform { text: String },
}

impl GoalCategory {
    /// Stable key used for success-history bookkeeping.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Travel { .. } => "travel",
            Self::Battle { .. } => "battle",
            Self::Acquire { .. } => "acquire",
            Self::Heal { .. } => "heal",
            Self::Train { .. } => "train",
            Self::Liquidate { .. } => "liquidate",
            Self::Conserve { .. } => "conserve",
            Self::Regroup => "regroup",
            Self::Checkpoint => "checkpoint",
            Self::Freeform { .. } => "freeform",
        }
    }
}

/// A unit of intent the agent is working toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub tier: GoalTier,
    /// Human-readable description.
    pub description: String,
    pub category: GoalCategory,
    /// Authored priority in [0, 100].
    pub base_priority: f64,
    /// Resources the goal consumes, by name.
    pub required: BTreeMap<String, f64>,
    /// Resources the goal yields, by name.
    pub reward: BTreeMap<String, f64>,
    /// Estimated cost in effort units.
    pub estimated_cost: f64,
    /// Estimated value in effort units.
    pub estimated_value: f64,
    pub status: GoalStatus,
    /// Completion fraction in [0, 1].
    pub progress: f32,
    /// Absolute deadline (session seconds), if any.
    pub deadline: Option<f64>,
    /// Goals that must complete before this one (catalog-authored).
    pub prerequisites: Vec<GoalId>,
    /// Insertion sequence, assigned by the goal graph; breaks priority ties.
    pub created_seq: u64,
}

impl Goal {
    /// Create a goal with neutral defaults (priority 50, cost/value 1.0).
    pub fn new(id: GoalId, tier: GoalTier, description: impl Into<String>, category: GoalCategory) -> Self {
        Self {
            id,
            tier,
            description: description.into(),
            category,
            base_priority: 50.0,
            required: BTreeMap::new(),
            reward: BTreeMap::new(),
            estimated_cost: 1.0,
            estimated_value: 1.0,
            status: GoalStatus::Pending,
            progress: 0.0,
            deadline: None,
            prerequisites: Vec::new(),
            created_seq: 0,
        }
    }

    /// Set the authored base priority, clamped to [0, 100].
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.base_priority = priority.clamp(0.0, 100.0);
        self
    }

    /// Set an absolute deadline in session seconds.
    pub fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set estimated cost and value.
    pub fn with_cost_value(mut self, cost: f64, value: f64) -> Self {
        self.estimated_cost = cost;
        self.estimated_value = value;
        self
    }

    /// Add a catalog-authored prerequisite.
    pub fn with_prerequisite(mut self, id: GoalId) -> Self {
        self.prerequisites.push(id);
        self
    }

    /// Add a required resource.
    pub fn with_requirement(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.required.insert(resource.into(), amount);
        self
    }

    /// Add a reward resource.
    pub fn with_reward(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.reward.insert(resource.into(), amount);
        self
    }

    /// Value-to-cost ratio. Zero-cost goals count as infinitely efficient.
    pub fn efficiency_ratio(&self) -> f64 {
        if self.estimated_cost <= 0.0 {
            f64::INFINITY
        } else {
            self.estimated_value / self.estimated_cost
        }
    }

    /// Record progress; the fraction is clamped to [0, 1].
    pub fn set_progress(&mut self, fraction: f32) {
        self.progress = fraction.clamp(0.0, 1.0);
    }

    /// Transition `Pending → InProgress`.
    pub fn start(&mut self) -> Result<(), GoalError> {
        self.transition(GoalStatus::InProgress)
    }

    /// Transition `InProgress → Completed` and pin progress to 1.
    pub fn complete(&mut self) -> Result<(), GoalError> {
        self.transition(GoalStatus::Completed)?;
        self.progress = 1.0;
        Ok(())
    }

    /// Transition `InProgress → Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), GoalError> {
        self.transition(GoalStatus::Failed {
            reason: reason.into(),
        })
    }

    fn transition(&mut self, to: GoalStatus) -> Result<(), GoalError> {
        let legal = matches!(
            (&self.status, &to),
            (GoalStatus::Pending, GoalStatus::InProgress)
                | (GoalStatus::InProgress, GoalStatus::Completed)
                | (GoalStatus::InProgress, GoalStatus::Failed { .. })
        );
        if !legal {
            return Err(GoalError::IllegalTransition {
                goal_id: self.id.get(),
                from: self.status.label().into(),
                to: to.label().into(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// External, hand-authored source of goals referenced by id.
///
/// Dependency resolution pulls missing prerequisites from here; the catalog
/// itself is authored content, not planner state, and lives outside the core.
pub trait GoalCatalog {
    /// Look up a goal definition by id.
    fn lookup(&self, id: GoalId) -> Option<Goal>;
}

/// A catalog over a fixed in-memory list. Sufficient for the bounded,
/// mostly hand-authored goal sets this core is tuned for.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: BTreeMap<GoalId, Goal>,
}

impl StaticCatalog {
    pub fn new(goals: impl IntoIterator<Item = Goal>) -> Self {
        Self {
            entries: goals.into_iter().map(|g| (g.id, g)).collect(),
        }
    }

    pub fn insert(&mut self, goal: Goal) {
        self.entries.insert(goal.id, goal);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GoalCatalog for StaticCatalog {
    fn lookup(&self, id: GoalId) -> Option<Goal> {
        self.entries.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(raw: u64) -> GoalId {
        GoalId::new(raw).unwrap()
    }

    fn goal(raw: u64) -> Goal {
        Goal::new(
            gid(raw),
            GoalTier::ShortTerm,
            "test goal",
            GoalCategory::Heal { location: None },
        )
    }

    #[test]
    fn legal_lifecycle() {
        let mut g = goal(1);
        g.start().unwrap();
        assert_eq!(g.status, GoalStatus::InProgress);
        g.complete().unwrap();
        assert_eq!(g.status, GoalStatus::Completed);
        assert_eq!(g.progress, 1.0);
    }

    #[test]
    fn completion_requires_start() {
        let mut g = goal(1);
        let err = g.complete().unwrap_err();
        assert!(matches!(err, GoalError::IllegalTransition { .. }));
        assert_eq!(g.status, GoalStatus::Pending);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut g = goal(1);
        g.start().unwrap();
        g.fail("timed out").unwrap();
        assert!(g.status.is_terminal());
        assert!(g.start().is_err());
    }

    #[test]
    fn progress_is_clamped() {
        let mut g = goal(1);
        g.set_progress(1.5);
        assert_eq!(g.progress, 1.0);
        g.set_progress(-0.1);
        assert_eq!(g.progress, 0.0);
    }

    #[test]
    fn priority_is_clamped() {
        let g = goal(1).with_priority(250.0);
        assert_eq!(g.base_priority, 100.0);
    }

    #[test]
    fn zero_cost_is_infinitely_efficient() {
        let g = goal(1).with_cost_value(0.0, 5.0);
        assert!(g.efficiency_ratio().is_infinite());
    }

    #[test]
    fn tier_rank_ordering() {
        assert!(GoalTier::Immediate.rank() < GoalTier::ShortTerm.rank());
        assert!(GoalTier::MediumTerm.rank() < GoalTier::LongTerm.rank());
    }

    #[test]
    fn static_catalog_lookup() {
        let catalog = StaticCatalog::new([goal(1), goal(2)]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.lookup(gid(1)).is_some());
        assert!(catalog.lookup(gid(3)).is_none());
    }

    #[test]
    fn category_keys_are_stable() {
        assert_eq!(
            GoalCategory::Battle {
                opponent: "rival".into()
            }
            .key(),
            "battle"
        );
        assert_eq!(GoalCategory::Freeform { text: "???".into() }.key(), "freeform");
    }
}
