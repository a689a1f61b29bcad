//! Utility-based goal prioritization.
//!
//! `score(goal, ctx)` combines the authored base priority with temporal,
//! dependency, efficiency, and learned success-rate multipliers, minus a risk
//! penalty, clamped to [0, 100]. Every factor is independently computable and
//! unit-tested. Scores are derived per planning pass and never cached across
//! ticks, since the risk and efficiency inputs change under the agent's feet.
//!
//! Battle-type risk is an opaque failure probability supplied by the combat
//! collaborator through [`ScoreContext`]; it is not recomputed here.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::goal::Goal;

// ---------------------------------------------------------------------------
// Success history
// ---------------------------------------------------------------------------

/// Per-category success/attempt counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub successes: u32,
    pub attempts: u32,
}

impl SuccessRecord {
    /// Success rate, or `None` before any attempt.
    pub fn rate(&self) -> Option<f64> {
        (self.attempts > 0).then(|| f64::from(self.successes) / f64::from(self.attempts))
    }
}

/// Learned per-category success rates, owned by the calculator and threaded
/// through calls rather than living in a module-level global. Serializable so
/// the orchestration layer can persist it between sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessHistory {
    records: BTreeMap<String, SuccessRecord>,
}

impl SuccessHistory {
    /// Record one attempt outcome for a category key.
    pub fn record(&mut self, category_key: &str, succeeded: bool) {
        let record = self.records.entry(category_key.to_string()).or_default();
        record.attempts += 1;
        if succeeded {
            record.successes += 1;
        }
    }

    /// Success rate for a category, or `None` with no data.
    pub fn rate(&self, category_key: &str) -> Option<f64> {
        self.records.get(category_key).and_then(SuccessRecord::rate)
    }

    pub fn record_for(&self, category_key: &str) -> SuccessRecord {
        self.records.get(category_key).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Per-goal inputs the calculator cannot derive on its own.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    /// Current session time in seconds.
    pub now: f64,
    /// Number of goals that depend on this one.
    pub dependent_count: usize,
    /// Opaque failure probability in [0, 1], supplied by the combat
    /// collaborator for battle-type goals (0.0 for everything else).
    pub failure_probability: f64,
}

/// The priority calculator with its owned success history.
#[derive(Debug, Clone, Default)]
pub struct PriorityCalculator {
    pub history: SuccessHistory,
}

impl PriorityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score a goal against the current world context, in [0, 100].
    pub fn score(&self, goal: &Goal, ctx: &ScoreContext) -> f64 {
        let product = goal.base_priority
            * temporal_multiplier(goal.deadline, ctx.now)
            * dependency_multiplier(ctx.dependent_count)
            * efficiency_multiplier(goal.efficiency_ratio())
            * self.success_multiplier(goal.category.key());
        (product - risk_penalty(ctx.failure_probability)).clamp(0.0, 100.0)
    }

    fn success_multiplier(&self, category_key: &str) -> f64 {
        match self.history.rate(category_key) {
            Some(rate) if rate > 0.8 => 1.2,
            Some(rate) if rate > 0.5 => 1.0,
            Some(_) => 0.7,
            // No data yet: neutral.
            None => 1.0,
        }
    }
}

/// Total order over scored goals: score (descending), then tier urgency,
/// then creation order.
pub fn total_order(a_score: f64, a: &Goal, b_score: f64, b: &Goal) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then(a.tier.rank().cmp(&b.tier.rank()))
        .then(a.created_seq.cmp(&b.created_seq))
}

/// Deadline pressure: ×2.0 inside a minute, ×1.5 inside ten, ×1.2 inside an
/// hour, neutral otherwise. Overdue deadlines count as maximally urgent.
fn temporal_multiplier(deadline: Option<f64>, now: f64) -> f64 {
    let Some(deadline) = deadline else {
        return 1.0;
    };
    let remaining = deadline - now;
    if remaining < 60.0 {
        2.0
    } else if remaining < 600.0 {
        1.5
    } else if remaining < 3600.0 {
        1.2
    } else {
        1.0
    }
}

fn dependency_multiplier(dependents: usize) -> f64 {
    match dependents {
        0 => 1.0,
        1 | 2 => 1.2,
        _ => 1.5,
    }
}

fn efficiency_multiplier(ratio: f64) -> f64 {
    if ratio > 2.0 {
        1.3
    } else if ratio > 1.0 {
        1.1
    } else if ratio > 0.5 {
        0.9
    } else {
        0.7
    }
}

fn risk_penalty(failure_probability: f64) -> f64 {
    if failure_probability > 0.5 {
        20.0
    } else if failure_probability > 0.2 {
        10.0
    } else {
        0.0
    }
}
