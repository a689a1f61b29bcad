//! Confidence engine: rolling health score and escalation tiers.
//!
//! Action outcomes, state inconsistencies, and goal-progress samples land in a
//! time-pruned window (default 60 s). Each event's weight decays with age as
//! `2^(-age/10)`. The combined score in [0, 100] maps to a discrete
//! [`EscalationTier`] that gates how much planning complexity is permitted;
//! tier transitions are logged and retained for diagnostics, and crossing into
//! `EmergencyProtocol` or below is the sole trigger for recovery activation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Seconds for an event's decay weight to halve.
const DECAY_HALF_LIFE_SECS: f64 = 10.0;

/// How many tier transitions to keep for `status()` diagnostics.
const TRANSITION_LOG_BOUND: usize = 32;

/// Severity of a reported state inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Penalty contribution of one event at full weight.
    pub fn value(&self) -> f64 {
        match self {
            Self::Low => 5.0,
            Self::Medium => 10.0,
            Self::High => 20.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One event kind in the confidence window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Signal {
    ActionOutcome { succeeded: bool },
    Inconsistency { severity: Severity },
    GoalProgress { fraction: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ConfidenceEvent {
    at: f64,
    signal: Signal,
}

// ---------------------------------------------------------------------------
// Escalation tiers
// ---------------------------------------------------------------------------

/// Discrete confidence band controlling permitted planning complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationTier {
    Normal,
    EnhancedMonitoring,
    PlanSimplification,
    EmergencyProtocol,
    ResetCondition,
}

impl EscalationTier {
    /// All tiers in order of increasing severity.
    pub const ALL: [EscalationTier; 5] = [
        EscalationTier::Normal,
        EscalationTier::EnhancedMonitoring,
        EscalationTier::PlanSimplification,
        EscalationTier::EmergencyProtocol,
        EscalationTier::ResetCondition,
    ];

    /// Pure, deterministic tier for a confidence score.
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Normal
        } else if score >= 60.0 {
            Self::EnhancedMonitoring
        } else if score >= 40.0 {
            Self::PlanSimplification
        } else if score >= 20.0 {
            Self::EmergencyProtocol
        } else {
            Self::ResetCondition
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::EnhancedMonitoring => "enhanced-monitoring",
            Self::PlanSimplification => "plan-simplification",
            Self::EmergencyProtocol => "emergency-protocol",
            Self::ResetCondition => "reset-condition",
        }
    }

    /// Strategic re-planning is allowed at Normal and EnhancedMonitoring only.
    pub fn allows_strategic(&self) -> bool {
        matches!(self, Self::Normal | Self::EnhancedMonitoring)
    }

    /// Lookahead (tactical expansion) survives through PlanSimplification's
    /// forced single-goal mode at the tiers below it.
    pub fn allows_lookahead(&self) -> bool {
        self.allows_strategic()
    }

    /// Whether the layered planner runs at all (Reactive always does).
    pub fn allows_operational(&self) -> bool {
        !matches!(self, Self::ResetCondition)
    }

    /// Whether this tier hands control to the recovery manager.
    pub fn triggers_recovery(&self) -> bool {
        matches!(self, Self::EmergencyProtocol | Self::ResetCondition)
    }
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A logged tier change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub from: EscalationTier,
    pub to: EscalationTier,
    pub at: f64,
}

// ---------------------------------------------------------------------------
// Confidence engine
// ---------------------------------------------------------------------------

/// Rolling-window confidence scorer.
#[derive(Debug, Clone)]
pub struct ConfidenceEngine {
    window_secs: f64,
    events: VecDeque<ConfidenceEvent>,
    tier: EscalationTier,
    transitions: VecDeque<TierTransition>,
}

impl ConfidenceEngine {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs,
            events: VecDeque::new(),
            tier: EscalationTier::Normal,
            transitions: VecDeque::new(),
        }
    }

    pub fn record_action(&mut self, now: f64, succeeded: bool) {
        self.events.push_back(ConfidenceEvent {
            at: now,
            signal: Signal::ActionOutcome { succeeded },
        });
    }

    pub fn record_inconsistency(&mut self, now: f64, severity: Severity) {
        self.events.push_back(ConfidenceEvent {
            at: now,
            signal: Signal::Inconsistency { severity },
        });
    }

    pub fn record_progress(&mut self, now: f64, fraction: f32) {
        self.events.push_back(ConfidenceEvent {
            at: now,
            signal: Signal::GoalProgress {
                fraction: fraction.clamp(0.0, 1.0),
            },
        });
    }

    /// Current tier (as of the last `update`).
    pub fn tier(&self) -> EscalationTier {
        self.tier
    }

    /// Logged tier transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &TierTransition> {
        self.transitions.iter()
    }

    /// Compute the confidence score in [0, 100], pruning expired events first.
    ///
    /// An empty action-outcome window scores 100; absence of evidence is not
    /// treated as failure.
    pub fn score(&mut self, now: f64) -> f64 {
        self.prune(now);

        let mut outcome_weight = 0.0;
        let mut outcome_success = 0.0;
        let mut penalty_weight = 0.0;
        let mut penalty_sum = 0.0;
        let mut progress_weight = 0.0;
        let mut progress_sum = 0.0;

        for event in &self.events {
            let age = (now - event.at).max(0.0);
            let weight = (2.0_f64).powf(-age / DECAY_HALF_LIFE_SECS);
            match event.signal {
                Signal::ActionOutcome { succeeded } => {
                    outcome_weight += weight;
                    if succeeded {
                        outcome_success += weight;
                    }
                }
                Signal::Inconsistency { severity } => {
                    penalty_weight += weight;
                    penalty_sum += weight * severity.value();
                }
                Signal::GoalProgress { fraction } => {
                    progress_weight += weight;
                    progress_sum += weight * f64::from(fraction);
                }
            }
        }

        let action_confidence = if outcome_weight > 0.0 {
            100.0 * outcome_success / outcome_weight
        } else {
            100.0
        };
        let inconsistency_penalty = if penalty_weight > 0.0 {
            penalty_sum / penalty_weight
        } else {
            0.0
        };
        let goal_bonus = if progress_weight > 0.0 {
            10.0 * progress_sum / progress_weight
        } else {
            0.0
        };

        (action_confidence - inconsistency_penalty + goal_bonus).clamp(0.0, 100.0)
    }

    /// Recompute the score and tier, logging any tier change.
    pub fn update(&mut self, now: f64) -> (f64, EscalationTier) {
        let score = self.score(now);
        let tier = EscalationTier::for_score(score);
        if tier != self.tier {
            tracing::info!(from = %self.tier, to = %tier, score, "escalation tier changed");
            self.transitions.push_back(TierTransition {
                from: self.tier,
                to: tier,
                at: now,
            });
            if self.transitions.len() > TRANSITION_LOG_BOUND {
                self.transitions.pop_front();
            }
            self.tier = tier;
        }
        (score, tier)
    }

    fn prune(&mut self, now: f64) {
        while let Some(front) = self.events.front() {
            if now - front.at > self.window_secs {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConfidenceEngine {
        ConfidenceEngine::new(60.0)
    }

    #[test]
    fn empty_history_scores_full_confidence() {
        let mut eng = engine();
        assert_eq!(eng.score(0.0), 100.0);
    }

    #[test]
    fn score_is_bounded_for_arbitrary_histories() {
        let mut eng = engine();
        for i in 0..50 {
            let at = f64::from(i);
            eng.record_action(at, i % 3 == 0);
            eng.record_inconsistency(at, Severity::High);
            eng.record_progress(at, 1.0);
        }
        let score = eng.score(50.0);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn failures_drag_the_score_down() {
        let mut eng = engine();
        for _ in 0..4 {
            eng.record_action(1.0, false);
        }
        let score = eng.score(1.0);
        assert!(score < 20.0, "score was {score}");
    }

    #[test]
    fn progress_lifts_a_shaky_score() {
        let mut eng = engine();
        eng.record_action(1.0, true);
        eng.record_action(1.0, false);
        let base = eng.score(1.0);

        eng.record_progress(1.0, 1.0);
        let lifted = eng.score(1.0);
        assert!(lifted > base);
    }

    #[test]
    fn events_outside_window_are_purged() {
        let mut eng = engine();
        eng.record_action(0.0, false);
        eng.record_action(0.0, false);
        assert!(eng.score(1.0) < 100.0);
        // 61 seconds later the failures have aged out entirely.
        assert_eq!(eng.score(61.1), 100.0);
    }

    #[test]
    fn recent_events_outweigh_old_ones() {
        let mut eng = engine();
        eng.record_action(0.0, false);
        eng.record_action(30.0, true);
        // At t=30 the success carries weight 1.0, the failure 2^-3.
        let score = eng.score(30.0);
        assert!(score > 80.0, "score was {score}");
    }

    #[test]
    fn three_high_inconsistencies_escalate() {
        let mut eng = engine();
        for _ in 0..3 {
            eng.record_inconsistency(0.5, Severity::High);
        }
        eng.record_action(0.5, false);
        let (score, tier) = eng.update(1.0);
        assert!(score < 40.0, "score was {score}");
        assert!(tier.triggers_recovery());
    }

    #[test]
    fn tier_is_pure_in_score() {
        for score in [0.0, 19.9, 20.0, 39.9, 40.0, 59.9, 60.0, 79.9, 80.0, 100.0] {
            assert_eq!(EscalationTier::for_score(score), EscalationTier::for_score(score));
        }
        assert_eq!(EscalationTier::for_score(80.0), EscalationTier::Normal);
        assert_eq!(EscalationTier::for_score(79.9), EscalationTier::EnhancedMonitoring);
        assert_eq!(EscalationTier::for_score(59.9), EscalationTier::PlanSimplification);
        assert_eq!(EscalationTier::for_score(39.9), EscalationTier::EmergencyProtocol);
        assert_eq!(EscalationTier::for_score(19.9), EscalationTier::ResetCondition);
    }

    #[test]
    fn tier_transitions_are_logged() {
        let mut eng = engine();
        let (_, tier) = eng.update(0.0);
        assert_eq!(tier, EscalationTier::Normal);

        for _ in 0..5 {
            eng.record_action(1.0, false);
        }
        eng.update(1.0);
        let transitions: Vec<_> = eng.transitions().collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, EscalationTier::Normal);
        assert!(transitions[0].to > EscalationTier::Normal);
    }

    #[test]
    fn tier_gating_flags() {
        assert!(EscalationTier::Normal.allows_strategic());
        assert!(!EscalationTier::PlanSimplification.allows_strategic());
        assert!(EscalationTier::PlanSimplification.allows_operational());
        assert!(!EscalationTier::ResetCondition.allows_operational());
        assert!(EscalationTier::EmergencyProtocol.triggers_recovery());
        assert!(!EscalationTier::PlanSimplification.triggers_recovery());
    }
}
