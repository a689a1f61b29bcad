//! State validation: impossible values and contradictions in a snapshot.
//!
//! Pure checks; no state is kept between ticks. Findings feed the confidence
//! engine as inconsistency events; a finding is never itself fatal.

use serde::{Deserialize, Serialize};

use crate::confidence::Severity;
use crate::snapshot::WorldSnapshot;

/// Hard cap on believable party size; anything larger is corrupted perception.
const MAX_PARTY_SIZE: usize = 6;

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub severity: Severity,
    pub detail: String,
}

impl Inconsistency {
    fn new(severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            severity,
            detail: detail.into(),
        }
    }
}

/// Stateless snapshot validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateValidator;

impl StateValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a snapshot for impossible values and contradictions.
    pub fn validate(&self, snapshot: &WorldSnapshot) -> Vec<Inconsistency> {
        let mut findings = Vec::new();

        if snapshot.resources.money < 0 {
            findings.push(Inconsistency::new(
                Severity::High,
                format!("negative money: {}", snapshot.resources.money),
            ));
        }

        for member in &snapshot.party {
            if !(0.0..=1.0).contains(&member.health_fraction) {
                findings.push(Inconsistency::new(
                    Severity::High,
                    format!(
                        "health fraction out of range for {}: {}",
                        member.name, member.health_fraction
                    ),
                ));
            }
        }

        if snapshot.party.len() > MAX_PARTY_SIZE {
            findings.push(Inconsistency::new(
                Severity::Medium,
                format!("party size {} exceeds maximum {MAX_PARTY_SIZE}", snapshot.party.len()),
            ));
        }

        // Mutually exclusive interaction modes.
        if snapshot.in_battle && snapshot.in_menu {
            findings.push(Inconsistency::new(
                Severity::Medium,
                "in_battle and in_menu both set",
            ));
        }
        if snapshot.in_battle && snapshot.in_dialogue {
            findings.push(Inconsistency::new(
                Severity::Low,
                "in_battle and in_dialogue both set",
            ));
        }

        if snapshot.timestamp < 0.0 || !snapshot.timestamp.is_finite() {
            findings.push(Inconsistency::new(
                Severity::High,
                format!("non-monotonic or invalid timestamp: {}", snapshot.timestamp),
            ));
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PartyMember, Position, ResourceSummary};
    use std::collections::BTreeMap;

    fn clean_snapshot() -> WorldSnapshot {
        WorldSnapshot {
            timestamp: 1.0,
            position: Position { x: 3, y: 4, map_id: 1 },
            party: vec![PartyMember {
                name: "lead".into(),
                level: 12,
                health_fraction: 0.9,
                status_afflicted: false,
            }],
            resources: ResourceSummary {
                money: 500,
                consumables: 4,
                move_uses: 60,
                badges: 1,
            },
            inventory: BTreeMap::new(),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: vec![],
        }
    }

    #[test]
    fn clean_snapshot_has_no_findings() {
        let validator = StateValidator::new();
        assert!(validator.validate(&clean_snapshot()).is_empty());
    }

    #[test]
    fn negative_money_is_high_severity() {
        let mut snap = clean_snapshot();
        snap.resources.money = -10;
        let findings = StateValidator::new().validate(&snap);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn health_out_of_range_flagged() {
        let mut snap = clean_snapshot();
        snap.party[0].health_fraction = 1.4;
        let findings = StateValidator::new().validate(&snap);
        assert!(findings.iter().any(|f| f.severity == Severity::High));
    }

    #[test]
    fn contradictory_modes_flagged() {
        let mut snap = clean_snapshot();
        snap.in_battle = true;
        snap.in_menu = true;
        let findings = StateValidator::new().validate(&snap);
        assert!(findings.iter().any(|f| f.detail.contains("in_menu")));
    }

    #[test]
    fn invalid_timestamp_flagged() {
        let mut snap = clean_snapshot();
        snap.timestamp = f64::NAN;
        let findings = StateValidator::new().validate(&snap);
        assert!(!findings.is_empty());
    }
}
