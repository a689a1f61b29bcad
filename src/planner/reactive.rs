//! Reactive layer: emergency predicates and interrupt actions.
//!
//! Runs every tick before any other layer. Each emergency is a boolean
//! predicate over the snapshot; when one is true, a short interrupt action
//! list pre-empts the operational plan for that tick. Normal planning resumes
//! only once no predicate holds.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};
use crate::collab::{InventoryProvider, MenuCommand, PerceptionFeed};
use crate::goal::TravelMode;
use crate::snapshot::WorldSnapshot;

/// Mean party health below this fraction is an emergency.
const CRITICAL_HEALTH_FRACTION: f32 = 0.25;

/// Emergency classes, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyKind {
    LeadFainted,
    CriticalHealth,
    StatusAffliction,
    SuppliesExhausted,
}

impl EmergencyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LeadFainted => "lead-fainted",
            Self::CriticalHealth => "critical-health",
            Self::StatusAffliction => "status-affliction",
            Self::SuppliesExhausted => "supplies-exhausted",
        }
    }
}

impl std::fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A firing emergency predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergency {
    pub kind: EmergencyKind,
    pub detail: String,
}

/// Evaluate all emergency predicates against a snapshot, most severe first.
pub fn scan(snapshot: &WorldSnapshot) -> Vec<Emergency> {
    let mut emergencies = Vec::new();

    if snapshot.lead_fainted() {
        emergencies.push(Emergency {
            kind: EmergencyKind::LeadFainted,
            detail: "lead party member fainted".into(),
        });
    }

    let mean = snapshot.mean_health();
    if !snapshot.party.is_empty() && mean < CRITICAL_HEALTH_FRACTION {
        emergencies.push(Emergency {
            kind: EmergencyKind::CriticalHealth,
            detail: format!("mean party health {mean:.2}"),
        });
    }

    if let Some(afflicted) = snapshot.party.iter().find(|m| m.status_afflicted) {
        emergencies.push(Emergency {
            kind: EmergencyKind::StatusAffliction,
            detail: format!("{} is status-afflicted", afflicted.name),
        });
    }

    if snapshot.resources.consumables == 0 {
        emergencies.push(Emergency {
            kind: EmergencyKind::SuppliesExhausted,
            detail: "no healing consumables remain".into(),
        });
    }

    emergencies
}

/// Interrupt actions for the most severe firing emergency.
pub fn interrupt_actions(emergencies: &[Emergency]) -> Vec<Action> {
    let Some(worst) = emergencies.first() else {
        return Vec::new();
    };
    match worst.kind {
        EmergencyKind::LeadFainted | EmergencyKind::CriticalHealth | EmergencyKind::SuppliesExhausted => {
            vec![
                Action::new(ActionKind::Navigate {
                    destination: "free-heal".into(),
                    mode: TravelMode::Cautious,
                }),
                Action::new(ActionKind::Interact {
                    object: "attendant".into(),
                }),
            ]
        }
        EmergencyKind::StatusAffliction => vec![
            Action::new(ActionKind::MenuOp {
                command: MenuCommand::Open("ITEMS".into()),
            }),
            Action::new(ActionKind::MenuOp {
                command: MenuCommand::UseItem {
                    item: "status-cure".into(),
                    target: None,
                },
            })
            .optional(),
            Action::new(ActionKind::MenuOp {
                command: MenuCommand::Cancel,
            }),
        ],
    }
}

/// Live emergency check for mid-plan cancellation, polled at action
/// boundaries from fresh collaborator state rather than the tick snapshot.
pub fn live_emergency(
    inventory: &dyn InventoryProvider,
    perception: &dyn PerceptionFeed,
) -> Option<String> {
    if let Some(battle) = perception.latest_battle_state() {
        if battle.own_hp <= 0.0 {
            return Some("active combatant fainted mid-plan".into());
        }
    }
    let resources = inventory.resources();
    if resources.money < 0 {
        return Some(format!("money went negative: {}", resources.money));
    }
    None
}
