//! World-state snapshot types.
//!
//! A [`WorldSnapshot`] is an immutable, timestamped copy of externally-owned
//! state, taken once per tick by the perception side. The core only reads it;
//! all mutation happens in the producing subsystems, which keeps the tick loop
//! free of shared mutable state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tile position in the overworld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    /// Map identifier the coordinates are relative to.
    pub map_id: u16,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})@{}", self.x, self.y, self.map_id)
    }
}

/// The resources the core tracks for trend analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Liquid currency.
    Money,
    /// Total healing/restorative consumable count.
    Consumables,
    /// Aggregate remaining move uses across the party.
    MoveUses,
    /// Mean party health fraction, scaled to [0, 100].
    MeanHealth,
}

impl ResourceKind {
    /// All tracked resources in canonical order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Money,
        ResourceKind::Consumables,
        ResourceKind::MoveUses,
        ResourceKind::MeanHealth,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::Consumables => "consumables",
            Self::MoveUses => "move-uses",
            Self::MeanHealth => "mean-health",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate resource figures reported by the inventory collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub money: i64,
    /// Total count of healing/restorative consumables.
    pub consumables: u32,
    /// Aggregate remaining move uses across the party.
    pub move_uses: u32,
    /// Progression tokens earned so far.
    pub badges: u8,
}

impl ResourceSummary {
    /// Value of a tracked resource as a series sample.
    ///
    /// Mean health is not part of the inventory summary; callers combine this
    /// with the party state for that series.
    pub fn value_of(&self, kind: ResourceKind) -> Option<f64> {
        match kind {
            ResourceKind::Money => Some(self.money as f64),
            ResourceKind::Consumables => Some(f64::from(self.consumables)),
            ResourceKind::MoveUses => Some(f64::from(self.move_uses)),
            ResourceKind::MeanHealth => None,
        }
    }
}

/// One party member as seen by perception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyMember {
    pub name: String,
    pub level: u32,
    /// Health as a fraction of maximum, in [0, 1].
    pub health_fraction: f32,
    /// Whether a persistent status condition is active.
    pub status_afflicted: bool,
}

impl PartyMember {
    pub fn is_fainted(&self) -> bool {
        self.health_fraction <= 0.0
    }
}

/// Snapshot of a battle in progress, as reported by the combat collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BattleObservation {
    pub turn: u32,
    /// Own active combatant's health fraction.
    pub own_hp: f32,
    /// Opponent's health fraction.
    pub opp_hp: f32,
}

/// An immutable, timestamped copy of externally-owned world state.
///
/// Taken once per tick; never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Seconds since session start. All window/decay math keys off this,
    /// never the wall clock, so replays are deterministic.
    pub timestamp: f64,
    pub position: Position,
    pub party: Vec<PartyMember>,
    pub resources: ResourceSummary,
    /// Named item counts (subset relevant to planning feasibility).
    pub inventory: BTreeMap<String, u32>,
    pub in_battle: bool,
    pub in_menu: bool,
    pub in_dialogue: bool,
    /// Ids of goals the surrounding subsystems consider active.
    pub active_goal_ids: Vec<u64>,
}

impl WorldSnapshot {
    /// Mean party health fraction in [0, 1]. Empty party counts as 0.
    pub fn mean_health(&self) -> f32 {
        if self.party.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.party.iter().map(|m| m.health_fraction).sum();
        sum / self.party.len() as f32
    }

    /// Whether the lead party member has fainted.
    pub fn lead_fainted(&self) -> bool {
        self.party.first().is_some_and(PartyMember::is_fainted)
    }

    /// Count of a named inventory item.
    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(health: f32) -> PartyMember {
        PartyMember {
            name: "m".into(),
            level: 10,
            health_fraction: health,
            status_afflicted: false,
        }
    }

    #[test]
    fn mean_health_averages_party() {
        let snap = WorldSnapshot {
            timestamp: 0.0,
            position: Position { x: 0, y: 0, map_id: 0 },
            party: vec![member(1.0), member(0.5), member(0.0)],
            resources: ResourceSummary::default(),
            inventory: BTreeMap::new(),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: vec![],
        };
        assert!((snap.mean_health() - 0.5).abs() < 1e-6);
        assert!(!snap.lead_fainted());
    }

    #[test]
    fn empty_party_has_zero_health() {
        let snap = WorldSnapshot {
            timestamp: 0.0,
            position: Position { x: 0, y: 0, map_id: 0 },
            party: vec![],
            resources: ResourceSummary::default(),
            inventory: BTreeMap::new(),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: vec![],
        };
        assert_eq!(snap.mean_health(), 0.0);
    }

    #[test]
    fn resource_summary_sampling() {
        let summary = ResourceSummary {
            money: 3000,
            consumables: 7,
            move_uses: 120,
            badges: 2,
        };
        assert_eq!(summary.value_of(ResourceKind::Money), Some(3000.0));
        assert_eq!(summary.value_of(ResourceKind::Consumables), Some(7.0));
        assert_eq!(summary.value_of(ResourceKind::MeanHealth), None);
    }
}
