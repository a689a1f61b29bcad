//! Tactical layer: expanding the active milestone into concrete sub-goals.
//!
//! Consults the inventory collaborator and the snapshot for feasibility:
//! missing requirements become Acquire/Liquidate sub-goals, and risky
//! categories get healing prep. Sub-goals are prerequisites of their
//! milestone, so the operational layer naturally clears them first.

use crate::collab::InventoryProvider;
use crate::goal::{Goal, GoalCategory, GoalId, GoalTier};
use crate::snapshot::WorldSnapshot;

/// Entering a battle below this mean health gets a healing sub-goal first.
const BATTLE_PREP_HEALTH: f32 = 0.6;
/// Long travel below this mean health gets a healing sub-goal first.
const TRAVEL_PREP_HEALTH: f32 = 0.4;

/// Expand a milestone into the sub-goals it needs right now.
///
/// Sub-goal ids are derived from the milestone id (shifted above the
/// hand-authored catalog range), so re-expansion merges instead of
/// duplicating.
pub fn expand(
    milestone: &Goal,
    snapshot: &WorldSnapshot,
    inventory: &dyn InventoryProvider,
) -> Vec<Goal> {
    let mut sub_goals = Vec::new();
    let mut slot = 0u64;
    let mut next_id = |slot: &mut u64| -> Option<GoalId> {
        *slot += 1;
        GoalId::new((milestone.id.get() << 4) | *slot)
    };
    let sub_priority = (milestone.base_priority + 10.0).min(100.0);

    // Requirement shortfalls, straight from the goal's resource map.
    for (resource, amount) in &milestone.required {
        if resource == "money" {
            if snapshot.resources.money < *amount as i64 {
                if let Some(id) = next_id(&mut slot) {
                    sub_goals.push(
                        Goal::new(
                            id,
                            GoalTier::ShortTerm,
                            format!("raise funds for {}", milestone.description),
                            GoalCategory::Liquidate { keep_essentials: true },
                        )
                        .with_priority(sub_priority),
                    );
                }
            }
        } else {
            let have = inventory.item_count(resource);
            let need = *amount as u32;
            if have < need {
                if let Some(id) = next_id(&mut slot) {
                    sub_goals.push(
                        Goal::new(
                            id,
                            GoalTier::ShortTerm,
                            format!("stock {} {resource}", need - have),
                            GoalCategory::Acquire {
                                item: resource.clone(),
                                quantity: need - have,
                            },
                        )
                        .with_priority(sub_priority),
                    );
                }
            }
        }
    }

    // Category-specific prep.
    let prep_heal = match &milestone.category {
        GoalCategory::Battle { .. } => snapshot.mean_health() < BATTLE_PREP_HEALTH,
        GoalCategory::Travel { .. } => snapshot.mean_health() < TRAVEL_PREP_HEALTH,
        _ => false,
    };
    if prep_heal {
        if let Some(id) = next_id(&mut slot) {
            sub_goals.push(
                Goal::new(
                    id,
                    GoalTier::ShortTerm,
                    format!("heal before {}", milestone.description),
                    GoalCategory::Heal { location: None },
                )
                .with_priority(sub_priority),
            );
        }
    }

    if !sub_goals.is_empty() {
        tracing::debug!(
            milestone = %milestone.id,
            count = sub_goals.len(),
            "tactical expansion produced sub-goals"
        );
    }
    sub_goals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PartyMember, Position, ResourceSummary};
    use std::collections::BTreeMap;

    struct FixedInventory(BTreeMap<String, u32>);

    impl InventoryProvider for FixedInventory {
        fn resources(&self) -> ResourceSummary {
            ResourceSummary::default()
        }
        fn item_count(&self, item: &str) -> u32 {
            self.0.get(item).copied().unwrap_or(0)
        }
    }

    fn snapshot(mean_health: f32, money: i64) -> WorldSnapshot {
        WorldSnapshot {
            timestamp: 0.0,
            position: Position { x: 0, y: 0, map_id: 0 },
            party: vec![PartyMember {
                name: "lead".into(),
                level: 15,
                health_fraction: mean_health,
                status_afflicted: false,
            }],
            resources: ResourceSummary {
                money,
                consumables: 3,
                move_uses: 50,
                badges: 0,
            },
            inventory: BTreeMap::new(),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: vec![],
        }
    }

    fn battle_milestone() -> Goal {
        Goal::new(
            GoalId::new(5).unwrap(),
            GoalTier::MediumTerm,
            "defeat the gatekeeper",
            GoalCategory::Battle {
                opponent: "gatekeeper".into(),
            },
        )
        .with_priority(70.0)
    }

    #[test]
    fn healthy_stocked_party_needs_no_prep() {
        let inventory = FixedInventory(BTreeMap::from([("potion".into(), 5)]));
        let subs = expand(&battle_milestone(), &snapshot(0.9, 1000), &inventory);
        assert!(subs.is_empty());
    }

    #[test]
    fn battered_party_heals_before_battle() {
        let inventory = FixedInventory(BTreeMap::new());
        let subs = expand(&battle_milestone(), &snapshot(0.4, 1000), &inventory);
        assert!(subs
            .iter()
            .any(|g| matches!(g.category, GoalCategory::Heal { .. })));
    }

    #[test]
    fn requirement_shortfalls_become_acquire_goals() {
        let milestone = battle_milestone().with_requirement("potion", 3.0);
        let inventory = FixedInventory(BTreeMap::from([("potion".into(), 1)]));
        let subs = expand(&milestone, &snapshot(0.9, 1000), &inventory);
        assert!(subs.iter().any(|g| matches!(
            &g.category,
            GoalCategory::Acquire { item, quantity: 2 } if item == "potion"
        )));
    }

    #[test]
    fn money_shortfall_becomes_liquidation() {
        let milestone = battle_milestone().with_requirement("money", 500.0);
        let inventory = FixedInventory(BTreeMap::new());
        let subs = expand(&milestone, &snapshot(0.9, 100), &inventory);
        assert!(subs
            .iter()
            .any(|g| matches!(g.category, GoalCategory::Liquidate { .. })));
    }

    #[test]
    fn re_expansion_yields_identical_ids() {
        let milestone = battle_milestone().with_requirement("potion", 3.0);
        let inventory = FixedInventory(BTreeMap::new());
        let a = expand(&milestone, &snapshot(0.4, 1000), &inventory);
        let b = expand(&milestone, &snapshot(0.4, 1000), &inventory);
        let ids_a: Vec<GoalId> = a.iter().map(|g| g.id).collect();
        let ids_b: Vec<GoalId> = b.iter().map(|g| g.id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
