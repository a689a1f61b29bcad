//! Strategic layer: long-horizon milestone ordering.
//!
//! Decomposes the long-term picture into an ordered list of medium-term
//! milestones by walking the goal graph's critical path. Re-planned rarely
//! (default every ~1000 ticks); strategy should not wobble tick to tick.

use crate::goal::{GoalId, GoalTier};
use crate::graph::GoalGraph;

/// Ordered milestone ids for the current strategy.
///
/// The critical path bounds minimum completion time, so milestones on it come
/// first, in path order. Medium/long-term goals off the path follow, by
/// authored priority. Terminal goals are never milestones.
pub fn plan_milestones(graph: &GoalGraph) -> Vec<GoalId> {
    let on_path: Vec<GoalId> = graph
        .critical_path()
        .into_iter()
        .filter(|id| is_milestone(graph, *id))
        .collect();

    let mut off_path: Vec<(f64, GoalId)> = graph
        .iter()
        .filter(|g| is_milestone(graph, g.id) && !on_path.contains(&g.id))
        .map(|g| (g.base_priority, g.id))
        .collect();
    off_path.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut milestones = on_path;
    milestones.extend(off_path.into_iter().map(|(_, id)| id));
    tracing::debug!(count = milestones.len(), "strategic milestones re-planned");
    milestones
}

fn is_milestone(graph: &GoalGraph, id: GoalId) -> bool {
    graph.get(id).is_some_and(|g| {
        matches!(g.tier, GoalTier::MediumTerm | GoalTier::LongTerm) && !g.status.is_terminal()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{Goal, GoalCategory};

    fn gid(raw: u64) -> GoalId {
        GoalId::new(raw).unwrap()
    }

    fn milestone(raw: u64, priority: f64) -> Goal {
        Goal::new(
            gid(raw),
            GoalTier::MediumTerm,
            format!("milestone {raw}"),
            GoalCategory::Battle {
                opponent: format!("gatekeeper {raw}"),
            },
        )
        .with_priority(priority)
    }

    #[test]
    fn critical_path_milestones_come_first_in_order() {
        let mut graph = GoalGraph::new();
        graph.push(milestone(1, 10.0));
        graph.push(milestone(2, 20.0));
        graph.push(milestone(3, 90.0));
        graph.add_prerequisite(gid(1), gid(2)).unwrap();

        let milestones = plan_milestones(&graph);
        // Path 1 → 2 first despite goal 3's higher priority.
        assert_eq!(milestones, vec![gid(1), gid(2), gid(3)]);
    }

    #[test]
    fn short_term_goals_are_not_milestones() {
        let mut graph = GoalGraph::new();
        let mut g = milestone(1, 50.0);
        g.tier = crate::goal::GoalTier::ShortTerm;
        graph.push(g);
        assert!(plan_milestones(&graph).is_empty());
    }

    #[test]
    fn completed_goals_drop_out() {
        let mut graph = GoalGraph::new();
        graph.push(milestone(1, 50.0));
        graph.push(milestone(2, 40.0));
        let g = graph.get_mut(gid(1)).unwrap();
        g.start().unwrap();
        g.complete().unwrap();

        assert_eq!(plan_milestones(&graph), vec![gid(2)]);
    }
}
