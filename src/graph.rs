//! Goal graph: one owned collection, two views.
//!
//! Goals live in a single insertion-ordered list (the LIFO "stack" view);
//! prerequisite edges form a DAG over them. Acyclicity is enforced at
//! insertion time: an edge that would create a cycle is rejected and the
//! graph left unchanged, so downstream traversals never need lazy cycle
//! detection. Priority ordering is derived per tick by the planner rather
//! than maintained as a mutable heap; with the stack bounded at ~50 goals a
//! rebuild is cheap and avoids stale-entry hazards.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::prelude::DiGraphMap;
use petgraph::Direction;

use crate::error::GraphError;
use crate::goal::{Goal, GoalCatalog, GoalId};

/// Default bound on the number of goals held at once.
pub const DEFAULT_STACK_BOUND: usize = 50;

/// Effect of a [`GoalGraph::push`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEffect {
    /// The goal was inserted.
    Inserted,
    /// A goal with the same id existed; the higher priority was kept.
    Merged,
    /// The goal was inserted and the named lowest-priority goal was evicted
    /// to stay within the stack bound.
    Evicted(GoalId),
}

/// The goal stack and its prerequisite DAG.
///
/// Owned exclusively by the planner; mutated only through the methods here.
#[derive(Debug, Default)]
pub struct GoalGraph {
    /// Insertion order; the tail is the most recently pushed goal.
    goals: Vec<Goal>,
    /// `(prerequisite, dependent)` pairs.
    edges: BTreeSet<(GoalId, GoalId)>,
    capacity: usize,
    next_seq: u64,
}

impl GoalGraph {
    /// Create a graph with the default stack bound.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STACK_BOUND)
    }

    /// Create a graph with a custom stack bound.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            goals: Vec::new(),
            edges: BTreeSet::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn contains(&self, id: GoalId) -> bool {
        self.goals.iter().any(|g| g.id == id)
    }

    pub fn get(&self, id: GoalId) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn get_mut(&mut self, id: GoalId) -> Option<&mut Goal> {
        self.goals.iter_mut().find(|g| g.id == id)
    }

    /// Goals in insertion order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter()
    }

    /// Number of goals that list `id` as a prerequisite.
    pub fn dependents_of(&self, id: GoalId) -> usize {
        self.edges.iter().filter(|(p, _)| *p == id).count()
    }

    /// Whether `id` still waits on an unfinished prerequisite in the graph.
    pub fn is_blocked(&self, id: GoalId) -> bool {
        self.edges
            .iter()
            .filter(|(_, d)| *d == id)
            .any(|(p, _)| self.get(*p).is_some_and(|g| !g.status.is_terminal()))
    }

    /// Push a goal: merge by id (keeping the higher base priority) or insert.
    ///
    /// If insertion exceeds the stack bound, the lowest-priority goal is
    /// evicted along with its edges.
    pub fn push(&mut self, mut goal: Goal) -> PushEffect {
        if let Some(existing) = self.get_mut(goal.id) {
            if goal.base_priority > existing.base_priority {
                existing.base_priority = goal.base_priority;
            }
            return PushEffect::Merged;
        }

        goal.created_seq = self.next_seq;
        self.next_seq += 1;
        self.goals.push(goal);

        if self.goals.len() > self.capacity {
            // Evict the lowest-priority entry (ties: the older one goes).
            let victim = self
                .goals
                .iter()
                .min_by(|a, b| {
                    a.base_priority
                        .partial_cmp(&b.base_priority)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.created_seq.cmp(&b.created_seq))
                })
                .map(|g| g.id);
            if let Some(victim) = victim {
                tracing::debug!(goal = %victim, "evicting lowest-priority goal at stack bound");
                self.remove(victim);
                return PushEffect::Evicted(victim);
            }
        }
        PushEffect::Inserted
    }

    /// LIFO peek at the most recently pushed goal.
    pub fn peek(&self) -> Option<&Goal> {
        self.goals.last()
    }

    /// LIFO pop of the most recently pushed goal, dropping its edges.
    pub fn pop(&mut self) -> Option<Goal> {
        let goal = self.goals.pop()?;
        self.edges.retain(|(p, d)| *p != goal.id && *d != goal.id);
        Some(goal)
    }

    /// Remove a goal by id, dropping its edges.
    pub fn remove(&mut self, id: GoalId) -> Option<Goal> {
        let idx = self.goals.iter().position(|g| g.id == id)?;
        let goal = self.goals.remove(idx);
        self.edges.retain(|(p, d)| *p != id && *d != id);
        Some(goal)
    }

    /// Record that `prerequisite` must complete before `dependent`.
    ///
    /// Rejects the edge (leaving the graph unchanged) if it would create a
    /// cycle, verified by a topological sort over the tentative edge set.
    pub fn add_prerequisite(&mut self, prerequisite: GoalId, dependent: GoalId) -> Result<(), GraphError> {
        // A self-edge is the degenerate cycle.
        if prerequisite == dependent {
            return Err(GraphError::CycleRejected {
                prerequisite: prerequisite.get(),
                dependent: dependent.get(),
            });
        }
        if !self.contains(prerequisite) {
            return Err(GraphError::GoalNotFound {
                goal_id: prerequisite.get(),
            });
        }
        if !self.contains(dependent) {
            return Err(GraphError::GoalNotFound {
                goal_id: dependent.get(),
            });
        }
        if self.edges.contains(&(prerequisite, dependent)) {
            return Ok(());
        }

        self.edges.insert((prerequisite, dependent));
        if toposort(&self.digraph(), None).is_err() {
            self.edges.remove(&(prerequisite, dependent));
            return Err(GraphError::CycleRejected {
                prerequisite: prerequisite.get(),
                dependent: dependent.get(),
            });
        }
        Ok(())
    }

    /// Pull missing prerequisites from the catalog until a fixed point.
    ///
    /// For every goal in the stack, every prerequisite id not already present
    /// is fetched from the catalog and pushed, and the corresponding edge
    /// recorded. Idempotent: a second run performs no pushes. Returns the
    /// number of goals pushed.
    pub fn resolve_dependencies(&mut self, catalog: &dyn GoalCatalog) -> usize {
        let mut pushed = 0;
        // Ids already attempted this resolution, so an evicted or
        // catalog-missing prerequisite is not refetched forever.
        let mut attempted: BTreeSet<GoalId> = BTreeSet::new();

        loop {
            // Wire up edges for prerequisites that are now present.
            let pairs: Vec<(GoalId, GoalId)> = self
                .goals
                .iter()
                .flat_map(|g| g.prerequisites.iter().map(move |p| (*p, g.id)))
                .filter(|(p, d)| self.contains(*p) && !self.edges.contains(&(*p, *d)))
                .collect();
            for (p, d) in pairs {
                if let Err(err) = self.add_prerequisite(p, d) {
                    tracing::warn!(%p, %d, %err, "skipping prerequisite edge");
                }
            }

            let missing: Vec<GoalId> = self
                .goals
                .iter()
                .flat_map(|g| g.prerequisites.iter().copied())
                .filter(|p| !self.contains(*p) && !attempted.contains(p))
                .collect();
            if missing.is_empty() {
                break;
            }

            for id in missing {
                attempted.insert(id);
                match catalog.lookup(id) {
                    Some(goal) => {
                        self.push(goal);
                        pushed += 1;
                    }
                    None => {
                        tracing::warn!(goal = %id, "prerequisite not in catalog");
                    }
                }
            }
        }
        pushed
    }

    /// Longest prerequisite chain through the DAG, in completion order.
    ///
    /// Kahn's algorithm produces the topological order; a longest-path
    /// back-substitution over that order yields the chain. Diagnostics and
    /// route optimization only; correctness never depends on this.
    pub fn critical_path(&self) -> Vec<GoalId> {
        let graph = self.digraph();
        let order = match self.kahn_order(&graph) {
            Some(order) => order,
            // Unreachable while the insertion invariant holds.
            None => return Vec::new(),
        };

        let mut dist: BTreeMap<GoalId, usize> = order.iter().map(|id| (*id, 0)).collect();
        let mut pred: BTreeMap<GoalId, GoalId> = BTreeMap::new();
        for &node in &order {
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                let candidate = dist[&node] + 1;
                if candidate > dist[&next] {
                    dist.insert(next, candidate);
                    pred.insert(next, node);
                }
            }
        }

        let mut tail = match order.iter().max_by_key(|id| dist[*id]) {
            Some(&id) => id,
            None => return Vec::new(),
        };
        let mut path = vec![tail];
        while let Some(&prev) = pred.get(&tail) {
            path.push(prev);
            tail = prev;
        }
        path.reverse();
        path
    }

    fn digraph(&self) -> DiGraphMap<GoalId, ()> {
        let mut graph = DiGraphMap::new();
        for goal in &self.goals {
            graph.add_node(goal.id);
        }
        for (p, d) in &self.edges {
            graph.add_edge(*p, *d, ());
        }
        graph
    }

    /// Kahn's algorithm over the prerequisite DAG. `None` on a cycle.
    fn kahn_order(&self, graph: &DiGraphMap<GoalId, ()>) -> Option<Vec<GoalId>> {
        let mut indegree: BTreeMap<GoalId, usize> = self
            .goals
            .iter()
            .map(|g| (g.id, graph.neighbors_directed(g.id, Direction::Incoming).count()))
            .collect();
        let mut queue: VecDeque<GoalId> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.goals.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                let deg = indegree.get_mut(&next)?;
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next);
                }
            }
        }

        (order.len() == self.goals.len()).then_some(order)
    }
}
