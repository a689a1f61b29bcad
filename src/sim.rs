//! Scripted simulation world for the CLI driver and end-to-end tests.
//!
//! One shared state cell, six thin handles implementing the collaborator
//! traits. The script plays a calm opening, then a jammed-position stretch,
//! then a money drain, so a full episode exercises the softlock detector,
//! the recovery ladder, and the death-spiral interventions. Seeded RNG keeps
//! every run reproducible.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::collab::{
    CollabError, CollabResult, CollaboratorSet, Combat, InputDriver, InventoryProvider, MenuCommand,
    Navigator, PerceptionFeed, Persistence,
};
use crate::goal::{Goal, GoalCategory, TravelMode};
use crate::snapshot::{BattleObservation, PartyMember, Position, ResourceSummary, WorldSnapshot};

/// Ticks [start, end) during which the avatar is jammed in place.
const JAM_PHASE: (u64, u64) = (40, 70);
/// Ticks [start, end) during which money drains fast.
const DRAIN_PHASE: (u64, u64) = (90, 130);
/// Money lost per tick inside the drain phase.
const DRAIN_PER_TICK: i64 = 220;

#[derive(Debug)]
struct SimState {
    tick: u64,
    rng: StdRng,
    position: Position,
    money: i64,
    consumables: u32,
    move_uses: u32,
    party: Vec<PartyMember>,
    checkpoints: Vec<String>,
    resets: u32,
    /// A reload or reset clears the scripted jam early.
    jam_cleared: bool,
}

impl SimState {
    fn jammed(&self) -> bool {
        !self.jam_cleared && (JAM_PHASE.0..JAM_PHASE.1).contains(&self.tick)
    }
}

/// The scripted world. Clone-cheap handles to its state implement every
/// collaborator trait.
#[derive(Debug)]
pub struct ScriptedWorld {
    state: Rc<RefCell<SimState>>,
}

#[derive(Clone)]
struct Handle(Rc<RefCell<SimState>>);

impl ScriptedWorld {
    pub fn new(seed: u64) -> Self {
        let state = SimState {
            tick: 0,
            rng: StdRng::seed_from_u64(seed),
            position: Position { x: 10, y: 10, map_id: 1 },
            money: 30_000,
            consumables: 8,
            move_uses: 120,
            party: vec![
                PartyMember {
                    name: "ember".into(),
                    level: 14,
                    health_fraction: 1.0,
                    status_afflicted: false,
                },
                PartyMember {
                    name: "brook".into(),
                    level: 11,
                    health_fraction: 0.9,
                    status_afflicted: false,
                },
            ],
            checkpoints: vec!["cp-genesis".into()],
            resets: 0,
            jam_cleared: false,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// A collaborator set backed by this world.
    pub fn collaborators(&self) -> CollaboratorSet {
        let handle = Handle(self.state.clone());
        CollaboratorSet {
            navigator: Box::new(handle.clone()),
            combat: Box::new(handle.clone()),
            inventory: Box::new(handle.clone()),
            perception: Box::new(handle.clone()),
            persistence: Box::new(handle.clone()),
            input: Box::new(handle),
        }
    }

    /// Advance the script one tick (1 tick = 1 second of session time).
    pub fn advance(&mut self) {
        let mut state = self.state.borrow_mut();
        state.tick += 1;
        let tick = state.tick;

        // Ambient wear: battles nibble at health and supplies.
        if tick % 9 == 0 {
            let hit: f32 = state.rng.gen_range(0.02..0.08);
            for member in &mut state.party {
                member.health_fraction = (member.health_fraction - hit).max(0.35);
            }
            state.move_uses = state.move_uses.saturating_sub(2);
        }
        if tick % 23 == 0 && state.consumables > 2 {
            state.consumables -= 1;
        }

        if (DRAIN_PHASE.0..DRAIN_PHASE.1).contains(&tick) {
            state.money = (state.money - DRAIN_PER_TICK).max(0);
        } else if tick % 13 == 0 {
            state.money += 60;
        }

        if !state.jammed() {
            let dx = state.rng.gen_range(-1..=1);
            let dy = state.rng.gen_range(-1..=1);
            state.position.x += dx;
            state.position.y += dy;
        }
    }

    /// Current scripted tick.
    pub fn tick(&self) -> u64 {
        self.state.borrow().tick
    }

    /// Times the system was fully reset.
    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }

    /// Immutable snapshot for this tick.
    pub fn snapshot(&self) -> WorldSnapshot {
        let state = self.state.borrow();
        WorldSnapshot {
            timestamp: state.tick as f64,
            position: state.position,
            party: state.party.clone(),
            resources: ResourceSummary {
                money: state.money,
                consumables: state.consumables,
                move_uses: state.move_uses,
                badges: 1,
            },
            inventory: BTreeMap::from([("potion".into(), state.consumables)]),
            in_battle: false,
            in_menu: false,
            in_dialogue: false,
            active_goal_ids: Vec::new(),
        }
    }
}

impl Navigator for Handle {
    fn navigate(&mut self, destination: &str, _mode: TravelMode, _timeout: f64) -> CollabResult<()> {
        let mut state = self.0.borrow_mut();
        if state.jammed() {
            // Inputs land but the avatar does not move.
            return Ok(());
        }
        // Deterministic pseudo-coordinates for named places.
        let seedling = destination.bytes().map(u64::from).sum::<u64>();
        state.position = Position {
            x: (seedling % 40) as i32,
            y: (seedling / 40 % 40) as i32,
            map_id: 1,
        };
        Ok(())
    }

    fn current_position(&self) -> Position {
        self.0.borrow().position
    }
}

impl Combat for Handle {
    fn battle_outcome(&self) -> Option<BattleObservation> {
        None
    }

    fn estimate_failure_probability(&self, goal: &Goal) -> f64 {
        match &goal.category {
            GoalCategory::Battle { .. } => {
                let state = self.0.borrow();
                let mean: f32 = state.party.iter().map(|m| m.health_fraction).sum::<f32>()
                    / state.party.len().max(1) as f32;
                f64::from(1.0 - mean).clamp(0.0, 1.0) * 0.6
            }
            _ => 0.0,
        }
    }
}

impl InventoryProvider for Handle {
    fn resources(&self) -> ResourceSummary {
        let state = self.0.borrow();
        ResourceSummary {
            money: state.money,
            consumables: state.consumables,
            move_uses: state.move_uses,
            badges: 1,
        }
    }

    fn item_count(&self, item: &str) -> u32 {
        if item == "potion" {
            self.0.borrow().consumables
        } else {
            0
        }
    }
}

impl PerceptionFeed for Handle {
    fn latest_menu_state(&self) -> Option<String> {
        None
    }

    fn latest_dialogue(&self) -> Option<String> {
        None
    }

    fn latest_battle_state(&self) -> Option<BattleObservation> {
        None
    }
}

impl Persistence for Handle {
    fn save_checkpoint(&mut self) -> CollabResult<String> {
        let mut state = self.0.borrow_mut();
        let id = format!("cp-{}", state.tick);
        state.checkpoints.push(id.clone());
        Ok(id)
    }

    fn load_checkpoint(&mut self, id: &str) -> CollabResult<()> {
        let mut state = self.0.borrow_mut();
        if !state.checkpoints.iter().any(|c| c == id) {
            return Err(CollabError::Rejected {
                operation: "load_checkpoint".into(),
                message: format!("unknown checkpoint {id}"),
            });
        }
        state.jam_cleared = true;
        Ok(())
    }

    fn latest_checkpoint(&self) -> Option<String> {
        self.0.borrow().checkpoints.last().cloned()
    }

    fn reset_system(&mut self) -> CollabResult<()> {
        let mut state = self.0.borrow_mut();
        state.resets += 1;
        state.jam_cleared = true;
        state.position = Position { x: 10, y: 10, map_id: 1 };
        for member in &mut state.party {
            member.health_fraction = 1.0;
        }
        Ok(())
    }
}

impl InputDriver for Handle {
    fn interact(&mut self, object: &str, _timeout: f64) -> CollabResult<()> {
        if object == "attendant" {
            let mut state = self.0.borrow_mut();
            for member in &mut state.party {
                member.health_fraction = 1.0;
                member.status_afflicted = false;
            }
            state.move_uses = 120;
        }
        Ok(())
    }

    fn menu_op(&mut self, _command: &MenuCommand, _timeout: f64) -> CollabResult<()> {
        Ok(())
    }

    fn wait(&mut self, _secs: f64) -> CollabResult<()> {
        Ok(())
    }

    fn delegate(&mut self, task: &str, _timeout: f64) -> CollabResult<()> {
        let mut state = self.0.borrow_mut();
        if task.starts_with("sell") {
            state.money += 800;
        }
        if task.starts_with("purchase") {
            state.money = (state.money - 300).max(0);
            state.consumables += 3;
        }
        Ok(())
    }
}
