//! # volition
//!
//! Goal-oriented planning and resilience core for autonomous game agents.
//! Decides what the agent does next and keeps it from getting permanently
//! stuck: a bounded goal DAG with utility-based prioritization, a four-layer
//! hierarchical planner gated by a confidence-driven escalation tier, and a
//! recovery ladder that degrades from in-place fixes down to a full reset.
//!
//! ## Architecture
//!
//! - **Goal graph** (`graph`): insertion-ordered stack + acyclic prerequisite DAG
//! - **Prioritization** (`priority`): multiplicative utility scoring with learned success rates
//! - **Planner** (`planner`): Strategic → Tactical → Operational → Reactive layers
//! - **Health signals** (`confidence`, `validate`, `softlock`, `spiral`): escalation tiers,
//!   stall and resource-trend detection
//! - **Recovery** (`recovery`): bounded escalation ladder with a single terminal error
//! - **Boundary** (`collab`, `core`): synchronous collaborator traits and the tick facade
//!
//! ## Library usage
//!
//! ```no_run
//! use volition::config::CoreConfig;
//! use volition::core::Core;
//! use volition::goal::StaticCatalog;
//! use volition::sim::ScriptedWorld;
//!
//! let world = ScriptedWorld::new(42);
//! let mut core = Core::new(
//!     CoreConfig::default(),
//!     Box::new(StaticCatalog::default()),
//!     world.collaborators(),
//! ).unwrap();
//! let report = core.tick(&world.snapshot()).unwrap();
//! println!("tier: {}", report.tier);
//! ```

pub mod action;
pub mod collab;
pub mod config;
pub mod confidence;
pub mod core;
pub mod error;
pub mod goal;
pub mod graph;
pub mod planner;
pub mod priority;
pub mod recovery;
pub mod sim;
pub mod snapshot;
pub mod softlock;
pub mod spiral;
pub mod validate;

pub use config::CoreConfig;
pub use core::{Core, PlanSource, StatusReport, TickReport};
pub use error::{CoreError, CoreResult};
pub use goal::{Goal, GoalCategory, GoalId, GoalStatus, GoalTier};
