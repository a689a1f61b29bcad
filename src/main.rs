//! volition CLI: drive the planning core against the scripted world.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use volition::config::CoreConfig;
use volition::core::{Core, PlanSource};
use volition::goal::{Goal, GoalCatalog, GoalCategory, GoalId, GoalTier, StaticCatalog, TravelMode};
use volition::sim::ScriptedWorld;

#[derive(Parser)]
#[command(name = "volition", version, about = "Goal-oriented planning & resilience core")]
struct Cli {
    /// Optional TOML config overriding the built-in thresholds.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted episode through the core.
    Run {
        /// Ticks to simulate.
        #[arg(long, default_value = "150")]
        ticks: u64,

        /// World script seed.
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Emit the final status report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as TOML.
    Defaults,
}

fn gid(raw: u64) -> GoalId {
    GoalId::new(raw).expect("demo ids are nonzero literals")
}

/// The hand-authored demo catalog: a short progression ladder with
/// prerequisites for dependency resolution to chase.
fn demo_catalog() -> StaticCatalog {
    StaticCatalog::new([
        Goal::new(
            gid(1),
            GoalTier::MediumTerm,
            "reach cove town",
            GoalCategory::Travel {
                destination: "cove-town".into(),
                mode: TravelMode::Direct,
            },
        )
        .with_priority(55.0)
        .with_cost_value(2.0, 3.0),
        Goal::new(
            gid(2),
            GoalTier::MediumTerm,
            "defeat the cove gatekeeper",
            GoalCategory::Battle {
                opponent: "cove-gatekeeper".into(),
            },
        )
        .with_priority(65.0)
        .with_cost_value(4.0, 8.0)
        .with_requirement("potion", 2.0)
        .with_prerequisite(gid(1)),
        Goal::new(
            gid(3),
            GoalTier::LongTerm,
            "defeat the ridge gatekeeper",
            GoalCategory::Battle {
                opponent: "ridge-gatekeeper".into(),
            },
        )
        .with_priority(70.0)
        .with_cost_value(6.0, 12.0)
        .with_prerequisite(gid(2)),
    ])
}

fn run_episode(config: CoreConfig, ticks: u64, seed: u64, json: bool) -> Result<()> {
    let mut world = ScriptedWorld::new(seed);
    let mut core = Core::new(config, Box::new(demo_catalog()), world.collaborators())?;

    // Seed the long-horizon goal; dependency resolution pulls in the rest.
    if let Some(catalog_top) = demo_catalog().lookup(gid(3)) {
        core.inject_goal(catalog_top);
    }

    for _ in 0..ticks {
        world.advance();
        let snapshot = world.snapshot();
        let report = core.tick(&snapshot)?;

        if report.source != PlanSource::Idle {
            tracing::info!(
                tick = report.tick,
                source = %report.source,
                tier = %report.tier,
                confidence = report.confidence,
                actions = report.actions.len(),
                "tick"
            );
        }
        if !report.actions.is_empty() {
            let exec = core.execute(report.goal_id, &report.actions, snapshot.timestamp);
            if !exec.succeeded() {
                tracing::warn!(outcome = ?exec.outcome, "execution did not complete");
            }
        }
    }

    let status = core.status();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).into_diagnostic()?
        );
    } else {
        println!(
            "after {} ticks: confidence {:.1}, tier {}, {} open goals, {} recovery attempts, {} resets",
            ticks,
            status.confidence,
            status.tier,
            status.active_goal_stack.len(),
            status.recent_recoveries.len(),
            world.resets(),
        );
        for goal in &status.active_goal_stack {
            println!("  [{}] {} ({})", goal.id, goal.description, goal.status);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };

    match cli.command {
        Commands::Run { ticks, seed, json } => run_episode(config, ticks, seed, json),
        Commands::Defaults => {
            print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            Ok(())
        }
    }
}
