//! Headless driver: runs a stage with scripted input and prints a summary.
//!
//! Run with: `cargo run -p emberwake-sim --bin emberwake-headless -- --seconds 60`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use emberwake_sim::context::SKILL_SLOTS;
use emberwake_sim::persistence::{JsonFileStore, MemoryStore, SnapshotStore};
use emberwake_sim::prelude::*;
use emberwake_sim::progression::RunStats;
use glam::Vec2;

/// Run the Emberwake simulation without a renderer
#[derive(Parser)]
#[command(name = "emberwake-headless")]
#[command(version)]
struct Cli {
    /// Simulated seconds to run
    #[arg(long, default_value_t = 60.0)]
    seconds: f32,

    /// RNG seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with a `SimConfig`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Profile file to load and autosave; in-memory when omitted
    #[arg(long)]
    profile: Option<PathBuf>,
}

/// Circle strafe, swing constantly, dash and cast on fixed beats.
fn scripted_input(frame: u64, fixed_dt: f32) -> InputState {
    let t = frame as f32 * fixed_dt;
    let mut skills = [false; SKILL_SLOTS];
    for (slot, pressed) in skills.iter_mut().enumerate() {
        *pressed = frame % 90 == slot as u64 * 20;
    }
    InputState {
        move_axis: Vec2::from_angle(t * 0.5),
        attack: true,
        dash: frame % 120 == 60,
        skills,
        ..InputState::default()
    }
}

fn main() -> Result<()> {
    emberwake_sim::logging::init_logging("info");
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SimConfig::from_json_str(&json)?
        }
        None => SimConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let store: Box<dyn SnapshotStore> = match cli.profile {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::default()),
    };

    let fixed_dt = config.fixed_dt;
    let frames = (cli.seconds / fixed_dt).ceil() as u64;
    let mut sim = Simulation::with_store(config, store).context("building simulation")?;
    sim.enter_scene(Scene::Stage(1));

    for frame in 0..frames {
        sim.step(scripted_input(frame, fixed_dt))
            .with_context(|| format!("frame {frame}"))?;
        if !sim.is_player_alive() {
            tracing::info!(frame, "player died");
            let recorded = sim.settle_game_over().context("settling game over")?;
            tracing::info!(recorded, "game over");
            break;
        }
    }

    let world = sim.world();
    let wave = world.resource::<WaveDirector>().map_or(0, |d| d.wave);
    let run = world.resource::<RunStats>().copied().unwrap_or_default();
    let health = world.get::<Health>(sim.player()).map_or(0.0, |h| h.current);
    let (published, dispatched) = world.events().totals();
    tracing::info!(
        wave,
        kills = run.kills,
        health,
        ticks = sim.tick_count(),
        runs = sim.recorded_runs(),
        published,
        dispatched,
        "run finished"
    );
    println!("{}", sim.state_hash()?);
    Ok(())
}
