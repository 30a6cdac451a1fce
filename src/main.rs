use anyhow::Result;
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod error;
mod models;
mod orchestrator;
mod pacing;
mod phases;
mod profile;


use crate::client::ApiClient;
use crate::config::{Settings, load_config};
use crate::orchestrator::{Orchestrator, RunState};
use crate::pacing::SystemClock;
use crate::phases::Phase;
use crate::profile::{GenreGraph, ProfileAnalyzer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    Basics,
    Library,
    Playlists,
    Genres,
    Discography,
    Mainstream,
    /// Analyze the saved state without calling the upstream API
    Analyze,
    /// Every phase in order, then the analysis
    All,
}

impl PhaseArg {
    fn phase(self) -> Option<Phase> {
        match self {
            PhaseArg::Basics => Some(Phase::Basics),
            PhaseArg::Library => Some(Phase::Library),
            PhaseArg::Playlists => Some(Phase::Playlists),
            PhaseArg::Genres => Some(Phase::Genres),
            PhaseArg::Discography => Some(Phase::Discography),
            PhaseArg::Mainstream => Some(Phase::Mainstream),
            PhaseArg::Analyze | PhaseArg::All => None,
        }
    }
}

#[derive(Parser)]
#[command(name = "taste-profiler")]
#[command(about = "Listening fingerprint and taste analytics for a music streaming account")]
#[command(version)]
struct Args {
    /// Phase to run
    #[arg(short = 'p', long = "phase", value_enum, default_value_t = PhaseArg::All)]
    phase: PhaseArg,

    /// JSON run state, read before and written after the run
    #[arg(short = 's', long = "state")]
    state: Option<PathBuf>,

    /// Resume the library scan from this offset
    #[arg(long = "offset")]
    offset: Option<u32>,

    /// Path to a JSON file overriding the tuning settings
    #[arg(long = "settings")]
    settings: Option<String>,

    /// Seed for blind-spot sampling and album shuffling
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Quiet mode - only warnings and errors are logged
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    let settings = match &args.settings {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::default(),
    };
    let mut state = match &args.state {
        Some(path) => RunState::load(path)?,
        None => RunState::default(),
    };
    if let Some(offset) = args.offset {
        state.library_offset = offset;
        state.library_done = false;
    }
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if args.phase == PhaseArg::Analyze {
        let graph = GenreGraph::default();
        let analysis = ProfileAnalyzer::new(&graph, &settings).analyze(
            &state.profile,
            &state.top_artist_ids,
            &mut rng,
        );
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let config = load_config()?;
    let client = ApiClient::new(&config, &settings, Arc::new(SystemClock::new()));
    let orchestrator = Orchestrator::new(&client, &settings);

    let outcome = match args.phase.phase() {
        Some(phase) => orchestrator
            .run_phase(&mut state, phase, &mut rng)
            .map(|summary| json!(summary)),
        None => orchestrator.run_all(&mut state, &mut rng).map(|summaries| {
            json!({
                "phases": summaries,
                "analysis": orchestrator.analyze(&state, &mut rng),
            })
        }),
    };

    // progress merged before a fatal error is kept for the next invocation
    if let Some(path) = &args.state {
        state.save(path)?;
        info!("Run state written to {}", path.display());
    }

    match outcome {
        Ok(value) => {
            print_json(&value)?;
            Ok(())
        }
        Err(err) => {
            match err.cooldown_secs() {
                Some(secs) => error!("Upstream asked for a {secs}s cooldown, try again later"),
                None => error!("Run aborted: {err}"),
            }
            print_json(&json!({ "error": err.to_string() }))?;
            Err(err.into())
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
