//! Stitches phase results into one run state.
//!
//! Each phase is idempotent on retry: its fragment is merged with
//! [`AggregateProfile::merge`], so re-running a phase after a partial failure
//! only adds what was missing.

use crate::client::ApiClient;
use crate::config::Settings;
use crate::error::ApiError;
use crate::phases::{AlbumGap, MainstreamReport, Phase, ProfileBuilder};
use crate::profile::{AggregateProfile, GenreGraph, MergeStats, ProfileAnalysis, ProfileAnalyzer};
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// Everything a caller needs to resume a run in a later invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunState {
    pub profile: AggregateProfile,
    pub user_id: Option<String>,
    /// Priority ordered, long-term first
    pub top_artist_ids: Vec<String>,
    pub library_offset: u32,
    pub library_done: bool,
    pub completed: BTreeSet<Phase>,
    pub discography: Vec<AlbumGap>,
    pub mainstream: Option<MainstreamReport>,
    pub warnings: Vec<String>,
}

impl RunState {
    /// Read a saved state, or start empty if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run state '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run state '{}'", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write run state '{}'", path.display()))
    }

    fn absorb(&mut self, phase: Phase, fragment: &AggregateProfile, warnings: &[String]) -> MergeStats {
        self.record_warnings(phase, warnings);
        self.profile.merge(fragment)
    }

    fn record_warnings(&mut self, phase: Phase, warnings: &[String]) {
        self.warnings
            .extend(warnings.iter().map(|w| format!("{phase}: {w}")));
    }
}

/// What one phase invocation contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub phase: Phase,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
    /// Library cursor; `null` once the scan is complete or for unchunked phases
    pub next_offset: Option<u32>,
    pub new_tracks: usize,
    pub new_artists: usize,
    pub new_genres: usize,
    pub warnings: Vec<String>,
    /// Phase-specific counters
    pub details: Value,
}

impl PhaseSummary {
    fn new(phase: Phase, build_time_ms: u64, stats: MergeStats, warnings: Vec<String>) -> Self {
        Self {
            phase,
            build_time_ms,
            next_offset: None,
            new_tracks: stats.new_tracks,
            new_artists: stats.new_artists,
            new_genres: stats.new_genres,
            warnings,
            details: Value::Null,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

pub struct Orchestrator<'a> {
    builder: ProfileBuilder<'a>,
    settings: &'a Settings,
    graph: GenreGraph,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a ApiClient, settings: &'a Settings) -> Self {
        Self {
            builder: ProfileBuilder::new(client, settings),
            settings,
            graph: GenreGraph::default(),
        }
    }

    /// Run a single phase and merge its output into `state`
    pub fn run_phase<R: Rng + ?Sized>(
        &self,
        state: &mut RunState,
        phase: Phase,
        rng: &mut R,
    ) -> Result<PhaseSummary, ApiError> {
        info!("Running phase {phase}");
        let summary = match phase {
            Phase::Basics => {
                let result = self.builder.build_basics()?;
                let stats = state.absorb(phase, &result.profile, &result.warnings);
                if let Some(user) = &result.user {
                    state.user_id = Some(user.id.clone());
                }
                if !result.top_artist_ids.is_empty() {
                    state.top_artist_ids = result.top_artist_ids.clone();
                }
                PhaseSummary::new(phase, result.build_time_ms, stats, result.warnings).with_details(
                    json!({ "topArtists": result.top_artist_ids.len(), "user": state.user_id }),
                )
            }
            Phase::Library => {
                let offset = if state.library_done { 0 } else { state.library_offset };
                let result = self.builder.build_library(offset)?;
                let stats = state.absorb(phase, &result.profile, &result.warnings);
                state.library_offset = result.next_offset.unwrap_or(0);
                state.library_done = result.next_offset.is_none();
                let mut summary =
                    PhaseSummary::new(phase, result.build_time_ms, stats, result.warnings)
                        .with_details(json!({
                            "startOffset": offset,
                            "pagesFetched": result.pages_fetched,
                            "total": result.total,
                        }));
                summary.next_offset = result.next_offset;
                summary
            }
            Phase::Playlists => {
                let result = self.builder.build_playlists(state.user_id.as_deref())?;
                let stats = state.absorb(phase, &result.profile, &result.warnings);
                PhaseSummary::new(phase, result.build_time_ms, stats, result.warnings).with_details(
                    json!({
                        "playlistsTotal": result.playlists_total,
                        "playlistsOwned": result.playlists_owned,
                        "playlistsBlocked": result.playlists_blocked,
                    }),
                )
            }
            Phase::Genres => {
                let result =
                    self.builder
                        .build_genres(&state.profile, &state.top_artist_ids, &self.graph)?;
                let stats = state.absorb(phase, &result.profile, &result.warnings);
                PhaseSummary::new(phase, result.build_time_ms, stats, result.warnings).with_details(
                    json!({
                        "reusedGenres": result.reused_genres,
                        "artistsLookedUp": result.artists_looked_up,
                        "probesIssued": result.probes_issued,
                        "probeHits": result.probe_hits,
                        "budgetExhausted": result.budget_exhausted,
                    }),
                )
            }
            Phase::Discography => {
                let result =
                    self.builder
                        .build_discography(&state.profile, &state.top_artist_ids, rng)?;
                state.record_warnings(phase, &result.warnings);
                let details = json!({
                    "gaps": result.gaps,
                    "artistsScanned": result.artists_scanned,
                    "albumsScanned": result.albums_scanned,
                    "budgetExhausted": result.budget_exhausted,
                });
                state.discography = result.gaps;
                PhaseSummary::new(phase, result.build_time_ms, MergeStats::default(), result.warnings)
                    .with_details(details)
            }
            Phase::Mainstream => {
                let top_genres = state.profile.top_genres(self.settings.mainstream_genres);
                let result = self.builder.build_mainstream(&state.profile, &top_genres)?;
                state.record_warnings(phase, &result.warnings);
                let details = json!({
                    "report": result.report,
                    "budgetExhausted": result.budget_exhausted,
                });
                state.mainstream = Some(result.report);
                PhaseSummary::new(phase, result.build_time_ms, MergeStats::default(), result.warnings)
                    .with_details(details)
            }
        };

        if phase != Phase::Library || state.library_done {
            state.completed.insert(phase);
        }
        info!(
            "Phase {} done in {}ms: +{} tracks, +{} artists, +{} genres",
            phase, summary.build_time_ms, summary.new_tracks, summary.new_artists, summary.new_genres
        );
        Ok(summary)
    }

    /// Run every phase in order, looping the library phase until its cursor
    /// is exhausted. A fatal error stops the run; merged progress stays in
    /// `state` so a later invocation can pick up from there.
    pub fn run_all<R: Rng + ?Sized>(
        &self,
        state: &mut RunState,
        rng: &mut R,
    ) -> Result<Vec<PhaseSummary>, ApiError> {
        let mut summaries = Vec::new();
        for phase in Phase::ALL {
            if phase != Phase::Library {
                summaries.push(self.run_phase(state, phase, rng)?);
                continue;
            }
            loop {
                let start = if state.library_done { 0 } else { state.library_offset };
                let summary = self.run_phase(state, phase, rng)?;
                let stalled = summary.next_offset == Some(start);
                summaries.push(summary);
                if state.library_done {
                    break;
                }
                if stalled {
                    warn!("Library scan stalled at offset {start}, leaving it for a later run");
                    break;
                }
            }
        }
        Ok(summaries)
    }

    pub fn analyze<R: Rng + ?Sized>(&self, state: &RunState, rng: &mut R) -> ProfileAnalysis {
        ProfileAnalyzer::new(&self.graph, self.settings).analyze(
            &state.profile,
            &state.top_artist_ids,
            rng,
        )
    }
}
