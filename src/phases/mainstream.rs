use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::models::Track;
use crate::profile::AggregateProfile;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How much of one genre's top search results the listener already knows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreOverlap {
    pub genre: String,
    /// Frequency of the genre in the listener's profile
    pub weight: u32,
    pub searched: usize,
    pub heard: usize,
    /// Unheard tracks by an artist the listener knows
    pub known_artist: usize,
    pub overlap_percent: u32,
}

impl GenreOverlap {
    /// Heard tracks count fully, known-artist tracks count half
    pub fn from_tracks(genre: &str, weight: u32, tracks: &[Track], known: &AggregateProfile) -> Self {
        let mut heard = 0;
        let mut known_artist = 0;
        for track in tracks {
            if known.knows_track(track) {
                heard += 1;
            } else if known.knows_any_artist(track) {
                known_artist += 1;
            }
        }
        Self {
            genre: genre.to_string(),
            weight,
            searched: tracks.len(),
            heard,
            known_artist,
            overlap_percent: overlap_percent(heard, known_artist, tracks.len()),
        }
    }
}

pub fn overlap_percent(heard: usize, known_artist: usize, searched: usize) -> u32 {
    if searched == 0 {
        return 0;
    }
    (100.0 * (heard as f64 + 0.5 * known_artist as f64) / searched as f64).round() as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainstreamReport {
    pub genres: Vec<GenreOverlap>,
    pub score: u32,
    pub tier: String,
}

impl MainstreamReport {
    /// Average the per-genre overlaps, weighted by genre frequency
    pub fn from_overlaps(genres: Vec<GenreOverlap>) -> Self {
        let total_weight: u64 = genres.iter().map(|g| g.weight.max(1) as u64).sum();
        let score = if total_weight == 0 {
            0
        } else {
            let weighted: u64 = genres
                .iter()
                .map(|g| g.overlap_percent as u64 * g.weight.max(1) as u64)
                .sum();
            (weighted as f64 / total_weight as f64).round() as u32
        };
        Self {
            tier: Self::tier(score).to_string(),
            genres,
            score,
        }
    }

    pub fn tier(score: u32) -> &'static str {
        match score {
            70.. => "Chart Chaser",
            45..=69 => "Crowd Pleaser",
            25..=44 => "Indie Wanderer",
            _ => "Deep Underground",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainstreamResult {
    pub report: MainstreamReport,
    pub budget_exhausted: bool,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

impl ProfileBuilder<'_> {
    /// Probe the top-ranked search results of the listener's top genres and
    /// measure how many are already known.
    pub fn build_mainstream(
        &self,
        known: &AggregateProfile,
        top_genres: &[(String, u32)],
    ) -> Result<MainstreamResult, ApiError> {
        let started = self.started();
        let budget = self.budget();
        let mut warnings = Vec::new();
        let mut overlaps = Vec::new();
        let mut budget_exhausted = false;

        for (genre, weight) in top_genres.iter().take(self.settings.mainstream_genres) {
            if budget.should_stop() {
                budget_exhausted = true;
                break;
            }
            let context = format!("mainstream search '{genre}'");
            let Some(tracks) = best_effort(
                self.client
                    .search_tracks(&format!("genre:\"{genre}\""), self.settings.tracks_per_genre),
                &context,
                &mut warnings,
            )?
            else {
                continue;
            };
            if tracks.is_empty() {
                warnings.push(format!("{context}: no results"));
                continue;
            }
            overlaps.push(GenreOverlap::from_tracks(genre, *weight, &tracks, known));
        }

        let report = MainstreamReport::from_overlaps(overlaps);
        info!("Mainstream: score {} ({})", report.score, report.tier);

        Ok(MainstreamResult {
            report,
            budget_exhausted,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }
}
