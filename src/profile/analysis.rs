use super::aggregate::AggregateProfile;
use super::blind_spots::{BlindSpot, find_blind_spots};
use super::catalog::GenreGraph;
use super::scoring::{ExplorerScore, GenreScoring, RadarPoint};
use crate::config::Settings;
use rand::Rng;
use serde::Serialize;

const TOP_ARTIST_DISPLAY: usize = 10;

/// One decade of the release timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecadeBucket {
    pub decade: String,
    pub count: u32,
    /// Share of dated tracks, 0-100
    pub percent: f64,
}

/// Headline numbers about the profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_tracks: usize,
    pub dated_tracks: usize,
    pub total_artists: usize,
    pub total_genres: usize,
    pub median_release_year: Option<i32>,
    pub peak_decade: Option<String>,
    pub total_listening_hours: f64,
    pub average_track_minutes: Option<f64>,
    pub explicit_percent: Option<f64>,
    /// Absent when the upstream omitted popularity everywhere
    pub average_popularity: Option<f64>,
    pub earliest_save: Option<String>,
    pub latest_save: Option<String>,
    pub last_played: Option<String>,
    pub sources: std::collections::BTreeMap<String, usize>,
}

/// Read-only snapshot handed to presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAnalysis {
    pub genre_radar: Vec<RadarPoint>,
    pub timeline: Vec<DecadeBucket>,
    pub explorer: ExplorerScore,
    pub blind_spots: Vec<BlindSpot>,
    pub top_artists: Vec<String>,
    pub stats: SummaryStats,
}

/// Pure transformations of a completed profile
pub struct ProfileAnalyzer<'a> {
    graph: &'a GenreGraph,
    settings: &'a Settings,
}

impl<'a> ProfileAnalyzer<'a> {
    pub fn new(graph: &'a GenreGraph, settings: &'a Settings) -> Self {
        Self { graph, settings }
    }

    /// Build the analysis snapshot. `top_artist_ids` is the priority-ordered
    /// list from the basics phase; the RNG drives untouched-genre sampling.
    pub fn analyze<R: Rng + ?Sized>(
        &self,
        profile: &AggregateProfile,
        top_artist_ids: &[String],
        rng: &mut R,
    ) -> ProfileAnalysis {
        let timeline = Self::timeline(profile);
        let top_artists = top_artist_ids
            .iter()
            .filter_map(|id| profile.artist_names.get(id).cloned())
            .take(TOP_ARTIST_DISPLAY)
            .collect();

        ProfileAnalysis {
            genre_radar: GenreScoring::radar(&profile.genre_frequency, self.settings.radar_size),
            explorer: GenreScoring::explorer(&profile.genre_frequency),
            blind_spots: find_blind_spots(
                &profile.genre_frequency,
                self.graph,
                self.settings.blind_spot_limit,
                rng,
            ),
            stats: Self::summary(profile, &timeline),
            timeline,
            top_artists,
        }
    }

    /// Decade buckets in chronological order
    pub fn timeline(profile: &AggregateProfile) -> Vec<DecadeBucket> {
        let distribution = profile.decade_distribution();
        let dated: u32 = distribution.values().sum();
        if dated == 0 {
            return Vec::new();
        }

        // labels share a width until year 10000, so lexical order is chronological
        distribution
            .into_iter()
            .map(|(decade, count)| DecadeBucket {
                decade,
                count,
                percent: (count as f64 / dated as f64 * 1000.0).round() / 10.0,
            })
            .collect()
    }

    /// Sorted-array midpoint
    pub fn median_year(profile: &AggregateProfile) -> Option<i32> {
        let mut years = profile.release_years();
        if years.is_empty() {
            return None;
        }
        years.sort_unstable();
        Some(years[years.len() / 2])
    }

    pub fn peak_decade(timeline: &[DecadeBucket]) -> Option<String> {
        timeline
            .iter()
            // earliest decade wins a tie
            .rev()
            .max_by_key(|bucket| bucket.count)
            .map(|bucket| bucket.decade.clone())
    }

    fn summary(profile: &AggregateProfile, timeline: &[DecadeBucket]) -> SummaryStats {
        let facts: Vec<_> = profile.track_facts.values().collect();

        let durations: Vec<u64> = facts.iter().filter_map(|f| f.duration_ms).collect();
        let total_ms: u64 = durations.iter().sum();
        let average_track_minutes = if durations.is_empty() {
            None
        } else {
            Some(round1(total_ms as f64 / durations.len() as f64 / 60_000.0))
        };

        let explicit_percent = if facts.is_empty() {
            None
        } else {
            let explicit = facts.iter().filter(|f| f.explicit).count();
            Some(round1(explicit as f64 / facts.len() as f64 * 100.0))
        };

        let popularity: Vec<u32> = facts.iter().filter_map(|f| f.popularity).collect();
        let average_popularity = if popularity.is_empty() {
            None
        } else {
            Some(round1(
                popularity.iter().sum::<u32>() as f64 / popularity.len() as f64,
            ))
        };

        SummaryStats {
            total_tracks: profile.total_tracks_analyzed(),
            dated_tracks: timeline.iter().map(|b| b.count as usize).sum(),
            total_artists: profile.artist_ids.len(),
            total_genres: profile.genre_frequency.len(),
            median_release_year: Self::median_year(profile),
            peak_decade: Self::peak_decade(timeline),
            total_listening_hours: round1(total_ms as f64 / 3_600_000.0),
            average_track_minutes,
            explicit_percent,
            average_popularity,
            earliest_save: profile.earliest_save().map(|dt| dt.to_rfc3339()),
            latest_save: profile.latest_save().map(|dt| dt.to_rfc3339()),
            last_played: profile.last_played().map(|dt| dt.to_rfc3339()),
            sources: profile.sources.clone(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
