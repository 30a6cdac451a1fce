use crate::models::{Artist, SimpleArtist, Track};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sample of artist names kept per genre for display
const GENRE_ARTIST_SAMPLE: usize = 8;

/// Facts about one track, kept per ID so that counters derive from unique tracks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFacts {
    pub year: Option<i32>,
    pub duration_ms: Option<u64>,
    pub explicit: bool,
    pub popularity: Option<u32>,
}

/// Counts of what a merge added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub new_tracks: usize,
    pub new_artists: usize,
    pub new_genres: usize,
}

/// The accumulating "heard" fingerprint.
///
/// Identifier sets and counters only ever grow. Merging the same fragment
/// twice leaves the profile unchanged after the first merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateProfile {
    pub track_ids: BTreeSet<String>,
    pub isrcs: BTreeSet<String>,
    pub artist_ids: BTreeSet<String>,
    pub artist_names: BTreeMap<String, String>,
    pub genre_frequency: BTreeMap<String, u32>,
    pub genre_artists: BTreeMap<String, BTreeSet<String>>,
    /// (artist key, genre) pairs already counted
    pub genre_observations: BTreeSet<(String, String)>,
    pub track_facts: BTreeMap<String, TrackFacts>,
    pub sources: BTreeMap<String, usize>,
    pub played_at: BTreeSet<String>,
    pub saved_at: BTreeSet<String>,
}

/// A year is plausible if it is after 1900 and not beyond next year
pub fn is_sane_year(year: i32, current_year: i32) -> bool {
    year > 1900 && year <= current_year + 1
}

/// Extract the year from "YYYY", "YYYY-MM" or "YYYY-MM-DD"
pub fn parse_release_year(release_date: &str) -> Option<i32> {
    release_date.get(..4)?.parse::<i32>().ok()
}

pub fn decade_label(year: i32) -> String {
    format!("{}s", year / 10 * 10)
}

fn normalize_genre(genre: &str) -> String {
    genre.trim().to_lowercase()
}

impl AggregateProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a track and its artists. Returns false if the track was already known
    /// or carries no identifier (local files).
    pub fn add_track(&mut self, track: &Track) -> bool {
        self.add_track_in_year(track, Utc::now().year())
    }

    fn add_track_in_year(&mut self, track: &Track, current_year: i32) -> bool {
        let Some(id) = track.id.as_deref().filter(|id| !id.is_empty()) else {
            return false;
        };

        for artist in &track.artists {
            self.add_simple_artist(artist);
        }
        if let Some(isrc) = track.isrc() {
            self.isrcs.insert(isrc.to_uppercase());
        }

        if !self.track_ids.insert(id.to_string()) {
            return false;
        }

        let year = track
            .release_date()
            .and_then(parse_release_year)
            .filter(|year| is_sane_year(*year, current_year));

        self.track_facts.insert(
            id.to_string(),
            TrackFacts {
                year,
                duration_ms: track.duration_ms,
                explicit: track.explicit.unwrap_or(false),
                popularity: track.popularity,
            },
        );
        true
    }

    pub fn add_simple_artist(&mut self, artist: &SimpleArtist) -> bool {
        match artist.id.as_deref() {
            Some(id) if !id.is_empty() => self.add_artist_id(id, artist.name.as_deref()),
            _ => false,
        }
    }

    fn add_artist_id(&mut self, id: &str, name: Option<&str>) -> bool {
        if let Some(name) = name {
            self.artist_names.insert(id.to_string(), name.to_string());
        }
        self.artist_ids.insert(id.to_string())
    }

    /// Record a full artist object including its genre tags
    pub fn add_artist(&mut self, artist: &Artist) -> bool {
        let Some(id) = artist.id.as_deref().filter(|id| !id.is_empty()) else {
            return false;
        };
        let added = self.add_artist_id(id, artist.name.as_deref());
        let display = artist.name.clone().unwrap_or_else(|| id.to_string());
        for genre in &artist.genres {
            self.record_genre(id, &display, genre);
        }
        added
    }

    /// Count one (artist, genre) observation. Repeats of the same pair are ignored.
    pub fn record_genre(&mut self, artist_key: &str, artist_name: &str, genre: &str) -> bool {
        let genre = normalize_genre(genre);
        if genre.is_empty() {
            return false;
        }
        if !self
            .genre_observations
            .insert((artist_key.to_string(), genre.clone()))
        {
            return false;
        }
        *self.genre_frequency.entry(genre.clone()).or_insert(0) += 1;
        let sample = self.genre_artists.entry(genre).or_default();
        if sample.len() < GENRE_ARTIST_SAMPLE {
            sample.insert(artist_name.to_string());
        }
        true
    }

    pub fn record_source(&mut self, source: &str, count: usize) {
        self.sources.insert(source.to_string(), count);
    }

    pub fn record_played_at(&mut self, timestamp: &str) {
        self.played_at.insert(timestamp.to_string());
    }

    pub fn record_saved_at(&mut self, timestamp: &str) {
        self.saved_at.insert(timestamp.to_string());
    }

    pub fn knows_track(&self, track: &Track) -> bool {
        track
            .id
            .as_deref()
            .is_some_and(|id| self.track_ids.contains(id))
            || track
                .isrc()
                .is_some_and(|isrc| self.isrcs.contains(&isrc.to_uppercase()))
    }

    pub fn knows_any_artist(&self, track: &Track) -> bool {
        track
            .artists
            .iter()
            .filter_map(|a| a.id.as_deref())
            .any(|id| self.artist_ids.contains(id))
    }

    /// Union another profile into this one
    pub fn merge(&mut self, other: &AggregateProfile) -> MergeStats {
        let mut stats = MergeStats::default();

        for id in &other.track_ids {
            if self.track_ids.insert(id.clone()) {
                stats.new_tracks += 1;
            }
        }
        for (id, facts) in &other.track_facts {
            self.track_facts
                .entry(id.clone())
                .or_insert_with(|| facts.clone());
        }
        self.isrcs.extend(other.isrcs.iter().cloned());

        for id in &other.artist_ids {
            if self.artist_ids.insert(id.clone()) {
                stats.new_artists += 1;
            }
        }
        for (id, name) in &other.artist_names {
            self.artist_names.insert(id.clone(), name.clone());
        }

        let genres_before = self.genre_frequency.len();
        for (artist_key, genre) in &other.genre_observations {
            let name = self
                .artist_names
                .get(artist_key)
                .cloned()
                .or_else(|| other.artist_names.get(artist_key).cloned())
                .unwrap_or_else(|| artist_key.clone());
            self.record_genre(artist_key, &name, genre);
        }
        stats.new_genres = self.genre_frequency.len() - genres_before;

        for (source, count) in &other.sources {
            self.sources.insert(source.clone(), *count);
        }
        self.played_at.extend(other.played_at.iter().cloned());
        self.saved_at.extend(other.saved_at.iter().cloned());

        stats
    }

    /// Decade label to track count, over tracks with a plausible release year
    pub fn decade_distribution(&self) -> BTreeMap<String, u32> {
        let mut distribution = BTreeMap::new();
        for year in self.release_years() {
            *distribution.entry(decade_label(year)).or_insert(0) += 1;
        }
        distribution
    }

    pub fn release_years(&self) -> Vec<i32> {
        self.track_facts.values().filter_map(|f| f.year).collect()
    }

    pub fn total_tracks_analyzed(&self) -> usize {
        self.track_ids.len()
    }

    /// Genres sorted by frequency, most frequent first
    pub fn top_genres(&self, limit: usize) -> Vec<(String, u32)> {
        let mut genres: Vec<(String, u32)> = self
            .genre_frequency
            .iter()
            .map(|(genre, count)| (genre.clone(), *count))
            .collect();
        genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        genres.truncate(limit);
        genres
    }

    pub fn earliest_save(&self) -> Option<DateTime<Utc>> {
        parse_timestamps(&self.saved_at).min()
    }

    pub fn latest_save(&self) -> Option<DateTime<Utc>> {
        parse_timestamps(&self.saved_at).max()
    }

    pub fn last_played(&self) -> Option<DateTime<Utc>> {
        parse_timestamps(&self.played_at).max()
    }
}

fn parse_timestamps(values: &BTreeSet<String>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
    values
        .iter()
        .filter_map(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
