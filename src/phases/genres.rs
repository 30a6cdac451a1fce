use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::models::Artist;
use crate::pacing::TimeBudget;
use crate::profile::{AggregateProfile, GenreGraph};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Most IDs the batch artist endpoint accepts
const ARTIST_BATCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenresResult {
    pub profile: AggregateProfile,
    /// Genres already known before this phase ran
    pub reused_genres: usize,
    pub artists_looked_up: usize,
    pub probes_issued: usize,
    /// Probes that credited a genre to at least one known artist
    pub probe_hits: usize,
    pub budget_exhausted: bool,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

impl ProfileBuilder<'_> {
    /// Fill in genre data the upstream does not reliably hand out.
    ///
    /// Genres seen on artist objects during basics are reused as-is. If there
    /// are none, a few artists are looked up directly. Finally every catalog
    /// genre still unseen is probed with a genre search, and any result by a
    /// known artist credits that genre to the artist. The probe is a
    /// statistical side channel: it misses genres that never surface in the
    /// bounded result and credits featured artists with the headliner's
    /// genre. Bounded by the catalog size and the phase time budget.
    pub fn build_genres(
        &self,
        known: &AggregateProfile,
        top_artist_ids: &[String],
        graph: &GenreGraph,
    ) -> Result<GenresResult, ApiError> {
        let started = self.started();
        let budget = self.budget();
        let mut fragment = AggregateProfile::new();
        let mut warnings = Vec::new();
        let reused_genres = known.genre_frequency.len();

        let mut artists_looked_up = 0;
        if known.genre_frequency.is_empty() && !top_artist_ids.is_empty() {
            let artists = self.lookup_artists(top_artist_ids, &budget, &mut warnings)?;
            artists_looked_up = artists.len();
            for artist in &artists {
                fragment.add_artist(artist);
            }
        }

        let mut probes_issued = 0;
        let mut probe_hits = 0;
        let mut budget_exhausted = false;

        for genre in graph.catalog() {
            if known.genre_frequency.contains_key(genre)
                || fragment.genre_frequency.contains_key(genre)
            {
                continue;
            }
            if budget.should_stop() {
                info!("Genre probing stopped after {probes_issued} probes, time budget spent");
                budget_exhausted = true;
                break;
            }

            probes_issued += 1;
            let context = format!("genre probe '{genre}'");
            let Some(tracks) = best_effort(
                self.client
                    .search_tracks(&format!("genre:\"{genre}\""), self.settings.genre_probe_limit),
                &context,
                &mut warnings,
            )?
            else {
                continue;
            };

            let mut credited = false;
            for track in &tracks {
                for artist in &track.artists {
                    let Some(id) = artist.id.as_deref() else {
                        continue;
                    };
                    if !known.artist_ids.contains(id) {
                        continue;
                    }
                    let name = known
                        .artist_names
                        .get(id)
                        .map(String::as_str)
                        .or(artist.name.as_deref())
                        .unwrap_or(id);
                    credited |= fragment.record_genre(id, name, genre);
                }
            }
            if credited {
                debug!("Probe '{genre}' matched known artists");
                probe_hits += 1;
            }
        }

        info!(
            "Genres: {} reused, {} artists looked up, {}/{} probes hit",
            reused_genres, artists_looked_up, probe_hits, probes_issued
        );

        Ok(GenresResult {
            profile: fragment,
            reused_genres,
            artists_looked_up,
            probes_issued,
            probe_hits,
            budget_exhausted,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }

    /// Batch lookup first; fall back to a few single lookups when refused
    fn lookup_artists(
        &self,
        artist_ids: &[String],
        budget: &TimeBudget,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Artist>, ApiError> {
        let batch: Vec<String> = artist_ids.iter().take(ARTIST_BATCH_LIMIT).cloned().collect();
        if let Some(artists) =
            best_effort(self.client.artists(&batch), "batch artist lookup", warnings)?
        {
            if artists.iter().any(|a| !a.genres.is_empty()) {
                return Ok(artists);
            }
        }

        let mut artists = Vec::new();
        for id in artist_ids.iter().take(self.settings.artist_lookup_limit) {
            if budget.should_stop() {
                break;
            }
            let context = format!("artist lookup {id}");
            if let Some(artist) = best_effort(self.client.artist(id), &context, warnings)? {
                artists.push(artist);
            }
        }
        Ok(artists)
    }
}
