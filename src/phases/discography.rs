use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::models::{Album, Track};
use crate::profile::{AggregateProfile, parse_release_year};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

const ALBUM_TRACK_LIMIT: u32 = 50;
const UNHEARD_SAMPLE: usize = 5;

/// A studio album with tracks the listener has not been seen playing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumGap {
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: String,
    pub album_name: String,
    pub release_year: Option<i32>,
    pub total_tracks: usize,
    pub unheard_count: usize,
    pub unheard_sample: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscographyResult {
    /// Sorted by unheard count, largest gap first
    pub gaps: Vec<AlbumGap>,
    pub artists_scanned: usize,
    pub albums_scanned: usize,
    pub budget_exhausted: bool,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

impl ProfileBuilder<'_> {
    /// For the top few artists, count album tracks missing from the known set.
    ///
    /// Album order per artist is shuffled so repeated runs cover different
    /// albums when an artist has more than the per-artist cap.
    pub fn build_discography<R: Rng + ?Sized>(
        &self,
        known: &AggregateProfile,
        top_artist_ids: &[String],
        rng: &mut R,
    ) -> Result<DiscographyResult, ApiError> {
        let started = self.started();
        let budget = self.budget();
        let mut warnings = Vec::new();
        let mut gaps = Vec::new();
        let mut artists_scanned = 0;
        let mut albums_scanned = 0;
        let mut budget_exhausted = false;

        'artists: for artist_id in top_artist_ids.iter().take(self.settings.discography_artists) {
            if budget.should_stop() {
                budget_exhausted = true;
                break;
            }
            let context = format!("albums of artist {artist_id}");
            let Some(page) = best_effort(
                self.client
                    .artist_albums(artist_id, self.settings.albums_fetched),
                &context,
                &mut warnings,
            )?
            else {
                continue;
            };
            artists_scanned += 1;

            let artist_name = known
                .artist_names
                .get(artist_id)
                .cloned()
                .or_else(|| {
                    page.items
                        .iter()
                        .flat_map(|album| &album.artists)
                        .find(|a| a.id.as_deref() == Some(artist_id.as_str()))
                        .and_then(|a| a.name.clone())
                })
                .unwrap_or_else(|| artist_id.clone());

            let mut albums: Vec<&Album> = page.items.iter().filter(|a| a.id.is_some()).collect();
            albums.shuffle(rng);

            for album in albums.into_iter().take(self.settings.albums_per_artist) {
                if budget.should_stop() {
                    budget_exhausted = true;
                    break 'artists;
                }
                if let Some(gap) = self.album_gap(known, artist_id, &artist_name, album, &mut warnings)? {
                    gaps.push(gap);
                }
                albums_scanned += 1;
            }
        }

        gaps.sort_by(|a, b| {
            b.unheard_count
                .cmp(&a.unheard_count)
                .then_with(|| a.album_name.cmp(&b.album_name))
        });

        info!(
            "Discography: {} artists, {} albums, {} with unheard tracks",
            artists_scanned,
            albums_scanned,
            gaps.len()
        );

        Ok(DiscographyResult {
            gaps,
            artists_scanned,
            albums_scanned,
            budget_exhausted,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }

    fn album_gap(
        &self,
        known: &AggregateProfile,
        artist_id: &str,
        artist_name: &str,
        album: &Album,
        warnings: &mut Vec<String>,
    ) -> Result<Option<AlbumGap>, ApiError> {
        let Some(album_id) = album.id.as_deref() else {
            return Ok(None);
        };
        let album_name = album.name.clone().unwrap_or_else(|| album_id.to_string());

        let context = format!("tracks of album '{album_name}'");
        let Some(page) = best_effort(
            self.client.album_tracks(album_id, ALBUM_TRACK_LIMIT),
            &context,
            warnings,
        )?
        else {
            return Ok(None);
        };

        let total_tracks = page.items.len();
        let mut unheard: Vec<&Track> = page.items.iter().filter(|t| !known.knows_track(t)).collect();

        // album track listings omit ISRCs; fetch them to catch reissues already heard
        if !unheard.is_empty() && !known.isrcs.is_empty() {
            let ids: Vec<String> = unheard.iter().filter_map(|t| t.id.clone()).collect();
            let context = format!("ISRC check for album '{album_name}'");
            if let Some(full) = best_effort(self.client.tracks(&ids), &context, warnings)? {
                let heard_elsewhere: Vec<&str> = full
                    .iter()
                    .filter(|t| known.knows_track(t))
                    .filter_map(|t| t.id.as_deref())
                    .collect();
                unheard.retain(|t| !t.id.as_deref().is_some_and(|id| heard_elsewhere.contains(&id)));
            }
        }

        if unheard.is_empty() {
            return Ok(None);
        }

        Ok(Some(AlbumGap {
            artist_id: artist_id.to_string(),
            artist_name: artist_name.to_string(),
            album_id: album_id.to_string(),
            album_name,
            release_year: album.release_date.as_deref().and_then(parse_release_year),
            total_tracks,
            unheard_count: unheard.len(),
            unheard_sample: unheard
                .iter()
                .filter_map(|t| t.name.clone())
                .take(UNHEARD_SAMPLE)
                .collect(),
        }))
    }
}
