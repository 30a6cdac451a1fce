use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::models::Playlist;
use crate::profile::AggregateProfile;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PLAYLIST_LIST_PAGE: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistsResult {
    pub profile: AggregateProfile,
    pub playlists_total: usize,
    pub playlists_owned: usize,
    /// Owned playlists whose tracks stopped coming back before the total
    pub playlists_blocked: usize,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

/// How a single playlist scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    Complete,
    Blocked,
    Failed,
}

impl ProfileBuilder<'_> {
    /// Scan every playlist the user owns. Followed playlists are skipped.
    pub fn build_playlists(&self, user_id: Option<&str>) -> Result<PlaylistsResult, ApiError> {
        let started = self.started();
        let mut profile = AggregateProfile::new();
        let mut warnings = Vec::new();

        let user_id = match user_id {
            Some(id) => id.to_string(),
            None => match best_effort(self.client.current_user(), "current user", &mut warnings)? {
                Some(user) => user.id,
                None => {
                    // without an owner id nothing can be attributed
                    return Ok(PlaylistsResult {
                        profile,
                        playlists_total: 0,
                        playlists_owned: 0,
                        playlists_blocked: 0,
                        warnings,
                        build_time_ms: self.build_time_ms(started),
                    });
                }
            },
        };

        let playlists = self.list_playlists(&mut warnings)?;
        let owned: Vec<&Playlist> = playlists.iter().filter(|p| p.is_owned_by(&user_id)).collect();
        info!("Playlists: {} total, {} owned", playlists.len(), owned.len());

        let mut playlists_blocked = 0;
        let mut items_seen = 0;
        for playlist in &owned {
            let (end, items) = self.scan_playlist(playlist, &mut profile, &mut warnings)?;
            items_seen += items;
            if end == ScanEnd::Blocked {
                playlists_blocked += 1;
            }
        }
        profile.record_source("playlist_tracks", items_seen);
        profile.record_source("playlists", playlists.len());

        Ok(PlaylistsResult {
            profile,
            playlists_total: playlists.len(),
            playlists_owned: owned.len(),
            playlists_blocked,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }

    fn list_playlists(&self, warnings: &mut Vec<String>) -> Result<Vec<Playlist>, ApiError> {
        let mut playlists = Vec::new();
        let mut offset = 0;
        loop {
            let context = format!("playlist list at offset {offset}");
            let Some(page) = best_effort(
                self.client.user_playlists(offset, PLAYLIST_LIST_PAGE),
                &context,
                warnings,
            )?
            else {
                break;
            };
            let fetched = page.items.len() as u32;
            playlists.extend(page.items);
            offset += fetched;
            if fetched == 0 || page.next.is_none() || page.total.is_some_and(|t| offset >= t) {
                break;
            }
        }
        Ok(playlists)
    }

    fn scan_playlist(
        &self,
        playlist: &Playlist,
        profile: &mut AggregateProfile,
        warnings: &mut Vec<String>,
    ) -> Result<(ScanEnd, usize), ApiError> {
        let Some(id) = playlist.id.as_deref() else {
            return Ok((ScanEnd::Failed, 0));
        };
        let name = playlist.name.as_deref().unwrap_or(id);
        // listings sometimes omit the count; the first page may still carry it
        let mut expected = playlist.tracks.as_ref().and_then(|t| t.total);
        let page_size = self.settings.playlist_page_size.max(1);

        let mut offset = 0;
        let mut pages = 0;
        while pages < self.settings.playlist_max_pages {
            if expected.is_some_and(|total| offset >= total) {
                break;
            }
            let context = format!("playlist '{name}' at offset {offset}");
            let Some(page) = best_effort(
                self.client.playlist_tracks(id, offset, page_size),
                &context,
                warnings,
            )?
            else {
                return Ok((ScanEnd::Failed, offset as usize));
            };
            pages += 1;
            expected = expected.or(page.total);

            if page.items.is_empty() {
                match expected {
                    Some(total) if offset < total => {
                        warn!("Playlist '{name}' returned no items at {offset}/{total}, treating as blocked");
                        warnings.push(format!(
                            "playlist '{name}' blocked after {offset} of {total} tracks"
                        ));
                        return Ok((ScanEnd::Blocked, offset as usize));
                    }
                    _ => break,
                }
            }

            for item in &page.items {
                if let Some(track) = &item.track {
                    profile.add_track(track);
                }
            }
            offset += page.items.len() as u32;
            if expected.is_none() && page.next.is_none() {
                break;
            }
        }

        Ok((ScanEnd::Complete, offset as usize))
    }
}
