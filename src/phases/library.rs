use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::profile::AggregateProfile;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One bounded chunk of the saved-tracks scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryResult {
    pub profile: AggregateProfile,
    /// Where the next invocation should resume, `None` once exhausted
    pub next_offset: Option<u32>,
    /// Saved-track count reported upstream
    pub total: Option<u32>,
    pub pages_fetched: u32,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

impl ProfileBuilder<'_> {
    /// Scan saved tracks from `offset`, stopping after the per-invocation page cap.
    pub fn build_library(&self, offset: u32) -> Result<LibraryResult, ApiError> {
        let started = self.started();
        let page_size = self.settings.library_page_size.max(1);
        let mut profile = AggregateProfile::new();
        let mut warnings = Vec::new();
        let mut offset = offset;
        let mut total = None;
        let mut pages_fetched = 0;
        let mut items_seen = 0;

        let next_offset = loop {
            if pages_fetched >= self.settings.library_max_pages {
                break Some(offset);
            }

            let context = format!("saved tracks at offset {offset}");
            let Some(page) = best_effort(
                self.client.saved_tracks(offset, page_size),
                &context,
                &mut warnings,
            )?
            else {
                // retry this page on the next invocation
                break Some(offset);
            };
            pages_fetched += 1;

            for saved in &page.items {
                if let Some(track) = &saved.track {
                    profile.add_track(track);
                }
                if let Some(added_at) = &saved.added_at {
                    profile.record_saved_at(added_at);
                }
            }
            items_seen += page.items.len();
            total = page.total.or(total);

            let fetched = page.items.len() as u32;
            if fetched == 0 {
                break None;
            }
            offset += fetched;
            let exhausted = match page.total {
                Some(total) => offset >= total,
                None => page.next.is_none(),
            };
            if exhausted {
                break None;
            }
        };

        profile.record_source("saved_tracks", items_seen);
        info!(
            "Library: {} pages, {} tracks, next offset {:?}",
            pages_fetched,
            profile.track_ids.len(),
            next_offset
        );

        Ok(LibraryResult {
            profile,
            next_offset,
            total,
            pages_fetched,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }
}
