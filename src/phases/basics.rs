use super::{ProfileBuilder, best_effort};
use crate::error::ApiError;
use crate::models::{TimeRange, User};
use crate::profile::AggregateProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Seed profile from the user's top items, history and follows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicsResult {
    pub profile: AggregateProfile,
    pub user: Option<User>,
    /// De-duplicated, long-term artists first
    pub top_artist_ids: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(rename = "buildTime")]
    pub build_time_ms: u64,
}

impl ProfileBuilder<'_> {
    /// Roughly nine sequential calls. Only an auth failure or a long cooldown
    /// fails the phase; every other call is optional.
    pub fn build_basics(&self) -> Result<BasicsResult, ApiError> {
        let started = self.started();
        let mut profile = AggregateProfile::new();
        let mut warnings = Vec::new();

        let user = best_effort(self.client.current_user(), "current user", &mut warnings)?;
        if let Some(user) = &user {
            info!("Building profile for {}", user.display_name.as_deref().unwrap_or(&user.id));
        }

        for range in TimeRange::ALL {
            let context = format!("top tracks ({})", range.as_str());
            if let Some(page) = best_effort(
                self.client.top_tracks(range, self.settings.top_limit),
                &context,
                &mut warnings,
            )? {
                for track in &page.items {
                    profile.add_track(track);
                }
                profile.record_source(&format!("top_tracks_{}", range.as_str()), page.items.len());
            }
        }

        if let Some(history) = best_effort(
            self.client.recently_played(self.settings.recent_limit),
            "recently played",
            &mut warnings,
        )? {
            for entry in &history.items {
                if let Some(track) = &entry.track {
                    profile.add_track(track);
                }
                if let Some(played_at) = &entry.played_at {
                    profile.record_played_at(played_at);
                }
            }
            profile.record_source("recently_played", history.items.len());
        }

        let mut top_artist_ids = Vec::new();
        let mut seen = HashSet::new();
        for range in TimeRange::ALL {
            let context = format!("top artists ({})", range.as_str());
            if let Some(page) = best_effort(
                self.client.top_artists(range, self.settings.top_limit),
                &context,
                &mut warnings,
            )? {
                for artist in &page.items {
                    profile.add_artist(artist);
                    if let Some(id) = &artist.id {
                        if seen.insert(id.clone()) {
                            top_artist_ids.push(id.clone());
                        }
                    }
                }
                profile.record_source(&format!("top_artists_{}", range.as_str()), page.items.len());
            }
        }

        if let Some(followed) = best_effort(
            self.client.followed_artists(self.settings.top_limit),
            "followed artists",
            &mut warnings,
        )? {
            for artist in &followed.artists.items {
                profile.add_artist(artist);
            }
            profile.record_source("followed_artists", followed.artists.items.len());
        }

        info!(
            "Basics: {} tracks, {} artists, {} genres, {} warnings",
            profile.track_ids.len(),
            profile.artist_ids.len(),
            profile.genre_frequency.len(),
            warnings.len()
        );

        Ok(BasicsResult {
            profile,
            user,
            top_artist_ids,
            warnings,
            build_time_ms: self.build_time_ms(started),
        })
    }
}
