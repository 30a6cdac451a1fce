//! Phase builders.
//!
//! Each phase runs against the rate-limited client, collects into a fresh
//! [`AggregateProfile`] fragment (or a serializable result slice) and hands it
//! back; the caller merges it. A sub-resource failure becomes a warning, while
//! auth failures and long cooldowns abort the phase.

pub mod basics;
pub mod discography;
pub mod genres;
pub mod library;
pub mod mainstream;
pub mod playlists;

#[cfg(test)]
pub(crate) mod phase_tests;

pub use basics::*;
pub use discography::*;
pub use genres::*;
pub use library::*;
pub use mainstream::*;
pub use playlists::*;

use crate::client::ApiClient;
use crate::config::Settings;
use crate::error::ApiError;
use crate::pacing::TimeBudget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Basics,
    Library,
    Playlists,
    Genres,
    Discography,
    Mainstream,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Basics,
        Phase::Library,
        Phase::Playlists,
        Phase::Genres,
        Phase::Discography,
        Phase::Mainstream,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Basics => "basics",
            Phase::Library => "library",
            Phase::Playlists => "playlists",
            Phase::Genres => "genres",
            Phase::Discography => "discography",
            Phase::Mainstream => "mainstream",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs phases against one user's credentials
pub struct ProfileBuilder<'a> {
    client: &'a ApiClient,
    settings: &'a Settings,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(client: &'a ApiClient, settings: &'a Settings) -> Self {
        Self { client, settings }
    }

    fn budget(&self) -> TimeBudget {
        TimeBudget::start(
            self.client.clock(),
            self.settings.time_budget(),
            self.settings.safety_margin(),
        )
        .with_lead(self.client.pacing_interval())
    }

    fn started(&self) -> Duration {
        self.client.clock().now()
    }

    fn build_time_ms(&self, started: Duration) -> u64 {
        self.client.clock().now().saturating_sub(started).as_millis() as u64
    }
}

/// Unwrap a best-effort call: fatal errors propagate, anything else is
/// logged, recorded as a warning and turned into `None`.
pub(crate) fn best_effort<T>(
    result: Result<T, ApiError>,
    context: &str,
    warnings: &mut Vec<String>,
) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!("{context}: {err}");
            warnings.push(format!("{context}: {err}"));
            Ok(None)
        }
    }
}
