use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub access_token: String,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();
    let base_url = std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let access_token = std::env::var("ACCESS_TOKEN").context("ACCESS_TOKEN is not set")?;
    Ok(Config {
        base_url,
        access_token,
    })
}

/// Empirically tuned limits for talking to the upstream API.
/// None of these are contracts of the upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_retries: u32,
    pub default_retry_after_secs: u64,
    pub cooldown_ceiling_secs: u64,
    pub pacing_ms: u64,
    pub time_budget_secs: u64,
    pub safety_margin_secs: u64,
    pub library_page_size: u32,
    pub library_max_pages: u32,
    pub playlist_page_size: u32,
    pub playlist_max_pages: u32,
    pub top_limit: u32,
    pub recent_limit: u32,
    pub artist_lookup_limit: usize,
    pub genre_probe_limit: u32,
    pub discography_artists: usize,
    pub albums_fetched: u32,
    pub albums_per_artist: usize,
    pub mainstream_genres: usize,
    pub tracks_per_genre: u32,
    pub blind_spot_limit: usize,
    pub radar_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_retry_after_secs: 5,
            cooldown_ceiling_secs: 30,
            pacing_ms: 1500,
            time_budget_secs: 50,
            safety_margin_secs: 5,
            library_page_size: 50,
            library_max_pages: 20,
            playlist_page_size: 100,
            playlist_max_pages: 50,
            top_limit: 50,
            recent_limit: 50,
            artist_lookup_limit: 5,
            genre_probe_limit: 20,
            discography_artists: 5,
            albums_fetched: 10,
            albums_per_artist: 5,
            mainstream_genres: 8,
            tracks_per_genre: 10,
            blind_spot_limit: 12,
            radar_size: 10,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; absent fields keep their defaults
    pub fn load_from_file(path: &str) -> Result<Settings> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{path}'"))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("invalid settings file '{path}'"))?;
        Ok(settings)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}
