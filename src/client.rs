use crate::config::{Config, Settings};
use crate::error::ApiError;
use crate::models::{
    Album, Artist, ArtistsResponse, CursorPaging, FollowedArtistsResponse, Paging, PlayHistory,
    Playlist, PlaylistItem, SavedTrack, SearchResponse, TimeRange, Track, TracksResponse, User,
};
use crate::pacing::{Clock, Pacer};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;
use urlencoding::encode;

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// One logical GET against the upstream API; the core never writes upstream
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Look up a query parameter by name
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        for (i, (key, value)) in self.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&format!("{}={}", encode(key), encode(value)));
        }
        url
    }
}

/// Status, throttling hint and body of an upstream response, success or not
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

/// Sends a single request. Non-success statuses are returned, not raised.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

/// Bearer-authenticated HTTP transport
pub struct UreqTransport {
    agent: Agent,
    base_url: String,
    access_token: String,
}

impl UreqTransport {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build();

        UreqTransport {
            agent,
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
        }
    }

    fn into_raw(response: ureq::Response) -> Result<RawResponse, ApiError> {
        let status = response.status();
        let retry_after = response.header("Retry-After").map(str::to_string);
        let body = response
            .into_string()
            .map_err(|e| ApiError::Transport(format!("failed to read body: {e}")))?;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let url = request.url(&self.base_url);
        debug!("GET {}", url);

        let result = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .call();

        match result {
            Ok(response) => Self::into_raw(response),
            Err(ureq::Error::Status(_, response)) => Self::into_raw(response),
            Err(ureq::Error::Transport(e)) => Err(ApiError::Transport(e.to_string())),
        }
    }
}

/// Backoff behaviour on HTTP 429
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_retry_after: Duration,
    pub cooldown_ceiling: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            default_retry_after: Duration::from_secs(settings.default_retry_after_secs),
            cooldown_ceiling: Duration::from_secs(settings.cooldown_ceiling_secs),
        }
    }

    fn wait_for(&self, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_retry_after)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Rate-limited client for the upstream music API
pub struct ApiClient {
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    pacer: Pacer,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Create a client talking HTTP to the configured base URL
    pub fn new(config: &Config, settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        Self::with_transport(
            Box::new(UreqTransport::new(config)),
            clock,
            RetryPolicy::from_settings(settings),
            settings.pacing(),
        )
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        pacing: Duration,
    ) -> Self {
        let pacer = Pacer::new(clock.clone(), pacing);
        ApiClient {
            transport,
            clock,
            pacer,
            policy,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Minimum spacing the pacer keeps between calls
    pub fn pacing_interval(&self) -> Duration {
        self.pacer.interval()
    }

    /// Execute a request, retrying briefly on throttling.
    ///
    /// A `Retry-After` above the cooldown ceiling is never waited out here;
    /// it is returned as [`ApiError::LongCooldown`] so the caller can tell the
    /// user how long to wait.
    pub fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let mut retries = 0;

        loop {
            self.pacer.wait_turn();
            let response = self.transport.send(request)?;

            match response.status {
                200..=299 => return Self::decode(&response.body),
                401 => return Err(ApiError::Unauthorized),
                429 => {
                    let wait = self.policy.wait_for(response.retry_after.as_deref());
                    if wait > self.policy.cooldown_ceiling {
                        warn!(
                            "{} throttled with Retry-After {}s, surfacing cooldown",
                            request.path,
                            wait.as_secs()
                        );
                        return Err(ApiError::LongCooldown(wait.as_secs()));
                    }
                    if retries >= self.policy.max_retries {
                        warn!("{} still throttled after {} retries", request.path, retries);
                        return Err(ApiError::RetryExhausted {
                            attempts: retries + 1,
                        });
                    }
                    retries += 1;
                    warn!(
                        "{} throttled, retry {}/{} in {}s",
                        request.path,
                        retries,
                        self.policy.max_retries,
                        wait.as_secs()
                    );
                    self.clock.sleep(wait);
                }
                status => {
                    return Err(ApiError::Upstream {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
        // 204 and friends carry no body
        let body = if body.trim().is_empty() { "null" } else { body };
        Ok(serde_json::from_str(body)?)
    }

    pub fn current_user(&self) -> Result<User, ApiError> {
        self.execute(&ApiRequest::get("/me"))
    }

    pub fn top_tracks(&self, range: TimeRange, limit: u32) -> Result<Paging<Track>, ApiError> {
        self.execute(
            &ApiRequest::get("/me/top/tracks")
                .param("time_range", range.as_str())
                .param("limit", limit),
        )
    }

    pub fn top_artists(&self, range: TimeRange, limit: u32) -> Result<Paging<Artist>, ApiError> {
        self.execute(
            &ApiRequest::get("/me/top/artists")
                .param("time_range", range.as_str())
                .param("limit", limit),
        )
    }

    pub fn recently_played(&self, limit: u32) -> Result<CursorPaging<PlayHistory>, ApiError> {
        self.execute(&ApiRequest::get("/me/player/recently-played").param("limit", limit))
    }

    pub fn saved_tracks(&self, offset: u32, limit: u32) -> Result<Paging<SavedTrack>, ApiError> {
        self.execute(
            &ApiRequest::get("/me/tracks")
                .param("limit", limit)
                .param("offset", offset),
        )
    }

    pub fn followed_artists(&self, limit: u32) -> Result<FollowedArtistsResponse, ApiError> {
        self.execute(
            &ApiRequest::get("/me/following")
                .param("type", "artist")
                .param("limit", limit),
        )
    }

    pub fn user_playlists(&self, offset: u32, limit: u32) -> Result<Paging<Playlist>, ApiError> {
        self.execute(
            &ApiRequest::get("/me/playlists")
                .param("limit", limit)
                .param("offset", offset),
        )
    }

    pub fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<PlaylistItem>, ApiError> {
        self.execute(
            &ApiRequest::get(format!("/playlists/{}/tracks", encode(playlist_id)))
                .param("limit", limit)
                .param("offset", offset),
        )
    }

    pub fn artist(&self, artist_id: &str) -> Result<Artist, ApiError> {
        self.execute(&ApiRequest::get(format!("/artists/{}", encode(artist_id))))
    }

    /// Batch lookup; many app tiers are refused this endpoint
    pub fn artists(&self, artist_ids: &[String]) -> Result<Vec<Artist>, ApiError> {
        let response: ArtistsResponse =
            self.execute(&ApiRequest::get("/artists").param("ids", artist_ids.join(",")))?;
        Ok(response.artists.into_iter().flatten().collect())
    }

    pub fn artist_albums(&self, artist_id: &str, limit: u32) -> Result<Paging<Album>, ApiError> {
        self.execute(
            &ApiRequest::get(format!("/artists/{}/albums", encode(artist_id)))
                .param("include_groups", "album")
                .param("limit", limit),
        )
    }

    pub fn album_tracks(&self, album_id: &str, limit: u32) -> Result<Paging<Track>, ApiError> {
        self.execute(
            &ApiRequest::get(format!("/albums/{}/tracks", encode(album_id))).param("limit", limit),
        )
    }

    pub fn tracks(&self, track_ids: &[String]) -> Result<Vec<Track>, ApiError> {
        let response: TracksResponse =
            self.execute(&ApiRequest::get("/tracks").param("ids", track_ids.join(",")))?;
        Ok(response.tracks.into_iter().flatten().collect())
    }

    /// Free-text or field search; `genre:"<label>"` is understood upstream
    pub fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        let response: SearchResponse = self.execute(
            &ApiRequest::get("/search")
                .param("q", query)
                .param("type", "track")
                .param("limit", limit),
        )?;
        Ok(response.tracks.map(|page| page.items).unwrap_or_default())
    }
}
