use serde::{Deserialize, Serialize};

// Upstream responses are frequently incomplete, so nearly every field is
// optional or defaulted. A missing field degrades a feature, never a phase.

/// The authenticated user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub country: Option<String>,
}

/// Artist reference embedded in tracks and albums
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleArtist {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Full artist object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artist {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

/// Track object; album tracks come back without `album` or `external_ids`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    pub album: Option<Album>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub popularity: Option<u32>,
    pub external_ids: Option<ExternalIds>,
    pub is_local: Option<bool>,
}

impl Track {
    pub fn isrc(&self) -> Option<&str> {
        self.external_ids.as_ref()?.isrc.as_deref()
    }

    pub fn release_date(&self) -> Option<&str> {
        self.album.as_ref()?.release_date.as_deref()
    }
}

/// Offset-paginated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub total: Option<u32>,
    pub next: Option<String>,
    pub offset: Option<u32>,
}

impl<T> Default for Paging<T> {
    fn default() -> Self {
        Paging {
            items: Vec::new(),
            total: None,
            next: None,
            offset: None,
        }
    }
}

/// Cursor-paginated list (followed artists, recently played)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPaging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next: Option<String>,
    pub total: Option<u32>,
}

impl<T> Default for CursorPaging<T> {
    fn default() -> Self {
        CursorPaging {
            items: Vec::new(),
            next: None,
            total: None,
        }
    }
}

/// Entry of the saved-tracks library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedTrack {
    pub added_at: Option<String>,
    pub track: Option<Track>,
}

/// Entry of the recently-played history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayHistory {
    pub played_at: Option<String>,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistOwner {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistTracksRef {
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<PlaylistOwner>,
    pub tracks: Option<PlaylistTracksRef>,
}

impl Playlist {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner
            .as_ref()
            .and_then(|owner| owner.id.as_deref())
            .is_some_and(|id| id == user_id)
    }
}

/// Entry of a playlist's track list; `track` is null for removed items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub added_at: Option<String>,
    pub track: Option<Track>,
}

/// Response structure for the followed-artists endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowedArtistsResponse {
    #[serde(default)]
    pub artists: CursorPaging<Artist>,
}

/// Response structure for the batch artist lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<Artist>>,
}

/// Response structure for the batch track lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracksResponse {
    #[serde(default)]
    pub tracks: Vec<Option<Track>>,
}

/// Response structure for track search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<Track>>,
}

/// Time range accepted by the top-items endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    LongTerm,
    MediumTerm,
    ShortTerm,
}

impl TimeRange {
    /// Priority order: long-term listening outranks recent listening
    pub const ALL: [TimeRange; 3] = [
        TimeRange::LongTerm,
        TimeRange::MediumTerm,
        TimeRange::ShortTerm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::LongTerm => "long_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::ShortTerm => "short_term",
        }
    }
}
