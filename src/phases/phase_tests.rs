// Phase builders driven against a scripted upstream in simulated time

use super::*;
use crate::client::{ApiClient, ApiRequest, RawResponse, RetryPolicy, Transport};
use crate::pacing::{Clock, ManualClock};
use crate::profile::{AggregateProfile, GenreGraph};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = Box<dyn Fn(&ApiRequest) -> RawResponse + Send + Sync>;

/// Upstream fake routing on request path
#[derive(Default)]
pub(crate) struct FakeApi {
    routes: Vec<(String, Handler)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeApi {
    pub(crate) fn route(
        mut self,
        path: &str,
        handler: impl Fn(&ApiRequest) -> RawResponse + Send + Sync + 'static,
    ) -> Self {
        self.routes.push((path.to_string(), Box::new(handler)));
        self
    }

    pub(crate) fn json(self, path: &str, body: Value) -> Self {
        self.route(path, move |_| ok(&body))
    }

    pub(crate) fn status(self, path: &str, status: u16) -> Self {
        self.route(path, move |_| RawResponse {
            status,
            retry_after: None,
            body: String::new(),
        })
    }

    pub(crate) fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

impl Transport for FakeApi {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, crate::error::ApiError> {
        self.calls.lock().unwrap().push(request.url(""));
        let handler = self
            .routes
            .iter()
            .find(|(path, _)| *path == request.path)
            .map(|(_, handler)| handler);
        Ok(match handler {
            Some(handler) => handler(request),
            None => RawResponse {
                status: 404,
                retry_after: None,
                body: "not found".to_string(),
            },
        })
    }
}

pub(crate) fn ok(body: &Value) -> RawResponse {
    RawResponse {
        status: 200,
        retry_after: None,
        body: body.to_string(),
    }
}

pub(crate) fn client(api: FakeApi, pacing: Duration) -> (ApiClient, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let client = ApiClient::with_transport(Box::new(api), clock.clone(), RetryPolicy::default(), pacing);
    (client, clock)
}

pub(crate) fn track_json(id: &str, artist_id: &str, year: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Song {id}"),
        "artists": [{ "id": artist_id, "name": format!("Artist {artist_id}") }],
        "album": { "id": format!("album-{id}"), "release_date": year },
        "duration_ms": 180000,
        "explicit": false
    })
}

pub(crate) fn artist_json(id: &str, genres: &[&str]) -> Value {
    json!({ "id": id, "name": format!("Artist {id}"), "genres": genres })
}

fn query_u32(request: &ApiRequest, key: &str) -> u32 {
    request
        .query_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Saved-tracks library of `total` tracks, paged by offset/limit
fn library_api(total: u32) -> FakeApi {
    FakeApi::default().with_library(total)
}

impl FakeApi {
    pub(crate) fn with_library(self, total: u32) -> Self {
        self.route("/me/tracks", move |request| {
            let offset = query_u32(request, "offset");
            let limit = query_u32(request, "limit");
            let end = (offset + limit).min(total);
            let items: Vec<Value> = (offset..end)
                .map(|i| {
                    json!({
                        "added_at": format!("2020-01-{:02}T00:00:00Z", i % 28 + 1),
                        "track": track_json(&format!("saved-{i}"), &format!("a{}", i % 7), "2010-06-01")
                    })
                })
                .collect();
            let next = if end < total { json!("more") } else { Value::Null };
            ok(&json!({ "items": items, "total": total, "offset": offset, "next": next }))
        })
    }
}

pub(crate) fn settings() -> Settings {
    Settings {
        pacing_ms: 0,
        ..Settings::default()
    }
}

#[test]
fn test_library_resumes_to_same_track_set() {
    let settings = settings();
    let (single_client, _) = client(library_api(230), Duration::ZERO);
    let single = ProfileBuilder::new(&single_client, &settings)
        .build_library(0)
        .unwrap();
    assert_eq!(single.next_offset, None);
    assert_eq!(single.profile.track_ids.len(), 230);

    let capped = Settings {
        library_max_pages: 2,
        ..settings.clone()
    };
    let (chunked_client, _) = client(library_api(230), Duration::ZERO);
    let builder = ProfileBuilder::new(&chunked_client, &capped);

    let mut merged = AggregateProfile::new();
    let mut offset = Some(0);
    let mut invocations = 0;
    while let Some(cursor) = offset {
        let chunk = builder.build_library(cursor).unwrap();
        assert!(chunk.pages_fetched <= 2);
        merged.merge(&chunk.profile);
        offset = chunk.next_offset;
        invocations += 1;
    }

    assert_eq!(invocations, 3);
    assert_eq!(merged.track_ids, single.profile.track_ids);
    assert_eq!(merged.saved_at, single.profile.saved_at);
}

#[test]
fn test_library_cursor_points_at_failed_page() {
    let settings = settings();
    let api = FakeApi::default().route("/me/tracks", |request| {
        let offset = query_u32(request, "offset");
        if offset >= 50 {
            return RawResponse {
                status: 500,
                retry_after: None,
                body: "boom".to_string(),
            };
        }
        let items: Vec<Value> = (0..50)
            .map(|i| json!({ "track": track_json(&format!("s{i}"), "a1", "2001") }))
            .collect();
        ok(&json!({ "items": items, "total": 120, "next": "more" }))
    });
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings).build_library(0).unwrap();
    assert_eq!(result.next_offset, Some(50));
    assert_eq!(result.profile.track_ids.len(), 50);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.total, Some(120));
}

pub(crate) fn basics_api() -> FakeApi {
    FakeApi::default()
        .json("/me", json!({ "id": "me", "display_name": "Listener" }))
        .route("/me/top/tracks", |request| {
            let range = request.query_value("time_range").unwrap_or_default().to_string();
            ok(&json!({ "items": [
                track_json(&format!("{range}-1"), "a1", "1994-03-01"),
                track_json("shared", "a2", "2005-01-01")
            ]}))
        })
        .route("/me/top/artists", |request| {
            let items = match request.query_value("time_range") {
                Some("long_term") => json!([artist_json("a1", &["rock", "grunge"]), artist_json("a2", &["rock"])]),
                Some("medium_term") => json!([artist_json("a3", &[]), artist_json("a1", &["rock", "grunge"])]),
                _ => json!([artist_json("a4", &["indie"]), artist_json("a2", &["rock"])]),
            };
            ok(&json!({ "items": items }))
        })
        .json(
            "/me/player/recently-played",
            json!({ "items": [
                { "played_at": "2026-10-01T08:00:00Z", "track": track_json("recent-1", "a5", "2024-01-01") }
            ]}),
        )
        .status("/me/following", 403)
}

#[test]
fn test_basics_orders_artists_by_priority_and_collects_warnings() {
    let settings = settings();
    let (client, _) = client(basics_api(), Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings).build_basics().unwrap();

    assert_eq!(result.user.unwrap().id, "me");
    assert_eq!(result.top_artist_ids, vec!["a1", "a2", "a3", "a4"]);
    // a1 twice and a2 three times, each counted once
    assert_eq!(result.profile.genre_frequency.get("rock"), Some(&2));
    assert_eq!(result.profile.genre_frequency.get("grunge"), Some(&1));
    assert_eq!(result.profile.genre_frequency.get("indie"), Some(&1));
    // three ranged tracks, one shared, one recent
    assert_eq!(result.profile.track_ids.len(), 5);
    assert_eq!(result.profile.played_at.len(), 1);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].starts_with("followed artists"));
    assert_eq!(result.profile.sources.get("recently_played"), Some(&1));
}

#[test]
fn test_basics_auth_failure_is_fatal() {
    let settings = settings();
    let api = FakeApi::default()
        .json("/me", json!({ "id": "me" }))
        .status("/me/top/tracks", 401);
    let log = api.call_log();
    let (client, _) = client(api, Duration::ZERO);

    let err = ProfileBuilder::new(&client, &settings).build_basics().unwrap_err();
    assert!(matches!(err, crate::error::ApiError::Unauthorized));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_long_cooldown_aborts_phase() {
    let settings = settings();
    let api = FakeApi::default().route("/search", |_| RawResponse {
        status: 429,
        retry_after: Some("120".to_string()),
        body: String::new(),
    });
    let log = api.call_log();
    let (client, _) = client(api, Duration::ZERO);

    let mut known = AggregateProfile::new();
    known.genre_frequency.insert("pop".to_string(), 3);
    let err = ProfileBuilder::new(&client, &settings)
        .build_mainstream(&known, &[("pop".to_string(), 3), ("rock".to_string(), 1)])
        .unwrap_err();

    assert_eq!(err.to_string(), "rate_limit_long:120");
    assert_eq!(log.lock().unwrap().len(), 1);
}

fn playlist_json(id: &str, owner: &str, total: u32) -> Value {
    json!({ "id": id, "name": format!("List {id}"), "owner": { "id": owner }, "tracks": { "total": total } })
}

#[test]
fn test_playlists_scan_owned_and_stop_when_blocked() {
    let settings = Settings {
        playlist_page_size: 2,
        ..settings()
    };
    let api = FakeApi::default()
        .json(
            "/me/playlists",
            json!({ "items": [
                playlist_json("mine", "me", 3),
                playlist_json("followed", "someone", 10),
                playlist_json("walled", "me", 6)
            ], "total": 3, "next": null }),
        )
        .route("/playlists/mine/tracks", |request| {
            let offset = query_u32(request, "offset");
            let items: Vec<Value> = (offset..(offset + 2).min(3))
                .map(|i| json!({ "track": track_json(&format!("m{i}"), "a1", "1999") }))
                .collect();
            ok(&json!({ "items": items, "total": 3 }))
        })
        .route("/playlists/walled/tracks", |request| {
            // first page served, then nothing
            let items = if query_u32(request, "offset") == 0 {
                json!([
                    { "track": track_json("w0", "a2", "2001") },
                    { "track": null }
                ])
            } else {
                json!([])
            };
            ok(&json!({ "items": items, "total": 6 }))
        })
        .status("/playlists/followed/tracks", 500);
    let log = api.call_log();
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings)
        .build_playlists(Some("me"))
        .unwrap();

    assert_eq!(result.playlists_total, 3);
    assert_eq!(result.playlists_owned, 2);
    assert_eq!(result.playlists_blocked, 1);
    let ids: Vec<&str> = result.profile.track_ids.iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["m0", "m1", "m2", "w0"]);
    assert!(!log.lock().unwrap().iter().any(|url| url.contains("followed")));
    assert!(result.warnings.iter().any(|w| w.contains("blocked")));
}

#[test]
fn test_playlists_skip_failed_playlist() {
    let settings = settings();
    let api = FakeApi::default()
        .json(
            "/me",
            json!({ "id": "me" }),
        )
        .json(
            "/me/playlists",
            json!({ "items": [playlist_json("broken", "me", 5), playlist_json("fine", "me", 1)], "next": null }),
        )
        .status("/playlists/broken/tracks", 502)
        .json(
            "/playlists/fine/tracks",
            json!({ "items": [{ "track": track_json("f0", "a1", "2011") }], "total": 1 }),
        );
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings)
        .build_playlists(None)
        .unwrap();
    assert!(result.profile.track_ids.contains("f0"));
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_playlists_survive_failed_user_lookup() {
    let settings = settings();
    let api = FakeApi::default()
        .status("/me", 500)
        .json("/me/playlists", json!({ "items": [playlist_json("mine", "me", 1)], "next": null }));
    let log = api.call_log();
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings)
        .build_playlists(None)
        .unwrap();

    assert_eq!(result.playlists_total, 0);
    assert!(result.profile.track_ids.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].starts_with("current user"));
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_playlist_without_track_count_pages_until_last() {
    let settings = Settings {
        playlist_page_size: 2,
        ..settings()
    };
    let api = FakeApi::default()
        .json(
            "/me/playlists",
            json!({ "items": [{ "id": "bare", "name": "Bare", "owner": { "id": "me" } }], "next": null }),
        )
        .route("/playlists/bare/tracks", |request| {
            let offset = query_u32(request, "offset");
            let items: Vec<Value> = (offset..(offset + 2).min(3))
                .map(|i| json!({ "track": track_json(&format!("b{i}"), "a1", "2004") }))
                .collect();
            let next = if offset + 2 < 3 { json!("more") } else { Value::Null };
            ok(&json!({ "items": items, "next": next }))
        });
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings)
        .build_playlists(Some("me"))
        .unwrap();

    let ids: Vec<&str> = result.profile.track_ids.iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["b0", "b1", "b2"]);
    assert_eq!(result.playlists_blocked, 0);
    assert!(result.warnings.is_empty());
}

fn known_profile() -> AggregateProfile {
    let mut known = AggregateProfile::new();
    for id in ["a1", "a2"] {
        known.artist_ids.insert(id.to_string());
        known.artist_names.insert(id.to_string(), format!("Artist {id}"));
    }
    known
}

#[test]
fn test_genre_probe_credits_known_artists() {
    let settings = settings();
    let api = FakeApi::default().route("/search", |request| {
        let items = match request.query_value("q") {
            Some("genre:\"shoegaze\"") => json!([track_json("x1", "a1", "1991"), track_json("x2", "zz", "1992")]),
            Some("genre:\"jazz\"") => json!([track_json("x3", "a2", "1959")]),
            _ => json!([track_json("x4", "stranger", "2000")]),
        };
        ok(&json!({ "tracks": { "items": items } }))
    });
    let log = api.call_log();
    let (client, _) = client(api, Duration::ZERO);

    let mut known = known_profile();
    known.record_genre("a2", "Artist a2", "jazz");
    let graph = GenreGraph::default();

    let result = ProfileBuilder::new(&client, &settings)
        .build_genres(&known, &["a1".to_string()], &graph)
        .unwrap();

    assert_eq!(result.reused_genres, 1);
    assert_eq!(result.artists_looked_up, 0);
    assert_eq!(result.probes_issued, graph.catalog().len() - 1);
    assert_eq!(result.probe_hits, 1);
    assert_eq!(result.profile.genre_frequency.get("shoegaze"), Some(&1));
    assert!(result.profile.genre_artists["shoegaze"].contains("Artist a1"));
    // known genre is never probed
    assert!(!log.lock().unwrap().iter().any(|url| url.contains("jazz")));
    assert!(!result.budget_exhausted);
}

#[test]
fn test_genre_lookup_falls_back_to_single_artists() {
    let settings = Settings {
        artist_lookup_limit: 1,
        ..settings()
    };
    let api = FakeApi::default()
        .status("/artists", 403)
        .json("/artists/a1", artist_json("a1", &["Dream Pop"]))
        .json("/search", json!({ "tracks": { "items": [] } }));
    let (client, _) = client(api, Duration::ZERO);

    let result = ProfileBuilder::new(&client, &settings)
        .build_genres(&known_profile(), &["a1".to_string(), "a2".to_string()], &GenreGraph::default())
        .unwrap();

    assert_eq!(result.artists_looked_up, 1);
    assert_eq!(result.profile.genre_frequency.get("dream pop"), Some(&1));
    assert!(result.warnings[0].starts_with("batch artist lookup"));
}

#[test]
fn test_genre_probing_respects_time_budget() {
    let settings = Settings {
        pacing_ms: 2000,
        ..Settings::default()
    };
    let api = FakeApi::default().json("/search", json!({ "tracks": { "items": [] } }));
    let log = api.call_log();
    let (client, clock) = client(api, settings.pacing());

    let result = ProfileBuilder::new(&client, &settings)
        .build_genres(&known_profile(), &[], &GenreGraph::default())
        .unwrap();

    assert!(result.budget_exhausted);
    assert!(result.probes_issued < GenreGraph::default().catalog().len());
    assert_eq!(log.lock().unwrap().len(), result.probes_issued);
    // no call was started inside the safety margin
    assert!(clock.now() <= settings.time_budget());
}

#[test]
fn test_genre_calls_start_before_safety_margin() {
    let settings = Settings {
        pacing_ms: 2000,
        ..Settings::default()
    };
    let clock = Arc::new(ManualClock::default());
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let seen = stamps.clone();
    let stamp_clock = clock.clone();
    let api = FakeApi::default().route("/search", move |_| {
        seen.lock().unwrap().push(stamp_clock.now());
        ok(&json!({ "tracks": { "items": [] } }))
    });
    let client = ApiClient::with_transport(
        Box::new(api),
        clock.clone(),
        RetryPolicy::default(),
        settings.pacing(),
    );

    let result = ProfileBuilder::new(&client, &settings)
        .build_genres(&known_profile(), &[], &GenreGraph::default())
        .unwrap();

    assert!(result.budget_exhausted);
    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), result.probes_issued);
    let deadline = settings.time_budget() - settings.safety_margin();
    assert!(stamps.iter().all(|at| *at < deadline), "{stamps:?}");
    assert_eq!(stamps.last().copied(), Some(Duration::from_secs(44)));
}

#[test]
fn test_discography_reports_sorted_gaps() {
    let settings = settings();
    let api = FakeApi::default()
        .json(
            "/artists/a1/albums",
            json!({ "items": [
                { "id": "full", "name": "All Heard", "release_date": "1994-01-01" },
                { "id": "half", "name": "Half Heard", "release_date": "1997-05-05" },
                { "id": "none", "name": "Nothing Heard", "release_date": "2003" }
            ]}),
        )
        .json(
            "/albums/full/tracks",
            json!({ "items": [{ "id": "k1", "name": "One" }, { "id": "k2", "name": "Two" }] }),
        )
        .json(
            "/albums/half/tracks",
            json!({ "items": [{ "id": "k3", "name": "Three" }, { "id": "u1", "name": "Four" }] }),
        )
        .json(
            "/albums/none/tracks",
            json!({ "items": [
                { "id": "u2", "name": "Five" }, { "id": "u3", "name": "Six" }, { "id": "u4", "name": "Seven" }
            ]}),
        );
    let (client, _) = client(api, Duration::ZERO);

    let mut known = known_profile();
    for id in ["k1", "k2", "k3"] {
        known.track_ids.insert(id.to_string());
    }
    let mut rng = StdRng::seed_from_u64(11);

    let result = ProfileBuilder::new(&client, &settings)
        .build_discography(&known, &["a1".to_string(), "a2".to_string()], &mut rng)
        .unwrap();

    let names: Vec<&str> = result.gaps.iter().map(|g| g.album_name.as_str()).collect();
    assert_eq!(names, vec!["Nothing Heard", "Half Heard"]);
    assert_eq!(result.gaps[0].unheard_count, 3);
    assert_eq!(result.gaps[0].release_year, Some(2003));
    assert_eq!(result.gaps[1].unheard_sample, vec!["Four"]);
    assert_eq!(result.gaps[0].artist_name, "Artist a1");
    assert_eq!(result.albums_scanned, 3);
    // a2's albums 404 and are skipped
    assert_eq!(result.artists_scanned, 1);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_discography_uses_isrc_to_spot_reissues() {
    let settings = settings();
    let api = FakeApi::default()
        .json("/artists/a1/albums", json!({ "items": [{ "id": "deluxe", "name": "Deluxe" }] }))
        .json(
            "/albums/deluxe/tracks",
            json!({ "items": [{ "id": "r1", "name": "Remaster" }, { "id": "b1", "name": "Bonus" }] }),
        )
        .json(
            "/tracks",
            json!({ "tracks": [
                { "id": "r1", "external_ids": { "isrc": "GBAAA0000001" } },
                { "id": "b1", "external_ids": { "isrc": "GBAAA0000099" } }
            ]}),
        );
    let (client, _) = client(api, Duration::ZERO);

    let mut known = known_profile();
    known.isrcs.insert("GBAAA0000001".to_string());
    let mut rng = StdRng::seed_from_u64(5);

    let result = ProfileBuilder::new(&client, &settings)
        .build_discography(&known, &["a1".to_string()], &mut rng)
        .unwrap();

    assert_eq!(result.gaps.len(), 1);
    assert_eq!(result.gaps[0].unheard_count, 1);
    assert_eq!(result.gaps[0].unheard_sample, vec!["Bonus"]);
}

#[test]
fn test_mainstream_weights_genres_by_frequency() {
    let settings = settings();
    let api = FakeApi::default().route("/search", |request| {
        let items: Vec<Value> = match request.query_value("q") {
            Some("genre:\"pop\"") => (0..10).map(|i| track_json(&format!("p{i}"), "a9", "2020")).collect(),
            _ => (0..10).map(|i| track_json(&format!("r{i}"), "a9", "1990")).collect(),
        };
        ok(&json!({ "tracks": { "items": items } }))
    });
    let (client, _) = client(api, Duration::ZERO);

    let mut known = known_profile();
    for i in 0..8 {
        known.track_ids.insert(format!("p{i}"));
    }
    let top_genres = vec![("pop".to_string(), 3), ("rock".to_string(), 1)];

    let result = ProfileBuilder::new(&client, &settings)
        .build_mainstream(&known, &top_genres)
        .unwrap();

    let report = &result.report;
    assert_eq!(report.genres.len(), 2);
    assert_eq!(report.genres[0].overlap_percent, 80);
    assert_eq!(report.genres[1].overlap_percent, 0);
    assert_eq!(report.score, 60);
    assert_eq!(report.tier, "Crowd Pleaser");
}

#[test]
fn test_build_time_reflects_simulated_waits() {
    let settings = Settings {
        pacing_ms: 1500,
        ..Settings::default()
    };
    let (client, _) = client(library_api(120), settings.pacing());

    let result = ProfileBuilder::new(&client, &settings).build_library(0).unwrap();
    // three pages, two paced gaps
    assert_eq!(result.pages_fetched, 3);
    assert_eq!(result.build_time_ms, 3000);
    assert_eq!(result.profile.sources.get("saved_tracks"), Some(&120));
}
