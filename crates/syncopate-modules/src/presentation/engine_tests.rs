// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::Utc;
use rand::SeedableRng;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncopate_config::{ConfigPaths, GlobalConfig, SyncConfig};
use syncopate_spotify::auth::{SpotifyAuth, TokenCache};
use syncopate_spotify::{SpotifyClient, SpotifyService};
use syncopate_state::{RunStatus, SyncState};

use super::state::PresentationState;
use super::PlaylistPresentationModule;
use crate::context::SyncContext;
use crate::module::SyncModule;

fn module(options: serde_json::Value) -> PlaylistPresentationModule {
    let sync: SyncConfig = serde_json::from_value(serde_json::json!({
        "id": "presentation",
        "type": "playlist_presentation",
        "schedule": {"interval": "5m"},
        "options": options,
    }))
    .unwrap();
    PlaylistPresentationModule::new(&sync).unwrap()
}

fn themed_options(mode: &str) -> serde_json::Value {
    let themes = serde_json::json!(["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7"]);
    serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "cover": {
            "enabled": true,
            "selection": {"mode": mode, "group_key": "theme"},
            "sources": {"default": [{"type": "list", "items": themes}]},
        },
        "title": {
            "enabled": true,
            "selection": {"mode": mode, "group_key": "theme"},
            "sources": {"default": [{"type": "list", "items": themes}]},
        },
    })
}

struct Harness {
    _dir: tempfile::TempDir,
    paths: ConfigPaths,
    global: GlobalConfig,
    state: SyncState,
    service: SpotifyService,
}

impl Harness {
    fn new(api_base: Option<String>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base_dir(dir.path());
        let mut global = GlobalConfig::defaults_for(&paths);
        global.spotify.client_id = "id".to_string();
        global.spotify.client_secret = "secret".to_string();
        global.runtime.storage_dir = dir.path().join("state");

        let token_path = dir.path().join("token.json");
        TokenCache {
            access_token: "token".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
            scope: None,
        }
        .save(&token_path)
        .unwrap();

        let auth = SpotifyAuth::from_config(&global)
            .unwrap()
            .with_cache_path(token_path);
        let mut builder = SpotifyClient::builder(auth);
        if let Some(base) = api_base {
            builder = builder.base_url(base);
        }
        let service = SpotifyService::new(builder.build().unwrap());

        let state = SyncState::load(dir.path().join("state/presentation.json")).unwrap();
        Self {
            _dir: dir,
            paths,
            global,
            state,
            service,
        }
    }

    fn ctx(&mut self) -> SyncContext<'_> {
        SyncContext {
            spotify: &self.service,
            state: &mut self.state,
            global: &self.global,
            paths: &self.paths,
            shared_cache: None,
        }
    }
}

#[tokio::test]
async fn no_enabled_features_is_a_noop() {
    let mut harness = Harness::new(None);
    let mut module = module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
    }));

    let outcome = module.run(&mut harness.ctx()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Noop);
    assert_eq!(outcome.details["reason"], "no_features_enabled");
    assert!(!harness.state.is_dirty());
}

#[tokio::test]
async fn recent_update_skips_the_interval() {
    let mut harness = Harness::new(None);
    harness.state.set(
        "playlist_presentation",
        serde_json::json!({
            "last_updated_at": Utc::now().to_rfc3339(),
            "last_phase": "day",
        }),
    );
    harness.state.save().unwrap();

    let mut module = module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "interval_seconds": 600,
        "title": {
            "enabled": true,
            "sources": {"default": [{"type": "list", "items": ["a"]}]},
        },
    }));

    let outcome = module.run(&mut harness.ctx()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::SkippedInterval);
    assert_eq!(outcome.details["phase"], "day");
    let remaining = outcome.details["remaining"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 600);
    // the skip must not dirty the state
    assert!(!harness.state.is_dirty());
}

#[tokio::test]
async fn grouped_features_share_one_value_per_fire() {
    let engine = module(themed_options("sequential"));

    // preset the shared cursor so the first resolver picks index 3
    let mut pres = PresentationState::default();
    pres.global_run_count = 1;
    pres.groups.entry("theme".to_string()).or_default().state.cursor = 3;

    let now = Utc::now();
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let base = std::path::Path::new("/tmp");

    let cover = engine.evaluate_feature(
        "cover",
        &engine.options.cover,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    assert_eq!(cover.value.as_deref(), Some("t3"));

    let title = engine.evaluate_feature(
        "title",
        &engine.options.title,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    // the group cache answers; the shared cursor did not advance twice
    assert_eq!(title.value.as_deref(), Some("t3"));
    assert_eq!(pres.groups["theme"].state.cursor, 4);
}

#[tokio::test]
async fn grouped_random_features_agree_within_a_fire() {
    let engine = module(themed_options("random"));
    let mut pres = PresentationState::default();
    pres.global_run_count = 9;

    let now = Utc::now();
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let base = std::path::Path::new("/tmp");

    let first = engine
        .evaluate_feature(
            "cover",
            &engine.options.cover,
            Vec::new(),
            &mut pres,
            "night",
            now,
            base,
            &mut rng,
        )
        .value
        .unwrap();
    let second = engine
        .evaluate_feature(
            "title",
            &engine.options.title,
            Vec::new(),
            &mut pres,
            "night",
            now,
            base,
            &mut rng,
        )
        .value
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn cadence_multiplier_gates_odd_runs() {
    let engine = module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "title": {
            "enabled": true,
            "cadence": {"multiplier": 2},
            "sources": {"default": [{"type": "list", "items": ["a", "b"]}]},
        },
    }));

    let now = Utc::now();
    let base = std::path::Path::new("/tmp");

    let mut pres = PresentationState::default();
    pres.global_run_count = 3;
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let odd = engine.evaluate_feature(
        "title",
        &engine.options.title,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    assert!(!odd.apply);
    assert_eq!(odd.reason, Some("cadence_skip"));

    pres.global_run_count = 4;
    let even = engine.evaluate_feature(
        "title",
        &engine.options.title,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    assert!(even.apply);
}

#[tokio::test]
async fn missing_assets_fall_back_or_skip() {
    let engine = module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "cover": {"enabled": true, "fallback_asset": "spare.png"},
        "title": {"enabled": true},
    }));

    let now = Utc::now();
    let mut pres = PresentationState::default();
    pres.global_run_count = 1;
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let base = std::path::Path::new("/tmp");

    let cover = engine.evaluate_feature(
        "cover",
        &engine.options.cover,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    assert!(cover.apply);
    assert_eq!(cover.value.as_deref(), Some("spare.png"));
    assert_eq!(cover.reason, Some("fallback_asset"));

    let title = engine.evaluate_feature(
        "title",
        &engine.options.title,
        Vec::new(),
        &mut pres,
        "default",
        now,
        base,
        &mut rng,
    );
    assert!(!title.apply);
    assert_eq!(title.reason, Some("no_assets"));
}

#[tokio::test]
async fn details_update_applies_and_persists() {
    let server = MockServer::start().await;
    let mut harness = Harness::new(Some(format!("{}/v1", server.uri())));

    Mock::given(method("PUT"))
        .and(path("/v1/playlists/p1"))
        .and(body_string_contains("Morning Vibes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut module = module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "title": {
            "enabled": true,
            "sources": {"default": [{"type": "list", "items": ["Morning Vibes"]}]},
        },
    }));

    let outcome = module.run(&mut harness.ctx()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Updated);
    assert_eq!(outcome.details["fields"], serde_json::json!(["name"]));

    // state carries the new details and counters
    assert!(harness.state.is_dirty());
    let pres = PresentationState::from_value(harness.state.get("playlist_presentation"));
    assert_eq!(pres.details.title.as_deref(), Some("Morning Vibes"));
    assert_eq!(pres.global_run_count, 1);
    assert!(pres.last_updated_at.is_some());
    assert_eq!(pres.features["title"].history, vec!["Morning Vibes"]);

    // an identical second fire sends nothing and reports a noop
    let mut second = Harness::new(Some(format!("{}/v1", server.uri())));
    second.state = harness.state;
    let mut pres = PresentationState::from_value(second.state.get("playlist_presentation"));
    pres.last_updated_at = None;
    second
        .state
        .set("playlist_presentation", serde_json::to_value(&pres).unwrap());
    let mut module = module_with_title();
    let outcome = module.run(&mut second.ctx()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Noop);
}

fn module_with_title() -> PlaylistPresentationModule {
    module(serde_json::json!({
        "playlist": {"kind": "playlist_id", "id": "p1"},
        "title": {
            "enabled": true,
            "sources": {"default": [{"type": "list", "items": ["Morning Vibes"]}]},
        },
    }))
}
