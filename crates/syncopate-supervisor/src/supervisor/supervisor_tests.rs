// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;
use syncopate_config::bootstrap;
use syncopate_ipc::{send_command, Command, Request};
use syncopate_modules::default_registry;

struct Fixture {
    _dir: tempfile::TempDir,
    paths: ConfigPaths,
    config: GlobalConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base_dir(dir.path().join("home"));
        bootstrap(&paths, false).unwrap();
        let config = load_global_config(&paths).unwrap();
        Self {
            _dir: dir,
            paths,
            config,
        }
    }

    fn write_sync(&self, id: &str, interval: &str) {
        let body = format!(
            "id: {id}\ntype: playlist_cache\nschedule:\n  interval: {interval}\n"
        );
        std::fs::write(self.paths.syncs_dir.join(format!("{id}.yml")), body).unwrap();
    }

    fn remove_sync(&self, id: &str) {
        std::fs::remove_file(self.paths.syncs_dir.join(format!("{id}.yml"))).unwrap();
    }

    fn supervisor(&self) -> Arc<Supervisor> {
        let syncs = load_sync_configs(&self.paths.syncs_dir).unwrap();
        Supervisor::new(
            self.config.clone(),
            self.paths.clone(),
            syncs,
            default_registry(),
        )
    }
}

#[tokio::test]
async fn reload_diffs_into_add_update_remove() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    fixture.write_sync("b", "30m");

    let supervisor = fixture.supervisor();
    supervisor.register_all();
    let mut ids = supervisor.scheduler().job_ids();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);

    // rewrite the directory so only {a, c} remain
    fixture.remove_sync("b");
    fixture.write_sync("c", "15m");

    let summary = supervisor.reload_now().unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.updated, 0);

    let mut ids = supervisor.scheduler().job_ids();
    ids.sort();
    assert_eq!(ids, vec!["a", "c"]);

    // the added sync fires immediately: its next run is already due
    let snapshot = supervisor.scheduler().snapshot();
    let a = snapshot.iter().find(|job| job.id == "a").unwrap();
    let c = snapshot.iter().find(|job| job.id == "c").unwrap();
    assert!(!a.missed);
    assert!(c.missed);
}

#[tokio::test]
async fn reloading_identical_configuration_is_idempotent() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");

    let supervisor = fixture.supervisor();
    supervisor.register_all();

    let first = supervisor.reload_now().unwrap();
    assert!(first.is_empty(), "unexpected events: {first:?}");
    let second = supervisor.reload_now().unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn changed_syncs_reregister_with_an_immediate_fire() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");

    let supervisor = fixture.supervisor();
    supervisor.register_all();
    assert!(!supervisor.scheduler().snapshot()[0].missed);

    fixture.write_sync("a", "45m");
    let summary = supervisor.reload_now().unwrap();
    assert_eq!(summary.updated, 1);
    assert!(supervisor.scheduler().snapshot()[0].missed);
}

#[tokio::test]
async fn broken_reload_preserves_the_previous_index() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");

    let supervisor = fixture.supervisor();
    supervisor.register_all();

    // duplicate id makes the directory unloadable
    std::fs::write(
        fixture.paths.syncs_dir.join("dup.yml"),
        "id: a\ntype: playlist_cache\nschedule:\n  interval: 5m\n",
    )
    .unwrap();

    assert!(supervisor.reload_now().is_none());
    assert_eq!(supervisor.scheduler().job_ids(), vec!["a"]);
}

#[tokio::test]
async fn status_reports_pause_and_next_run_semantics() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    fixture.write_sync("b", "30m");

    let supervisor = fixture.supervisor();
    supervisor.register_all();

    let response = supervisor.handle_request(&Request::for_sync(Command::Pause, "a"));
    assert!(response.is_ok());

    let Response::Ok { jobs: Some(jobs), .. } = supervisor.handle_request(&Request::status())
    else {
        panic!("expected a jobs response");
    };
    let a = jobs.iter().find(|job| job.id == "a").unwrap();
    let b = jobs.iter().find(|job| job.id == "b").unwrap();

    assert!(a.paused);
    assert!(a.next_run.is_none());
    assert!(!a.missed);
    assert!(!b.paused);
    assert!(b.next_run.is_some());
    assert!(!b.missed);
}

#[tokio::test]
async fn unknown_ids_and_missing_fields_are_error_responses() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    let supervisor = fixture.supervisor();
    supervisor.register_all();

    let response = supervisor.handle_request(&Request::for_sync(Command::Pause, "ghost"));
    assert!(matches!(response, Response::Error { message } if message.contains("ghost")));

    let response = supervisor.handle_request(&Request {
        command: Command::Start,
        sync_id: None,
    });
    assert!(!response.is_ok());
}

#[tokio::test]
async fn delete_removes_the_trigger_and_start_revives_it() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    let supervisor = fixture.supervisor();
    supervisor.register_all();

    let response = supervisor.handle_request(&Request::for_sync(Command::Delete, "a"));
    assert!(response.is_ok());
    assert!(supervisor.scheduler().job_ids().is_empty());

    // the sync still exists in the index, so start re-registers it
    let response = supervisor.handle_request(&Request::for_sync(Command::Start, "a"));
    assert!(response.is_ok());
    assert_eq!(supervisor.scheduler().job_ids(), vec!["a"]);
}

#[tokio::test]
async fn ipc_round_trip_over_a_real_socket() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    let supervisor = fixture.supervisor();
    supervisor.register_all();

    let socket_path = fixture.config.supervisor.ipc_socket.clone();
    let listener = bind_socket(&socket_path).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(crate::ipc_server::serve(
        Arc::clone(&supervisor),
        listener,
        stop_rx,
    ));

    let response = send_command(&socket_path, &Request::status()).await.unwrap();
    assert!(response.is_ok());

    let response = send_command(&socket_path, &Request::for_sync(Command::Pause, "a"))
        .await
        .unwrap();
    assert!(response.is_ok());

    // malformed payloads get an error response, not a dropped connection
    {
        use tokio::io::AsyncWriteExt;
        let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(b"{this is not json").await.unwrap();
        stream.shutdown().await.unwrap();
        use tokio::io::AsyncReadExt;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed["status"], "error");
    }

    stop_tx.send(true).unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}

#[tokio::test]
async fn run_serves_ipc_and_stops_on_request() {
    let fixture = Fixture::new();
    fixture.write_sync("a", "30m");
    let supervisor = fixture.supervisor();

    let handle = tokio::spawn(Arc::clone(&supervisor).run(false));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let socket = &fixture.config.supervisor.ipc_socket;
    let response = send_command(socket, &Request::status()).await.unwrap();
    assert!(response.is_ok());

    supervisor.request_stop();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert!(result.is_ok());
    // the socket file is unlinked on shutdown
    assert!(!socket.exists());
}

#[tokio::test]
async fn stale_socket_files_are_replaced_on_bind() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("ipc.sock");
    std::fs::write(&socket_path, b"stale").unwrap();
    let listener = bind_socket(&socket_path).unwrap();
    drop(listener);
    assert!(socket_path.exists());
}
