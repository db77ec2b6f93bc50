// SPDX-License-Identifier: GPL-3.0-or-later

use std::process::ExitCode;

use anyhow::{anyhow, Context};
use tracing::info;

use syncopate_config::{
    bootstrap, load_global_config, load_sync_configs, ConfigPaths, GlobalConfig, SyncConfig,
};
use syncopate_ipc::{send_command, Command, Request, Response};
use syncopate_modules::default_registry;
use syncopate_spotify::{SpotifyAuth, SpotifyClient, SpotifyError, SpotifyService};
use syncopate_state::{state_path_for_sync, SyncState};
use syncopate_supervisor::{execute_fire, SharedCacheManager, Supervisor};

use crate::track_id::parse_track_id;

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_RATE_LIMITED: u8 = 2;

type CommandResult = anyhow::Result<ExitCode>;

struct AppContext {
    global: GlobalConfig,
    syncs: Vec<SyncConfig>,
}

fn load_context(paths: &ConfigPaths) -> anyhow::Result<AppContext> {
    let global = load_global_config(paths).context("loading config.yml")?;
    let syncs = load_sync_configs(&paths.syncs_dir).context("loading sync definitions")?;
    Ok(AppContext { global, syncs })
}

fn find_sync<'a>(context: &'a AppContext, sync_id: &str) -> anyhow::Result<&'a SyncConfig> {
    context
        .syncs
        .iter()
        .find(|sync| sync.id == sync_id)
        .ok_or_else(|| anyhow!("unknown sync '{sync_id}'"))
}

pub fn init(paths: &ConfigPaths, force: bool) -> CommandResult {
    let report = bootstrap(paths, force)?;

    println!("configuration root: {}", paths.base_dir.display());
    let mut created: Vec<&str> = Vec::new();
    if report.base_created {
        created.push("base directory");
    }
    if report.state_dir_created {
        created.push("state/");
    }
    if report.syncs_dir_created {
        created.push("syncs/");
    }
    if report.templates_dir_created {
        created.push("templates/");
    }
    if report.assets_dir_created {
        created.push("assets/");
    }
    if report.global_config_created {
        created.push(if report.global_config_overwritten {
            "config.yml (overwritten)"
        } else {
            "config.yml"
        });
    }

    if created.is_empty() {
        println!("nothing to do, everything already exists");
    } else {
        for item in created {
            println!("created {item}");
        }
        println!("next: put your Spotify credentials into config.yml");
    }
    Ok(ExitCode::from(EXIT_OK))
}

pub async fn serve(paths: &ConfigPaths, hot_reload: bool) -> CommandResult {
    let context = load_context(paths)?;
    let supervisor = Supervisor::new(
        context.global,
        paths.clone(),
        context.syncs,
        default_registry(),
    );
    supervisor.run(hot_reload).await?;
    Ok(ExitCode::from(EXIT_OK))
}

pub fn list(paths: &ConfigPaths) -> CommandResult {
    let context = load_context(paths)?;
    if context.syncs.is_empty() {
        println!("no syncs defined in {}", paths.syncs_dir.display());
        return Ok(ExitCode::from(EXIT_OK));
    }

    for sync in &context.syncs {
        let schedule = match (&sync.schedule.interval, &sync.schedule.cron) {
            (Some(interval), _) => format!("every {interval}"),
            (None, Some(cron)) => format!("cron[{cron}]"),
            (None, None) => "unscheduled".to_string(),
        };
        match &sync.description {
            Some(description) => {
                println!("{:<24} {:<22} {:<16} {description}", sync.id, sync.kind, schedule)
            }
            None => println!("{:<24} {:<22} {schedule}", sync.id, sync.kind),
        }
    }
    Ok(ExitCode::from(EXIT_OK))
}

/// One-shot execution of a single sync, writing the same run records the
/// supervisor would.
pub async fn run_once(paths: &ConfigPaths, sync_id: &str) -> CommandResult {
    let context = load_context(paths)?;
    let sync = find_sync(&context, sync_id)?.clone();

    let registry = default_registry();
    let mut cache = SharedCacheManager::new(&context.syncs);
    let shared = cache.refresh(&context.global, false);

    let report = execute_fire(&sync, &context.global, paths, &registry, shared).await?;
    println!("{}: {}", report.sync_id, report.status);
    if let Some(error) = report.error {
        println!("  error: {error}");
        return Ok(ExitCode::from(EXIT_FAILURE));
    }
    Ok(ExitCode::from(EXIT_OK))
}

pub async fn status(paths: &ConfigPaths) -> CommandResult {
    let context = load_context(paths)?;
    let response = send_command(&context.global.supervisor.ipc_socket, &Request::status()).await?;

    match response {
        Response::Ok { jobs, .. } => {
            let jobs = jobs.unwrap_or_default();
            if jobs.is_empty() {
                println!("supervisor running, no scheduled jobs");
                return Ok(ExitCode::from(EXIT_OK));
            }
            println!("{:<24} {:<28} {:<8} paused", "id", "next run", "missed");
            for job in jobs {
                println!(
                    "{:<24} {:<28} {:<8} {}",
                    job.id,
                    job.next_run.as_deref().unwrap_or("-"),
                    job.missed,
                    job.paused
                );
            }
            Ok(ExitCode::from(EXIT_OK))
        }
        Response::Error { message } => {
            eprintln!("supervisor error: {message}");
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

pub async fn supervisor_command(
    paths: &ConfigPaths,
    command: Command,
    sync_id: &str,
) -> CommandResult {
    let context = load_context(paths)?;
    let response = send_command(
        &context.global.supervisor.ipc_socket,
        &Request::for_sync(command, sync_id),
    )
    .await?;

    match response {
        Response::Ok { message, .. } => {
            println!("{}", message.unwrap_or_else(|| "ok".to_string()));
            Ok(ExitCode::from(EXIT_OK))
        }
        Response::Error { message } => {
            eprintln!("supervisor error: {message}");
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

/// Configuration and connectivity checks. Exit code 2 signals that the
/// remote service answered with a rate limit.
pub async fn doctor(paths: &ConfigPaths) -> CommandResult {
    println!("configuration root: {}", paths.base_dir.display());

    let context = match load_context(paths) {
        Ok(context) => {
            println!("ok: configuration parses ({} syncs)", context.syncs.len());
            context
        }
        Err(e) => {
            println!("fail: {e:#}");
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };

    let mut failed = false;

    if context.global.spotify.is_configured() {
        println!("ok: Spotify credentials configured");
    } else {
        println!("fail: Spotify credentials are placeholders; edit config.yml");
        failed = true;
    }

    let socket = &context.global.supervisor.ipc_socket;
    match send_command(socket, &Request::status()).await {
        Ok(_) => println!("ok: supervisor answering on {}", socket.display()),
        Err(e) => println!("warn: supervisor not reachable ({e})"),
    }

    if context.global.spotify.is_configured() {
        if let Ok(auth) = SpotifyAuth::from_config(&context.global) {
            if !auth.cache_path().exists() {
                println!(
                    "warn: no cached Spotify token at {} (authorize this application first)",
                    auth.cache_path().display()
                );
            }
        }
        match ping_spotify(&context.global).await {
            Ok(user) => println!("ok: Spotify API reachable (user {user})"),
            Err(SpotifyError::RateLimited { retry_after }) => {
                println!(
                    "fail: Spotify API rate limited (retry after {}s)",
                    retry_after.unwrap_or(0)
                );
                return Ok(ExitCode::from(EXIT_RATE_LIMITED));
            }
            Err(e) => {
                println!("fail: Spotify API check failed ({e})");
                failed = true;
            }
        }
    }

    Ok(ExitCode::from(if failed { EXIT_FAILURE } else { EXIT_OK }))
}

async fn ping_spotify(global: &GlobalConfig) -> Result<String, SpotifyError> {
    let auth = SpotifyAuth::from_config(global)?;
    let client = SpotifyClient::new(auth)?;
    let service = SpotifyService::new(client);
    service.user_id().await
}

pub fn logs(paths: &ConfigPaths, sync_id: &str, tail: usize) -> CommandResult {
    let context = load_context(paths)?;
    let sync = find_sync(&context, sync_id)?;

    let state = SyncState::load(state_path_for_sync(&context.global, sync))?;
    let history = state.run_history();
    if history.is_empty() {
        println!("no runs recorded for {sync_id}");
        return Ok(ExitCode::from(EXIT_OK));
    }

    let tail = tail.max(1);
    for record in history.iter().skip(history.len().saturating_sub(tail)) {
        let completed = record.completed_at.as_deref().unwrap_or("-");
        println!("{}  {:<16} completed {completed}", record.started_at, record.status);
        if let Some(error) = &record.error {
            println!("    error: {error}");
        }
        if let Some(details) = &record.details {
            println!("    details: {details}");
        }
    }
    Ok(ExitCode::from(EXIT_OK))
}

pub fn set_last_track(paths: &ConfigPaths, sync_id: &str, track_id: &str) -> CommandResult {
    let context = load_context(paths)?;
    let sync = find_sync(&context, sync_id)?;

    let mut state = SyncState::load(state_path_for_sync(&context.global, sync))?;
    if track_id == "-" {
        state.set_last_processed_track_id(None);
        println!("cleared cursor for {sync_id}");
    } else {
        let parsed = parse_track_id(track_id)?;
        state.set_last_processed_track_id(Some(&parsed));
        println!("cursor for {sync_id} set to {parsed}");
    }
    state.save()?;
    Ok(ExitCode::from(EXIT_OK))
}

pub async fn serve_api(paths: &ConfigPaths, bind: &str) -> CommandResult {
    let app = syncopate_api::router(syncopate_api::AppState::new(paths.clone()));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(target: "api", addr = %listener.local_addr()?, "HTTP control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(ExitCode::from(EXIT_OK))
}

async fn shutdown_signal() {
    let mut interrupt = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("install SIGINT handler");
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("install SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    info!(target: "api", "shutdown signal received");
}
