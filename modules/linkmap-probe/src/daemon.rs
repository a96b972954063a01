//! The probe daemon: one subscription connection at a time, with
//! heartbeat supervision and capped reconnect backoff. Scrape jobs are
//! spawned off the loop and never block it.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::scrape::{self, ScrapeRequest};
use crate::sse::SseParser;
use crate::state::{ProbeConfig, StateDir};

/// Connection is considered dead this long after the last event.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Reconnect backoff schedule, capped at the last entry.
const BACKOFF_SECS: [u64; 5] = [5, 10, 20, 40, 60];

pub fn pid_alive(pid: i32) -> bool {
    // Zero-signal liveness probe.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// `run` without `--foreground`: re-execute ourselves detached with
/// stdio on the log file, and record the child PID.
pub fn spawn_background(state_dir: &StateDir) -> Result<()> {
    if let Some(pid) = state_dir.read_pid() {
        if pid_alive(pid) {
            anyhow::bail!("probe already running (pid {pid})");
        }
        state_dir.remove_pid();
    }

    let exe = std::env::current_exe().context("locating own executable")?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(state_dir.log_path())
        .with_context(|| format!("opening {}", state_dir.log_path().display()))?;
    let log_err = log.try_clone()?;

    let child = {
        use std::os::unix::process::CommandExt;
        std::process::Command::new(exe)
            .args(["run", "--foreground"])
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .process_group(0)
            .spawn()
            .context("spawning daemon")?
    };

    state_dir.write_pid(child.id() as i32)?;
    println!("probe started (pid {})", child.id());
    Ok(())
}

pub fn stop(state_dir: &StateDir) -> Result<()> {
    let Some(pid) = state_dir.read_pid() else {
        anyhow::bail!("probe is not running");
    };
    if !pid_alive(pid) {
        state_dir.remove_pid();
        anyhow::bail!("probe is not running (stale pid file removed)");
    }

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    state_dir.remove_pid();
    println!("probe stopped (pid {pid})");
    Ok(())
}

pub fn status(state_dir: &StateDir) {
    match state_dir.read_pid() {
        Some(pid) if pid_alive(pid) => println!("running (pid {pid})"),
        Some(_) => println!("not running (stale pid file)"),
        None => println!("not running"),
    }
}

/// The foreground event loop. Returns on shutdown signal.
pub async fn run_foreground(state_dir: &StateDir, config: ProbeConfig) -> Result<()> {
    config
        .access_token
        .as_deref()
        .context("not logged in; run `lmp login` first")?;

    state_dir.write_pid(std::process::id() as i32)?;
    info!(api_base = %config.api_base, "probe daemon started");

    let http = reqwest::Client::new();
    let mut backoff_idx: usize = 0;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            result = connect_once(&http, &config, &mut backoff_idx) => {
                match result {
                    Ok(()) => info!("subscription closed by server, reconnecting"),
                    Err(e) => warn!(error = %format!("{e:#}"), "subscription dropped"),
                }
                let delay = BACKOFF_SECS[backoff_idx.min(BACKOFF_SECS.len() - 1)];
                backoff_idx = (backoff_idx + 1).min(BACKOFF_SECS.len() - 1);
                info!(delay_secs = delay, "reconnecting after backoff");
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                }
            }
        }
    }

    info!("probe daemon shutting down");
    state_dir.remove_pid();
    Ok(())
}

/// One subscription connection: read until the server closes, the
/// heartbeat deadline passes, or the transport errors. The backoff
/// index resets once the first byte arrives (a real connection, not
/// just a completed handshake).
async fn connect_once(
    http: &reqwest::Client,
    config: &ProbeConfig,
    backoff_idx: &mut usize,
) -> Result<()> {
    let token = config.access_token.as_deref().expect("checked at startup");
    let endpoint = format!(
        "{}/api/probe/subscribe_events",
        config.api_base.trim_end_matches('/')
    );

    let mut resp = http
        .get(&endpoint)
        .bearer_auth(token)
        .send()
        .await
        .context("subscribe request failed")?;

    if !resp.status().is_success() {
        anyhow::bail!("subscribe endpoint returned {}", resp.status());
    }

    info!("subscribed to event stream");
    let mut parser = SseParser::new();
    let mut first_byte = false;
    let mut deadline = Instant::now() + HEARTBEAT_TIMEOUT;

    loop {
        tokio::select! {
            chunk = resp.chunk() => {
                match chunk.context("reading event stream")? {
                    Some(bytes) => {
                        if !first_byte {
                            first_byte = true;
                            *backoff_idx = 0;
                        }
                        deadline = Instant::now() + HEARTBEAT_TIMEOUT;
                        for event in parser.push(&bytes) {
                            dispatch(http, config, event);
                        }
                    }
                    None => return Ok(()),
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                anyhow::bail!("no event for {}s, dropping connection", HEARTBEAT_TIMEOUT.as_secs());
            }
        }
    }
}

fn dispatch(http: &reqwest::Client, config: &ProbeConfig, event: crate::sse::SseEvent) {
    match event.event.as_str() {
        // Pings only exist to move the heartbeat deadline, which every
        // received chunk already does.
        "ping" => {}
        "scrape_request" => match serde_json::from_str::<ScrapeRequest>(&event.data) {
            Ok(request) => {
                tokio::spawn(scrape::run_job(http.clone(), config.clone(), request));
            }
            Err(e) => warn!(error = %e, data = %event.data, "undecodable scrape request"),
        },
        other => warn!(event = other, "unknown stream event"),
    }
}
