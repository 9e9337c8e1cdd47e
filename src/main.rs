// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlos command-line client.
//!
//! Records runs by replaying a GeoJSON track through the run session
//! controller, and reads leaderboards and run history from the API.

use anyhow::{bail, Context, Result};
use athlos::{
    config::Config,
    models::{LeaderboardEntry, LeaderboardPeriod},
    services::{geometry, ApiClient, LiveLeaderboard, RecordingMap, TrackReplay},
    session::{RunSessionController, RunState, RunSummary, SessionMode},
    time_utils::format_elapsed,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "athlos", version, about = "Athlos run recorder and API client")]
struct Cli {
    /// API root (overrides ATHLOS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a run by replaying a GeoJSON track
    Run {
        /// GeoJSON file containing a LineString
        #[arg(long)]
        track: PathBuf,

        /// Do not mirror the run to the server
        #[arg(long)]
        guest: bool,

        /// Delay between replayed readings in milliseconds
        #[arg(long, default_value_t = 1000)]
        cadence_ms: u64,

        /// Write the path and territory as GeoJSON
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Print a leaderboard
    Leaderboard {
        #[arg(long, value_enum, default_value_t = Period::Daily)]
        period: Period,

        /// Keep printing live updates until interrupted
        #[arg(long)]
        follow: bool,
    },
    /// List a user's past runs
    History {
        #[arg(long)]
        user_id: Option<u64>,
    },
    /// Log in and print the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Period {
    Daily,
    Weekly,
    AllTime,
}

impl From<Period> for LeaderboardPeriod {
    fn from(p: Period) -> Self {
        match p {
            Period::Daily => LeaderboardPeriod::Daily,
            Period::Weekly => LeaderboardPeriod::Weekly,
            Period::AllTime => LeaderboardPeriod::AllTime,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    let client = ApiClient::from_config(&config);
    tracing::debug!(api = %config.api_base_url, "Client configured");

    match cli.command {
        Command::Run {
            track,
            guest,
            cadence_ms,
            export,
        } => {
            let mode = if guest {
                SessionMode::Guest
            } else {
                config.session_mode()
            };
            record_run(
                &client,
                mode,
                &track,
                Duration::from_millis(cadence_ms),
                export,
            )
            .await
        }
        Command::Leaderboard { period, follow } => {
            print_leaderboard(&client, period.into()).await?;
            if follow {
                follow_leaderboard(&config.ws_url, period.into()).await?;
            }
            Ok(())
        }
        Command::History { user_id } => {
            let user_id = user_id
                .or(config.user_id)
                .context("No user given (use --user-id or ATHLOS_USER_ID)")?;
            print_history(&client, user_id).await
        }
        Command::Login { email, password } => {
            let response = client.login(&email, &password).await?;
            println!("user_id={}", response.user.id);
            println!("token={}", response.token);
            Ok(())
        }
        Command::Register {
            email,
            password,
            name,
        } => {
            let user = client.register(&email, &password, &name).await?;
            println!("Registered {} (id {})", user.name, user.id);
            Ok(())
        }
    }
}

async fn record_run(
    client: &ApiClient,
    mode: SessionMode,
    track_path: &Path,
    cadence: Duration,
    export: Option<PathBuf>,
) -> Result<()> {
    let track = geometry::load_track_from_file(track_path)
        .with_context(|| format!("Failed to load track {}", track_path.display()))?;
    tracing::info!(points = track.len(), mode = ?mode, "Replaying track");

    let total = track.len();
    let replay = TrackReplay::new(track, cadence);
    let map = RecordingMap::default();
    let (controller, mut handle) =
        RunSessionController::new(mode, client.clone(), replay.clone(), map.clone());
    let session = tokio::spawn(controller.run());

    // Wait for the track to run out, or for something to block recording.
    let reached = handle
        .wait_for(|s| s.path_len >= total || s.is_blocked() || s.state == RunState::Ended)
        .await;

    if let Some(snapshot) = reached {
        if let Some(message) = &snapshot.message {
            eprintln!("{}", message);
        }
        if snapshot.state != RunState::Ended && !snapshot.is_blocked() {
            handle.end();
            let settled = handle
                .wait_for(|s| {
                    s.state == RunState::Ended || (s.message.is_some() && !s.end_in_flight)
                })
                .await;
            if let Some(s) = settled.filter(|s| s.state != RunState::Ended) {
                eprintln!("{}", s.message.unwrap_or_default());
            }
        }
    }
    handle.leave();

    let summary = session.await.context("Run session task failed")?;
    if summary.end_pending {
        eprintln!("End request was still in flight; the server may have closed the run.");
    }
    print_summary(client, &summary).await;

    if let Some(path) = export {
        let collection = geometry::run_feature_collection(&summary.path);
        let json = serde_json::to_string_pretty(&collection)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Exported to {}", path.display());
    }

    let drawn = map.snapshot();
    tracing::debug!(
        drawn_points = drawn.path.len(),
        claimed = drawn.claimed.len(),
        "Map state"
    );

    if !summary.completed {
        bail!("Run was not completed");
    }
    Ok(())
}

async fn print_summary(client: &ApiClient, summary: &RunSummary) {
    println!("Time       {}", format_elapsed(summary.elapsed_secs));
    println!("Points     {}", summary.path.len());
    println!("Distance   {:.0} m", summary.distance_meters());
    println!("Steps      {}", summary.steps());
    match &summary.territory {
        Some(ring) => println!("Territory  {} vertices", ring.len() - 1),
        None => println!("Territory  none (needs at least 3 points)"),
    }
    match summary.encoded_path() {
        Ok(encoded) if !encoded.is_empty() => println!("Polyline   {}", encoded),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not encode path"),
    }

    if let SessionMode::Authenticated { user_id } = summary.mode {
        match client.get_user(user_id).await {
            Ok(user) => println!(
                "Goal       {}% of {} steps",
                user.daily_progress(summary.steps()),
                user.step_goal()
            ),
            Err(e) => tracing::warn!(user_id, error = %e, "Could not load profile"),
        }
    }
}

async fn print_leaderboard(client: &ApiClient, period: LeaderboardPeriod) -> Result<()> {
    let entries = client.leaderboard(period).await?;
    print_entries(&entries);
    Ok(())
}

async fn follow_leaderboard(ws_url: &str, period: LeaderboardPeriod) -> Result<()> {
    let mut live = LiveLeaderboard::connect(ws_url, &[period])
        .await
        .with_context(|| format!("Failed to connect to {}", ws_url))?;

    loop {
        tokio::select! {
            update = live.next() => match update {
                Some(update) => {
                    println!("--- {} leaderboard updated ---", update.period.slug());
                    print_entries(&update.entries);
                }
                None => bail!("Live leaderboard connection closed"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn print_entries(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("No entries yet");
        return;
    }
    for entry in entries {
        println!(
            "{:>3}. {:<24} {:>8} steps",
            entry.rank, entry.name, entry.total_steps
        );
    }
}

async fn print_history(client: &ApiClient, user_id: u64) -> Result<()> {
    let runs = client.user_runs(user_id).await?;
    for run in runs {
        let started = run
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<6} {}  {}  {:>7.0} m  {:>6} steps{}",
            run.id,
            started,
            format_elapsed(run.duration_seconds.unwrap_or(0)),
            run.distance_meters.unwrap_or(0.0),
            run.total_steps.unwrap_or(0),
            if run.is_active { "  (active)" } else { "" }
        );
    }
    Ok(())
}

/// Initialize structured JSON logging on stderr.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("athlos=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
