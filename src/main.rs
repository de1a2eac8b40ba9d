mod cli;

use stemforge::{
    checkpoint::CheckpointManager,
    config,
    orchestrator::{Orchestrator, RunSummary},
    pipeline::{PipelineContext, Profile},
    services::{tools, Services},
};
use stemforge_common::{PlaylistId, TrackId};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "stemforge=trace,stemforge_db=debug,stemforge_common=debug".to_string()
        } else {
            "stemforge=debug,stemforge_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            tracks,
            playlist,
            channels,
            profile,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_tracks(
                cli.config.as_deref(),
                tracks,
                playlist,
                channels,
                profile,
            ))
        }
        Commands::Resume { playlist } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resume(cli.config.as_deref(), playlist))
        }
        Commands::Status { json } => status(cli.config.as_deref(), json),
        Commands::Export { output } => export(cli.config.as_deref(), &output),
        Commands::Clear { yes } => clear(cli.config.as_deref(), yes),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("stemforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_checkpoints(config: &config::Config) -> Result<CheckpointManager> {
    let db_path = config.database_path();
    tracing::debug!("Opening checkpoint database at {}", db_path.display());
    CheckpointManager::open(&db_path)
        .with_context(|| format!("Failed to open checkpoint database {}", db_path.display()))
}

fn build_orchestrator(config_path: Option<&Path>) -> Result<Orchestrator> {
    let config = Arc::new(config::load_config_or_default(config_path)?);
    let checkpoints = open_checkpoints(&config)?;
    let services = Services::from_config(&config)?;
    let orchestrator = Orchestrator::new(PipelineContext::new(config, checkpoints, services));

    // First Ctrl-C stops dispatching; running tracks finish.
    let abort = orchestrator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight tracks");
            abort.cancel();
        }
    });

    Ok(orchestrator)
}

async fn run_tracks(
    config_path: Option<&Path>,
    tracks: Vec<String>,
    playlist: Option<String>,
    channel_names: Vec<String>,
    profile: Option<String>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config_path)?;
    let config = &orchestrator.context().config;

    let channels = if channel_names.is_empty() {
        config.channels.clone()
    } else {
        channel_names
            .iter()
            .map(|name| {
                config
                    .channel(name)
                    .cloned()
                    .with_context(|| format!("Unknown channel: {}", name))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let profile = match profile {
        Some(p) => p.parse::<Profile>().map_err(anyhow::Error::msg)?,
        None => config.pipeline.profile,
    };

    let track_ids = tracks.into_iter().map(TrackId::from).collect();
    let summary = match playlist {
        Some(id) => {
            orchestrator
                .start_playlist(PlaylistId::from(id), track_ids, channels, profile)
                .await?
        }
        None => orchestrator.start_run(track_ids, channels, profile).await?,
    };

    print_summary(&summary);
    ensure_success(&[summary])
}

async fn resume(config_path: Option<&Path>, playlist: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(config_path)?;

    let summaries = match playlist {
        Some(id) => vec![
            orchestrator
                .resume_playlist(&PlaylistId::from(id))
                .await?,
        ],
        None => orchestrator.resume_incomplete().await,
    };

    if summaries.is_empty() {
        println!("Nothing to resume.");
    }
    for summary in &summaries {
        print_summary(summary);
    }
    ensure_success(&summaries)
}

fn print_summary(summary: &RunSummary) {
    println!("Playlist: {}", summary.playlist_id);
    println!("Status: {}", summary.status);
    println!("Completed: {}", summary.completed.len());
    println!("Failed: {}", summary.failed.len());
    for failure in &summary.failed {
        let stage = failure
            .last_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "  {} [{}] after {}: {}",
            failure.track_id, failure.kind, stage, failure.error
        );
    }
    if !summary.not_dispatched.is_empty() {
        println!("Not dispatched: {}", summary.not_dispatched.len());
    }
    println!();
}

fn ensure_success(summaries: &[RunSummary]) -> Result<()> {
    let failed: usize = summaries.iter().map(|s| s.failed.len()).sum();
    if failed > 0 {
        anyhow::bail!("{} track(s) failed", failed);
    }
    Ok(())
}

fn status(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let checkpoints = open_checkpoints(&config)?;
    let stats = checkpoints.recovery_stats()?;
    let incomplete = checkpoints.list_incomplete_playlists();

    if json {
        let value = serde_json::json!({
            "stats": stats,
            "incomplete_playlists": incomplete,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Playlists: {} ({} incomplete)", stats.playlists_total, stats.playlists_incomplete);
    println!(
        "Tracks: {} ({} completed, {} failed)",
        stats.tracks_total, stats.tracks_completed, stats.tracks_failed
    );
    println!(
        "Stems: {} completed, {} invalid",
        stats.stems_completed, stats.stems_invalid
    );
    println!("Cached files: {}", stats.cached_files);
    println!("Failure records: {}", stats.failures);

    if !incomplete.is_empty() {
        println!("\nIncomplete playlists:");
        for playlist in &incomplete {
            println!(
                "  {} [{}] {}/{} tracks",
                playlist.id, playlist.status, playlist.processed_tracks, playlist.total_tracks
            );
        }
    }

    Ok(())
}

fn export(config_path: Option<&Path>, output: &Path) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let checkpoints = open_checkpoints(&config)?;
    checkpoints
        .export_json(output)
        .with_context(|| format!("Failed to export checkpoints to {}", output.display()))?;
    println!("Exported checkpoints to {}", output.display());
    Ok(())
}

fn clear(config_path: Option<&Path>, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to clear checkpoints without --yes");
    }
    let config = config::load_config_or_default(config_path)?;
    let checkpoints = open_checkpoints(&config)?;
    let removed = checkpoints.clear()?;
    println!("Removed {} checkpoint records", removed);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = tools::check_tools(&config.tools);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Data dir: {}", config.pipeline.data_dir.display());
    println!("  Concurrency: {}", config.pipeline.concurrency);
    println!("  Profile: {}", config.pipeline.profile);
    println!("  Models: {}", config.separation.models.join(", "));
    println!(
        "  Devices: {} (fallback {})",
        config.separation.preferred_device, config.separation.fallback_device
    );
    println!("  Channels: {}", config.channels.len());
    for channel in &config.channels {
        let stems: Vec<String> = channel.all_stems().map(|s| s.to_string()).collect();
        println!("    {}: {}", channel.name, stems.join(", "));
    }

    Ok(())
}
