//! TripCrew - collaborative trip itinerary editor
//!
//! CLI entry point for viewing and editing a shared itinerary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use itinerary::{EmptyDayPolicy, ItemId, ItineraryList, NewItineraryItem, ReorderOutcome};
use tripcrew::cli::{Cli, Command};
use tripcrew::config::Config;
use tripcrew::gateway::{HttpGateway, TripGateway};
use tripcrew::preview::{MoveSpec, run_preview};
use tripcrew::render;
use tripcrew::repl;
use tripcrew::sync::{SyncCoordinator, SyncEvent, SyncHandle, SyncOptions};
use tripcrew::trip::{Trip, TripId};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripcrew")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("tripcrew.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("TripCrew loaded config: server={}", config.server.base_url);

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Show { trip } => {
            debug!(trip, "main: matched Show command");
            cmd_show(&config, TripId(trip)).await
        }
        Command::Move {
            trip,
            item,
            day,
            position,
        } => {
            debug!(trip, item, day, position, "main: matched Move command");
            cmd_move(&config, TripId(trip), ItemId(item), day, position).await
        }
        Command::Rm { trip, item } => {
            debug!(trip, item, "main: matched Rm command");
            cmd_rm(&config, TripId(trip), ItemId(item)).await
        }
        Command::Add {
            trip,
            day,
            place,
            description,
            address,
            start,
            end,
            lat,
            lng,
        } => {
            debug!(trip, day, %place, "main: matched Add command");
            let mut item = NewItineraryItem::new(day, place).with_times(start, end);
            if let Some(description) = description {
                item = item.with_description(description);
            }
            if let Some(address) = address {
                item = item.with_address(address);
            }
            if let (Some(lat), Some(lng)) = (lat, lng) {
                item = item.with_coordinates(lat, lng);
            }
            cmd_add(&config, TripId(trip), item).await
        }
        Command::Join { trip } => {
            debug!(trip, "main: matched Join command");
            repl::run_interactive(&config, TripId(trip)).await
        }
        Command::Preview { file, moves } => {
            debug!(file = %file.display(), moves = moves.len(), "main: matched Preview command");
            cmd_preview(&file, &moves, config.sync.empty_days)
        }
    }
}

fn gateway(config: &Config) -> Result<Arc<dyn TripGateway>> {
    config.validate()?;
    Ok(Arc::new(
        HttpGateway::from_config(&config.server).context("Failed to create trip server client")?,
    ))
}

/// Coordinator without a realtime channel, for one-shot edits
async fn one_shot(config: &Config, trip_id: TripId) -> Result<SyncHandle> {
    let handle = SyncCoordinator::spawn(trip_id, gateway(config)?, None, SyncOptions::from(config))
        .await
        .context("Failed to load trip")?;
    Ok(handle)
}

/// Wait for background persistence and report a server rejection as an error
async fn finish(handle: &SyncHandle, mut events: broadcast::Receiver<SyncEvent>) -> Result<ItineraryList> {
    handle.settle().await?;
    let list = handle.snapshot().await?;
    handle.shutdown().await?;

    while let Ok(event) = events.try_recv() {
        if let SyncEvent::PersistenceFailed { error } = event {
            return Err(eyre::eyre!("Server rejected the change: {}", error));
        }
    }
    Ok(list)
}

async fn cmd_show(config: &Config, trip_id: TripId) -> Result<()> {
    debug!(%trip_id, "cmd_show: called");
    let trip = gateway(config)?.fetch_trip(trip_id).await.context("Failed to load trip")?;
    print_trip(&trip);
    Ok(())
}

fn print_trip(trip: &Trip) {
    let span = trip.span();
    let list = ItineraryList::from_items(trip.itinerary_items.clone(), &Default::default(), &span);
    println!(
        "{} {}",
        trip.title.bright_white().bold(),
        format!("({} – {}, {} days)", trip.start_date, trip.end_date, span.trip_days).dimmed()
    );
    print!("{}", render::itinerary(&list));
}

async fn cmd_move(config: &Config, trip_id: TripId, item: ItemId, day: u32, position: u32) -> Result<()> {
    debug!(%trip_id, %item, day, position, "cmd_move: called");
    let handle = one_shot(config, trip_id).await?;
    let events = handle.subscribe_events();

    match handle.move_item(item, day, position).await? {
        ReorderOutcome::Unchanged => println!("{}", "Nothing moved.".dimmed()),
        ReorderOutcome::Staged { changes, .. } => print!("{}", render::changes(&changes)),
    }

    let list = finish(&handle, events).await?;
    print!("{}", render::itinerary(&list));
    Ok(())
}

async fn cmd_rm(config: &Config, trip_id: TripId, item: ItemId) -> Result<()> {
    debug!(%trip_id, %item, "cmd_rm: called");
    let handle = one_shot(config, trip_id).await?;
    let events = handle.subscribe_events();

    handle.remove_item(item).await?;
    let list = finish(&handle, events).await?;
    println!("{} #{}", "Removed".green(), item);
    print!("{}", render::itinerary(&list));
    Ok(())
}

async fn cmd_add(config: &Config, trip_id: TripId, item: NewItineraryItem) -> Result<()> {
    debug!(%trip_id, day = item.day, "cmd_add: called");
    let handle = one_shot(config, trip_id).await?;
    let events = handle.subscribe_events();

    let created = handle.create_item(item).await?;
    let list = finish(&handle, events).await?;
    println!("{} #{} {}", "Added".green(), created.id, created.place_name);
    print!("{}", render::itinerary(&list));
    Ok(())
}

fn cmd_preview(file: &Path, moves: &[MoveSpec], policy: EmptyDayPolicy) -> Result<()> {
    debug!(file = %file.display(), "cmd_preview: called");
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let trip: Trip = serde_json::from_str(&content).context("Failed to parse trip snapshot")?;

    let report = run_preview(&trip, moves, policy).context("Preview rejected")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
