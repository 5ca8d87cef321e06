//! Colisten Sim - headless co-listening simulator.
//!
//! Runs one host and several guests in a single process over an in-memory
//! session store. The host walks through a playlist; on every track change
//! each device "loads" for a random time and the session waits at the
//! rebuffer barrier until everyone is ready.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colisten_core::{
    bootstrap_services, BootstrappedServices, ConnectionState, InMemorySessionStore,
    Session, SessionStore, StaticCredentials, StoredAccount, Track, TrackSource,
};
use rand::Rng;
use tokio::signal;

use crate::config::SimConfig;

/// How long any device may wait for a session-wide condition.
const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Colisten Sim - drives a scripted co-listening session.
#[derive(Parser, Debug)]
#[command(name = "colisten-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "COLISTEN_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Number of guests (overrides config file).
    #[arg(short = 'g', long)]
    guests: Option<usize>,

    /// Seconds each track plays (overrides config file).
    #[arg(short = 's', long)]
    play_secs: Option<u64>,
}

/// One simulated device.
struct Device {
    label: String,
    services: BootstrappedServices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Colisten Sim v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        SimConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(guests) = args.guests {
        config.guests = guests;
    }
    if let Some(play_secs) = args.play_secs {
        config.play_secs = play_secs;
    }

    log::info!(
        "Configuration: guests={}, tracks={}, play_secs={}",
        config.guests,
        config.playlist.len(),
        config.play_secs
    );

    let core_config = config.to_core_config();
    let store: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::with_operation_log_capacity(0));

    let host_credentials = StaticCredentials {
        cookies: Some("colisten-sim-host".to_string()),
        accounts: vec![StoredAccount {
            name: "Sim Host".to_string(),
            avatar_url: String::new(),
        }],
    };
    let host = Device {
        label: "host".to_string(),
        services: bootstrap_services(&core_config, Arc::clone(&store), &host_credentials)
            .context("Failed to bootstrap host")?,
    };

    let mut guests = Vec::with_capacity(config.guests);
    for i in 0..config.guests {
        let services =
            bootstrap_services(&core_config, Arc::clone(&store), &StaticCredentials::anonymous())
                .with_context(|| format!("Failed to bootstrap guest {}", i + 1))?;
        guests.push(Device {
            label: format!("guest-{}", i + 1),
            services,
        });
    }

    for device in std::iter::once(&host).chain(guests.iter()) {
        spawn_event_logger(device);
    }

    let outcome = tokio::select! {
        result = run_script(&config, &host, &guests) => result,
        _ = signal::ctrl_c() => {
            log::info!("Interrupted, cleaning up...");
            Ok(())
        }
    };

    for guest in &guests {
        guest.services.shutdown().await;
    }
    host.services.shutdown().await;

    log::info!("Shutdown complete");
    outcome
}

/// Logs every lifecycle event a device emits until it shuts down.
fn spawn_event_logger(device: &Device) {
    let label = device.label.clone();
    let mut events = device.services.event_bridge.subscribe();
    let cancel = device.services.cancel_token.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => log::info!("[{}] {:?}", label, event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[{}] Missed {} events", label, n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

async fn run_script(config: &SimConfig, host: &Device, guests: &[Device]) -> Result<()> {
    let tracks: Vec<Track> = config
        .playlist
        .iter()
        .enumerate()
        .map(|(i, title)| Track {
            id: format!("sim-{}", i + 1),
            title: title.clone(),
            artist: "Colisten Sim".to_string(),
            album: None,
            thumbnail_url: None,
            duration_ms: config.play_secs * 1000,
            source: TrackSource::Local,
        })
        .collect();

    let coordinator = &host.services.coordinator;
    let code = coordinator
        .create_session(None, false, 0)
        .await
        .context("Failed to create session")?;
    log::info!("Host {} created session {}", host.services.identity.user_id, code);
    wait_connected(host).await?;

    for guest in guests {
        guest
            .services
            .coordinator
            .join_session(&code)
            .await
            .with_context(|| format!("{} failed to join {}", guest.label, code))?;
        wait_connected(guest).await?;
    }

    for track in &tracks {
        play_track(config, host, guests, track).await?;
    }

    if let Some(session) = coordinator.current_session() {
        log::info!(
            "Finished playlist with {} users, position {} ms",
            session.users.len(),
            session.position
        );
    }
    Ok(())
}

/// Raises the barrier for `track`, lets every device load, then plays it.
async fn play_track(
    config: &SimConfig,
    host: &Device,
    guests: &[Device],
    track: &Track,
) -> Result<()> {
    let coordinator = &host.services.coordinator;
    let devices: Vec<&Device> = std::iter::once(host).chain(guests.iter()).collect();

    for device in &devices {
        device.services.coordinator.update_buffering_state(true).await;
    }
    log::info!("Host switching to '{}'", track.title);
    coordinator.update_player_state(Some(track), false, 0).await;

    for device in &devices {
        let delay = rand::thread_rng().gen_range(0..=config.max_buffer_ms);
        let label = device.label.clone();
        let device_coordinator = Arc::clone(&device.services.coordinator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            log::debug!("[{}] Loaded after {} ms", label, delay);
            device_coordinator.update_buffering_state(false).await;
        });
    }

    for device in &devices {
        let mut session = device.services.coordinator.session_state();
        let released = |s: &Option<Session>| {
            s.as_ref().is_some_and(|s| {
                !s.is_syncing && s.current_song.as_ref().is_some_and(|c| c.id == track.id)
            })
        };
        tokio::time::timeout(CONVERGENCE_TIMEOUT, session.wait_for(released))
            .await
            .with_context(|| format!("{} stuck at the barrier", device.label))?
            .context("Coordinator dropped")?;
    }
    log::info!("All {} devices ready, playing '{}'", devices.len(), track.title);

    let mut position = 0;
    coordinator.update_player_state(Some(track), true, position).await;

    let step = Duration::from_millis(config.position_update_ms);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + step, step);
    while position < track.duration_ms {
        ticker.tick().await;
        position = (position + config.position_update_ms).min(track.duration_ms);
        coordinator.update_player_state(Some(track), true, position).await;
    }
    Ok(())
}

async fn wait_connected(device: &Device) -> Result<()> {
    let mut state = device.services.coordinator.connection_state();
    let reached = tokio::time::timeout(
        CONVERGENCE_TIMEOUT,
        state.wait_for(|s| matches!(s, ConnectionState::Connected(_) | ConnectionState::Error(_))),
    )
    .await
    .with_context(|| format!("{} never connected", device.label))?
    .context("Coordinator dropped")?
    .clone();

    if let ConnectionState::Error(message) = reached {
        bail!("{} failed to connect: {}", device.label, message);
    }
    Ok(())
}
