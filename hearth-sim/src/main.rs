use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hearth_core::{Device, Notification};
use hearth_sim::{
    ChannelSink, Config, InMemoryDeviceRegistry, Services, Simulator, SimulatorEvent, SystemClock,
    TracingSink, api,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "hearth-sim")]
#[command(about = "Hearth telemetry simulator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hearth-sim.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,hearth_sim=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let fleet = config.fleet();
    info!(
        devices = fleet.len(),
        tick_interval_ms = config.simulator.tick_interval_ms,
        http_addr = %config.server.http_addr,
        "Starting hearth-sim"
    );

    let registry = Arc::new(
        fleet
            .iter()
            .map(|device| {
                let mut entry = Device::new(device.id.as_str(), device.kind);
                entry.on = device.on;
                entry
            })
            .collect::<InMemoryDeviceRegistry>(),
    );

    let (sink, notifications_rx) = ChannelSink::new(config.notifications.channel_capacity);
    let services = Services::from_config(
        &config,
        Arc::new(SystemClock),
        Arc::new(sink),
        Arc::new(TracingSink),
    );

    let simulator = Arc::new(Simulator::new(config.simulator.clone(), services, registry));
    simulator.register_all();

    let cancel = CancellationToken::new();

    let notifier_handle = tokio::spawn(run_notifier(notifications_rx, cancel.clone()));
    let events_handle = tokio::spawn(run_event_logger(simulator.subscribe(), cancel.clone()));

    simulator.start();

    let http_addr = config.server.http_addr;
    let app = api::router(simulator.clone());
    let listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    simulator.stop();
    cancel.cancel();

    let _ = notifier_handle.await;
    let _ = events_handle.await;

    info!("hearth-sim shut down complete");
    Ok(())
}

async fn run_notifier(mut rx: mpsc::Receiver<Notification>, cancel: CancellationToken) {
    info!("Notifier started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Notifier shutting down");
                break;
            }
            Some(notification) = rx.recv() => {
                info!(
                    id = notification.id,
                    priority = ?notification.priority,
                    title = %notification.title,
                    "{}",
                    notification.message
                );
            }
        }
    }
}

async fn run_event_logger(
    mut events: broadcast::Receiver<SimulatorEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(SimulatorEvent::StatusChanged { device_id, connected }) => {
                    info!(device_id = %device_id, connected, "Device status changed");
                }
                Ok(SimulatorEvent::DataUpdated { device_id, state }) => {
                    debug!(
                        device_id = %device_id,
                        temperature = state.temperature,
                        humidity = state.humidity,
                        power = state.power,
                        "Data updated"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagging behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
