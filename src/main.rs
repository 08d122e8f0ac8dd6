//! Location relay utility

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use location_relay::{
    client::LocationClient,
    config::AppConfig,
    errors::AppError,
    geolocation::{FixedPosition, Geolocator, NoGeolocation},
    models::{Coordinates, RoomCode},
    receiver::{Receiver, ReceiverStatus},
    sender::{Sender, SenderStatus},
    server,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Share a location under a room code")]
struct Cli {
    /// Configuration file, instead of config/default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve,
    /// Publish a position and keep refreshing it
    Send {
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true, requires = "longitude")]
        latitude: Option<f64>,
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true, requires = "latitude")]
        longitude: Option<f64>,
        /// Room code to publish under; generated when omitted
        #[arg(long)]
        room_code: Option<String>,
    },
    /// Follow the position published under a room code
    Receive {
        room_code: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    #[cfg(feature = "dotenv")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => server::run(&config).await,
        Command::Send {
            latitude,
            longitude,
            room_code,
        } => {
            let position = latitude.zip(longitude).map(|(lat, lon)| Coordinates::new(lat, lon));
            run_sender(&config, position, room_code).await
        }
        Command::Receive { room_code } => run_receiver(&config, &room_code).await,
    }
}

async fn run_sender(
    config: &AppConfig,
    position: Option<Coordinates>,
    room_code: Option<String>,
) -> Result<(), AppError> {
    config.client.validate()?;
    let api = Arc::new(LocationClient::new(&config.client)?);
    let mut sender = Sender::new(api, config.sender.update_interval);

    let geolocator: Box<dyn Geolocator> = match position {
        Some(position) => Box::new(FixedPosition(position)),
        None => Box::new(NoGeolocation),
    };
    sender.locate(geolocator.as_ref()).await?;

    match room_code {
        Some(code) => sender.set_room_code(RoomCode::try_from(code)?),
        None => {
            sender.generate_room_code();
        }
    }
    if let Some(code) = sender.room_code() {
        println!("Room code: {code}");
    }

    let mut status = sender.subscribe();
    sender.send().await?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                sender.stop().await;
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = status.borrow_and_update().clone();
                match current {
                    SenderStatus::PollingUpdates { updates } => info!("Updates sent: {}", updates),
                    SenderStatus::Failed(message) => {
                        sender.finished().await;
                        return Err(AppError::LoopStopped(message));
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn run_receiver(config: &AppConfig, room_code: &str) -> Result<(), AppError> {
    config.client.validate()?;
    let api = Arc::new(LocationClient::new(&config.client)?);
    let mut receiver = Receiver::new(api, config.receiver.poll_interval);

    // The first change carries the initial reading
    let mut snapshots = receiver.subscribe();
    receiver.submit(room_code).await?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                receiver.clear().await;
                return Ok(());
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let ReceiverStatus::Stopped(message) = snapshot.status {
                    receiver.finished().await;
                    return Err(AppError::LoopStopped(message));
                }
                if let Some(reading) = snapshot.reading {
                    println!(
                        "{} {} at {}",
                        reading.latitude,
                        reading.longitude,
                        reading.timestamp.to_rfc3339()
                    );
                }
            }
        }
    }
}
