//! Parlor simulation binary.
//!
//! Runs a burst of concurrent sends through one room against a scripted,
//! lossy transport on virtual time, then echoes the accepted events back
//! through sync and reports the outcome. Runs with the same seed are
//! identical.
//!
//! # Usage
//!
//! ```bash
//! parlor-sim --seed 7 --sends 20 --failure-rate 0.3
//! RUST_LOG=parlor_client=debug parlor-sim
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use parlor_client::{Client, ClientConfig, ClientError, Room, Services};
use parlor_core::compose;
use parlor_harness::{MemoryPersistence, ScriptedTransport, SimEnv};
use parlor_proto::{RoomId, UserId};
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parlor room engine simulation
#[derive(Parser, Debug)]
#[command(name = "parlor-sim")]
#[command(about = "Deterministic send/retry simulation for the Parlor room engine")]
#[command(version)]
struct Args {
    /// Seed for the simulated environment
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of concurrent sends
    #[arg(long, default_value = "10")]
    sends: usize,

    /// Probability that a send attempt fails transiently
    #[arg(long, default_value = "0.25")]
    failure_rate: f64,

    /// Virtual latency of every transport call, in milliseconds
    #[arg(long, default_value = "40")]
    latency_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default)]
struct Tally {
    sent: usize,
    failed: usize,
    cancelled: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, sends = args.sends, "Parlor simulation starting");

    let env = SimEnv::with_seed(args.seed);
    let user = UserId::new("@sim:parlor.test");
    let room_id = RoomId::new("!sim:parlor.test");

    let transport = Arc::new(ScriptedTransport::new(env.clone(), user.clone()));
    transport.set_failure_rate(args.failure_rate);
    transport.set_latency(Duration::from_millis(args.latency_ms));
    let persistence = Arc::new(MemoryPersistence::new());

    let services = Services::new(Arc::clone(&transport)).with_persistence(persistence.clone());
    let client = Client::new(env.clone(), ClientConfig::new(user), services);
    let room = client.open_room(&room_id).await;

    let mut tasks = JoinSet::new();
    for index in 0..args.sends {
        let room = room.clone();
        let content = compose::text(format!("message {index}"));
        tasks.spawn(async move { room.send_message(content).await });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(event_id) => {
                tally.sent += 1;
                tracing::debug!(%event_id, "send settled");
            },
            Err(ClientError::SendCancelled { .. }) => tally.cancelled += 1,
            Err(e) => {
                tally.failed += 1;
                tracing::warn!("send failed: {e}");
            },
        }
    }

    room.sync(transport.sync_update(&room_id)).await?;

    let pending = room.with_room(Room::pending_sends).await;
    let last = room.last_event().await;
    tracing::info!(
        sent = tally.sent,
        failed = tally.failed,
        cancelled = tally.cancelled,
        attempts = transport.attempts(),
        delivered = transport.delivered().len(),
        pending,
        snapshots = persistence.store_count(),
        elapsed = ?env.elapsed(),
        "simulation finished"
    );
    if let Some(last) = last {
        tracing::info!(
            event_id = %last.event_id(),
            status = ?last.status(),
            ordering_key = %last.ordering_key(),
            "last event"
        );
    }

    Ok(())
}
