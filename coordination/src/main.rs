//! Local session simulator
//!
//! Drives a full coordination cycle against the in-memory store: a table of
//! participants votes into a two-camp split, reveals twice, and the second
//! deadlock drafts a devil's advocate whose round then expires and resets
//! the table. Useful for eyeballing the protocol without a deployed store.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use coordination::{
    Card, ClockSync, CoordinationConfig, MemoryRowStore, Participant, SessionClient, StoreEvent,
};

#[derive(Parser)]
#[command(name = "poker-sim", about = "Simulate a planning-poker session end to end")]
struct Args {
    /// Number of simulated participants (at least 2).
    #[arg(long, default_value_t = 4)]
    participants: usize,

    /// Arbitration round length in seconds; short by default so the
    /// simulation finishes quickly.
    #[arg(long, default_value_t = 2)]
    advocate_secs: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    coordination::telemetry::init_tracing();
    let args = Args::parse();
    let participants = args.participants.max(2);

    let config = CoordinationConfig {
        advocate_duration_secs: args.advocate_secs,
        ..CoordinationConfig::from_env()
    };
    let store = MemoryRowStore::new().shared();
    let clock = ClockSync::new(config.clock_resync);

    let session_id = SessionClient::create_session(&store, &clock).await?;
    info!(session_id = %session_id, "Simulated session ready");

    // One client per participant, all joined to the same session. The
    // facilitator (client 0) subscribes before anyone joins so its roster
    // sees every presence sync.
    let mut clients = Vec::new();
    for _ in 0..participants {
        let mut client =
            SessionClient::new(store.clone(), clock.clone(), config.clone(), &session_id);
        client.load().await?;
        clients.push(client);
    }
    let mut feed = clients[0].subscribe();
    for (i, client) in clients.iter_mut().enumerate() {
        client
            .join(Participant::new(
                format!("sim-{i}"),
                format!("Player {}", i + 1),
                "🎲",
            ))
            .await?;
    }
    drain(&mut clients[0], &mut feed).await?;

    info!("Voting in a two-camp split");
    for (i, client) in clients.iter_mut().enumerate() {
        let card = if i % 2 == 0 { Card::One } else { Card::Thirteen };
        client.cast_vote(card).await?;
    }
    drain(&mut clients[0], &mut feed).await?;

    for reveal in 1..=2 {
        clients[0].reveal().await?;
        drain(&mut clients[0], &mut feed).await?;

        let record = clients[0].record().expect("record cached after reveal");
        info!(
            reveal,
            average = %clients[0].average(),
            deadlock_count = record.deadlock_count,
            arbitration = record.advocate_active(),
            "Cards revealed"
        );

        if record.advocate_active() {
            let advocate = record.devils_advocate.clone().expect("advocate set");
            info!(
                advocate = %advocate.name,
                side = %advocate.side,
                value = %advocate.value,
                "Deadlock broken by the devil's advocate, waiting for the round to expire"
            );
        } else {
            // Hide the cards and argue; the split stays, so the next
            // reveal is the second consecutive deadlock.
            clients[0].reveal().await?;
            drain(&mut clients[0], &mut feed).await?;
        }
    }

    // Let the countdown task end the arbitration round.
    tokio::time::sleep(std::time::Duration::from_secs(u64::from(args.advocate_secs) + 1)).await;
    drain(&mut clients[0], &mut feed).await?;

    let record = clients[0].record().expect("record cached");
    info!(
        revealed = record.revealed,
        deadlock_count = record.deadlock_count,
        arbitration = record.advocate_active(),
        votes = clients[0].votes().len(),
        "Arbitration complete, table reset"
    );

    for client in &mut clients {
        client.leave().await?;
    }
    Ok(())
}

/// Apply every pending change notification to the client.
async fn drain(
    client: &mut SessionClient,
    feed: &mut tokio::sync::broadcast::Receiver<StoreEvent>,
) -> Result<()> {
    loop {
        match feed.try_recv() {
            Ok(event) => client.handle_event(event).await?,
            Err(tokio::sync::broadcast::error::TryRecvError::Empty) => return Ok(()),
            Err(tokio::sync::broadcast::error::TryRecvError::Closed) => return Ok(()),
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
        }
    }
}
