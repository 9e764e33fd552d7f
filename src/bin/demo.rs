//! Runs a complete shuffle-and-deal game end to end with the deterministic
//! mock proof system: registration, every shuffle turn, dealing, local
//! recovery and reveal, then prints a JSON summary of each seat's hand.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Result};
use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zk_shuffle::game::DealAssignment;
use zk_shuffle::keys::draw_keypair;
use zk_shuffle::store::{GameOperation, GameStore, InMemoryGameStore};
use zk_shuffle::test_support::{MockProver, MockVerifier};
use zk_shuffle::{GameId, GameSettings, GameStatus, PlayerAddress, PlayerClient};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Run a complete mock-proved shuffle-and-deal game")]
struct Args {
    /// Number of players at the table.
    #[arg(long, default_value_t = 2)]
    players: usize,

    /// Deck size.
    #[arg(long, default_value_t = 52)]
    cards: usize,

    /// How many cards to deal, round-robin across seats.
    #[arg(long, default_value_t = 5)]
    deal: usize,

    #[arg(long, default_value_t = 7)]
    game_id: GameId,

    /// Seed for key generation and shuffling.
    #[arg(long, default_value_t = 42, env = "ZK_SHUFFLE_DEMO_SEED")]
    seed: u64,
}

#[derive(Serialize)]
struct Summary {
    game_id: GameId,
    num_cards: usize,
    hands: Vec<HandSummary>,
}

#[derive(Serialize)]
struct HandSummary {
    seat: usize,
    /// Deck slot → recovered card index.
    cards: BTreeMap<usize, usize>,
}

async fn wait_for_status(
    store: &InMemoryGameStore<MockVerifier>,
    game_id: GameId,
    status: GameStatus,
) -> Result<()> {
    for _ in 0..600 {
        if store.snapshot(game_id).await.ok().map(|game| game.status) == Some(status) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("timed out waiting for {status:?}");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    ensure!(args.deal >= 1, "must deal at least one card");
    ensure!(args.deal <= args.cards, "cannot deal more cards than the deck holds");

    let store = Arc::new(InMemoryGameStore::new(MockVerifier));
    let dealer = PlayerAddress([0xD0; 20]);
    store
        .submit(
            dealer,
            GameOperation::CreateGame {
                game_id: args.game_id,
                num_players: args.players,
                num_cards: args.cards,
            },
        )
        .await?;
    store
        .submit(
            dealer,
            GameOperation::SetGameSettings {
                game_id: args.game_id,
                settings: GameSettings::default(),
            },
        )
        .await?;

    let mut handles = Vec::new();
    let mut addresses = Vec::new();
    for player in 0..args.players {
        let store = Arc::clone(&store);
        let game_id = args.game_id;
        let keys = draw_keypair(&mut StdRng::seed_from_u64(args.seed + player as u64));
        let rng = StdRng::seed_from_u64(args.seed ^ ((player as u64) << 32));
        addresses.push(keys.address());
        handles.push(tokio::spawn(async move {
            let mut client = PlayerClient::new(store, MockProver, game_id, keys, rng)
                .with_poll_interval(Duration::from_millis(200));
            client.run_until_complete().await
        }));
    }

    wait_for_status(&store, args.game_id, GameStatus::Deal).await?;
    info!(game_id = args.game_id, "shuffling done, assigning cards");

    let assignments: Vec<DealAssignment> = (0..args.players)
        .filter_map(|seat| {
            let card_mask = (0..args.deal)
                .filter(|card| card % args.players == seat)
                .fold(0u64, |mask, card| mask | 1 << card);
            (card_mask != 0).then_some(DealAssignment {
                card_mask,
                recipient: seat,
            })
        })
        .collect();
    store
        .submit(
            dealer,
            GameOperation::RequestDeal {
                game_id: args.game_id,
                assignments,
            },
        )
        .await?;

    wait_for_status(&store, args.game_id, GameStatus::Open).await?;
    store
        .submit(dealer, GameOperation::Close { game_id: args.game_id })
        .await?;

    // Seats were assigned in registration order, which depends on
    // scheduling; resolve each client's seat through its address.
    let snapshot = store.snapshot(args.game_id).await?;
    let mut hands = Vec::new();
    for (player, handle) in handles.into_iter().enumerate() {
        let cards = handle.await??;
        let seat = snapshot
            .player_index_of(&addresses[player])
            .expect("every client registered");
        hands.push(HandSummary { seat, cards });
    }
    hands.sort_by_key(|hand| hand.seat);
    let summary = Summary {
        game_id: args.game_id,
        num_cards: args.cards,
        hands,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
