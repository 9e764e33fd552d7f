//! The shared-store boundary between clients and the state machine.
//!
//! Clients never hold the machine; they read snapshots, submit
//! authenticated operations, and watch the event stream. Writes to one
//! game are serialized by the store, which is what gives the protocol its
//! total per-game order.

pub mod in_memory;

pub use in_memory::InMemoryGameStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::curve::Point;
use crate::deck::CardDeltas;
use crate::game::{
    DealAssignment, Game, GameEvent, GameId, GameSettings, PlayerId, ProtocolError,
    ShuffleSubmission,
};
use crate::keys::PlayerAddress;
use crate::proof::PackedProof;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The state machine rejected the write; retrying the same submission
    /// will fail the same way.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Transport-level failure; clients retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Every write the state machine accepts, as a serializable envelope. The
/// submitting address travels alongside, authenticated by the transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GameOperation {
    CreateGame {
        game_id: GameId,
        num_players: usize,
        num_cards: usize,
    },
    SetGameSettings {
        game_id: GameId,
        settings: GameSettings,
    },
    Register {
        game_id: GameId,
        public_key: Point,
    },
    Shuffle {
        game_id: GameId,
        proof: PackedProof,
        deck: ShuffleSubmission,
    },
    RequestDeal {
        game_id: GameId,
        assignments: Vec<DealAssignment>,
    },
    Deal {
        game_id: GameId,
        card_index: usize,
        player_index: PlayerId,
        proof: PackedProof,
        share: Point,
        init_deltas: Option<CardDeltas>,
    },
    Open {
        game_id: GameId,
        card_mask: u64,
        proofs: Vec<PackedProof>,
        shares: Vec<Point>,
        init_deltas: Vec<Option<CardDeltas>>,
    },
    Close {
        game_id: GameId,
    },
    Fault {
        game_id: GameId,
        reason: String,
    },
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Submit an authenticated write. Returns the events the accepted write
    /// emitted; the same events also reach every subscriber.
    async fn submit(
        &self,
        caller: PlayerAddress,
        operation: GameOperation,
    ) -> Result<Vec<GameEvent>, StoreError>;

    /// Read-only view of one game.
    async fn snapshot(&self, game_id: GameId) -> Result<Game, StoreError>;

    /// Subscribe to the event stream. Slow consumers may observe lag; they
    /// recover by re-reading the snapshot.
    fn subscribe(&self) -> broadcast::Receiver<GameEvent>;
}
