//! Record types of the per-game state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::curve::{Fq, Point};
use crate::deck::{CardCiphertext, CompressedDeck};
use crate::keys::PlayerAddress;

/// Externally assigned, non-zero game identifier.
pub type GameId = u64;
/// Index of a player within a game's registration order.
pub type PlayerId = usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// No game under this id. Never stored; reported by guards.
    Uncreated,
    Created,
    Registration,
    Shuffle,
    Deal,
    Open,
    /// Terminal error state, entered only by external escalation.
    Faulted,
    Complete,
}

/// How decryption shares are dispatched during `Deal`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealPolicy {
    /// Any owing player may submit at any time; the per-card record bitmap
    /// is the only ordering constraint.
    #[default]
    Unordered,
    /// Shares must arrive in seat order; each accepted share advances the
    /// turn cursor.
    RoundRobin,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    pub deal_policy: DealPolicy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeat {
    pub address: PlayerAddress,
    pub public_key: Point,
}

/// One batch entry of a deal request: which cards go to which seat.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealAssignment {
    pub card_mask: u64,
    pub recipient: PlayerId,
}

/// Per-card dealing state: who receives it, whose shares have landed, and
/// the uncompressed working copy once the first share decompressed it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDealState {
    pub recipient: PlayerId,
    pub record: u64,
    pub card: Option<CardCiphertext>,
}

/// The deck update a shuffler submits alongside their proof. Selector words
/// arrive as raw field elements and are width-checked by the machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleSubmission {
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub x0: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub x1: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field")]
    pub selector0: Fq,
    #[serde(with = "crate::crypto_serde::field")]
    pub selector1: Fq,
}

/// One game's full record. Clients receive clones of this as read-only
/// snapshots; only the state machine mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub status: GameStatus,
    pub creator: PlayerAddress,
    pub num_players: usize,
    pub num_cards: usize,
    pub settings: GameSettings,
    pub players: Vec<PlayerSeat>,
    pub aggregated_pk: Option<Point>,
    pub turn: usize,
    pub deck: Option<CompressedDeck>,
    pub deals: BTreeMap<usize, CardDealState>,
}

impl Game {
    pub fn new(
        id: GameId,
        creator: PlayerAddress,
        num_players: usize,
        num_cards: usize,
    ) -> Self {
        Self {
            id,
            status: GameStatus::Created,
            creator,
            num_players,
            num_cards,
            settings: GameSettings::default(),
            players: Vec::with_capacity(num_players),
            aggregated_pk: None,
            turn: 0,
            deck: None,
            deals: BTreeMap::new(),
        }
    }

    /// Bitmask with one bit per registered seat.
    pub fn full_mask(&self) -> u64 {
        (1u64 << self.num_players) - 1
    }

    pub fn player_index_of(&self, address: &PlayerAddress) -> Option<PlayerId> {
        self.players.iter().position(|seat| seat.address == *address)
    }

    pub fn card_fully_decrypted(&self, card_index: usize) -> bool {
        self.deals
            .get(&card_index)
            .is_some_and(|deal| deal.record == self.full_mask())
    }

    pub fn all_requested_cards_decrypted(&self) -> bool {
        !self.deals.is_empty()
            && self
                .deals
                .values()
                .all(|deal| deal.record == self.full_mask())
    }
}
