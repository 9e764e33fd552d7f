//! Events emitted by accepted state-machine writes.

use serde::{Deserialize, Serialize};

use super::types::{GameId, GameStatus, PlayerId};
use crate::keys::PlayerAddress;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A player registered and was assigned a seat.
    Register {
        game_id: GameId,
        address: PlayerAddress,
        player_id: PlayerId,
    },
    /// A player is expected to act in the given state.
    PlayerTurn {
        game_id: GameId,
        player_index: PlayerId,
        status: GameStatus,
    },
    /// A shuffler replaced the deck.
    DeckUpdated {
        game_id: GameId,
        player_index: PlayerId,
    },
    /// A decryption share was accepted for a card.
    CardDealt {
        game_id: GameId,
        card_index: usize,
        player_index: PlayerId,
    },
}
