//! The authoritative state machine. One instance owns every game record;
//! each operation is a finite, atomic computation
//! `(current state, operation) → new state + events | error`, with no
//! partial writes on any rejection path.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::error::ProtocolError;
use super::events::GameEvent;
use super::types::{
    CardDealState, DealAssignment, DealPolicy, Game, GameId, GameSettings, GameStatus, PlayerId,
    PlayerSeat, ShuffleSubmission,
};
use crate::curve::Point;
use crate::deck::{self, CardCiphertext, CardDeltas, CompressedDeck, Selectors, INVALID_CARD_INDEX};
use crate::keys::{aggregate_public_keys, PlayerAddress};
use crate::proof::{
    game_nonce, CircuitId, DecryptPublicSignals, PackedProof, ProofVerifier, ShufflePublicSignals,
};

const LOG_TARGET: &str = "zk_shuffle::game";

/// Upper bound on seats; the per-card record bitmaps are 64-bit words.
pub const MAX_PLAYERS: usize = 32;

pub struct GameManager<V> {
    verifier: V,
    games: HashMap<GameId, Game>,
}

impl<V: ProofVerifier> GameManager<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            games: HashMap::new(),
        }
    }

    fn game(&self, game_id: GameId) -> Result<&Game, ProtocolError> {
        self.games.get(&game_id).ok_or(ProtocolError::InvalidState {
            state: GameStatus::Uncreated,
        })
    }

    fn game_mut(&mut self, game_id: GameId) -> Result<&mut Game, ProtocolError> {
        self.games
            .get_mut(&game_id)
            .ok_or(ProtocolError::InvalidState {
                state: GameStatus::Uncreated,
            })
    }

    #[tracing::instrument(target = LOG_TARGET, skip(self))]
    pub fn create_game(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        num_players: usize,
        num_cards: usize,
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        if game_id == 0 {
            return Err(ProtocolError::Malformed("game id must be non-zero"));
        }
        if !(2..=MAX_PLAYERS).contains(&num_players) {
            return Err(ProtocolError::Malformed("player count out of range"));
        }
        if !(1..=deck::MAX_CARDS).contains(&num_cards) {
            return Err(ProtocolError::Malformed("deck size out of range"));
        }
        if let Some(existing) = self.games.get(&game_id) {
            return Err(ProtocolError::InvalidState {
                state: existing.status,
            });
        }
        self.games
            .insert(game_id, Game::new(game_id, caller, num_players, num_cards));
        debug!(target: LOG_TARGET, game_id, num_players, num_cards, "game created");
        Ok(Vec::new())
    }

    pub fn set_game_settings(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        settings: GameSettings,
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game_mut(game_id)?;
        if game.status != GameStatus::Created {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if caller != game.creator {
            return Err(ProtocolError::NotYourTurn);
        }
        game.settings = settings;
        game.status = GameStatus::Registration;
        Ok(Vec::new())
    }

    /// Seat a player. The N-th registration finalizes the aggregated key,
    /// materializes the initial deck and opens the shuffle phase.
    #[tracing::instrument(target = LOG_TARGET, skip(self, public_key))]
    pub fn register(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        public_key: Point,
    ) -> Result<(PlayerId, Vec<GameEvent>), ProtocolError> {
        let game = self.game_mut(game_id)?;
        if game.status != GameStatus::Registration {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if !public_key.is_on_curve() {
            return Err(ProtocolError::InvalidPublicKey);
        }
        if game.player_index_of(&caller).is_some() {
            return Err(ProtocolError::Malformed("address already registered"));
        }

        let player_id = game.players.len();
        game.players.push(PlayerSeat {
            address: caller,
            public_key,
        });
        let mut events = vec![GameEvent::Register {
            game_id,
            address: caller,
            player_id,
        }];

        if game.players.len() == game.num_players {
            let publics: Vec<Point> = game.players.iter().map(|seat| seat.public_key).collect();
            let aggregated = aggregate_public_keys(&publics)
                .map_err(|_| ProtocolError::InvalidPublicKey)?;
            game.aggregated_pk = Some(aggregated);
            game.deck = Some(deck::initial_deck(game.num_cards));
            game.status = GameStatus::Shuffle;
            game.turn = 0;
            events.push(GameEvent::PlayerTurn {
                game_id,
                player_index: 0,
                status: GameStatus::Shuffle,
            });
            debug!(target: LOG_TARGET, game_id, "registration complete, shuffling begins");
        }
        Ok((player_id, events))
    }

    pub fn aggregated_pk(&self, game_id: GameId) -> Result<Point, ProtocolError> {
        let game = self.game(game_id)?;
        game.aggregated_pk
            .ok_or(ProtocolError::InvalidState { state: game.status })
    }

    pub fn deck(&self, game_id: GameId) -> Result<&CompressedDeck, ProtocolError> {
        let game = self.game(game_id)?;
        game.deck
            .as_ref()
            .ok_or(ProtocolError::InvalidState { state: game.status })
    }

    pub fn snapshot(&self, game_id: GameId) -> Result<Game, ProtocolError> {
        self.game(game_id).cloned()
    }

    /// Apply one shuffle turn: verify the proof against the stored deck and
    /// the submitted one, then swap the deck in and advance the turn.
    #[tracing::instrument(target = LOG_TARGET, skip(self, proof, submission))]
    pub fn shuffle(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        proof: &PackedProof,
        submission: ShuffleSubmission,
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game_mut(game_id)?;
        if game.status != GameStatus::Shuffle {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        let shuffler = game.turn;
        if game
            .players
            .get(shuffler)
            .map(|seat| seat.address)
            != Some(caller)
        {
            return Err(ProtocolError::NotYourTurn);
        }

        let num_cards = game.num_cards;
        if submission.x0.len() != num_cards || submission.x1.len() != num_cards {
            return Err(ProtocolError::Malformed("deck update has the wrong length"));
        }
        let selectors = Selectors::from_field(submission.selector0, submission.selector1, num_cards)?;
        let aggregated = game
            .aggregated_pk
            .ok_or(ProtocolError::InvalidState { state: game.status })?;
        let current = game
            .deck
            .as_ref()
            .ok_or(ProtocolError::InvalidState { state: game.status })?;

        let signals = ShufflePublicSignals {
            nonce: game_nonce(game_id),
            aggregated_pk: aggregated,
            input_x0: current.x0.clone(),
            input_x1: current.x1.clone(),
            output_x0: submission.x0.clone(),
            output_x1: submission.x1.clone(),
            input_selectors: current.selectors,
            output_selectors: selectors,
        };
        if !self
            .verifier
            .verify(CircuitId::Shuffle, proof, &signals.to_vec())
        {
            warn!(target: LOG_TARGET, game_id, shuffler, "shuffle proof rejected");
            return Err(ProtocolError::ProofFailed);
        }

        let game = self.game_mut(game_id)?;
        game.deck = Some(CompressedDeck {
            x0: submission.x0,
            x1: submission.x1,
            selectors,
        });
        game.turn += 1;
        let mut events = vec![GameEvent::DeckUpdated {
            game_id,
            player_index: shuffler,
        }];
        if game.turn == game.num_players {
            game.status = GameStatus::Deal;
            game.turn = 0;
            events.push(GameEvent::PlayerTurn {
                game_id,
                player_index: 0,
                status: GameStatus::Deal,
            });
        } else {
            events.push(GameEvent::PlayerTurn {
                game_id,
                player_index: game.turn,
                status: GameStatus::Shuffle,
            });
        }
        Ok(events)
    }

    /// Mark cards for dealing. Creator-only; the whole batch is validated
    /// and applied atomically, so the phase cannot close between two
    /// assignments of the same round.
    #[tracing::instrument(target = LOG_TARGET, skip(self, assignments))]
    pub fn request_deal(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        assignments: &[DealAssignment],
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game_mut(game_id)?;
        if game.status != GameStatus::Deal {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if caller != game.creator {
            return Err(ProtocolError::NotYourTurn);
        }
        if assignments.is_empty() {
            return Err(ProtocolError::Malformed("empty deal request"));
        }
        let mut requested = 0u64;
        for assignment in assignments {
            if assignment.recipient >= game.num_players {
                return Err(ProtocolError::Malformed("recipient index out of range"));
            }
            if assignment.card_mask == 0 || assignment.card_mask >> game.num_cards != 0 {
                return Err(ProtocolError::Malformed("card mask out of range"));
            }
            if requested & assignment.card_mask != 0 {
                return Err(ProtocolError::Malformed("card assigned twice in one request"));
            }
            requested |= assignment.card_mask;
        }
        if mask_indices(requested)
            .iter()
            .any(|index| game.deals.contains_key(index))
        {
            return Err(ProtocolError::Malformed("card already requested"));
        }

        let mut events = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            for index in mask_indices(assignment.card_mask) {
                game.deals.insert(
                    index,
                    CardDealState {
                        recipient: assignment.recipient,
                        record: 0,
                        card: None,
                    },
                );
            }
            events.push(GameEvent::PlayerTurn {
                game_id,
                player_index: assignment.recipient,
                status: GameStatus::Deal,
            });
        }
        Ok(events)
    }

    /// Accept one non-recipient decryption share for a card.
    #[tracing::instrument(target = LOG_TARGET, skip(self, proof, share, init_deltas))]
    #[allow(clippy::too_many_arguments)]
    pub fn deal(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        card_index: usize,
        player_index: PlayerId,
        proof: &PackedProof,
        share: Point,
        init_deltas: Option<CardDeltas>,
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game(game_id)?;
        if game.status != GameStatus::Deal {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if game
            .players
            .get(player_index)
            .map(|seat| seat.address)
            != Some(caller)
        {
            return Err(ProtocolError::NotYourTurn);
        }
        let deal_state = game
            .deals
            .get(&card_index)
            .ok_or(ProtocolError::Malformed("card has no pending deal request"))?;
        if deal_state.recipient == player_index {
            // Recipients finish their own cards through `open`.
            return Err(ProtocolError::NotYourTurn);
        }
        if game.settings.deal_policy == DealPolicy::RoundRobin && player_index != game.turn {
            return Err(ProtocolError::NotYourTurn);
        }

        let updated = self.staged_share(game, card_index, player_index, proof, share, init_deltas.as_ref())?;

        let game = self.game_mut(game_id)?;
        let deal_state = game
            .deals
            .get_mut(&card_index)
            .ok_or(ProtocolError::Malformed("card has no pending deal request"))?;
        deal_state.card = Some(updated);
        deal_state.record |= 1 << player_index;
        if game.settings.deal_policy == DealPolicy::RoundRobin {
            game.turn = (game.turn + 1) % game.num_players;
        }
        debug!(target: LOG_TARGET, game_id, card_index, player_index, "share accepted");
        Ok(vec![GameEvent::CardDealt {
            game_id,
            card_index,
            player_index,
        }])
    }

    /// Recipient-side reveal: submit the final share(s) for owned cards,
    /// making them publicly searchable. Verification of every entry happens
    /// before any card is touched, so the whole call is atomic.
    #[tracing::instrument(target = LOG_TARGET, skip_all, fields(game_id, card_mask))]
    pub fn open(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        card_mask: u64,
        proofs: &[PackedProof],
        shares: &[Point],
        init_deltas: &[Option<CardDeltas>],
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game(game_id)?;
        if game.status != GameStatus::Deal && game.status != GameStatus::Open {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        let caller_index = game
            .player_index_of(&caller)
            .ok_or(ProtocolError::NotYourTurn)?;
        if card_mask == 0 || card_mask >> game.num_cards != 0 {
            return Err(ProtocolError::Malformed("card mask out of range"));
        }
        let cards = mask_indices(card_mask);
        if proofs.len() != cards.len()
            || shares.len() != cards.len()
            || init_deltas.len() != cards.len()
        {
            return Err(ProtocolError::Malformed(
                "proofs, shares and deltas must match the card mask",
            ));
        }

        let mut staged = Vec::with_capacity(cards.len());
        for (entry, &card_index) in cards.iter().enumerate() {
            let deal_state = game
                .deals
                .get(&card_index)
                .ok_or(ProtocolError::Malformed("card has no pending deal request"))?;
            if deal_state.recipient != caller_index {
                return Err(ProtocolError::NotYourTurn);
            }
            let updated = self.staged_share(
                game,
                card_index,
                caller_index,
                &proofs[entry],
                shares[entry],
                init_deltas[entry].as_ref(),
            )?;
            staged.push((card_index, updated));
        }

        let game = self.game_mut(game_id)?;
        let mut events = Vec::with_capacity(staged.len() + 1);
        for (card_index, updated) in staged {
            let deal_state = game
                .deals
                .get_mut(&card_index)
                .ok_or(ProtocolError::Malformed("card has no pending deal request"))?;
            deal_state.card = Some(updated);
            deal_state.record |= 1 << caller_index;
            events.push(GameEvent::CardDealt {
                game_id,
                card_index,
                player_index: caller_index,
            });
        }
        if game.settings.deal_policy == DealPolicy::RoundRobin && game.turn == caller_index {
            game.turn = (game.turn + 1) % game.num_players;
        }
        if game.status == GameStatus::Deal && game.all_requested_cards_decrypted() {
            game.status = GameStatus::Open;
            events.push(GameEvent::PlayerTurn {
                game_id,
                player_index: caller_index,
                status: GameStatus::Open,
            });
            debug!(target: LOG_TARGET, game_id, "all requested cards decrypted");
        }
        Ok(events)
    }

    /// Resolve a fully decrypted card against the initial-deck table.
    pub fn search(&self, game_id: GameId, card_index: usize) -> Result<usize, ProtocolError> {
        let game = self.game(game_id)?;
        let deal_state = game
            .deals
            .get(&card_index)
            .ok_or(ProtocolError::CardNotFullyDecrypted)?;
        if deal_state.record != game.full_mask() {
            return Err(ProtocolError::CardNotFullyDecrypted);
        }
        let card = deal_state
            .card
            .ok_or(ProtocolError::CardNotFullyDecrypted)?;
        Ok(deck::find_card(&card.c1, game.num_cards).unwrap_or(INVALID_CARD_INDEX))
    }

    /// External close of a finished game.
    pub fn close(&mut self, caller: PlayerAddress, game_id: GameId) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game_mut(game_id)?;
        if game.status != GameStatus::Open {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if caller != game.creator {
            return Err(ProtocolError::NotYourTurn);
        }
        game.status = GameStatus::Complete;
        Ok(Vec::new())
    }

    /// External escalation (timeout policy, misbehavior) into the terminal
    /// error state.
    pub fn fault(
        &mut self,
        caller: PlayerAddress,
        game_id: GameId,
        reason: &str,
    ) -> Result<Vec<GameEvent>, ProtocolError> {
        let game = self.game_mut(game_id)?;
        if matches!(game.status, GameStatus::Complete | GameStatus::Faulted) {
            return Err(ProtocolError::InvalidState { state: game.status });
        }
        if caller != game.creator {
            return Err(ProtocolError::NotYourTurn);
        }
        warn!(target: LOG_TARGET, game_id, reason, "game faulted");
        game.status = GameStatus::Faulted;
        Ok(Vec::new())
    }

    /// Validate and verify one share without touching any state. Returns
    /// the card with the share applied; the caller commits it.
    fn staged_share(
        &self,
        game: &Game,
        card_index: usize,
        player_index: PlayerId,
        proof: &PackedProof,
        share: Point,
        init_deltas: Option<&CardDeltas>,
    ) -> Result<CardCiphertext, ProtocolError> {
        let deal_state = game
            .deals
            .get(&card_index)
            .ok_or(ProtocolError::Malformed("card has no pending deal request"))?;
        if deal_state.record & (1 << player_index) != 0 {
            return Err(ProtocolError::DoubleDeal);
        }
        let card = match deal_state.card {
            Some(card) => card,
            None => {
                let deltas = init_deltas.ok_or(ProtocolError::Malformed(
                    "first share for a card must carry its deltas",
                ))?;
                let deck = game
                    .deck
                    .as_ref()
                    .ok_or(ProtocolError::InvalidState { state: game.status })?;
                deck.decompress_card(card_index, deltas)?
            }
        };
        if !share.is_on_curve() {
            return Err(ProtocolError::ProofFailed);
        }
        let signals = DecryptPublicSignals {
            share,
            card,
            player_pk: game.players[player_index].public_key,
        };
        if !self
            .verifier
            .verify(CircuitId::Decrypt, proof, &signals.to_vec())
        {
            return Err(ProtocolError::ProofFailed);
        }
        Ok(card.apply_share(&share))
    }
}

fn mask_indices(mask: u64) -> Vec<usize> {
    (0..u64::BITS as usize)
        .filter(|index| mask >> index & 1 == 1)
        .collect()
}
