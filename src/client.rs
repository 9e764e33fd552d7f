//! Per-player orchestrator: watches the shared store and discharges every
//! obligation the protocol puts on its player: the shuffle turn, owed
//! decryption shares, and the final reveal of received cards.
//!
//! The loop is event-driven with a polling fallback and exponential
//! backoff on transport failures. It is parameterized by the store, the
//! prover and a clock, so tests can substitute all three.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ark_std::rand::rngs::StdRng;
use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::deck::CardDeltas;
use crate::game::{DealPolicy, Game, GameEvent, GameId, GameStatus, PlayerId, ProtocolError};
use crate::keys::{KeyPair, PlayerAddress};
use crate::proof::game_nonce;
use crate::store::{GameOperation, GameStore, StoreError};
use crate::witness::{
    build_shuffle_witness, prepare_decrypt_data, recover_card_index, sample_permutation,
    sample_randomness, DealWitness, Prover,
};

const LOG_TARGET: &str = "zk_shuffle::client";

/// Canonical polling fallback when no event arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Time source of the client loop.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Doubling backoff between a base and a cap, for transport retries.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

pub struct PlayerClient<S, P, C = TokioClock> {
    store: Arc<S>,
    prover: P,
    clock: C,
    game_id: GameId,
    keys: KeyPair,
    address: PlayerAddress,
    player_id: Option<PlayerId>,
    recovered: BTreeMap<usize, usize>,
    rng: StdRng,
    poll_interval: Duration,
}

impl<S, P> PlayerClient<S, P, TokioClock>
where
    S: GameStore,
    P: Prover,
{
    pub fn new(store: Arc<S>, prover: P, game_id: GameId, keys: KeyPair, rng: StdRng) -> Self {
        Self::with_clock(store, prover, TokioClock, game_id, keys, rng)
    }
}

impl<S, P, C> PlayerClient<S, P, C>
where
    S: GameStore,
    P: Prover,
    C: Clock,
{
    pub fn with_clock(
        store: Arc<S>,
        prover: P,
        clock: C,
        game_id: GameId,
        keys: KeyPair,
        rng: StdRng,
    ) -> Self {
        let address = keys.address();
        Self {
            store,
            prover,
            clock,
            game_id,
            keys,
            address,
            player_id: None,
            recovered: BTreeMap::new(),
            rng,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn address(&self) -> PlayerAddress {
        self.address
    }

    /// Cards recovered so far, keyed by deck slot.
    pub fn recovered_cards(&self) -> &BTreeMap<usize, usize> {
        &self.recovered
    }

    /// Submit this player's registration and learn the assigned seat.
    pub async fn register(&mut self) -> Result<PlayerId> {
        if let Some(player_id) = self.player_id {
            return Ok(player_id);
        }
        let events = self
            .store
            .submit(
                self.address,
                GameOperation::Register {
                    game_id: self.game_id,
                    public_key: self.keys.public,
                },
            )
            .await?;
        let player_id = events
            .iter()
            .find_map(|event| match event {
                GameEvent::Register {
                    address, player_id, ..
                } if *address == self.address => Some(*player_id),
                _ => None,
            })
            .context("accepted registration did not emit a Register event")?;
        info!(target: LOG_TARGET, game_id = self.game_id, player_id, "registered");
        self.player_id = Some(player_id);
        Ok(player_id)
    }

    /// Drive the game to completion. Returns the cards this player
    /// received, keyed by deck slot.
    pub async fn run_until_complete(&mut self) -> Result<BTreeMap<usize, usize>> {
        let mut events = self.store.subscribe();
        let mut backoff = Backoff::new(self.poll_interval, self.poll_interval * 8);

        loop {
            let snapshot = match self.store.snapshot(self.game_id).await {
                Ok(snapshot) => {
                    backoff.reset();
                    snapshot
                }
                Err(StoreError::Unavailable(reason)) => {
                    warn!(target: LOG_TARGET, %reason, "store unavailable, backing off");
                    self.clock.sleep(backoff.next_delay()).await;
                    continue;
                }
                Err(StoreError::Protocol(ProtocolError::InvalidState {
                    state: GameStatus::Uncreated,
                })) => {
                    // The orchestrator has not created the game yet.
                    self.clock.sleep(backoff.next_delay()).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(player_id) = snapshot.player_index_of(&self.address) {
                self.player_id = Some(player_id);
            }

            match snapshot.status {
                GameStatus::Registration if self.player_id.is_none() => {
                    self.register().await?;
                }
                GameStatus::Shuffle if self.player_id == Some(snapshot.turn) => {
                    self.take_shuffle_turn(&snapshot).await?;
                }
                GameStatus::Deal => {
                    self.submit_owed_shares(&snapshot).await?;
                    self.reveal_ready_cards(&snapshot).await?;
                }
                GameStatus::Complete => return Ok(self.recovered.clone()),
                GameStatus::Faulted => bail!("game {} faulted", self.game_id),
                _ => {}
            }

            tokio::select! {
                received = events.recv() => match received {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(target: LOG_TARGET, skipped, "event stream lagged, resyncing from snapshot");
                    }
                    Err(RecvError::Closed) => bail!("event stream closed"),
                },
                _ = self.clock.sleep(self.poll_interval) => {}
            }
        }
    }

    async fn take_shuffle_turn(&mut self, snapshot: &Game) -> Result<()> {
        let deck = snapshot
            .deck
            .as_ref()
            .context("shuffle state without a deck")?;
        let aggregated = snapshot
            .aggregated_pk
            .context("shuffle state without an aggregated key")?;
        let num_cards = deck.num_cards();
        let witness = build_shuffle_witness(
            game_nonce(self.game_id),
            deck,
            &sample_permutation(num_cards, &mut self.rng),
            &sample_randomness(num_cards, &mut self.rng),
            &aggregated,
        )?;
        let proof = self.prover.prove_shuffle(&witness)?;
        let operation = GameOperation::Shuffle {
            game_id: self.game_id,
            proof,
            deck: witness.submission(),
        };
        match self.store.submit(self.address, operation).await {
            Ok(_) => info!(target: LOG_TARGET, game_id = self.game_id, "shuffle turn taken"),
            Err(err) if is_stale_race(&err) => {
                debug!(target: LOG_TARGET, %err, "shuffle raced a newer write, resyncing");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Submit a decryption share for every requested card this player owes
    /// one on.
    async fn submit_owed_shares(&mut self, snapshot: &Game) -> Result<()> {
        let Some(me) = self.player_id else {
            return Ok(());
        };
        for (&card_index, deal_state) in &snapshot.deals {
            if deal_state.recipient == me || deal_state.record >> me & 1 == 1 {
                continue;
            }
            if snapshot.settings.deal_policy == DealPolicy::RoundRobin && snapshot.turn != me {
                continue;
            }
            let (card, init_deltas) = match deal_state.card {
                Some(card) => (card, None),
                None => {
                    let deck = snapshot.deck.as_ref().context("deal state without a deck")?;
                    (
                        prepare_decrypt_data(deck, card_index)?,
                        Some(deck.card_deltas(card_index)?),
                    )
                }
            };
            let witness = DealWitness::new(card, &self.keys);
            let proof = self.prover.prove_decrypt(&witness)?;
            let operation = GameOperation::Deal {
                game_id: self.game_id,
                card_index,
                player_index: me,
                proof,
                share: witness.share(),
                init_deltas,
            };
            match self.store.submit(self.address, operation).await {
                Ok(_) => {
                    debug!(target: LOG_TARGET, card_index, "share submitted");
                }
                Err(err) if is_stale_race(&err) => {
                    debug!(target: LOG_TARGET, card_index, %err, "share raced a newer write");
                }
                Err(StoreError::Protocol(ProtocolError::ProofFailed)) => {
                    // The card mutated between snapshot and submission
                    // (another share landed first); rebuild next wake.
                    warn!(target: LOG_TARGET, card_index, "share went stale, rebuilding");
                }
                Err(err) => return Err(err.into()),
            }
            if snapshot.settings.deal_policy == DealPolicy::RoundRobin {
                // The turn cursor moved; resync before the next card.
                break;
            }
        }
        Ok(())
    }

    /// For every owned card whose quorum has landed, recover the plaintext
    /// locally and reveal it with the final share.
    async fn reveal_ready_cards(&mut self, snapshot: &Game) -> Result<()> {
        let Some(me) = self.player_id else {
            return Ok(());
        };
        let others = snapshot.full_mask() & !(1 << me);
        for (&card_index, deal_state) in &snapshot.deals {
            if deal_state.recipient != me
                || deal_state.record >> me & 1 == 1
                || deal_state.record & others != others
            {
                continue;
            }
            let card = deal_state
                .card
                .context("card with a full quorum is still compressed")?;
            let value = recover_card_index(&card, self.keys.secret.expose(), snapshot.num_cards)
                .context("decrypted point does not match any card")?;
            self.recovered.insert(card_index, value);

            let witness = DealWitness::new(card, &self.keys);
            let proof = self.prover.prove_decrypt(&witness)?;
            let init_deltas: Option<CardDeltas> = None;
            let operation = GameOperation::Open {
                game_id: self.game_id,
                card_mask: 1 << card_index,
                proofs: vec![proof],
                shares: vec![witness.share()],
                init_deltas: vec![init_deltas],
            };
            match self.store.submit(self.address, operation).await {
                Ok(_) => {
                    info!(target: LOG_TARGET, card_index, value, "card recovered and revealed");
                }
                Err(err) if is_stale_race(&err) => {
                    debug!(target: LOG_TARGET, card_index, %err, "reveal raced a newer write");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Rejections that mean the snapshot went stale under us, not that the
/// submission was wrong. The loop resyncs and moves on.
fn is_stale_race(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Protocol(
            ProtocolError::NotYourTurn
                | ProtocolError::DoubleDeal
                | ProtocolError::InvalidState { .. }
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(40));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(40));
        assert_eq!(backoff.next_delay(), Duration::from_secs(40));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
