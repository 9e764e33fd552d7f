//! In-process store: the pure state machine behind a mutex, with events
//! fanned out over a broadcast channel. Stands in for the on-chain store
//! in tests, demos and single-host deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::{GameOperation, GameStore, StoreError};
use crate::game::{Game, GameEvent, GameId, GameManager};
use crate::keys::PlayerAddress;
use crate::proof::ProofVerifier;

const LOG_TARGET: &str = "zk_shuffle::store";

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct InMemoryGameStore<V> {
    manager: Mutex<GameManager<V>>,
    events: broadcast::Sender<GameEvent>,
}

impl<V: ProofVerifier> InMemoryGameStore<V> {
    pub fn new(verifier: V) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            manager: Mutex::new(GameManager::new(verifier)),
            events,
        }
    }

    /// The event stream as a `Stream`, for consumers that prefer it over a
    /// raw receiver.
    pub fn event_stream(&self) -> BroadcastStream<GameEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    fn publish(&self, events: &[GameEvent]) {
        for event in events {
            // Send only fails when nobody subscribes, which is fine.
            let _ = self.events.send(event.clone());
        }
    }
}

#[async_trait]
impl<V> GameStore for InMemoryGameStore<V>
where
    V: ProofVerifier + Send + Sync,
{
    async fn submit(
        &self,
        caller: PlayerAddress,
        operation: GameOperation,
    ) -> Result<Vec<GameEvent>, StoreError> {
        let events = {
            let mut manager = self.manager.lock();
            match operation {
                GameOperation::CreateGame {
                    game_id,
                    num_players,
                    num_cards,
                } => manager.create_game(caller, game_id, num_players, num_cards)?,
                GameOperation::SetGameSettings { game_id, settings } => {
                    manager.set_game_settings(caller, game_id, settings)?
                }
                GameOperation::Register { game_id, public_key } => {
                    manager.register(caller, game_id, public_key)?.1
                }
                GameOperation::Shuffle {
                    game_id,
                    proof,
                    deck,
                } => manager.shuffle(caller, game_id, &proof, deck)?,
                GameOperation::RequestDeal {
                    game_id,
                    assignments,
                } => manager.request_deal(caller, game_id, &assignments)?,
                GameOperation::Deal {
                    game_id,
                    card_index,
                    player_index,
                    proof,
                    share,
                    init_deltas,
                } => manager.deal(
                    caller,
                    game_id,
                    card_index,
                    player_index,
                    &proof,
                    share,
                    init_deltas,
                )?,
                GameOperation::Open {
                    game_id,
                    card_mask,
                    proofs,
                    shares,
                    init_deltas,
                } => manager.open(caller, game_id, card_mask, &proofs, &shares, &init_deltas)?,
                GameOperation::Close { game_id } => manager.close(caller, game_id)?,
                GameOperation::Fault { game_id, reason } => {
                    manager.fault(caller, game_id, &reason)?
                }
            }
        };
        debug!(target: LOG_TARGET, %caller, count = events.len(), "write accepted");
        self.publish(&events);
        Ok(events)
    }

    async fn snapshot(&self, game_id: GameId) -> Result<Game, StoreError> {
        Ok(self.manager.lock().snapshot(game_id)?)
    }

    fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }
}
