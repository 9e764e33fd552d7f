use std::collections::BTreeSet;

use ark_ff::One;
use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;

use super::*;
use crate::curve::{Fq, Point};
use crate::deck::{CompressedDeck, SHORT_DECK, STANDARD_DECK};
use crate::keys::{draw_keypair, KeyPair, PlayerAddress};
use crate::proof::game_nonce;
use crate::test_support::{MockProver, MockVerifier};
use crate::witness::{
    build_shuffle_witness, prepare_decrypt_data, recover_card_index, sample_permutation,
    sample_randomness, DealWitness, Prover,
};

const GAME: GameId = 7;

/// A table of players driving one `GameManager` directly, with the mock
/// proof system standing in for the Groth16 toolchain.
struct Table {
    manager: GameManager<MockVerifier>,
    creator: PlayerAddress,
    players: Vec<KeyPair>,
    rng: StdRng,
}

impl Table {
    fn start(num_players: usize, num_cards: usize, policy: DealPolicy) -> Self {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut manager = GameManager::new(MockVerifier);
        let creator = PlayerAddress([0xCC; 20]);
        manager
            .create_game(creator, GAME, num_players, num_cards)
            .unwrap();
        manager
            .set_game_settings(creator, GAME, GameSettings { deal_policy: policy })
            .unwrap();
        let players: Vec<KeyPair> = (0..num_players).map(|_| draw_keypair(&mut rng)).collect();
        for pair in &players {
            manager.register(pair.address(), GAME, pair.public).unwrap();
        }
        Self {
            manager,
            creator,
            players,
            rng,
        }
    }

    fn deck(&self) -> CompressedDeck {
        self.manager.deck(GAME).unwrap().clone()
    }

    fn shuffle_once(&mut self, player: usize) -> Result<Vec<GameEvent>, ProtocolError> {
        let deck = self.deck();
        let num_cards = deck.num_cards();
        let witness = build_shuffle_witness(
            game_nonce(GAME),
            &deck,
            &sample_permutation(num_cards, &mut self.rng),
            &sample_randomness(num_cards, &mut self.rng),
            &self.manager.aggregated_pk(GAME).unwrap(),
        )
        .unwrap();
        let proof = MockProver.prove_shuffle(&witness).unwrap();
        self.manager
            .shuffle(self.players[player].address(), GAME, &proof, witness.submission())
    }

    fn shuffle_all(&mut self) {
        for player in 0..self.players.len() {
            self.shuffle_once(player).unwrap();
        }
    }

    fn request(&mut self, card_mask: u64, recipient: usize) {
        self.manager
            .request_deal(
                self.creator,
                GAME,
                &[DealAssignment {
                    card_mask,
                    recipient,
                }],
            )
            .unwrap();
    }

    /// Build a valid share submission for `player` on `card_index`.
    fn share_for(&self, card_index: usize, player: usize) -> (crate::proof::PackedProof, Point, Option<crate::deck::CardDeltas>) {
        let snapshot = self.manager.snapshot(GAME).unwrap();
        let deal_state = snapshot.deals[&card_index];
        let deck = snapshot.deck.as_ref().unwrap();
        let (card, deltas) = match deal_state.card {
            Some(card) => (card, None),
            None => (
                prepare_decrypt_data(deck, card_index).unwrap(),
                Some(deck.card_deltas(card_index).unwrap()),
            ),
        };
        let witness = DealWitness::new(card, &self.players[player]);
        let proof = MockProver.prove_decrypt(&witness).unwrap();
        (proof, witness.share(), deltas)
    }

    fn deal_share(&mut self, card_index: usize, player: usize) -> Result<Vec<GameEvent>, ProtocolError> {
        let (proof, share, deltas) = self.share_for(card_index, player);
        self.manager.deal(
            self.players[player].address(),
            GAME,
            card_index,
            player,
            &proof,
            share,
            deltas,
        )
    }

    fn open_card(&mut self, card_index: usize, recipient: usize) -> Result<Vec<GameEvent>, ProtocolError> {
        let (proof, share, deltas) = self.share_for(card_index, recipient);
        self.manager.open(
            self.players[recipient].address(),
            GAME,
            1 << card_index,
            &[proof],
            &[share],
            &[deltas],
        )
    }

    /// Deal a card to `recipient` the whole way: every other player submits
    /// a share, the recipient recovers locally and reveals.
    fn deal_card_fully(&mut self, card_index: usize, recipient: usize) -> usize {
        for player in 0..self.players.len() {
            if player != recipient {
                self.deal_share(card_index, player).unwrap();
            }
        }
        let snapshot = self.manager.snapshot(GAME).unwrap();
        let recovered = recover_card_index(
            &snapshot.deals[&card_index].card.unwrap(),
            self.players[recipient].secret.expose(),
            snapshot.num_cards,
        )
        .expect("recipient recovers a card point");
        self.open_card(card_index, recipient).unwrap();
        assert_eq!(self.manager.search(GAME, card_index).unwrap(), recovered);
        recovered
    }

    fn assert_deck_on_curve(&self) {
        for card in self.deck().decompress().unwrap() {
            assert!(card.c0.is_on_curve());
            assert!(card.c1.is_on_curve());
        }
    }
}

#[test]
fn two_players_deal_five_cards_alternating() {
    let mut table = Table::start(2, STANDARD_DECK, DealPolicy::Unordered);

    let initial = table.deck();
    table.shuffle_once(0).unwrap();
    let after_first = table.deck();
    assert_ne!(initial, after_first);
    table.shuffle_once(1).unwrap();
    let after_second = table.deck();
    assert_ne!(after_first, after_second);
    table.assert_deck_on_curve();

    for card_index in 0..5 {
        table.request(1 << card_index, card_index % 2);
    }
    let mut seen = BTreeSet::new();
    for card_index in 0..5 {
        let value = table.deal_card_fully(card_index, card_index % 2);
        assert!(value < STANDARD_DECK);
        seen.insert(value);

        let snapshot = table.manager.snapshot(GAME).unwrap();
        assert_eq!(snapshot.deals[&card_index].record, 0b11);
    }
    assert_eq!(seen.len(), 5);

    let snapshot = table.manager.snapshot(GAME).unwrap();
    assert_eq!(snapshot.status, GameStatus::Open);
    table.manager.close(table.creator, GAME).unwrap();
    assert_eq!(
        table.manager.snapshot(GAME).unwrap().status,
        GameStatus::Complete
    );
}

#[test]
fn three_players_short_deck_deal_to_first_seat() {
    let mut table = Table::start(3, SHORT_DECK, DealPolicy::Unordered);
    table.shuffle_all();
    table.assert_deck_on_curve();

    table.request(1, 0);
    let value = table.deal_card_fully(0, 0);
    assert!(value < SHORT_DECK);
    assert_eq!(table.manager.search(GAME, 0).unwrap(), value);
}

#[test]
fn full_deal_recovers_every_card_exactly_once() {
    let num_cards = 8;
    let mut table = Table::start(2, num_cards, DealPolicy::Unordered);
    table.shuffle_all();

    for card_index in 0..num_cards {
        table.request(1 << card_index, card_index % 2);
    }
    let mut values = Vec::new();
    for card_index in 0..num_cards {
        values.push(table.deal_card_fully(card_index, card_index % 2));
    }
    values.sort_unstable();
    assert_eq!(values, (0..num_cards).collect::<Vec<_>>());
}

#[test]
fn tampered_shuffle_is_rejected_without_state_change() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);
    let deck = table.deck();
    let witness = build_shuffle_witness(
        game_nonce(GAME),
        &deck,
        &sample_permutation(SHORT_DECK, &mut table.rng),
        &sample_randomness(SHORT_DECK, &mut table.rng),
        &table.manager.aggregated_pk(GAME).unwrap(),
    )
    .unwrap();
    let proof = MockProver.prove_shuffle(&witness).unwrap();
    let mut submission = witness.submission();
    submission.x0[3] += Fq::one();

    let err = table
        .manager
        .shuffle(table.players[0].address(), GAME, &proof, submission)
        .unwrap_err();
    assert_eq!(err, ProtocolError::ProofFailed);

    let snapshot = table.manager.snapshot(GAME).unwrap();
    assert_eq!(snapshot.status, GameStatus::Shuffle);
    assert_eq!(snapshot.turn, 0);
    assert_eq!(snapshot.deck.unwrap(), deck);
}

#[test]
fn double_deal_is_rejected() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);
    table.shuffle_all();
    table.request(1 << 2, 0);

    table.deal_share(2, 1).unwrap();
    assert_eq!(table.deal_share(2, 1).unwrap_err(), ProtocolError::DoubleDeal);
}

#[test]
fn tampered_share_is_rejected_without_state_change() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);
    table.shuffle_all();
    table.request(1, 0);

    let (proof, share, deltas) = table.share_for(0, 1);
    let tampered = share.add(&crate::curve::BASE8);
    let err = table
        .manager
        .deal(table.players[1].address(), GAME, 0, 1, &proof, tampered, deltas)
        .unwrap_err();
    assert_eq!(err, ProtocolError::ProofFailed);
    assert_eq!(table.manager.snapshot(GAME).unwrap().deals[&0].record, 0);
}

#[test]
fn wrong_or_unknown_shuffler_is_rejected() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);

    // Seat 1 cannot shuffle while it is seat 0's turn.
    assert_eq!(table.shuffle_once(1).unwrap_err(), ProtocolError::NotYourTurn);

    // An address that never registered cannot shuffle at all.
    let outsider = draw_keypair(&mut table.rng);
    let deck = table.deck();
    let witness = build_shuffle_witness(
        game_nonce(GAME),
        &deck,
        &sample_permutation(SHORT_DECK, &mut table.rng),
        &sample_randomness(SHORT_DECK, &mut table.rng),
        &table.manager.aggregated_pk(GAME).unwrap(),
    )
    .unwrap();
    let proof = MockProver.prove_shuffle(&witness).unwrap();
    let err = table
        .manager
        .shuffle(outsider.address(), GAME, &proof, witness.submission())
        .unwrap_err();
    assert_eq!(err, ProtocolError::NotYourTurn);
}

#[test]
fn off_curve_public_key_is_rejected() {
    let mut manager = GameManager::new(MockVerifier);
    let creator = PlayerAddress([0xCC; 20]);
    manager.create_game(creator, GAME, 2, SHORT_DECK).unwrap();
    manager
        .set_game_settings(creator, GAME, GameSettings::default())
        .unwrap();

    let mut rng = StdRng::seed_from_u64(5);
    let pair = draw_keypair(&mut rng);
    let off_curve = Point {
        x: pair.public.x,
        y: pair.public.y + Fq::one(),
    };
    let err = manager
        .register(pair.address(), GAME, off_curve)
        .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidPublicKey);

    let snapshot = manager.snapshot(GAME).unwrap();
    assert_eq!(snapshot.status, GameStatus::Registration);
    assert!(snapshot.players.is_empty());
}

#[test]
fn registration_closes_at_capacity() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);
    let late = draw_keypair(&mut table.rng);
    let err = table
        .manager
        .register(late.address(), GAME, late.public)
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::InvalidState {
            state: GameStatus::Shuffle
        }
    );
}

#[test]
fn aggregated_key_is_the_exact_sum_of_registrations() {
    let table = Table::start(3, SHORT_DECK, DealPolicy::Unordered);
    let expected = table
        .players
        .iter()
        .fold(Point::IDENTITY, |acc, pair| acc.add(&pair.public));
    assert_eq!(table.manager.aggregated_pk(GAME).unwrap(), expected);
}

#[test]
fn search_requires_full_quorum() {
    let mut table = Table::start(3, SHORT_DECK, DealPolicy::Unordered);
    table.shuffle_all();
    table.request(1, 0);

    assert_eq!(
        table.manager.search(GAME, 0).unwrap_err(),
        ProtocolError::CardNotFullyDecrypted
    );
    table.deal_share(0, 1).unwrap();
    assert_eq!(
        table.manager.search(GAME, 0).unwrap_err(),
        ProtocolError::CardNotFullyDecrypted
    );
    // A card that was never requested is just as undecrypted.
    assert_eq!(
        table.manager.search(GAME, 5).unwrap_err(),
        ProtocolError::CardNotFullyDecrypted
    );
}

#[test]
fn operations_outside_their_state_are_rejected() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);

    // Dealing before the shuffles are done.
    let err = table
        .manager
        .request_deal(
            table.creator,
            GAME,
            &[DealAssignment {
                card_mask: 1,
                recipient: 0,
            }],
        )
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::InvalidState {
            state: GameStatus::Shuffle
        }
    );

    table.shuffle_all();

    // Shuffling after the shuffle phase closed.
    assert_eq!(
        table.shuffle_once(0).unwrap_err(),
        ProtocolError::InvalidState {
            state: GameStatus::Deal
        }
    );

    // Unknown game id.
    assert_eq!(
        table.manager.snapshot(GAME + 1).unwrap_err(),
        ProtocolError::InvalidState {
            state: GameStatus::Uncreated
        }
    );
}

#[test]
fn round_robin_policy_enforces_seat_order() {
    let mut table = Table::start(3, SHORT_DECK, DealPolicy::RoundRobin);
    table.shuffle_all();
    table.request(1, 2);

    // Seat 1 may not act before seat 0.
    assert_eq!(table.deal_share(0, 1).unwrap_err(), ProtocolError::NotYourTurn);
    table.deal_share(0, 0).unwrap();
    table.deal_share(0, 1).unwrap();
    table.open_card(0, 2).unwrap();
    assert!(table.manager.search(GAME, 0).unwrap() < SHORT_DECK);
}

#[test]
fn recipients_cannot_submit_through_deal() {
    let mut table = Table::start(2, SHORT_DECK, DealPolicy::Unordered);
    table.shuffle_all();
    table.request(1, 0);
    assert_eq!(table.deal_share(0, 0).unwrap_err(), ProtocolError::NotYourTurn);
}
