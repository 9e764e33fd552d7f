//! Decryption-share witness: one player's removal of their encryption layer
//! from a dealt card, plus the recipient-side recovery helpers.

use crate::curve::{Fs, Point};
use crate::deck::{self, CardCiphertext, CodecError, CompressedDeck};
use crate::keys::KeyPair;
use crate::proof::DecryptPublicSignals;

/// Witness for the decrypt circuit: the card, the submitting player's keys,
/// and the derived share `sk·c0`.
#[derive(Clone, Debug)]
pub struct DealWitness {
    pub card: CardCiphertext,
    pub player_pk: Point,
    secret: Fs,
}

impl DealWitness {
    pub fn new(card: CardCiphertext, keys: &KeyPair) -> Self {
        Self {
            card,
            player_pk: keys.public,
            secret: *keys.secret.expose(),
        }
    }

    /// The partial decryption share this witness proves well-formed.
    pub fn share(&self) -> Point {
        self.card.c0.mul(&self.secret)
    }

    pub fn secret(&self) -> &Fs {
        &self.secret
    }

    pub fn public_signals(&self) -> DecryptPublicSignals {
        DecryptPublicSignals {
            share: self.share(),
            card: self.card,
            player_pk: self.player_pk,
        }
    }
}

/// Compressed path: decompress card `index` straight off the shared deck,
/// for the first player to decrypt it.
pub fn prepare_decrypt_data(
    deck: &CompressedDeck,
    index: usize,
) -> Result<CardCiphertext, CodecError> {
    deck.decompress_card(index, &deck.card_deltas(index)?)
}

/// Recipient-side recovery once every other player's share has been
/// applied: `M = c1 − sk·c0`.
pub fn recover_card(card: &CardCiphertext, secret: &Fs) -> Point {
    card.c1.sub(&card.c0.mul(secret))
}

/// Recover and resolve against the initial-deck table.
pub fn recover_card_index(card: &CardCiphertext, secret: &Fs, num_cards: usize) -> Option<usize> {
    deck::find_card(&recover_card(card, secret), num_cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::initial_deck;
    use crate::keys::draw_keypair;
    use ark_std::test_rng;

    #[test]
    fn compressed_path_matches_full_decompression() {
        let deck = initial_deck(8);
        let cards = deck.decompress().unwrap();
        for (i, expected) in cards.iter().enumerate() {
            assert_eq!(prepare_decrypt_data(&deck, i).unwrap(), *expected);
        }
    }

    #[test]
    fn shares_remove_exactly_one_layer() {
        let mut rng = test_rng();
        let num_cards = 4;
        let alice = draw_keypair(&mut rng);
        let bob = draw_keypair(&mut rng);
        let aggregated = alice.public.add(&bob.public);

        let card = prepare_decrypt_data(&initial_deck(num_cards), 2)
            .unwrap()
            .rerandomize(&crate::curve::random_scalar(&mut rng), &aggregated);

        let alice_witness = DealWitness::new(card, &alice);
        let after_alice = card.apply_share(&alice_witness.share());
        assert_eq!(
            recover_card_index(&after_alice, bob.secret.expose(), num_cards),
            Some(2)
        );

        // Signals bind the share, the card, and the submitting key.
        let signals = alice_witness.public_signals();
        assert_eq!(signals.share, alice_witness.share());
        assert_eq!(signals.player_pk, alice.public);
    }
}
