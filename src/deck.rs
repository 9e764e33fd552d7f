//! Deck encoding and compression.
//!
//! A card slot holds an ElGamal ciphertext `(c0, c1)` of curve points. On
//! the shared store each point is kept as its x-coordinate plus one sign
//! bit; the sign bits of a whole deck are packed into two selector words.
//! The initial deck is a process-wide constant: card `i` encodes the point
//! `(i + 1)·Base8` under the identity `c0`, which is what `search` resolves
//! decrypted points against.

use ark_ff::{BigInt, Field, One, PrimeField, Zero};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::{self, Fq, Fs, Point, BASE8, COEFF_A, COEFF_D};

/// Largest deck the selector words and the constant table support.
pub const MAX_CARDS: usize = 52;
/// Deck size of a standard game.
pub const STANDARD_DECK: usize = 52;
/// Deck size of the short-deck variant.
pub const SHORT_DECK: usize = 30;

/// Sentinel returned by `search` when a decrypted point matches no card.
pub const INVALID_CARD_INDEX: usize = 999_999;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("delta is not the canonical square root for this x-coordinate")]
    IllFormedDelta,
    #[error("selector word has bits beyond the deck size")]
    IllFormedSelector,
    #[error("x-coordinate is not on the curve")]
    NotOnCurve,
}

/// The two packed sign-bit words of a compressed deck. Bit `i` of a word
/// recovers the y-coordinate sign of card `i`'s `c0` or `c1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    pub s0: u64,
    pub s1: u64,
}

impl Selectors {
    /// Parse selector words submitted as field elements, rejecting values
    /// with bits beyond `num_cards`.
    pub fn from_field(s0: Fq, s1: Fq, num_cards: usize) -> Result<Self, CodecError> {
        Ok(Self {
            s0: selector_word(s0, num_cards)?,
            s1: selector_word(s1, num_cards)?,
        })
    }

    pub fn to_field(&self) -> (Fq, Fq) {
        (Fq::from(self.s0), Fq::from(self.s1))
    }

    pub fn bit0(&self, index: usize) -> bool {
        self.s0 >> index & 1 == 1
    }

    pub fn bit1(&self, index: usize) -> bool {
        self.s1 >> index & 1 == 1
    }

    pub fn set_bit0(&mut self, index: usize, value: bool) {
        self.s0 = (self.s0 & !(1u64 << index)) | ((value as u64) << index);
    }

    pub fn set_bit1(&mut self, index: usize, value: bool) {
        self.s1 = (self.s1 & !(1u64 << index)) | ((value as u64) << index);
    }
}

fn selector_word(value: Fq, num_cards: usize) -> Result<u64, CodecError> {
    debug_assert!(num_cards <= MAX_CARDS);
    let repr = value.into_bigint();
    if repr >= BigInt::from(1u64 << num_cards) {
        return Err(CodecError::IllFormedSelector);
    }
    Ok(repr.0[0])
}

/// One card as a pair of curve points.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCiphertext {
    pub c0: Point,
    pub c1: Point,
}

impl CardCiphertext {
    /// Add a fresh encryption layer: `(c0 + r·G, c1 + r·pk)`.
    pub fn rerandomize(&self, randomness: &Fs, aggregated_pk: &Point) -> CardCiphertext {
        CardCiphertext {
            c0: self.c0.add(&BASE8.mul(randomness)),
            c1: self.c1.add(&aggregated_pk.mul(randomness)),
        }
    }

    /// Remove one player's decryption share from `c1`.
    pub fn apply_share(&self, share: &Point) -> CardCiphertext {
        CardCiphertext {
            c0: self.c0,
            c1: self.c1.sub(share),
        }
    }
}

/// The canonical y-deltas a client supplies the first time a card is dealt,
/// so the state machine can decompress it without a square root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDeltas {
    #[serde(with = "crate::crypto_serde::field")]
    pub delta0: Fq,
    #[serde(with = "crate::crypto_serde::field")]
    pub delta1: Fq,
}

/// Whole-deck compressed representation: x-coordinates plus selector words.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedDeck {
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub x0: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub x1: Vec<Fq>,
    pub selectors: Selectors,
}

impl CompressedDeck {
    pub fn num_cards(&self) -> usize {
        self.x0.len()
    }

    /// Compress a deck of ciphertexts.
    pub fn compress(cards: &[CardCiphertext]) -> CompressedDeck {
        let mut selectors = Selectors::default();
        let mut x0 = Vec::with_capacity(cards.len());
        let mut x1 = Vec::with_capacity(cards.len());
        for (i, card) in cards.iter().enumerate() {
            x0.push(card.c0.x);
            x1.push(card.c1.x);
            selectors.set_bit0(i, sel_of(&card.c0.y));
            selectors.set_bit1(i, sel_of(&card.c1.y));
        }
        CompressedDeck { x0, x1, selectors }
    }

    /// Decompress card `i` from externally supplied deltas. This is the
    /// cheap path the state machine uses; it re-verifies the deltas rather
    /// than computing square roots.
    pub fn decompress_card(&self, index: usize, deltas: &CardDeltas) -> Result<CardCiphertext, CodecError> {
        let y0 = decompress_ec(self.x0[index], deltas.delta0, self.selectors.bit0(index))?;
        let y1 = decompress_ec(self.x1[index], deltas.delta1, self.selectors.bit1(index))?;
        Ok(CardCiphertext {
            c0: Point { x: self.x0[index], y: y0 },
            c1: Point { x: self.x1[index], y: y1 },
        })
    }

    /// Recover the deltas for card `i` from the curve equation.
    pub fn card_deltas(&self, index: usize) -> Result<CardDeltas, CodecError> {
        Ok(CardDeltas {
            delta0: ec_x_to_delta(self.x0[index])?,
            delta1: ec_x_to_delta(self.x1[index])?,
        })
    }

    /// Decompress the whole deck, deriving every delta. Clients use this to
    /// build shuffle witnesses.
    pub fn decompress(&self) -> Result<Vec<CardCiphertext>, CodecError> {
        (0..self.num_cards())
            .map(|i| self.decompress_card(i, &self.card_deltas(i)?))
            .collect()
    }
}

/// Recover a y-coordinate from `(x, delta, sel)`. `delta` must be the
/// canonical root (`≤ (Q−1)/2`) and `(x, delta)` must satisfy the curve
/// equation; `sel` picks between `delta` and `Q − delta`.
pub fn decompress_ec(x: Fq, delta: Fq, sel: bool) -> Result<Fq, CodecError> {
    if !curve::is_canonical(&delta) || !curve::on_curve(x, delta) {
        return Err(CodecError::IllFormedDelta);
    }
    Ok(if sel { delta } else { -delta })
}

/// Canonical square root of `(1 − A·x²)/(1 − D·x²)`, the y-coordinate a
/// compressed x decompresses to before the selector bit is applied.
pub fn ec_x_to_delta(x: Fq) -> Result<Fq, CodecError> {
    let xx = x.square();
    let denominator = (Fq::one() - COEFF_D * xx)
        .inverse()
        .ok_or(CodecError::NotOnCurve)?;
    let yy = (Fq::one() - COEFF_A * xx) * denominator;
    let y = yy.sqrt().ok_or(CodecError::NotOnCurve)?;
    Ok(if curve::is_canonical(&y) { y } else { -y })
}

/// Selector bit of a y-coordinate: set iff `y` is canonical.
pub fn sel_of(y: &Fq) -> bool {
    curve::is_canonical(y)
}

struct InitialDeck {
    points: Vec<Point>,
    compressed: CompressedDeck,
}

static MASTER_DECK: Lazy<InitialDeck> = Lazy::new(|| {
    let points: Vec<Point> = (0..MAX_CARDS)
        .map(|i| BASE8.mul(&Fs::from(i as u64 + 1)))
        .collect();
    let cards: Vec<CardCiphertext> = points
        .iter()
        .map(|&point| CardCiphertext {
            c0: Point {
                x: Fq::zero(),
                y: Fq::one(),
            },
            c1: point,
        })
        .collect();
    InitialDeck {
        compressed: CompressedDeck::compress(&cards),
        points,
    }
});

/// The fixed pre-shuffle deck for a game of `num_cards`: every `c0` is the
/// neutral element, every `c1` the card's plaintext point. Identical across
/// games so the proving keys can bake it in.
pub fn initial_deck(num_cards: usize) -> CompressedDeck {
    assert!(
        num_cards >= 1 && num_cards <= MAX_CARDS,
        "deck size {num_cards} out of range"
    );
    let master = &MASTER_DECK.compressed;
    let mask = (1u64 << num_cards) - 1;
    CompressedDeck {
        x0: master.x0[..num_cards].to_vec(),
        x1: master.x1[..num_cards].to_vec(),
        selectors: Selectors {
            s0: master.selectors.s0 & mask,
            s1: master.selectors.s1 & mask,
        },
    }
}

/// Plaintext point of card `index`.
pub fn card_point(index: usize) -> Point {
    MASTER_DECK.points[index]
}

/// Map a fully decrypted point back to its card index.
pub fn find_card(point: &Point, num_cards: usize) -> Option<usize> {
    MASTER_DECK.points[..num_cards]
        .iter()
        .position(|candidate| candidate == point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::Rng;
    use ark_std::test_rng;

    fn random_point<R: Rng>(rng: &mut R) -> Point {
        BASE8.mul(&curve::random_scalar(rng))
    }

    #[test]
    fn compression_round_trips_for_random_points() {
        let mut rng = test_rng();
        for _ in 0..8 {
            let p = random_point(&mut rng);
            let delta = ec_x_to_delta(p.x).unwrap();
            assert_eq!(decompress_ec(p.x, delta, sel_of(&p.y)), Ok(p.y));
        }
    }

    #[test]
    fn non_canonical_delta_is_rejected() {
        let mut rng = test_rng();
        let p = random_point(&mut rng);
        let delta = ec_x_to_delta(p.x).unwrap();
        assert_eq!(
            decompress_ec(p.x, -delta, sel_of(&p.y)),
            Err(CodecError::IllFormedDelta)
        );
        assert_eq!(
            decompress_ec(p.x, delta + Fq::one(), true),
            Err(CodecError::IllFormedDelta)
        );
    }

    #[test]
    fn selector_words_reject_out_of_range_bits() {
        assert_eq!(
            Selectors::from_field(Fq::from(1u64 << 52), Fq::zero(), 52),
            Err(CodecError::IllFormedSelector)
        );
        let parsed = Selectors::from_field(Fq::from(5u64), Fq::from(2u64), 3).unwrap();
        assert_eq!(parsed, Selectors { s0: 5, s1: 2 });
    }

    #[test]
    fn standard_deck_matches_the_deployment_constants() {
        let deck = initial_deck(STANDARD_DECK);
        assert!(deck.x0.iter().all(|x| x.is_zero()));
        assert_eq!(deck.selectors.s0, 4503599627370495);
        assert_eq!(deck.selectors.s1, 3075935501959818);
    }

    #[test]
    fn initial_deck_decompresses_to_card_points() {
        let deck = initial_deck(SHORT_DECK);
        let cards = deck.decompress().unwrap();
        for (i, card) in cards.iter().enumerate() {
            assert!(card.c0.is_on_curve());
            assert!(card.c1.is_on_curve());
            assert_eq!(card.c1, card_point(i));
            assert_eq!(find_card(&card.c1, SHORT_DECK), Some(i));
        }
    }

    #[test]
    fn rerandomization_preserves_the_plaintext() {
        let mut rng = test_rng();
        let sk = curve::random_scalar(&mut rng);
        let pk = BASE8.mul(&sk);
        let card = CardCiphertext {
            c0: Point {
                x: Fq::zero(),
                y: Fq::one(),
            },
            c1: card_point(7),
        };
        let rerandomized = card.rerandomize(&curve::random_scalar(&mut rng), &pk);
        let share = rerandomized.c0.mul(&sk);
        assert_eq!(rerandomized.apply_share(&share).c1, card_point(7));
    }
}
