//! Packed Groth16 proofs, typed public-signal records, and the verifier
//! seam the state machine calls through.
//!
//! The verifier is an opaque predicate over `(circuit, proof, signals)`.
//! The layouts below are what existing proving keys commit to, so they are
//! typed and length-checked at the boundary rather than shuttled around as
//! loose arrays.

use ark_bn254::{Bn254, Fq2, G1Affine, G2Affine};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::{Fq, Point};
use crate::deck::{CardCiphertext, CodecError, Selectors};
use crate::game::GameId;

const LOG_TARGET: &str = "zk_shuffle::proof";

/// Coordinate field of the BN254 pairing groups the proofs live in. Distinct
/// from [`Fq`], which is the BN254 *scalar* field the signals live in.
pub type ProofFq = ark_bn254::Fq;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitId {
    Shuffle,
    Decrypt,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("public signal vector has length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error(transparent)]
    Selector(#[from] CodecError),
}

/// Groth16 proof `(a ∈ G1, b ∈ G2, c ∈ G1)` packed as the eight coordinates
/// `[a.x, a.y, b.x0, b.x1, b.y0, b.y1, c.x, c.y]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedProof {
    #[serde(with = "crate::crypto_serde::field_vec")]
    elements: Vec<ProofFq>,
}

impl PackedProof {
    pub const NUM_ELEMENTS: usize = 8;

    pub fn new(elements: [ProofFq; Self::NUM_ELEMENTS]) -> Self {
        Self {
            elements: elements.to_vec(),
        }
    }

    pub fn elements(&self) -> &[ProofFq] {
        &self.elements
    }

    pub fn from_groth16(proof: &Proof<Bn254>) -> Self {
        Self::new([
            proof.a.x,
            proof.a.y,
            proof.b.x.c0,
            proof.b.x.c1,
            proof.b.y.c0,
            proof.b.y.c1,
            proof.c.x,
            proof.c.y,
        ])
    }

    /// Unpack into group elements, checking curve and subgroup membership.
    /// Returns `None` for anything malformed; the caller surfaces that as a
    /// failed verification.
    pub fn to_groth16(&self) -> Option<Proof<Bn254>> {
        if self.elements.len() != Self::NUM_ELEMENTS {
            return None;
        }
        let e = &self.elements;
        let a = checked_g1(e[0], e[1])?;
        let b = checked_g2(Fq2::new(e[2], e[3]), Fq2::new(e[4], e[5]))?;
        let c = checked_g1(e[6], e[7])?;
        Some(Proof { a, b, c })
    }
}

fn checked_g1(x: ProofFq, y: ProofFq) -> Option<G1Affine> {
    let point = G1Affine::new_unchecked(x, y);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

fn checked_g2(x: Fq2, y: Fq2) -> Option<G2Affine> {
    let point = G2Affine::new_unchecked(x, y);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

/// The value binding a proof to its game.
pub fn game_nonce(game_id: GameId) -> Fq {
    Fq::from(game_id)
}

/// Public signals of the shuffle circuit, in the order the verifying key
/// commits to:
///
/// ```text
/// [0..3)          nonce, pk.x, pk.y
/// [3..3+N)        UX0          [3+N..3+2N)   UX1
/// [3+2N..3+3N)    VX0          [3+3N..3+4N)  VX1
/// [3+4N..5+4N)    s_u.{0,1}    [5+4N..7+4N)  s_v.{0,1}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShufflePublicSignals {
    #[serde(with = "crate::crypto_serde::field")]
    pub nonce: Fq,
    pub aggregated_pk: Point,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub input_x0: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub input_x1: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub output_x0: Vec<Fq>,
    #[serde(with = "crate::crypto_serde::field_vec")]
    pub output_x1: Vec<Fq>,
    pub input_selectors: Selectors,
    pub output_selectors: Selectors,
}

impl ShufflePublicSignals {
    pub fn len(num_cards: usize) -> usize {
        7 + 4 * num_cards
    }

    pub fn num_cards(&self) -> usize {
        self.input_x0.len()
    }

    pub fn to_vec(&self) -> Vec<Fq> {
        let mut signals = Vec::with_capacity(Self::len(self.num_cards()));
        signals.push(self.nonce);
        signals.push(self.aggregated_pk.x);
        signals.push(self.aggregated_pk.y);
        signals.extend_from_slice(&self.input_x0);
        signals.extend_from_slice(&self.input_x1);
        signals.extend_from_slice(&self.output_x0);
        signals.extend_from_slice(&self.output_x1);
        let (su0, su1) = self.input_selectors.to_field();
        let (sv0, sv1) = self.output_selectors.to_field();
        signals.extend_from_slice(&[su0, su1, sv0, sv1]);
        signals
    }

    pub fn from_slice(signals: &[Fq], num_cards: usize) -> Result<Self, SignalError> {
        let expected = Self::len(num_cards);
        if signals.len() != expected {
            return Err(SignalError::Length {
                expected,
                actual: signals.len(),
            });
        }
        let n = num_cards;
        let slice = |from: usize| signals[from..from + n].to_vec();
        Ok(Self {
            nonce: signals[0],
            aggregated_pk: Point {
                x: signals[1],
                y: signals[2],
            },
            input_x0: slice(3),
            input_x1: slice(3 + n),
            output_x0: slice(3 + 2 * n),
            output_x1: slice(3 + 3 * n),
            input_selectors: Selectors::from_field(signals[3 + 4 * n], signals[4 + 4 * n], n)?,
            output_selectors: Selectors::from_field(signals[5 + 4 * n], signals[6 + 4 * n], n)?,
        })
    }
}

/// Public signals of the decrypt circuit:
/// `[share.x, share.y, c0.x, c0.y, c1.x, c1.y, pk.x, pk.y]`. The circuit
/// proves `share = sk·c0` for the `sk` behind `pk`, bound to the full card
/// so a share cannot be replayed against another slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptPublicSignals {
    pub share: Point,
    pub card: CardCiphertext,
    pub player_pk: Point,
}

impl DecryptPublicSignals {
    pub const LEN: usize = 8;

    pub fn to_vec(&self) -> Vec<Fq> {
        vec![
            self.share.x,
            self.share.y,
            self.card.c0.x,
            self.card.c0.y,
            self.card.c1.x,
            self.card.c1.y,
            self.player_pk.x,
            self.player_pk.y,
        ]
    }

    pub fn from_slice(signals: &[Fq]) -> Result<Self, SignalError> {
        if signals.len() != Self::LEN {
            return Err(SignalError::Length {
                expected: Self::LEN,
                actual: signals.len(),
            });
        }
        Ok(Self {
            share: Point {
                x: signals[0],
                y: signals[1],
            },
            card: CardCiphertext {
                c0: Point {
                    x: signals[2],
                    y: signals[3],
                },
                c1: Point {
                    x: signals[4],
                    y: signals[5],
                },
            },
            player_pk: Point {
                x: signals[6],
                y: signals[7],
            },
        })
    }
}

/// Opaque verification predicate. Implementations must be pure: a malformed
/// proof or signal vector verifies `false`, never panics.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, circuit: CircuitId, proof: &PackedProof, public_signals: &[Fq]) -> bool;
}

/// Library-backed verifier over prepared Groth16 verifying keys.
pub struct Groth16Verifier {
    shuffle_vk: PreparedVerifyingKey<Bn254>,
    decrypt_vk: PreparedVerifyingKey<Bn254>,
}

impl Groth16Verifier {
    pub fn new(shuffle_vk: VerifyingKey<Bn254>, decrypt_vk: VerifyingKey<Bn254>) -> Self {
        Self {
            shuffle_vk: prepare_verifying_key(&shuffle_vk),
            decrypt_vk: prepare_verifying_key(&decrypt_vk),
        }
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, circuit: CircuitId, proof: &PackedProof, public_signals: &[Fq]) -> bool {
        let Some(proof) = proof.to_groth16() else {
            tracing::debug!(target: LOG_TARGET, ?circuit, "malformed packed proof");
            return false;
        };
        let vk = match circuit {
            CircuitId::Shuffle => &self.shuffle_vk,
            CircuitId::Decrypt => &self.decrypt_vk,
        };
        Groth16::<Bn254>::verify_proof(vk, &proof, public_signals).unwrap_or(false)
    }
}
