//! Client-side witness construction for the shuffle and decrypt circuits,
//! and the seam to the external prover.

pub mod deal;
pub mod shuffle;

pub use deal::{prepare_decrypt_data, recover_card, recover_card_index, DealWitness};
pub use shuffle::{build_shuffle_witness, sample_permutation, sample_randomness, ShuffleWitness};

use thiserror::Error;

use crate::deck::CodecError;
use crate::proof::PackedProof;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error("permutation is not a bijection over the deck")]
    InvalidPermutation,
    #[error("randomness vector has length {actual}, expected {expected}")]
    RandomnessLength { expected: usize, actual: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("witness rejected by the proving backend: {0}")]
    Witness(String),
    #[error("proving backend failure: {0}")]
    Backend(String),
}

/// External Groth16 prover. Implementations wrap a real proving backend or
/// the deterministic mock in [`crate::test_support`].
pub trait Prover: Send + Sync {
    fn prove_shuffle(&self, witness: &ShuffleWitness) -> Result<PackedProof, ProverError>;
    fn prove_decrypt(&self, witness: &DealWitness) -> Result<PackedProof, ProverError>;
}
