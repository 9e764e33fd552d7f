//! Mental-poker protocol core: N mutually distrustful players jointly
//! shuffle and selectively reveal a deck without any single party learning
//! its order. ElGamal over Baby Jubjub carries the deck; Groth16 proofs
//! (verified through an opaque seam) attest that every shuffle is a
//! permutation + rerandomization and every decryption share is well-formed.

pub mod client;
pub mod crypto_serde;
pub mod curve;
pub mod deck;
pub mod game;
pub mod keys;
pub mod proof;
pub mod store;
pub mod test_support;
pub mod witness;

pub use client::{Clock, PlayerClient, TokioClock};
pub use curve::{Fq, Fs, Point};
pub use deck::{CardCiphertext, CardDeltas, CompressedDeck, Selectors};
pub use game::{
    DealAssignment, DealPolicy, Game, GameEvent, GameId, GameManager, GameSettings, GameStatus,
    ProtocolError,
};
pub use keys::{draw_keypair, KeyPair, PlayerAddress, SecretKey};
pub use proof::{CircuitId, Groth16Verifier, PackedProof, ProofVerifier};
pub use store::{GameOperation, GameStore, InMemoryGameStore, StoreError};
pub use witness::{build_shuffle_witness, DealWitness, Prover, ShuffleWitness};
