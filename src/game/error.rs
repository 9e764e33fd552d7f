use thiserror::Error;

use super::types::GameStatus;
use crate::deck::CodecError;

/// Everything the state machine can reject a write with. A rejected write
/// leaves the game untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("operation not permitted in state {state:?}")]
    InvalidState { state: GameStatus },
    #[error("caller is not the player expected to act")]
    NotYourTurn,
    #[error("public key is not a point on the curve")]
    InvalidPublicKey,
    #[error("permutation is not a bijection over the deck")]
    InvalidPermutation,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("player already submitted a share for this card")]
    DoubleDeal,
    #[error("proof rejected by the verifier")]
    ProofFailed,
    #[error("card has outstanding decryption shares")]
    CardNotFullyDecrypted,
    #[error("malformed operation: {0}")]
    Malformed(&'static str),
}
