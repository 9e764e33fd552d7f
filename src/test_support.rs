//! Deterministic stand-in proof system for tests and demos.
//!
//! The mock prover tags the public signals with a Keccak digest packed into
//! the first two proof elements; the mock verifier recomputes the tag. Any
//! tampering with the submitted deck, share or signals after proving makes
//! the tag mismatch, which exercises the same rejection paths a real
//! Groth16 verifier would.

use ark_ff::{PrimeField, Zero};
use ark_serialize::CanonicalSerialize;
use sha3::{Digest, Keccak256};

use crate::curve::Fq;
use crate::proof::{CircuitId, PackedProof, ProofFq, ProofVerifier};
use crate::witness::{DealWitness, Prover, ProverError, ShuffleWitness};

/// Bind a circuit id and signal vector into a packed-proof-shaped tag.
pub fn tag_proof(circuit: CircuitId, public_signals: &[Fq]) -> PackedProof {
    let mut hasher = Keccak256::new();
    hasher.update(match circuit {
        CircuitId::Shuffle => &b"shuffle"[..],
        CircuitId::Decrypt => &b"decrypt"[..],
    });
    for signal in public_signals {
        let mut buf = Vec::new();
        signal
            .serialize_compressed(&mut buf)
            .expect("field elements serialize infallibly");
        hasher.update(&buf);
    }
    let digest = hasher.finalize();
    let mut elements = [ProofFq::zero(); PackedProof::NUM_ELEMENTS];
    elements[0] = ProofFq::from_le_bytes_mod_order(&digest[..16]);
    elements[1] = ProofFq::from_le_bytes_mod_order(&digest[16..]);
    PackedProof::new(elements)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MockProver;

impl Prover for MockProver {
    fn prove_shuffle(&self, witness: &ShuffleWitness) -> Result<PackedProof, ProverError> {
        Ok(tag_proof(
            CircuitId::Shuffle,
            &witness.public_signals().to_vec(),
        ))
    }

    fn prove_decrypt(&self, witness: &DealWitness) -> Result<PackedProof, ProverError> {
        Ok(tag_proof(
            CircuitId::Decrypt,
            &witness.public_signals().to_vec(),
        ))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MockVerifier;

impl ProofVerifier for MockVerifier {
    fn verify(&self, circuit: CircuitId, proof: &PackedProof, public_signals: &[Fq]) -> bool {
        tag_proof(circuit, public_signals) == *proof
    }
}

/// Verifier that accepts everything. For tests that only exercise guard
/// logic and never tamper with submissions.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllVerifier;

impl ProofVerifier for AcceptAllVerifier {
    fn verify(&self, _circuit: CircuitId, _proof: &PackedProof, _public_signals: &[Fq]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;

    #[test]
    fn tags_commit_to_circuit_and_signals() {
        let signals = vec![Fq::one(), Fq::from(2u64)];
        let proof = tag_proof(CircuitId::Shuffle, &signals);
        assert!(MockVerifier.verify(CircuitId::Shuffle, &proof, &signals));
        assert!(!MockVerifier.verify(CircuitId::Decrypt, &proof, &signals));
        assert!(!MockVerifier.verify(CircuitId::Shuffle, &proof, &[Fq::one()]));
    }
}
