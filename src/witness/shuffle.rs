//! Shuffle-turn witness: permutation + rerandomization over a compressed
//! deck, computed bit-exactly the way the shuffle circuit computes it.

use ark_std::rand::seq::SliceRandom;
use ark_std::rand::Rng;

use super::WitnessError;
use crate::curve::{self, Fq, Fs, Point};
use crate::deck::{CardCiphertext, CompressedDeck, Selectors};
use crate::game::ShuffleSubmission;
use crate::proof::ShufflePublicSignals;

const LOG_TARGET: &str = "zk_shuffle::witness";

/// Full private witness of one shuffle turn. The `input_delta`/`output_delta`
/// vectors hold the decompressed y-coordinates the circuit consumes; the
/// selector words travel unchanged.
#[derive(Clone, Debug)]
pub struct ShuffleWitness {
    pub nonce: Fq,
    pub aggregated_pk: Point,
    pub permutation: Vec<usize>,
    pub randomness: Vec<Fs>,
    pub input_x0: Vec<Fq>,
    pub input_x1: Vec<Fq>,
    pub input_delta0: Vec<Fq>,
    pub input_delta1: Vec<Fq>,
    pub input_selectors: Selectors,
    pub output_x0: Vec<Fq>,
    pub output_x1: Vec<Fq>,
    pub output_delta0: Vec<Fq>,
    pub output_delta1: Vec<Fq>,
    pub output_selectors: Selectors,
}

impl ShuffleWitness {
    pub fn num_cards(&self) -> usize {
        self.input_x0.len()
    }

    /// The signals the proof will be checked against.
    pub fn public_signals(&self) -> ShufflePublicSignals {
        ShufflePublicSignals {
            nonce: self.nonce,
            aggregated_pk: self.aggregated_pk,
            input_x0: self.input_x0.clone(),
            input_x1: self.input_x1.clone(),
            output_x0: self.output_x0.clone(),
            output_x1: self.output_x1.clone(),
            input_selectors: self.input_selectors,
            output_selectors: self.output_selectors,
        }
    }

    /// The deck update submitted alongside the proof.
    pub fn submission(&self) -> ShuffleSubmission {
        let (selector0, selector1) = self.output_selectors.to_field();
        ShuffleSubmission {
            x0: self.output_x0.clone(),
            x1: self.output_x1.clone(),
            selector0,
            selector1,
        }
    }
}

/// Uniform permutation of `[0, n)` (Fisher–Yates).
pub fn sample_permutation<R: Rng>(num_cards: usize, rng: &mut R) -> Vec<usize> {
    let mut permutation: Vec<usize> = (0..num_cards).collect();
    permutation.shuffle(rng);
    permutation
}

/// Uniform rerandomization scalars, one per card.
pub fn sample_randomness<R: Rng>(num_cards: usize, rng: &mut R) -> Vec<Fs> {
    (0..num_cards).map(|_| curve::random_scalar(rng)).collect()
}

fn validate_permutation(permutation: &[usize], num_cards: usize) -> Result<(), WitnessError> {
    if permutation.len() != num_cards {
        return Err(WitnessError::InvalidPermutation);
    }
    let mut seen = vec![false; num_cards];
    for &slot in permutation {
        if slot >= num_cards || seen[slot] {
            return Err(WitnessError::InvalidPermutation);
        }
        seen[slot] = true;
    }
    Ok(())
}

/// Build the witness for one shuffle turn. Output slot `j` carries input
/// card `permutation[j]` under a fresh encryption layer:
/// `V[j] = (U_c0 + r·G, U_c1 + r·pk_agg)` with `r = randomness[j]`.
#[tracing::instrument(target = LOG_TARGET, skip_all, fields(num_cards = deck.num_cards()))]
pub fn build_shuffle_witness(
    nonce: Fq,
    deck: &CompressedDeck,
    permutation: &[usize],
    randomness: &[Fs],
    aggregated_pk: &Point,
) -> Result<ShuffleWitness, WitnessError> {
    let num_cards = deck.num_cards();
    validate_permutation(permutation, num_cards)?;
    if randomness.len() != num_cards {
        return Err(WitnessError::RandomnessLength {
            expected: num_cards,
            actual: randomness.len(),
        });
    }

    let input_cards = deck.decompress()?;
    let output_cards: Vec<CardCiphertext> = permutation
        .iter()
        .zip(randomness)
        .map(|(&source, r)| input_cards[source].rerandomize(r, aggregated_pk))
        .collect();
    let output = CompressedDeck::compress(&output_cards);

    Ok(ShuffleWitness {
        nonce,
        aggregated_pk: *aggregated_pk,
        permutation: permutation.to_vec(),
        randomness: randomness.to_vec(),
        input_x0: deck.x0.clone(),
        input_x1: deck.x1.clone(),
        input_delta0: input_cards.iter().map(|card| card.c0.y).collect(),
        input_delta1: input_cards.iter().map(|card| card.c1.y).collect(),
        input_selectors: deck.selectors,
        output_x0: output.x0,
        output_x1: output.x1,
        output_delta0: output_cards.iter().map(|card| card.c0.y).collect(),
        output_delta1: output_cards.iter().map(|card| card.c1.y).collect(),
        output_selectors: output.selectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{find_card, initial_deck};
    use crate::keys::{aggregate_public_keys, draw_keypair};
    use crate::proof::game_nonce;
    use ark_std::test_rng;

    #[test]
    fn malformed_permutations_are_rejected() {
        let deck = initial_deck(4);
        let r = sample_randomness(4, &mut test_rng());
        let pk = crate::curve::BASE8;
        for bad in [vec![0, 1, 2], vec![0, 1, 2, 2], vec![0, 1, 2, 4]] {
            assert_eq!(
                build_shuffle_witness(game_nonce(1), &deck, &bad, &r, &pk).unwrap_err(),
                WitnessError::InvalidPermutation
            );
        }
    }

    #[test]
    fn shuffled_deck_still_decrypts_to_the_original_cards() {
        let mut rng = test_rng();
        let num_cards = 6;
        let pairs = [draw_keypair(&mut rng), draw_keypair(&mut rng)];
        let aggregated =
            aggregate_public_keys(&[pairs[0].public, pairs[1].public]).unwrap();

        let mut deck = initial_deck(num_cards);
        for _ in 0..pairs.len() {
            let permutation = sample_permutation(num_cards, &mut rng);
            let randomness = sample_randomness(num_cards, &mut rng);
            let witness =
                build_shuffle_witness(game_nonce(1), &deck, &permutation, &randomness, &aggregated)
                    .unwrap();
            deck = CompressedDeck {
                x0: witness.output_x0.clone(),
                x1: witness.output_x1.clone(),
                selectors: witness.output_selectors,
            };
        }

        let mut recovered: Vec<usize> = deck
            .decompress()
            .unwrap()
            .iter()
            .map(|card| {
                let mut c1 = card.c1;
                for pair in &pairs {
                    c1 = c1.sub(&card.c0.mul(pair.secret.expose()));
                }
                find_card(&c1, num_cards).expect("decrypted point is a card")
            })
            .collect();
        recovered.sort_unstable();
        assert_eq!(recovered, (0..num_cards).collect::<Vec<_>>());
    }
}
