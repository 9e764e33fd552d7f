//! Player key material and joint-key aggregation.
//!
//! Every player draws an independent keypair; the joint encryption key is
//! the point sum of all public keys, so removing every player's share is
//! required to decrypt: `pk_agg = Σ pk_i = (Σ sk_i)·G`.

use std::fmt;

use ark_ff::Zero;
use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto_serde::canonical_serialize_hex;
use crate::curve::{self, CurveError, Fs, Point, BASE8};

/// A player's secret scalar. Never serialized; wiped on drop.
#[derive(Clone)]
pub struct SecretKey(Fs);

impl SecretKey {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        SecretKey(curve::random_scalar(rng))
    }

    pub fn public_key(&self) -> Point {
        BASE8.mul(&self.0)
    }

    pub fn expose(&self) -> &Fs {
        &self.0
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.0 = Fs::zero();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: Point,
}

impl KeyPair {
    pub fn address(&self) -> PlayerAddress {
        PlayerAddress::derive(&self.public)
    }
}

/// Draw a fresh keypair: `sk` uniform in the scalar field, `pk = sk·G`.
pub fn draw_keypair<R: Rng>(rng: &mut R) -> KeyPair {
    let secret = SecretKey::random(rng);
    let public = secret.public_key();
    KeyPair { secret, public }
}

/// Left-fold the players' public keys into the joint key, re-verifying that
/// each one is on the curve.
pub fn aggregate_public_keys(keys: &[Point]) -> Result<Point, CurveError> {
    let mut aggregated = Point::IDENTITY;
    for key in keys {
        if !key.is_on_curve() {
            return Err(CurveError::NotOnCurve);
        }
        aggregated = aggregated.add(key);
    }
    Ok(aggregated)
}

/// 20-byte caller identity, derived from a public key Ethereum-style: the
/// trailing bytes of the Keccak-256 of the point's canonical encoding.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerAddress(pub [u8; 20]);

impl PlayerAddress {
    pub fn derive(public_key: &Point) -> Self {
        let encoded = canonical_serialize_hex(public_key)
            .expect("points serialize to a byte vector infallibly");
        let digest = Keccak256::digest(encoded.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        PlayerAddress(bytes)
    }
}

impl fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for PlayerAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for PlayerAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let stripped = encoded.strip_prefix("0x").unwrap_or(&encoded);
        let bytes = hex::decode(stripped).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("player address must be 20 bytes"))?;
        Ok(PlayerAddress(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::test_rng;

    #[test]
    fn aggregated_key_equals_the_key_of_summed_secrets() {
        let mut rng = test_rng();
        let pairs: Vec<KeyPair> = (0..3).map(|_| draw_keypair(&mut rng)).collect();
        let publics: Vec<Point> = pairs.iter().map(|p| p.public).collect();
        let aggregated = aggregate_public_keys(&publics).unwrap();

        let combined_secret = pairs
            .iter()
            .fold(Fs::zero(), |acc, pair| acc + pair.secret.expose());
        assert_eq!(aggregated, BASE8.mul(&combined_secret));
    }

    #[test]
    fn aggregation_rejects_off_curve_keys() {
        let mut rng = test_rng();
        let mut bad = draw_keypair(&mut rng).public;
        bad.x += crate::curve::Fq::from(1u64);
        assert_eq!(
            aggregate_public_keys(&[bad]),
            Err(CurveError::NotOnCurve)
        );
    }

    #[test]
    fn addresses_are_stable_and_distinct() {
        let mut rng = test_rng();
        let a = draw_keypair(&mut rng);
        let b = draw_keypair(&mut rng);
        assert_eq!(a.address(), PlayerAddress::derive(&a.public));
        assert_ne!(a.address(), b.address());
    }
}
