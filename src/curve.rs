//! Baby Jubjub twisted-Edwards arithmetic in the coordinate form used by the
//! shuffle and decrypt circuits.
//!
//! The base field is the BN254 scalar field (`ark_ed_on_bn254::Fq`), so
//! every coordinate doubles as a circuit signal. Points are kept in the
//! `a = 168700` form of the curve rather than the scaled `a = 1` form the
//! arkworks curve config uses; the two are isomorphic but produce different
//! coordinates, and the proving keys pin this one.

use ark_ff::{BigInteger, Field, MontFp, One, PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base field of the curve, `Q = 21888242871839275222246405745257275088548364400416034343698204186575808495617`.
pub type Fq = ark_ed_on_bn254::Fq;
/// Scalar field of the prime-order subgroup.
pub type Fs = ark_ed_on_bn254::Fr;

/// `A` coefficient of `A·x² + y² = 1 + D·x²·y²`.
pub const COEFF_A: Fq = MontFp!("168700");
/// `D` coefficient of the curve equation.
pub const COEFF_D: Fq = MontFp!("168696");

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    #[error("point is not on the curve")]
    NotOnCurve,
    #[error("scalar is not below the subgroup order")]
    InvalidScalar,
}

/// Affine Baby Jubjub point.
///
/// `(0, 0)` is the identity sentinel used on the wire; arithmetic treats it
/// as the neutral element and normalizes the group-theoretic neutral
/// `(0, 1)` back to it, so the identity has a single representation.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    CanonicalSerialize,
    CanonicalDeserialize,
)]
pub struct Point {
    #[serde(with = "crate::crypto_serde::field")]
    pub x: Fq,
    #[serde(with = "crate::crypto_serde::field")]
    pub y: Fq,
}

/// Generator of the prime-order subgroup (`Base8`).
pub const BASE8: Point = Point {
    x: MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553"),
    y: MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203"),
};

impl Point {
    pub const IDENTITY: Point = Point {
        x: MontFp!("0"),
        y: MontFp!("0"),
    };

    /// Admit an externally supplied point, rejecting anything off the curve
    /// (including the identity sentinel, which does not satisfy the curve
    /// equation).
    pub fn new(x: Fq, y: Fq) -> Result<Self, CurveError> {
        if !on_curve(x, y) {
            return Err(CurveError::NotOnCurve);
        }
        Ok(Self { x, y })
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }

    pub fn is_on_curve(&self) -> bool {
        on_curve(self.x, self.y)
    }

    /// Complete twisted-Edwards addition with the `(0, 0)` sentinel folded in.
    pub fn add(&self, other: &Point) -> Point {
        if self.is_identity() {
            return *other;
        }
        if other.is_identity() {
            return *self;
        }
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let dxxyy = COEFF_D * x1x2 * y1y2;
        let x3 = (self.x * other.y + self.y * other.x)
            * (Fq::one() + dxxyy)
                .inverse()
                .expect("complete twisted Edwards addition has nonzero denominators");
        let y3 = (y1y2 - COEFF_A * x1x2)
            * (Fq::one() - dxxyy)
                .inverse()
                .expect("complete twisted Edwards addition has nonzero denominators");
        Self::normalize(Point { x: x3, y: y3 })
    }

    pub fn neg(&self) -> Point {
        if self.is_identity() {
            return *self;
        }
        Point {
            x: -self.x,
            y: self.y,
        }
    }

    pub fn sub(&self, other: &Point) -> Point {
        self.add(&other.neg())
    }

    /// Double-and-add from the least significant bit of `scalar`.
    pub fn mul(&self, scalar: &Fs) -> Point {
        let mut acc = Point::IDENTITY;
        let mut base = *self;
        for bit in scalar.into_bigint().to_bits_le() {
            if bit {
                acc = acc.add(&base);
            }
            base = base.add(&base);
        }
        acc
    }

    fn normalize(point: Point) -> Point {
        if point.x.is_zero() && point.y.is_one() {
            Point::IDENTITY
        } else {
            point
        }
    }
}

/// `A·x² + y² == 1 + D·x²·y²`.
pub fn on_curve(x: Fq, y: Fq) -> bool {
    let xx = x.square();
    let yy = y.square();
    COEFF_A * xx + yy == Fq::one() + COEFF_D * xx * yy
}

/// Admit a base-field element as a subgroup scalar. Values at or above the
/// subgroup order are rejected rather than silently reduced.
pub fn scalar_from_base(value: Fq) -> Result<Fs, CurveError> {
    Fs::from_bigint(value.into_bigint()).ok_or(CurveError::InvalidScalar)
}

/// Embed a subgroup scalar into the base field for use as a circuit signal.
pub fn scalar_to_base(scalar: &Fs) -> Fq {
    Fq::from_bigint(scalar.into_bigint())
        .expect("the subgroup order is smaller than the base field modulus")
}

/// Whether `y` is the canonical representative of `±y`, i.e. `y ≤ (Q−1)/2`.
pub fn is_canonical(y: &Fq) -> bool {
    y.into_bigint() <= Fq::MODULUS_MINUS_ONE_DIV_TWO
}

/// Uniform subgroup scalar.
pub fn random_scalar<R: Rng>(rng: &mut R) -> Fs {
    Fs::rand(rng)
}
