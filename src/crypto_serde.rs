//! Serde helpers for arkworks types, encoded as 0x-prefixed hex strings of
//! their canonical compressed bytes.

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serializer};

pub fn canonical_serialize_hex<T>(value: &T) -> Result<String, ark_serialize::SerializationError>
where
    T: CanonicalSerialize,
{
    let mut buf = Vec::new();
    value.serialize_compressed(&mut buf)?;
    Ok(format!("0x{}", hex::encode(buf)))
}

pub fn canonical_deserialize_hex<T>(encoded: &str) -> anyhow::Result<T>
where
    T: CanonicalDeserialize,
{
    let stripped = encoded.strip_prefix("0x").unwrap_or(encoded);
    let bytes = hex::decode(stripped)?;
    let value = T::deserialize_compressed(&mut bytes.as_slice())?;
    Ok(value)
}

/// Serde adapter for a single canonical-serializable value.
pub mod field {
    use super::*;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let encoded = canonical_serialize_hex(value).map_err(SerError::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        canonical_deserialize_hex(&encoded).map_err(DeError::custom)
    }
}

/// Serde adapter for vectors of canonical-serializable values.
pub mod field_vec {
    use super::*;

    pub fn serialize<T, S>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let encoded: Vec<String> = values
            .iter()
            .map(canonical_serialize_hex)
            .collect::<Result<_, _>>()
            .map_err(SerError::custom)?;
        serde::Serialize::serialize(&encoded, serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|entry| canonical_deserialize_hex(entry).map_err(DeError::custom))
            .collect()
    }
}
