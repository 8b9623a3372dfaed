//! Binary persistence of protocol keys as `<path>.key.bin` files.
//!
//! Key layouts are length-prefixed and fixed-width; an outer key cannot be
//! parsed without knowing the shape of its nested keys, so deserialization
//! always takes the parameter object the key was generated for.

use anyhow::{Context, Result};

use crate::errors::ProtocolError;

/// Byte codec implemented by every protocol key.
pub trait KeyCodec: Sized {
    /// Parameter object needed to parse a key of this type.
    type Params;

    /// Append the canonical byte encoding to `buffer`.
    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()>;

    /// Exact byte length [serialize](Self::serialize) will produce.
    fn serialized_size(&self) -> usize;

    /// Parse a key back; returns the key and the bytes consumed.
    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)>;
}

/// Persist a key.
pub fn save_key<K: KeyCodec>(file_path: &str, key: &K) -> Result<()> {
    let full_path = format!("{}.key.bin", file_path);
    let mut buffer = Vec::with_capacity(key.serialized_size());
    key.serialize(&mut buffer)?;
    if buffer.len() != key.serialized_size() {
        return Err(ProtocolError::Serialization(format!(
            "key serialized {} bytes, expected {}",
            buffer.len(),
            key.serialized_size()
        ))
        .into());
    }
    std::fs::write(&full_path, &buffer)
        .with_context(|| format!("saving key to {} @{}:{}", full_path, file!(), line!()))?;
    Ok(())
}

/// Load a key previously written by [save_key].
pub fn load_key<K: KeyCodec>(params: &K::Params, file_path: &str) -> Result<K> {
    let full_path = format!("{}.key.bin", file_path);
    let buffer = std::fs::read(&full_path)
        .with_context(|| format!("loading key from {} @{}:{}", full_path, file!(), line!()))?;
    if buffer.is_empty() {
        return Err(
            ProtocolError::Serialization(format!("loaded buffer is empty: {}", full_path)).into(),
        );
    }
    let (key, consumed) = K::deserialize(params, &buffer)?;
    if consumed != buffer.len() {
        return Err(ProtocolError::Serialization(format!(
            "key file {} has {} trailing bytes",
            full_path,
            buffer.len() - consumed
        ))
        .into());
    }
    Ok(key)
}
