//! Metadata attached to archives and entries
//!
//! The engine treats metadata as an opaque blob. Encoding structured values
//! into that blob is delegated to `serde_json`, so any `Serialize` type can
//! be attached and read back as any compatible `Deserialize` type.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialized metadata value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    /// Serialize a structured value
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_vec(value)?))
    }

    /// Deserialize into a structured value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    /// Wrap raw bytes read from a manifest
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
