//! Payload codecs
//!
//! The protocols only move opaque bytes; a codec turns them into the
//! caller's item type and back.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use latchkey_common::{LatchkeyError, Result};

pub trait PayloadCodec: Send + Sync + 'static {
    /// Item type; `Default` is what a freshly created record holds
    type Item: Default + Send + Sync;

    fn encode(&self, item: &Self::Item) -> Result<Bytes>;

    fn decode(&self, bytes: Bytes) -> Result<Self::Item>;
}

/// Identity codec over raw bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl PayloadCodec for RawCodec {
    type Item = Bytes;

    fn encode(&self, item: &Bytes) -> Result<Bytes> {
        Ok(item.clone())
    }

    fn decode(&self, bytes: Bytes) -> Result<Bytes> {
        Ok(bytes)
    }
}

/// JSON codec for any serde type.
///
/// An empty payload decodes to `T::default()`, so records created as
/// uninitialized read back as an empty item.
pub struct JsonCodec<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> PayloadCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<Bytes> {
        serde_json::to_vec(item)
            .map(Bytes::from)
            .map_err(|e| LatchkeyError::Codec(format!("failed to encode payload: {}", e)))
    }

    fn decode(&self, bytes: Bytes) -> Result<T> {
        if bytes.is_empty() {
            return Ok(T::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| LatchkeyError::Codec(format!("failed to decode payload: {}", e)))
    }
}
