//! Payload encode/decode boundary.
//!
//! The stores treat `data` as opaque JSON. Callers map it to their own types
//! here, either one type at a time through [`Payload`], or through a
//! [`PayloadRegistry`] that picks a decoder from the record's `type` field
//! when one actor type stores several payload shapes.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A Rust type stored as a record payload under a stable type name.
pub trait Payload: Serialize + DeserializeOwned {
    /// Name written to the record's `type` field.
    const TYPE: &'static str;
}

/// Errors crossing the payload boundary.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Failed to encode payload {type_name}: {source}")]
    Encode {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode payload {type_name}: {source}")]
    Decode {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Payload type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("No decoder registered for payload type {0}")]
    Unregistered(String),
}

/// Encode a payload to its stored JSON form.
pub fn encode<P: Serialize + ?Sized>(type_name: &str, payload: &P) -> Result<Value, PayloadError> {
    serde_json::to_value(payload).map_err(|source| PayloadError::Encode {
        type_name: type_name.to_string(),
        source,
    })
}

/// Decode stored JSON into `P`, without checking the record type.
pub fn decode<P: DeserializeOwned>(type_name: &str, data: &Value) -> Result<P, PayloadError> {
    P::deserialize(data).map_err(|source| PayloadError::Decode {
        type_name: type_name.to_string(),
        source,
    })
}

/// Decode stored JSON into `P` after checking the record type is `P::TYPE`.
pub fn decode_typed<P: Payload>(record_type: &str, data: &Value) -> Result<P, PayloadError> {
    if record_type != P::TYPE {
        return Err(PayloadError::TypeMismatch {
            expected: P::TYPE.to_string(),
            found: record_type.to_string(),
        });
    }
    decode(record_type, data)
}

type Decoder<T> = Box<dyn Fn(&Value) -> Result<T, PayloadError> + Send + Sync>;

/// Decoders keyed by record type, all producing one target type `T`
/// (typically an enum of the actor's events or commands).
pub struct PayloadRegistry<T> {
    decoders: HashMap<String, Decoder<T>>,
}

impl<T: 'static> PayloadRegistry<T> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `P` under `P::TYPE`, converting into `T` after decoding.
    pub fn register<P>(self) -> Self
    where
        P: Payload + Into<T> + 'static,
    {
        self.register_with(P::TYPE, |data| decode::<P>(P::TYPE, data).map(Into::into))
    }

    /// Register a custom decoder (e.g. an upcaster for a renamed type).
    pub fn register_with<F>(mut self, type_name: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&Value) -> Result<T, PayloadError> + Send + Sync + 'static,
    {
        self.decoders.insert(type_name.into(), Box::new(decoder));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    pub fn decode(&self, type_name: &str, data: &Value) -> Result<T, PayloadError> {
        let decoder = self
            .decoders
            .get(type_name)
            .ok_or_else(|| PayloadError::Unregistered(type_name.to_string()))?;
        decoder(data)
    }
}

impl<T: 'static> Default for PayloadRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PayloadRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("PayloadRegistry")
            .field("types", &types)
            .finish()
    }
}
