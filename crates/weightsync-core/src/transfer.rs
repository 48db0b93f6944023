//! Typed Object Transfer Protocol
//!
//! The paired-device link only moves string-keyed maps of byte blobs. A
//! `TransferObject` is any serde type bound to a fixed routing key; the key is
//! the only thing used to demultiplex payloads on the receiving side, so keys
//! must be unique across the types that share one channel.

use std::collections::BTreeMap;
use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::TransferError;

/// Key carried by the acknowledgment payload
pub const ACK_KEY: &str = "success";

// ----------------------------------------------------------------------------
// Transfer Object Capability
// ----------------------------------------------------------------------------

/// A payload type that can cross the paired-device link
pub trait TransferObject: Serialize + DeserializeOwned + Send + 'static {
    /// Routing key this type is sent under
    const ROUTING_KEY: &'static str;

    /// Encode to the JSON bytes placed under the routing key
    fn encode(&self) -> Result<Vec<u8>, TransferError> {
        serde_json::to_vec(self).map_err(|source| TransferError::Encode {
            key: Self::ROUTING_KEY,
            source,
        })
    }

    /// Decode from bytes found under the routing key
    fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
        serde_json::from_slice(bytes).map_err(|source| TransferError::Decode {
            key: Self::ROUTING_KEY,
            source,
        })
    }

    /// Wrap this object as a single-key message payload
    fn to_payload(&self) -> Result<Payload, TransferError> {
        Ok(Payload::single(Self::ROUTING_KEY, self.encode()?))
    }

    /// Extract and decode this type from a payload
    ///
    /// `None` when the payload does not carry this type's key.
    fn from_payload(payload: &Payload) -> Option<Result<Self, TransferError>> {
        payload.get(Self::ROUTING_KEY).map(Self::decode)
    }
}

// ----------------------------------------------------------------------------
// Generic Message Payload
// ----------------------------------------------------------------------------

/// Generic message exchanged over the link: routing key → bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(BTreeMap<String, Vec<u8>>);

impl Payload {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Payload carrying exactly one entry
    pub fn single(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mut payload = Self::new();
        payload.insert(key, bytes);
        payload
    }

    /// The reply sent back for every inbound interactive message
    pub fn acknowledgment() -> Self {
        Self::single(ACK_KEY, b"true".to_vec())
    }

    pub fn is_acknowledgment(&self) -> bool {
        self.get(ACK_KEY) == Some(b"true".as_slice())
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.0.insert(key.into(), bytes)
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, bytes)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {} bytes", key, bytes.len())?;
        }
        write!(f, "}}")
    }
}

// ----------------------------------------------------------------------------
// Routing Registry
// ----------------------------------------------------------------------------

/// Classification of one payload entry against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    /// Registered key whose bytes decode as the registered type
    Decodable,
    /// Registered key whose bytes do not decode
    Malformed,
    /// Key no registered type claims
    Unknown,
}

#[derive(Clone, Copy)]
struct RegistryEntry {
    type_name: &'static str,
    decodes: fn(&[u8]) -> bool,
}

fn decodes_as<T: TransferObject>(bytes: &[u8]) -> bool {
    T::decode(bytes).is_ok()
}

/// Closed set of transfer types known to one channel, keyed by routing key
#[derive(Clone, Default)]
pub struct TransferRegistry {
    entries: BTreeMap<&'static str, RegistryEntry>,
}

impl fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, entry)| (key, entry.type_name)))
            .finish()
    }
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transfer type; fails if another type already owns its key
    pub fn register<T: TransferObject>(&mut self) -> Result<(), TransferError> {
        let incoming = std::any::type_name::<T>();
        if let Some(existing) = self.entries.get(T::ROUTING_KEY) {
            if existing.type_name == incoming {
                return Ok(());
            }
            return Err(TransferError::RoutingKeyCollision {
                key: T::ROUTING_KEY,
                existing: existing.type_name,
                incoming,
            });
        }
        self.entries.insert(
            T::ROUTING_KEY,
            RegistryEntry {
                type_name: incoming,
                decodes: decodes_as::<T>,
            },
        );
        Ok(())
    }

    /// Builder-style registration
    pub fn with<T: TransferObject>(mut self) -> Result<Self, TransferError> {
        self.register::<T>()?;
        Ok(self)
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn routing_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify every entry of a payload
    pub fn inspect<'a>(&self, payload: &'a Payload) -> Vec<(&'a str, RouteStatus)> {
        payload
            .0
            .iter()
            .map(|(key, bytes)| {
                let status = match self.entries.get(key.as_str()) {
                    Some(entry) if (entry.decodes)(bytes.as_slice()) => RouteStatus::Decodable,
                    Some(_) => RouteStatus::Malformed,
                    None => RouteStatus::Unknown,
                };
                (key.as_str(), status)
            })
            .collect()
    }
}
