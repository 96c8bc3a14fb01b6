//! Message registry (§4.3): a tagged union over a `Message` base trait.
//!
//! Variants are registered by type, in the order the caller registers them;
//! the first registration gets tag 1. Re-registering an already-present
//! variant (by `TypeId`) is a no-op. The registry is built once at startup
//! and frozen before any connection is accepted (§5): reads and writes both
//! take the `RwLock`, but in steady state only reads happen.

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::RwLock;

use wincode::{Decode, Encode};
use wincode_derive::{Decode as DeriveDecode, Encode as DeriveEncode};

use crate::error::RegistryError;

const TAG_LEN: usize = 4;

pub trait Message: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Returned by [`MessageRegistry::decode`] when the wire tag doesn't match
/// any registered variant. Registered at construction so it always has a
/// slot in the table, independent of whatever tag it ends up standing in for.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEncode, DeriveDecode)]
pub struct UnknownMessage {
    pub tag: u32,
    pub body: Vec<u8>,
}

impl Message for UnknownMessage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type EncodeFn = fn(&dyn Any) -> Vec<u8>;
type DecodeFn = fn(&[u8]) -> Option<Box<dyn Message>>;

struct VariantEntry {
    type_id: TypeId,
    tag: u32,
    encode: EncodeFn,
    decode: DecodeFn,
}

struct Inner {
    variants: Vec<VariantEntry>,
    next_tag: u32,
}

pub struct MessageRegistry {
    inner: RwLock<Inner>,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRegistry {
    pub fn new() -> Self {
        let registry = Self { inner: RwLock::new(Inner { variants: Vec::new(), next_tag: 0 }) };
        registry.register::<UnknownMessage>();
        registry
    }

    /// Assigns the next tag to `T` unless it is already registered.
    pub fn register<T>(&self)
    where
        T: Message + Encode + Decode + 'static,
    {
        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.variants.iter().any(|v| v.type_id == type_id) {
            return;
        }

        inner.next_tag += 1;
        let tag = inner.next_tag;

        let encode: EncodeFn = |msg| {
            let concrete = msg.downcast_ref::<T>().expect("registry encode called with wrong type");
            wincode::to_vec(concrete).unwrap_or_default()
        };
        let decode: DecodeFn =
            |bytes| wincode::from_slice::<T>(bytes).ok().map(|v| Box::new(v) as Box<dyn Message>);

        inner.variants.push(VariantEntry { type_id, tag, encode, decode });
    }

    /// `⟨tag: u32-LE⟩ ⟨field-tagged body⟩`. Panics if `msg`'s concrete type
    /// was never registered — the registry must be frozen and populated
    /// before any message reaches this path.
    pub fn encode(&self, msg: &dyn Message) -> Vec<u8> {
        let type_id = msg.as_any().type_id();
        let inner = self.inner.read().expect("registry lock poisoned");
        let entry = inner
            .variants
            .iter()
            .find(|v| v.type_id == type_id)
            .unwrap_or_else(|| panic!("message type {type_id:?} was never registered"));

        let body = (entry.encode)(msg.as_any());
        let mut out = Vec::with_capacity(TAG_LEN + body.len());
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Unknown tags, and bodies that fail to decode against a known tag's
    /// schema, both fall back to [`UnknownMessage`] rather than erroring —
    /// only a truncated tag frame is a hard error.
    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Message>, RegistryError> {
        if bytes.len() < TAG_LEN {
            return Err(RegistryError::TruncatedTag(bytes.len()));
        }

        let tag = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let body = &bytes[TAG_LEN..];

        let inner = self.inner.read().expect("registry lock poisoned");
        if let Some(entry) = inner.variants.iter().find(|v| v.tag == tag) {
            if let Some(msg) = (entry.decode)(body) {
                return Ok(msg);
            }
        }

        Ok(Box::new(UnknownMessage { tag, body: body.to_vec() }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, DeriveEncode, DeriveDecode)]
    struct Ping {
        seq: u32,
    }

    impl Message for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, DeriveEncode, DeriveDecode)]
    struct Pong {
        seq: u32,
    }

    impl Message for Pong {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn tags_start_at_one_after_the_sentinel() {
        let registry = MessageRegistry::new();
        registry.register::<Ping>();
        registry.register::<Pong>();

        let ping_tag = u32::from_le_bytes(registry.encode(&Ping { seq: 1 })[..4].try_into().unwrap());
        let pong_tag = u32::from_le_bytes(registry.encode(&Pong { seq: 1 })[..4].try_into().unwrap());
        assert_eq!(ping_tag, 2);
        assert_eq!(pong_tag, 3);
    }

    #[test]
    fn re_registration_is_idempotent() {
        let registry = MessageRegistry::new();
        registry.register::<Ping>();
        let tag_before = u32::from_le_bytes(registry.encode(&Ping { seq: 0 })[..4].try_into().unwrap());
        registry.register::<Ping>();
        registry.register::<Ping>();
        let tag_after = u32::from_le_bytes(registry.encode(&Ping { seq: 0 })[..4].try_into().unwrap());
        assert_eq!(tag_before, tag_after);
    }

    #[test]
    fn roundtrip_through_encode_decode() {
        let registry = MessageRegistry::new();
        registry.register::<Ping>();

        let wire = registry.encode(&Ping { seq: 42 });
        let decoded = registry.decode(&wire).unwrap();
        let ping = decoded.as_any().downcast_ref::<Ping>().unwrap();
        assert_eq!(*ping, Ping { seq: 42 });
    }

    #[test]
    fn unknown_tag_falls_back_to_sentinel() {
        let registry = MessageRegistry::new();
        registry.register::<Ping>();

        let mut wire = 999u32.to_le_bytes().to_vec();
        wire.extend_from_slice(b"garbage");
        let decoded = registry.decode(&wire).unwrap();
        let unknown = decoded.as_any().downcast_ref::<UnknownMessage>().unwrap();
        assert_eq!(unknown.tag, 999);
        assert_eq!(unknown.body, b"garbage");
    }

    #[test]
    fn truncated_tag_is_an_error() {
        let registry = MessageRegistry::new();
        let err = registry.decode(&[1, 2]).unwrap_err();
        assert_eq!(err, RegistryError::TruncatedTag(2));
    }
}
