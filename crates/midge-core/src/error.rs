//! Error types for the broker core.

use thiserror::Error;

/// Failures surfaced by the codec, datastore, and dispatcher.
///
/// `TransportDead` is terminal for the connection that raised it: the host
/// must tear the connection down and purge its observers. The other kinds
/// leave the stream aligned (the packet drop drains any unread body), so
/// the host may keep serving the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport failed a read or write.
    #[error("connection lost: {0}")]
    TransportDead(&'static str),

    /// A packet header or body failed to parse.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// The peer asked for something outside the implemented subset.
    #[error("unsupported: {0}")]
    UnsupportedFeature(&'static str),

    /// Lookup of a key with no stored value.
    #[error("no entry for key")]
    KeyMissing,
}

pub type Result<T> = std::result::Result<T, Error>;
