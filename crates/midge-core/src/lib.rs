//! midge-core - the embeddable broker core.
//!
//! A minimal MQTT-compatible publish/subscribe engine for small
//! sensor/actuator fleets: a streaming wire codec for the MQTT 3.x subset
//! (CONNECT, QoS 0 PUBLISH, single-topic SUBSCRIBE, PINGREQ, DISCONNECT),
//! a last-value datastore keyed by topic, and a dispatch server that wires
//! the two together.
//!
//! The core performs no I/O of its own. Everything is generic over the
//! [`Connection`] transport contract and the [`Clock`], so the same engine
//! runs against a TCP socket, an embedded network stack, or an in-memory
//! buffer in tests.

pub mod clock;
pub mod connection;
pub mod datastore;
pub mod error;
pub mod key;
pub mod packet;
pub mod server;
pub mod varint;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::Clock;
pub use connection::{Connection, ConnectionType};
pub use datastore::{DataStore, Entry, Observer};
pub use error::{Error, Result};
pub use key::{Matcher, PackedKey, StringKey, TopicKey};
pub use packet::{Packet, PacketType};
pub use server::Server;
