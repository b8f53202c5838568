//! Transport contract consumed by the packet codec.

use crate::error::Result;

/// Chunk size for the default [`Connection::drain`] implementation.
const DRAIN_CHUNK: usize = 512;

/// Protocol revision negotiated during CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionType {
    #[default]
    Unknown = 0,
    Mqtt31 = 1,
    Mqtt311 = 2,
    Mqtt5 = 3,
}

impl ConnectionType {
    /// Inverse of `self as u8`, for transports that share the negotiated
    /// revision across handles as a plain byte.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ConnectionType::Mqtt31,
            2 => ConnectionType::Mqtt311,
            3 => ConnectionType::Mqtt5,
            _ => ConnectionType::Unknown,
        }
    }
}

/// Byte-oriented transport the broker core reads and writes.
///
/// Implementations are blocking: `read` fills the whole buffer or fails,
/// retrying transient conditions (would-block, timeout) internally. The
/// core imposes no timeouts of its own; keep-alive enforcement belongs to
/// the host.
pub trait Connection {
    /// Fill `buf` completely, or fail with [`crate::Error::TransportDead`]
    /// on peer disconnect or a permanent I/O error.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf`, or fail.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Write that the transport is free to split. Used when a packet
    /// header is emitted separately from a payload that follows it.
    fn write_partial(&mut self, buf: &[u8]) -> Result<()> {
        self.write(buf)
    }

    /// Read and discard exactly `count` bytes.
    fn drain(&mut self, mut count: usize) -> Result<()> {
        let mut scratch = [0u8; DRAIN_CHUNK];
        while count > 0 {
            let step = count.min(DRAIN_CHUNK);
            self.read(&mut scratch[..step])?;
            count -= step;
        }
        Ok(())
    }

    /// Terminate the peer session.
    fn close(&mut self);

    /// An owning handle to the same underlying socket, cheap enough to
    /// move into a datastore observer that outlives the dispatching frame.
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    /// Stable identifier for this connection (e.g. a file descriptor).
    /// Duplicated handles report the same id.
    fn id(&self) -> u32;

    fn connection_type(&self) -> ConnectionType;

    fn set_connection_type(&mut self, kind: ConnectionType);
}
