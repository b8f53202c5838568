//! Blocking TCP transport implementing the core connection contract.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::trace;

use midge_core::{Connection, ConnectionType, Error, Result};

/// State shared by every duplicated handle of one client socket.
struct Shared {
    stream: TcpStream,
    /// Negotiated protocol revision, shared so a CONNECT handled on the
    /// read-loop handle is visible to duplicates captured by observers.
    kind: AtomicU8,
}

/// Owning handle to a client socket. `duplicate` is an `Arc` clone, cheap
/// enough to move into a datastore observer. Reads and writes are safe to
/// run from different threads; concurrent writers are serialised by the
/// host's dispatch lock.
#[derive(Clone)]
pub struct TcpConnection {
    shared: Arc<Shared>,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            shared: Arc::new(Shared {
                stream,
                kind: AtomicU8::new(ConnectionType::Unknown as u8),
            }),
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

impl Connection for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut stream = &self.shared.stream;
        let mut filled = 0;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::TransportDead("peer closed")),
                Ok(count) => {
                    trace!("read {} of {} bytes", filled + count, buf.len());
                    filled += count;
                }
                Err(err) if is_transient(err.kind()) => continue,
                Err(_) => return Err(Error::TransportDead("read error")),
            }
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut stream = &self.shared.stream;
        let mut written = 0;
        while written < buf.len() {
            match stream.write(&buf[written..]) {
                Ok(0) => return Err(Error::TransportDead("peer closed")),
                Ok(count) => written += count,
                Err(err) if is_transient(err.kind()) => continue,
                Err(_) => return Err(Error::TransportDead("write error")),
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.shared.stream.shutdown(Shutdown::Both);
    }

    fn duplicate(&self) -> Self {
        self.clone()
    }

    fn id(&self) -> u32 {
        self.shared.stream.as_raw_fd() as u32
    }

    fn connection_type(&self) -> ConnectionType {
        ConnectionType::from_raw(self.shared.kind.load(Ordering::Relaxed))
    }

    fn set_connection_type(&mut self, kind: ConnectionType) {
        self.shared.kind.store(kind as u8, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Accept one peer and hand both ends back.
    fn socket_pair() -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let join = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (accepted, _) = listener.accept().unwrap();
        (TcpConnection::new(accepted), join.join().unwrap())
    }

    #[test]
    fn read_fills_exactly() {
        let (mut connection, mut peer) = socket_pair();
        peer.write_all(b"abcdef").unwrap();

        let mut buf = [0u8; 4];
        connection.read(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd");

        let mut rest = [0u8; 2];
        connection.read(&mut rest).unwrap();
        assert_eq!(&rest, b"ef");
    }

    #[test]
    fn read_after_peer_close_is_dead() {
        let (mut connection, peer) = socket_pair();
        drop(peer);

        let mut buf = [0u8; 1];
        assert!(matches!(
            connection.read(&mut buf),
            Err(Error::TransportDead(_))
        ));
    }

    #[test]
    fn drain_discards_exactly() {
        let (mut connection, mut peer) = socket_pair();
        peer.write_all(b"0123456789").unwrap();

        connection.drain(8).unwrap();

        let mut buf = [0u8; 2];
        connection.read(&mut buf).unwrap();
        assert_eq!(&buf, b"89");
    }

    #[test]
    fn duplicates_share_socket_and_protocol_type() {
        let (mut connection, mut peer) = socket_pair();
        let mut duplicate = connection.duplicate();

        assert_eq!(connection.id(), duplicate.id());

        connection.set_connection_type(ConnectionType::Mqtt311);
        assert_eq!(duplicate.connection_type(), ConnectionType::Mqtt311);

        peer.write_all(b"xy").unwrap();
        let mut buf = [0u8; 2];
        duplicate.read(&mut buf).unwrap();
        assert_eq!(&buf, b"xy");
    }

    #[test]
    fn close_ends_the_session() {
        let (mut connection, mut peer) = socket_pair();
        connection.close();

        let mut buf = [0u8; 1];
        assert!(matches!(
            connection.read(&mut buf),
            Err(Error::TransportDead(_))
        ));
        // The peer eventually observes the shutdown as EOF.
        let mut peer_buf = [0u8; 1];
        assert_eq!(std::io::Read::read(&mut peer, &mut peer_buf).unwrap(), 0);
    }
}
