//! TCP accept loop and per-connection read loops.
//!
//! The core dispatches on one logical thread. Running a blocking read loop
//! per connection therefore serialises dispatch behind a mutex around the
//! whole server, the arrangement the core prescribes for parallel hosts.
//! The next packet header is awaited *outside* the lock, so an idle client
//! never stalls the others.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{debug, info, warn};

use midge_core::{Connection, Error, Packet, Server, TopicKey};

use crate::clock::SystemClock;
use crate::transport::TcpConnection;

pub type SharedServer<K> = Arc<Mutex<Server<K, SystemClock>>>;

/// Bind and serve forever.
pub fn run<K: TopicKey>(bind: SocketAddr, server: SharedServer<K>) -> io::Result<()> {
    let listener = TcpListener::bind(bind)?;
    info!("listening on {}", bind);

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept failed: {}", err);
                continue;
            }
        };

        let connection = TcpConnection::new(stream);
        debug!("client {} connected from {}", connection.id(), peer);

        let server = Arc::clone(&server);
        thread::spawn(move || read_loop(connection, server));
    }
}

fn lock<K: TopicKey>(server: &SharedServer<K>) -> MutexGuard<'_, Server<K, SystemClock>> {
    // A poisoning panic cannot leave the store half-mutated in a way the
    // broker cares about; keep serving.
    server.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_loop<K: TopicKey>(mut connection: TcpConnection, server: SharedServer<K>) {
    let client_id = connection.id();

    loop {
        // Blocks on the next fixed header with the dispatch lock released.
        let mut packet = match Packet::read_next(connection.duplicate()) {
            Ok(packet) => packet,
            Err(_) => {
                debug!("client {} hung up", client_id);
                break;
            }
        };

        let result = lock(&server).handle_message(&mut packet);

        match result {
            Ok(()) => {}
            Err(Error::TransportDead(reason)) => {
                warn!("client {}: {}", client_id, reason);
                break;
            }
            Err(err) => {
                // The packet's drop already drained the unread body, so the
                // stream is back on a packet boundary; keep serving.
                warn!("client {}: {}", client_id, err);
            }
        }
    }

    lock(&server).remove_client(client_id);
    connection.close();
    debug!("client {} torn down", client_id);
}
