//! Packet dispatch: interpret one decoded packet, mutate the store, and
//! answer on the wire.

use bytes::BytesMut;
use log::{debug, warn};

use crate::clock::Clock;
use crate::connection::{Connection, ConnectionType};
use crate::datastore::{DataStore, Entry, Observer};
use crate::error::{Error, Result};
use crate::key::{Matcher, TopicKey};
use crate::packet::{
    Connect, ConnectAck, Packet, PacketType, PingResp, Publish, Subscribe, SubscribeAck,
};

/// Default ceiling on a single PUBLISH payload.
pub const DEFAULT_MAX_PAYLOAD: u32 = 1024 * 1024;

/// The broker core: one datastore, one clock, one packet at a time.
///
/// [`Server::handle_message`] is one-shot; the host read loop owns the
/// looping. While a PUBLISH dispatches, the store's observers run
/// synchronously, so subscriber writes are ordered with the publish that
/// caused them. The core assumes a single logical dispatch thread; a host
/// running parallel read loops serialises them around the whole server.
pub struct Server<K: TopicKey, T: Clock> {
    store: DataStore<K>,
    clock: T,
    max_payload: u32,
}

impl<K: TopicKey, T: Clock> Server<K, T> {
    pub fn new(clock: T) -> Self {
        Self {
            store: DataStore::new(),
            clock,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Cap the PUBLISH payload size accepted by dispatch.
    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn store(&self) -> &DataStore<K> {
        &self.store
    }

    /// Purge the observers of a connection that went away.
    pub fn remove_client(&mut self, client_id: u32) {
        self.store.remove_client(client_id);
    }

    /// Dispatch one packet. Returns [`Error::TransportDead`] when the
    /// connection is beyond saving; other failures leave the stream
    /// aligned (the packet's drop drains the unread body) and the host may
    /// keep serving the client.
    pub fn handle_message<C>(&mut self, packet: &mut Packet<C>) -> Result<()>
    where
        C: Connection + Send + 'static,
    {
        debug!("handling {:?} packet", packet.packet_type());

        match packet.packet_type() {
            PacketType::Connect => self.handle_connect(packet),
            PacketType::Publish => self.handle_publish(packet),
            PacketType::Subscribe => self.handle_subscribe(packet),
            PacketType::Pingreq => PingResp::write_on(packet.connection())
                .map_err(|_| Error::TransportDead("unable to send response")),
            PacketType::Disconnect => {
                debug!("client {} disconnected", packet.connection().id());
                let client_id = packet.connection().id();
                packet.connection().close();
                self.store.remove_client(client_id);
                Ok(())
            }
            other => {
                warn!("unsupported packet type {:?}", other);
                Err(Error::UnsupportedFeature("packet type"))
            }
        }
    }

    fn handle_connect<C: Connection>(&mut self, packet: &mut Packet<C>) -> Result<()> {
        let mut ack = ConnectAck::default();

        match Connect::read_from(packet) {
            Ok(connect) => {
                let name = connect.protocol_name.as_ref();
                if name != b"MQTT" && name != b"MQIsdp" {
                    warn!("connect with unknown protocol name");
                    ack.error = true;
                }

                match connect.protocol_level {
                    3 => packet
                        .connection()
                        .set_connection_type(ConnectionType::Mqtt31),
                    4 => packet
                        .connection()
                        .set_connection_type(ConnectionType::Mqtt311),
                    5 => packet
                        .connection()
                        .set_connection_type(ConnectionType::Mqtt5),
                    level => {
                        warn!("connect with unsupported protocol level {}", level);
                        ack.error = true;
                    }
                }
            }
            Err(err) => {
                warn!("connect parse failed: {}", err);
                ack.error = true;
            }
        }

        ack.write_on(packet.connection())
            .map_err(|_| Error::TransportDead("unable to send response"))
    }

    fn handle_publish<C: Connection>(&mut self, packet: &mut Packet<C>) -> Result<()> {
        let publish = Publish::read_from(packet)?;

        if publish.payload_bytes > self.max_payload {
            warn!(
                "publish of {} bytes over the {} byte limit",
                publish.payload_bytes, self.max_payload
            );
            return Err(Error::MalformedPacket("payload too large"));
        }

        let key = K::encode(&publish.topic)?;

        let mut payload = BytesMut::zeroed(publish.payload_bytes as usize);
        packet
            .read(&mut payload)
            .map_err(|_| Error::TransportDead("unable to complete read"))?;

        let entry = Entry {
            payload: payload.freeze(),
            timestamp: self.clock.timestamp(),
        };
        self.store.set(key, entry);
        Ok(())
    }

    fn handle_subscribe<C>(&mut self, packet: &mut Packet<C>) -> Result<()>
    where
        C: Connection + Send + 'static,
    {
        if packet.type_flags() != 0b0010 {
            return Err(Error::MalformedPacket("bad subscribe flags"));
        }

        // Duplicated up front: the body parser holds the packet, so the
        // handle the observers capture has to exist before parsing starts.
        let origin = packet.connection().duplicate();
        let client_id = origin.id();
        let store = &mut self.store;

        let subscribe = Subscribe::read_from(packet, |topic| {
            let matcher = match topic {
                _ if topic.contains(&b'+') => {
                    return Err(Error::UnsupportedFeature("'+' wildcard"));
                }
                [head @ .., b'#'] => Matcher::Prefix(K::encode(head)?),
                _ => Matcher::Full(K::encode(topic)?),
            };

            let mut connection = origin.duplicate();
            store.add_observer(Observer {
                client_id,
                callback: Box::new(move |key: &K, entry: &Entry| {
                    if !matcher.matches(key) {
                        return true;
                    }
                    debug!("forwarding to client {}", connection.id());
                    let publish = Publish {
                        topic: key.decode(),
                        payload_bytes: entry.payload.len() as u32,
                    };
                    // A subscriber that cannot be written to unsubscribes
                    // itself; the connection goes down with its read loop.
                    publish.write_on(&mut connection, &entry.payload).is_ok()
                }),
            });
            Ok(())
        })?;

        SubscribeAck {
            packet_id: subscribe.packet_id,
            response: 0,
        }
        .write_on(packet.connection())
        .map_err(|_| Error::TransportDead("unable to send response"))
    }
}
