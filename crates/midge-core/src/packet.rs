//! MQTT wire codec: the fixed header, budget-tracked packet bodies, and
//! the 3.x packet types the broker speaks.
//!
//! Every inbound packet is framed as `[control byte][variable length][body]`.
//! [`Packet`] owns the body phase: all reads are bounded by the announced
//! remaining length, and dropping a packet with body bytes still pending
//! drains them so the stream stays aligned on packet boundaries.

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::varint;

/// Longest protocol name accepted in CONNECT (`"MQIsdp"`).
const MAX_PROTOCOL_NAME: usize = 6;
/// Longest client id accepted in CONNECT.
const MAX_CLIENT_ID: usize = 23;
/// Longest topic accepted in PUBLISH and SUBSCRIBE.
const MAX_TOPIC: usize = 128;

/// MQTT control packet types (upper nibble of the control byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Reserved = 0,
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    /// Decode from a fixed-header control byte. Every nibble value is a
    /// defined type, so this cannot fail.
    pub fn from_control(control: u8) -> Self {
        match control >> 4 {
            0 => PacketType::Reserved,
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            _ => PacketType::Auth,
        }
    }
}

/// Header common to all MQTT packets.
#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    pub control: u8,
    pub remaining_size: u32,
}

impl FixedHeader {
    pub fn read_from<C: Connection>(connection: &mut C) -> Result<Self> {
        let mut control = [0u8; 1];
        connection.read(&mut control)?;
        let remaining_size = varint::read_from(connection)?;
        Ok(FixedHeader {
            control: control[0],
            remaining_size,
        })
    }
}

/// One in-flight inbound packet: control byte, unconsumed body budget, and
/// the connection the body arrives on.
pub struct Packet<C: Connection> {
    control: u8,
    bytes_remaining: u32,
    connection: C,
}

impl<C: Connection> Packet<C> {
    /// Read the next fixed header off `connection` and frame its body.
    pub fn read_next(mut connection: C) -> Result<Self> {
        let header = FixedHeader::read_from(&mut connection)?;
        debug!(
            "new packet: control {:#04x}, {} body bytes",
            header.control, header.remaining_size
        );
        Ok(Packet {
            control: header.control,
            bytes_remaining: header.remaining_size,
            connection,
        })
    }

    pub fn packet_type(&self) -> PacketType {
        PacketType::from_control(self.control)
    }

    /// Per-type flag nibble (DUP/QoS/RETAIN for PUBLISH, the reserved
    /// `0010` pattern for SUBSCRIBE).
    pub fn type_flags(&self) -> u8 {
        self.control & 0x0F
    }

    pub fn bytes_remaining(&self) -> u32 {
        self.bytes_remaining
    }

    pub fn connection(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Bounded body read. Asking for more bytes than the packet has left
    /// is a caller bug and fails without consuming the transport.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() > self.bytes_remaining as usize {
            return Err(Error::MalformedPacket("read past end of packet"));
        }
        self.connection.read(buf)?;
        self.bytes_remaining -= buf.len() as u32;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(&mut byte)?;
        Ok(byte[0])
    }

    /// Big-endian two-byte integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        let mut bytes = [0u8; 2];
        self.read(&mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Length-prefixed string, capped at `max` bytes.
    pub fn read_string(&mut self, max: usize) -> Result<Bytes> {
        let length = usize::from(self.read_u16()?);
        if length > max {
            warn!("string of {} bytes too long for {}-byte field", length, max);
            return Err(Error::MalformedPacket("string too long for field"));
        }
        let mut buf = BytesMut::zeroed(length);
        self.read(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Discard `count` body bytes.
    pub fn drain(&mut self, count: u32) -> Result<()> {
        if count > self.bytes_remaining {
            return Err(Error::MalformedPacket("drain past end of packet"));
        }
        self.connection.drain(count as usize)?;
        self.bytes_remaining -= count;
        Ok(())
    }
}

impl<C: Connection> Drop for Packet<C> {
    fn drop(&mut self) {
        // A packet abandoned mid-body (parse failure, unsupported type)
        // still owes the stream its residue; consume it so the next
        // read_next lands on a fresh fixed header.
        if self.bytes_remaining > 0 {
            debug!(
                "packet dropped with {} bytes pending, draining",
                self.bytes_remaining
            );
            if self.connection.drain(self.bytes_remaining as usize).is_err() {
                warn!("drain on drop failed, stream is dead");
            }
        }
    }
}

/// CONNECT body for MQTT 3.x: protocol name and level, connect flags,
/// keep-alive, client id.
#[derive(Debug, Clone, Default)]
pub struct Connect {
    pub protocol_name: Bytes,
    pub protocol_level: u8,
    pub flags: u8,
    pub keep_alive: u16,
    pub client_id: Bytes,
}

impl Connect {
    pub fn read_from<C: Connection>(packet: &mut Packet<C>) -> Result<Self> {
        let protocol_name = packet.read_string(MAX_PROTOCOL_NAME)?;
        let protocol_level = packet.read_u8()?;
        // Flag content is ignored; clean-session (bit 1) is assumed set.
        let flags = packet.read_u8()?;
        // Keep-alive enforcement belongs to the host.
        let keep_alive = packet.read_u16()?;
        let client_id = packet.read_string(MAX_CLIENT_ID)?;

        Ok(Connect {
            protocol_name,
            protocol_level,
            flags,
            keep_alive,
            client_id,
        })
    }

    /// Emit a CONNECT, for the client end of a link.
    pub fn write_on<C: Connection>(&self, connection: &mut C) -> Result<()> {
        if self.protocol_name.len() > MAX_PROTOCOL_NAME || self.client_id.len() > MAX_CLIENT_ID {
            return Err(Error::MalformedPacket("connect field too long"));
        }

        // Both strings are capped well below 127 bytes, so the remaining
        // length always fits a single byte.
        let remaining = 2 + self.protocol_name.len() + 1 + 1 + 2 + 2 + self.client_id.len();

        let mut buffer = Vec::with_capacity(2 + remaining);
        buffer.push((PacketType::Connect as u8) << 4);
        buffer.push(remaining as u8);
        buffer.extend_from_slice(&(self.protocol_name.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&self.protocol_name);
        buffer.push(self.protocol_level);
        buffer.push(self.flags);
        buffer.extend_from_slice(&self.keep_alive.to_be_bytes());
        buffer.extend_from_slice(&(self.client_id.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&self.client_id);

        connection.write(&buffer)
    }
}

/// CONNECT for a plain MQTT 3.1.1 session.
pub fn default_connect() -> Connect {
    Connect {
        protocol_name: Bytes::from_static(b"MQTT"),
        protocol_level: 4,
        // Bit 1: sessions are independent, nothing carries over between
        // connections sharing a client id.
        flags: 0b10,
        keep_alive: 0,
        client_id: Bytes::from_static(b"MIDGE"),
    }
}

/// CONNACK. The broker answers every CONNECT with one; `read_from` covers
/// the client end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectAck {
    /// Set before sending to answer with the generic error code.
    pub error: bool,

    /// Populated when receiving.
    pub flags: u8,
    pub return_code: u8,
}

impl ConnectAck {
    pub fn write_on<C: Connection>(&self, connection: &mut C) -> Result<()> {
        // Flags byte is all reserved except bit 0 (session present);
        // sessions are not kept, so it is always zero.
        let return_code = if self.error { 0x80 } else { 0x00 };
        connection.write(&[(PacketType::Connack as u8) << 4, 2, 0, return_code])
    }

    pub fn read_from<C: Connection>(packet: &mut Packet<C>) -> Result<Self> {
        let flags = packet.read_u8()?;
        let return_code = packet.read_u8()?;
        Ok(ConnectAck {
            error: return_code != 0,
            flags,
            return_code,
        })
    }
}

/// PUBLISH header. The parser stops at the payload boundary: payload bytes
/// stay on the wire for the dispatcher to stream into a store entry.
#[derive(Debug, Clone, Default)]
pub struct Publish {
    pub topic: Bytes,
    pub payload_bytes: u32,
}

impl Publish {
    pub fn read_from<C: Connection>(packet: &mut Packet<C>) -> Result<Self> {
        let flags = packet.type_flags();
        let topic = packet.read_string(MAX_TOPIC)?;

        if (flags >> 1) & 0b11 != 0 {
            // QoS is not supported; the packet id is read only to keep the
            // payload length right.
            let _packet_id = packet.read_u16()?;
        }

        let payload_bytes = packet.bytes_remaining();
        Ok(Publish {
            topic,
            payload_bytes,
        })
    }

    /// Emit an outbound QoS 0 PUBLISH: framed header and topic first, then
    /// the payload straight from the caller's buffer, so a stored entry is
    /// never copied into an intermediate packet buffer.
    pub fn write_on<C: Connection>(&self, connection: &mut C, payload: &[u8]) -> Result<()> {
        if self.topic.len() > MAX_TOPIC {
            return Err(Error::MalformedPacket("topic too long"));
        }

        let mut header = Vec::with_capacity(MAX_TOPIC + 8);
        header.push((PacketType::Publish as u8) << 4);

        // Unlike the short control packets this one easily exceeds 127
        // bytes, so the length gets the variable encoding.
        let remaining = (2 + self.topic.len() + payload.len()) as u32;
        let mut length = [0u8; 4];
        let length_bytes = varint::encode_to_slice(remaining, &mut length);
        header.extend_from_slice(&length[..length_bytes]);

        header.extend_from_slice(&(self.topic.len() as u16).to_be_bytes());
        header.extend_from_slice(&self.topic);

        connection.write_partial(&header)?;
        connection.write(payload)
    }
}

/// SUBSCRIBE body. Topics are handed to `on_topic` as they parse; an error
/// return aborts the parse.
#[derive(Debug, Clone, Default)]
pub struct Subscribe {
    pub packet_id: u16,
}

impl Subscribe {
    pub fn read_from<C, F>(packet: &mut Packet<C>, mut on_topic: F) -> Result<Self>
    where
        C: Connection,
        F: FnMut(&[u8]) -> Result<()>,
    {
        let packet_id = packet.read_u16()?;

        while packet.bytes_remaining() > 0 {
            let topic = packet.read_string(MAX_TOPIC)?;
            on_topic(&topic)?;

            // Requested QoS; reserved in the subset implemented.
            let _options = packet.read_u8()?;
        }

        Ok(Subscribe { packet_id })
    }

    /// Emit a single-topic subscribe at QoS 0, for the client end of a
    /// link.
    pub fn write_on<C: Connection>(&self, topic: &[u8], connection: &mut C) -> Result<()> {
        if topic.len() > MAX_TOPIC {
            return Err(Error::MalformedPacket("topic too long"));
        }

        let mut buffer = Vec::with_capacity(topic.len() + 16);
        // MQTT requires flag bit 1 set on SUBSCRIBE.
        buffer.push(((PacketType::Subscribe as u8) << 4) | 0b0010);

        let remaining = (2 + 2 + topic.len() + 1) as u32;
        let mut length = [0u8; 4];
        let length_bytes = varint::encode_to_slice(remaining, &mut length);
        buffer.extend_from_slice(&length[..length_bytes]);

        buffer.extend_from_slice(&self.packet_id.to_be_bytes());
        buffer.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        buffer.extend_from_slice(topic);
        buffer.push(0);

        connection.write(&buffer)
    }
}

/// SUBACK carrying a single response byte (single-topic subscribes only).
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeAck {
    pub packet_id: u16,
    pub response: u8,
}

impl SubscribeAck {
    pub fn write_on<C: Connection>(&self, connection: &mut C) -> Result<()> {
        let [id_high, id_low] = self.packet_id.to_be_bytes();
        connection.write(&[
            (PacketType::Suback as u8) << 4,
            3, // packet id plus exactly one response byte
            id_high,
            id_low,
            self.response,
        ])
    }

    pub fn read_from<C: Connection>(packet: &mut Packet<C>) -> Result<Self> {
        let packet_id = packet.read_u16()?;
        let response = packet.read_u8()?;
        Ok(SubscribeAck {
            packet_id,
            response,
        })
    }
}

/// PINGRESP: the type byte and a zero length.
pub struct PingResp;

impl PingResp {
    pub fn write_on<C: Connection>(connection: &mut C) -> Result<()> {
        debug!("sending ping response");
        connection.write(&[(PacketType::Pingresp as u8) << 4, 0])
    }
}
