//! Variable byte integer encoding, as used for the MQTT remaining-length
//! field.
//!
//! Little-endian base-128: each byte carries seven payload bits, the high
//! bit flags a continuation. Up to four bytes, so values range over
//! `0..=268_435_455`:
//! - 0-127: 1 byte
//! - 128-16383: 2 bytes
//! - 16384-2097151: 3 bytes
//! - 2097152-268435455: 4 bytes

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Largest encodable value (four bytes of seven payload bits).
pub const MAX: u32 = 268_435_455;

/// Decode a variable byte integer from the front of a buffer.
///
/// Returns `Ok(Some((value, bytes_consumed)))` on success, `Ok(None)` if
/// the buffer ends mid-integer, or `Err` if a fifth continuation byte
/// would be required.
pub fn decode(buf: &[u8]) -> Result<Option<(u32, usize)>> {
    let mut multiplier = 1u32;
    let mut value = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if multiplier > 128 * 128 * 128 {
            return Err(Error::MalformedPacket("length encoding over four bytes"));
        }

        value += u32::from(byte & 0x7F) * multiplier;

        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }

        multiplier *= 128;
    }

    Ok(None)
}

/// Decode a variable byte integer straight off a connection, one byte at a
/// time. Used for the remaining-length field of the fixed header, where the
/// body length is not yet known.
pub fn read_from<C: Connection>(connection: &mut C) -> Result<u32> {
    let mut multiplier = 1u32;
    let mut value = 0u32;

    loop {
        let mut byte = [0u8; 1];
        connection.read(&mut byte)?;

        if multiplier > 128 * 128 * 128 {
            return Err(Error::MalformedPacket("length encoding over four bytes"));
        }

        value += u32::from(byte[0] & 0x7F) * multiplier;

        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }

        multiplier *= 128;
    }
}

/// Encode `value` in the canonical minimum-length form. The buffer must
/// hold at least [`encoded_len`] bytes; returns the number written.
pub fn encode_to_slice(mut value: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf[i] = byte;
        i += 1;
        if value == 0 {
            break;
        }
    }
    i
}

/// Number of bytes [`encode_to_slice`] produces for `value`.
pub fn encoded_len(mut value: u32) -> usize {
    let mut len = 0;
    loop {
        len += 1;
        value /= 128;
        if value == 0 {
            break;
        }
    }
    len
}
