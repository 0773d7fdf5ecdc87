//! Fixed header: packet type registry and remaining-length encoding.
//!
//! # Format
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +---------------+---------------+
//! |  packet type  |     flags     |   1 byte
//! +---------------+---------------+
//! |   remaining length (varint)   |   1-4 bytes
//! +-------------------------------+
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::PacketError;

// ============================================================================
// Constants
// ============================================================================

/// Largest value the remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes in the remaining-length field.
pub const MAX_LENGTH_BYTES: usize = 4;

// ============================================================================
// PacketType
// ============================================================================

/// Control packet type carried in the upper header nibble.
///
/// Nibbles 0 and 15 are reserved and have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client request to connect.
    Connect = 1,
    /// Connect acknowledgment.
    Connack = 2,
    /// Publish message.
    Publish = 3,
    /// QoS 1 publish acknowledgment.
    Puback = 4,
    /// QoS 2 publish received.
    Pubrec = 5,
    /// QoS 2 publish release.
    Pubrel = 6,
    /// QoS 2 publish complete.
    Pubcomp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    Suback = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    Unsuback = 11,
    /// Ping request.
    Pingreq = 12,
    /// Ping response.
    Pingresp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Maps a header type nibble to a packet type.
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            1 => Self::Connect,
            2 => Self::Connack,
            3 => Self::Publish,
            4 => Self::Puback,
            5 => Self::Pubrec,
            6 => Self::Pubrel,
            7 => Self::Pubcomp,
            8 => Self::Subscribe,
            9 => Self::Suback,
            10 => Self::Unsubscribe,
            11 => Self::Unsuback,
            12 => Self::Pingreq,
            13 => Self::Pingresp,
            14 => Self::Disconnect,
            _ => return None,
        })
    }

    /// Flags every packet of this type must carry, or `None` for PUBLISH
    /// whose flags are variable.
    #[must_use]
    pub const fn fixed_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::Pubrel | Self::Subscribe | Self::Unsubscribe => Some(0b0010),
            _ => Some(0),
        }
    }

    /// Returns the wire name, e.g. `CONNACK`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connack => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::Puback => "PUBACK",
            Self::Pubrec => "PUBREC",
            Self::Pubrel => "PUBREL",
            Self::Pubcomp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::Suback => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Unsuback => "UNSUBACK",
            Self::Pingreq => "PINGREQ",
            Self::Pingresp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FixedHeader
// ============================================================================

/// Decoded fixed header handed to the packet decoder with the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// Packet type from the upper nibble.
    pub packet_type: PacketType,
    /// Flags from the lower nibble.
    pub flags: u8,
    /// Body length in bytes.
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Creates a header.
    #[inline]
    #[must_use]
    pub const fn new(packet_type: PacketType, flags: u8, remaining_length: usize) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Returns the first header byte.
    #[inline]
    #[must_use]
    pub const fn byte(&self) -> u8 {
        ((self.packet_type as u8) << 4) | (self.flags & 0x0F)
    }

    /// Total frame length: header byte, length field and body.
    #[inline]
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        1 + remaining_length_len(self.remaining_length) + self.remaining_length
    }

    /// Rejects flags that differ from the type's fixed flags.
    pub fn check_flags(&self) -> Result<(), PacketError> {
        match self.packet_type.fixed_flags() {
            Some(expected) if expected != self.flags => Err(PacketError::InvalidFlags {
                flags: self.flags,
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Remaining Length
// ============================================================================

/// Number of bytes needed to encode `len` as a remaining-length field.
///
/// Values above [`MAX_REMAINING_LENGTH`] report 4; callers reject them
/// before encoding.
#[inline]
#[must_use]
pub const fn remaining_length_len(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Writes `len` as a base-128 varint into `buf`, returning bytes written.
pub fn write_remaining_length(buf: &mut [u8], len: usize) -> Result<usize, PacketError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(PacketError::PacketTooLarge(len));
    }

    let needed = remaining_length_len(len);
    if buf.len() < needed {
        return Err(PacketError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }

    let mut value = len;
    for slot in buf.iter_mut().take(needed) {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        *slot = byte;
    }

    Ok(needed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_nibbles() {
        assert_eq!(PacketType::from_nibble(0), None);
        assert_eq!(PacketType::from_nibble(15), None);
        assert_eq!(PacketType::from_nibble(2), Some(PacketType::Connack));
    }

    #[test]
    fn test_header_byte() {
        let header = FixedHeader::new(PacketType::Subscribe, 0b0010, 5);
        assert_eq!(header.byte(), 0x82);
        assert_eq!(header.frame_len(), 7);
    }

    #[test]
    fn test_check_flags() {
        assert!(FixedHeader::new(PacketType::Pubrel, 0b0010, 2).check_flags().is_ok());
        assert_eq!(
            FixedHeader::new(PacketType::Pubrel, 0, 2).check_flags(),
            Err(PacketError::InvalidFlags { flags: 0 })
        );
        assert!(FixedHeader::new(PacketType::Publish, 0b1011, 2).check_flags().is_ok());
    }

    #[test]
    fn test_remaining_length_boundaries() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (2_097_152, &[0x80, 0x80, 0x80, 0x01]),
            (MAX_REMAINING_LENGTH, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for (len, expected) in cases {
            let mut buf = [0u8; 4];
            let n = write_remaining_length(&mut buf, *len).unwrap();
            assert_eq!(&buf[..n], *expected, "length {len}");
            assert_eq!(remaining_length_len(*len), expected.len());
        }
    }

    #[test]
    fn test_remaining_length_too_large() {
        let mut buf = [0u8; 4];
        assert_eq!(
            write_remaining_length(&mut buf, MAX_REMAINING_LENGTH + 1),
            Err(PacketError::PacketTooLarge(MAX_REMAINING_LENGTH + 1))
        );
    }
}
