//! Packet capability consumed by the codec, and the MQTT 3.1.1 packet family.
//!
//! The codec and the stream only need four things from a packet: its type,
//! its encoded length, a way to serialize it into a buffer, and a factory
//! that builds it from a decoded header and body. That contract is the
//! [`Packet`] trait. [`ControlPacket`] implements it for the MQTT 3.1.1
//! control packets.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `header` | [`PacketType`], [`FixedHeader`], remaining-length helpers |
//! | `connect` | [`Connect`], [`Will`], [`Connack`] |
//! | `publish` | [`Publish`], [`QoS`] |
//! | `subscribe` | [`Subscribe`], [`Suback`], [`Unsubscribe`] |

// ============================================================================
// Submodules
// ============================================================================

mod connect;
mod header;
mod publish;
mod subscribe;
mod wire;

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;

use crate::error::PacketError;

use self::wire::{Reader, Writer};

// ============================================================================
// Re-exports
// ============================================================================

pub use connect::{Connack, ConnackCode, Connect, Will};
pub use header::{
    FixedHeader, MAX_LENGTH_BYTES, MAX_REMAINING_LENGTH, PacketType, remaining_length_len,
    write_remaining_length,
};
pub use publish::{Publish, QoS};
pub use subscribe::{Suback, SubackCode, Subscribe, Subscription, Unsubscribe};

// ============================================================================
// Packet Trait
// ============================================================================

/// A value the codec can frame.
///
/// Implementations own the body layout; the codec owns the fixed header
/// parsing on the way in.
pub trait Packet: Debug + Send + Sync + Sized + 'static {
    /// Returns the packet type.
    fn packet_type(&self) -> PacketType;

    /// Returns the full frame length: header byte, length field and body.
    fn encoded_len(&self) -> usize;

    /// Writes the full frame into `buf`, returning the bytes written.
    ///
    /// Validation happens here; an invalid packet returns an error and the
    /// contents of `buf` are unspecified.
    fn encode_into(&self, buf: &mut [u8]) -> Result<usize, PacketError>;

    /// Builds a packet from a decoded fixed header and its complete body.
    fn decode(header: FixedHeader, body: &[u8]) -> Result<Self, PacketError>;
}

// ============================================================================
// ControlPacket
// ============================================================================

/// The MQTT 3.1.1 control packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    /// Client request to connect.
    Connect(Connect),
    /// Connect acknowledgment.
    Connack(Connack),
    /// Application message.
    Publish(Publish),
    /// QoS 1 acknowledgment.
    Puback {
        /// Identifier of the acknowledged PUBLISH.
        packet_id: u16,
    },
    /// QoS 2 part 1.
    Pubrec {
        /// Identifier of the received PUBLISH.
        packet_id: u16,
    },
    /// QoS 2 part 2.
    Pubrel {
        /// Identifier of the released PUBLISH.
        packet_id: u16,
    },
    /// QoS 2 part 3.
    Pubcomp {
        /// Identifier of the completed PUBLISH.
        packet_id: u16,
    },
    /// Subscribe request.
    Subscribe(Subscribe),
    /// Subscribe acknowledgment.
    Suback(Suback),
    /// Unsubscribe request.
    Unsubscribe(Unsubscribe),
    /// Unsubscribe acknowledgment.
    Unsuback {
        /// Identifier of the acknowledged UNSUBSCRIBE.
        packet_id: u16,
    },
    /// Ping request.
    Pingreq,
    /// Ping response.
    Pingresp,
    /// Client is disconnecting.
    Disconnect,
}

impl ControlPacket {
    /// Returns the packet identifier of acknowledgment packets.
    fn ack_id(&self) -> Option<u16> {
        match *self {
            Self::Puback { packet_id }
            | Self::Pubrec { packet_id }
            | Self::Pubrel { packet_id }
            | Self::Pubcomp { packet_id }
            | Self::Unsuback { packet_id } => Some(packet_id),
            _ => None,
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Self::Publish(publish) => publish.flags(),
            other => other.packet_type().fixed_flags().unwrap_or(0),
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Self::Connect(connect) => connect.body_len(),
            Self::Connack(_) => Connack::BODY_LEN,
            Self::Publish(publish) => publish.body_len(),
            Self::Subscribe(subscribe) => subscribe.body_len(),
            Self::Suback(suback) => suback.body_len(),
            Self::Unsubscribe(unsubscribe) => unsubscribe.body_len(),
            Self::Puback { .. }
            | Self::Pubrec { .. }
            | Self::Pubrel { .. }
            | Self::Pubcomp { .. }
            | Self::Unsuback { .. } => 2,
            Self::Pingreq | Self::Pingresp | Self::Disconnect => 0,
        }
    }

    fn header(&self) -> FixedHeader {
        FixedHeader::new(self.packet_type(), self.flags(), self.body_len())
    }
}

impl Packet for ControlPacket {
    fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::Connack(_) => PacketType::Connack,
            Self::Publish(_) => PacketType::Publish,
            Self::Puback { .. } => PacketType::Puback,
            Self::Pubrec { .. } => PacketType::Pubrec,
            Self::Pubrel { .. } => PacketType::Pubrel,
            Self::Pubcomp { .. } => PacketType::Pubcomp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::Suback(_) => PacketType::Suback,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::Unsuback { .. } => PacketType::Unsuback,
            Self::Pingreq => PacketType::Pingreq,
            Self::Pingresp => PacketType::Pingresp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    fn encoded_len(&self) -> usize {
        self.header().frame_len()
    }

    fn encode_into(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let header = self.header();
        if header.remaining_length > MAX_REMAINING_LENGTH {
            return Err(PacketError::PacketTooLarge(header.remaining_length));
        }

        let mut w = Writer::new(buf);
        w.header(header)?;
        match self {
            Self::Connect(connect) => connect.encode_body(&mut w)?,
            Self::Connack(connack) => connack.encode_body(&mut w)?,
            Self::Publish(publish) => publish.encode_body(&mut w)?,
            Self::Subscribe(subscribe) => subscribe.encode_body(&mut w)?,
            Self::Suback(suback) => suback.encode_body(&mut w)?,
            Self::Unsubscribe(unsubscribe) => unsubscribe.encode_body(&mut w)?,
            Self::Pingreq | Self::Pingresp | Self::Disconnect => {}
            ack => match ack.ack_id() {
                Some(0) | None => return Err(PacketError::MissingPacketId),
                Some(packet_id) => w.u16(packet_id)?,
            },
        }
        Ok(w.position())
    }

    fn decode(header: FixedHeader, body: &[u8]) -> Result<Self, PacketError> {
        header.check_flags()?;

        let mut r = Reader::new(body);
        let packet = match header.packet_type {
            PacketType::Connect => Self::Connect(Connect::decode_body(&mut r)?),
            PacketType::Connack => Self::Connack(Connack::decode_body(&mut r)?),
            PacketType::Publish => Self::Publish(Publish::decode_body(header.flags, &mut r)?),
            PacketType::Subscribe => Self::Subscribe(Subscribe::decode_body(&mut r)?),
            PacketType::Suback => Self::Suback(Suback::decode_body(&mut r)?),
            PacketType::Unsubscribe => Self::Unsubscribe(Unsubscribe::decode_body(&mut r)?),
            PacketType::Puback => Self::Puback {
                packet_id: decode_ack(&mut r)?,
            },
            PacketType::Pubrec => Self::Pubrec {
                packet_id: decode_ack(&mut r)?,
            },
            PacketType::Pubrel => Self::Pubrel {
                packet_id: decode_ack(&mut r)?,
            },
            PacketType::Pubcomp => Self::Pubcomp {
                packet_id: decode_ack(&mut r)?,
            },
            PacketType::Unsuback => Self::Unsuback {
                packet_id: decode_ack(&mut r)?,
            },
            PacketType::Pingreq => Self::Pingreq,
            PacketType::Pingresp => Self::Pingresp,
            PacketType::Disconnect => Self::Disconnect,
        };
        r.finish()?;

        Ok(packet)
    }
}

fn decode_ack(r: &mut Reader<'_>) -> Result<u16, PacketError> {
    match r.u16("packet id")? {
        0 => Err(PacketError::MissingPacketId),
        packet_id => Ok(packet_id),
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<Connect> for ControlPacket {
    fn from(connect: Connect) -> Self {
        Self::Connect(connect)
    }
}

impl From<Connack> for ControlPacket {
    fn from(connack: Connack) -> Self {
        Self::Connack(connack)
    }
}

impl From<Publish> for ControlPacket {
    fn from(publish: Publish) -> Self {
        Self::Publish(publish)
    }
}

impl From<Subscribe> for ControlPacket {
    fn from(subscribe: Subscribe) -> Self {
        Self::Subscribe(subscribe)
    }
}

impl From<Suback> for ControlPacket {
    fn from(suback: Suback) -> Self {
        Self::Suback(suback)
    }
}

impl From<Unsubscribe> for ControlPacket {
    fn from(unsubscribe: Unsubscribe) -> Self {
        Self::Unsubscribe(unsubscribe)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(packet: &ControlPacket) -> Result<Vec<u8>, PacketError> {
        let mut buf = vec![0u8; packet.encoded_len()];
        let n = packet.encode_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    #[test]
    fn test_empty_body_packets() {
        assert_eq!(encode(&ControlPacket::Pingreq).unwrap(), [0xC0, 0x00]);
        assert_eq!(encode(&ControlPacket::Pingresp).unwrap(), [0xD0, 0x00]);
        assert_eq!(encode(&ControlPacket::Disconnect).unwrap(), [0xE0, 0x00]);
    }

    #[test]
    fn test_ack_packets() {
        assert_eq!(
            encode(&ControlPacket::Pubrel { packet_id: 0x0102 }).unwrap(),
            [0x62, 0x02, 0x01, 0x02]
        );
        assert_eq!(
            encode(&ControlPacket::Puback { packet_id: 0 }),
            Err(PacketError::MissingPacketId)
        );

        let header = FixedHeader::new(PacketType::Pubcomp, 0, 2);
        assert_eq!(
            ControlPacket::decode(header, &[0x00, 0x09]).unwrap(),
            ControlPacket::Pubcomp { packet_id: 9 }
        );
    }

    #[test]
    fn test_trailing_body_rejected() {
        let header = FixedHeader::new(PacketType::Pingreq, 0, 1);
        assert_eq!(
            ControlPacket::decode(header, &[0x00]),
            Err(PacketError::TrailingBytes { extra: 1 })
        );
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let packets = [
            ControlPacket::from(Connect::new("client")),
            ControlPacket::from(Connack::accepted()),
            ControlPacket::from(Publish::new("t", vec![0u8; 200])),
            ControlPacket::Unsuback { packet_id: 4 },
        ];
        for packet in &packets {
            assert_eq!(encode(packet).unwrap().len(), packet.encoded_len());
        }
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut buf = [0u8; 3];
        assert!(matches!(
            ControlPacket::from(Connack::accepted()).encode_into(&mut buf),
            Err(PacketError::BufferTooSmall { .. })
        ));
    }
}
