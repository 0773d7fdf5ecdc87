//! PUBLISH packet and QoS levels.

// ============================================================================
// Imports
// ============================================================================

use crate::error::PacketError;

use super::wire::{Reader, Writer, check_field, field_len};

// ============================================================================
// Constants
// ============================================================================

const FLAG_DUP: u8 = 0b1000;
const FLAG_QOS: u8 = 0b0110;
const FLAG_RETAIN: u8 = 0b0001;

// ============================================================================
// QoS
// ============================================================================

/// Delivery guarantee level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery.
    AtLeastOnce = 1,
    /// Assured single delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = PacketError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(PacketError::InvalidQos(other)),
        }
    }
}

// ============================================================================
// Publish
// ============================================================================

/// Application message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Publish {
    /// Redelivery flag; only valid with QoS 1 or 2.
    pub dup: bool,
    /// Delivery QoS.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Topic name; must not contain wildcards.
    pub topic: String,
    /// Packet identifier; present on the wire only for QoS 1 and 2.
    pub packet_id: u16,
    /// Message payload.
    pub payload: Vec<u8>,
}

impl Publish {
    /// Creates a QoS 0 message.
    #[inline]
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub(crate) fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= FLAG_DUP;
        }
        if self.retain {
            flags |= FLAG_RETAIN;
        }
        flags
    }

    pub(crate) fn body_len(&self) -> usize {
        let id = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        field_len(self.topic.len()) + id + self.payload.len()
    }

    fn validate(&self) -> Result<(), PacketError> {
        if self.topic.is_empty() || self.topic.contains(['+', '#']) {
            return Err(PacketError::InvalidTopic(self.topic.clone()));
        }
        check_field(self.topic.len())?;
        match self.qos {
            QoS::AtMostOnce if self.dup => Err(PacketError::InvalidFlags {
                flags: self.flags(),
            }),
            QoS::AtLeastOnce | QoS::ExactlyOnce if self.packet_id == 0 => {
                Err(PacketError::MissingPacketId)
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        self.validate()?;

        w.string(&self.topic)?;
        if self.qos != QoS::AtMostOnce {
            w.u16(self.packet_id)?;
        }
        w.raw(&self.payload)
    }

    pub(crate) fn decode_body(flags: u8, r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let qos = QoS::try_from((flags & FLAG_QOS) >> 1)?;
        let dup = flags & FLAG_DUP != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(PacketError::InvalidFlags { flags });
        }

        let topic = r.string("topic")?;
        let packet_id = if qos == QoS::AtMostOnce {
            0
        } else {
            match r.u16("packet id")? {
                0 => return Err(PacketError::MissingPacketId),
                id => id,
            }
        };
        let payload = r.rest().to_vec();

        let publish = Self {
            dup,
            qos,
            retain: flags & FLAG_RETAIN != 0,
            topic,
            packet_id,
            payload,
        };
        publish.validate()?;
        Ok(publish)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::packet::{ControlPacket, FixedHeader, Packet, PacketType};

    fn encode(packet: &ControlPacket) -> Result<Vec<u8>, PacketError> {
        let mut buf = vec![0u8; packet.encoded_len()];
        let n = packet.encode_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    #[test]
    fn test_qos0_publish_bytes() {
        let packet = ControlPacket::Publish(Publish::new("a/b", b"hi".to_vec()));
        assert_eq!(
            encode(&packet).unwrap(),
            [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']
        );
    }

    #[test]
    fn test_qos1_requires_packet_id() {
        let publish = Publish {
            qos: QoS::AtLeastOnce,
            ..Publish::new("a", Vec::new())
        };
        assert_eq!(
            encode(&ControlPacket::Publish(publish)),
            Err(PacketError::MissingPacketId)
        );
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        let publish = Publish::new("a/#", Vec::new());
        assert_eq!(
            encode(&ControlPacket::Publish(publish)),
            Err(PacketError::InvalidTopic("a/#".into()))
        );
    }

    #[test]
    fn test_qos3_flags_rejected() {
        let header = FixedHeader::new(PacketType::Publish, 0b0110, 3);
        assert_eq!(
            ControlPacket::decode(header, &[0x00, 0x01, b'a']),
            Err(PacketError::InvalidQos(3))
        );
    }

    fn qos() -> impl Strategy<Value = QoS> {
        prop_oneof![
            Just(QoS::AtMostOnce),
            Just(QoS::AtLeastOnce),
            Just(QoS::ExactlyOnce)
        ]
    }

    proptest! {
        #[test]
        fn prop_publish_reencodes_identically(
            topic in "[a-z0-9/]{1,40}",
            payload in proptest::collection::vec(any::<u8>(), 0..300),
            qos in qos(),
            retain in any::<bool>(),
            dup in any::<bool>(),
            packet_id in 1u16..,
        ) {
            let publish = Publish {
                dup: dup && qos != QoS::AtMostOnce,
                qos,
                retain,
                topic,
                packet_id: if qos == QoS::AtMostOnce { 0 } else { packet_id },
                payload,
            };
            let bytes = encode(&ControlPacket::Publish(publish)).unwrap();

            let mut source = bytes.as_slice();
            let decoded = tokio_test::block_on(crate::codec::decode::<ControlPacket, _>(&mut source))
                .unwrap()
                .unwrap();
            prop_assert_eq!(decoded.bytes, bytes.len());
            prop_assert_eq!(encode(&decoded.packet).unwrap(), bytes);
        }
    }
}
