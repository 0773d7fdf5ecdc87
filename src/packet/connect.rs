//! CONNECT and CONNACK packets.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::PacketError;

use super::publish::QoS;
use super::wire::{Reader, Writer, check_field, field_len};

// ============================================================================
// Constants
// ============================================================================

/// Protocol name and level for MQTT 3.1.1.
const PROTOCOL_MQTT: (&str, u8) = ("MQTT", 4);

/// Protocol name and level for MQTT 3.1.
const PROTOCOL_MQISDP: (&str, u8) = ("MQIsdp", 3);

const FLAG_USERNAME: u8 = 0b1000_0000;
const FLAG_PASSWORD: u8 = 0b0100_0000;
const FLAG_WILL_RETAIN: u8 = 0b0010_0000;
const FLAG_WILL_QOS: u8 = 0b0001_1000;
const FLAG_WILL: u8 = 0b0000_0100;
const FLAG_CLEAN_SESSION: u8 = 0b0000_0010;
const FLAG_RESERVED: u8 = 0b0000_0001;

// ============================================================================
// Will
// ============================================================================

/// Message the broker publishes if the client disconnects uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    /// Topic of the will message.
    pub topic: String,
    /// Will message payload.
    pub payload: Vec<u8>,
    /// Delivery QoS.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
}

// ============================================================================
// Connect
// ============================================================================

/// Client connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Client identifier (may be empty with a clean session).
    pub client_id: String,
    /// Keep alive interval in seconds.
    pub keep_alive: u16,
    /// Discard any previous session state.
    pub clean_session: bool,
    /// Optional last will.
    pub will: Option<Will>,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password; requires a user name.
    pub password: Option<Vec<u8>>,
    /// Protocol level: 4 for MQTT 3.1.1, 3 for MQTT 3.1.
    pub protocol_level: u8,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: 0,
            clean_session: true,
            will: None,
            username: None,
            password: None,
            protocol_level: PROTOCOL_MQTT.1,
        }
    }
}

impl Connect {
    /// Creates a clean-session CONNECT for `client_id`.
    #[inline]
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    fn protocol_name(&self) -> Result<&'static str, PacketError> {
        match self.protocol_level {
            4 => Ok(PROTOCOL_MQTT.0),
            3 => Ok(PROTOCOL_MQISDP.0),
            level => Err(PacketError::InvalidProtocolLevel(level)),
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL | ((will.qos as u8) << 3);
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }

    pub(crate) fn body_len(&self) -> usize {
        let name = self.protocol_name().map_or(0, str::len);
        let mut len = field_len(name) + 1 + 1 + 2 + field_len(self.client_id.len());
        if let Some(will) = &self.will {
            len += field_len(will.topic.len()) + field_len(will.payload.len());
        }
        if let Some(username) = &self.username {
            len += field_len(username.len());
        }
        if let Some(password) = &self.password {
            len += field_len(password.len());
        }
        len
    }

    fn validate(&self) -> Result<(), PacketError> {
        self.protocol_name()?;
        check_field(self.client_id.len())?;
        if let Some(will) = &self.will {
            if will.topic.is_empty() {
                return Err(PacketError::InvalidTopic(will.topic.clone()));
            }
            check_field(will.topic.len())?;
            check_field(will.payload.len())?;
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(PacketError::InvalidConnectFlags(self.flags()));
        }
        if let Some(username) = &self.username {
            check_field(username.len())?;
        }
        if let Some(password) = &self.password {
            check_field(password.len())?;
        }
        Ok(())
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        self.validate()?;

        w.string(self.protocol_name()?)?;
        w.u8(self.protocol_level)?;
        w.u8(self.flags())?;
        w.u16(self.keep_alive)?;
        w.string(&self.client_id)?;
        if let Some(will) = &self.will {
            w.string(&will.topic)?;
            w.binary(&will.payload)?;
        }
        if let Some(username) = &self.username {
            w.string(username)?;
        }
        if let Some(password) = &self.password {
            w.binary(password)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let name = r.string("protocol name")?;
        let level = r.u8("protocol level")?;
        let expected = match name.as_str() {
            n if n == PROTOCOL_MQTT.0 => PROTOCOL_MQTT.1,
            n if n == PROTOCOL_MQISDP.0 => PROTOCOL_MQISDP.1,
            _ => return Err(PacketError::InvalidProtocolName(name)),
        };
        if level != expected {
            return Err(PacketError::InvalidProtocolLevel(level));
        }

        let flags = r.u8("connect flags")?;
        let has_will = flags & FLAG_WILL != 0;
        let will_bits = flags & (FLAG_WILL_QOS | FLAG_WILL_RETAIN);
        if flags & FLAG_RESERVED != 0
            || (!has_will && will_bits != 0)
            || (flags & FLAG_PASSWORD != 0 && flags & FLAG_USERNAME == 0)
        {
            return Err(PacketError::InvalidConnectFlags(flags));
        }

        let keep_alive = r.u16("keep alive")?;
        let client_id = r.string("client id")?;

        let will = if has_will {
            let qos = QoS::try_from((flags & FLAG_WILL_QOS) >> 3)?;
            let topic = r.string("will topic")?;
            let payload = r.binary("will payload")?.to_vec();
            Some(Will {
                topic,
                payload,
                qos,
                retain: flags & FLAG_WILL_RETAIN != 0,
            })
        } else {
            None
        };

        let username = if flags & FLAG_USERNAME != 0 {
            Some(r.string("username")?)
        } else {
            None
        };
        let password = if flags & FLAG_PASSWORD != 0 {
            Some(r.binary("password")?.to_vec())
        } else {
            None
        };
        r.finish()?;

        Ok(Self {
            client_id,
            keep_alive,
            clean_session: flags & FLAG_CLEAN_SESSION != 0,
            will,
            username,
            password,
            protocol_level: level,
        })
    }
}

// ============================================================================
// ConnackCode
// ============================================================================

/// CONNACK return codes defined by MQTT 3.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnackCode {
    /// Connection accepted.
    Accepted = 0,
    /// Unacceptable protocol version.
    UnacceptableProtocolVersion = 1,
    /// Client identifier rejected.
    IdentifierRejected = 2,
    /// Server unavailable.
    ServerUnavailable = 3,
    /// Bad user name or password.
    BadUsernameOrPassword = 4,
    /// Not authorized.
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnackCode {
    type Error = PacketError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUsernameOrPassword,
            5 => Self::NotAuthorized,
            other => return Err(PacketError::InvalidReturnCode(other)),
        })
    }
}

impl fmt::Display for ConnackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "Connection accepted",
            Self::UnacceptableProtocolVersion => "Unacceptable protocol version",
            Self::IdentifierRejected => "Identifier rejected",
            Self::ServerUnavailable => "Server unavailable",
            Self::BadUsernameOrPassword => "Bad user name or password",
            Self::NotAuthorized => "Not authorized",
        })
    }
}

// ============================================================================
// Connack
// ============================================================================

/// Connect acknowledgment.
///
/// The return code is kept as a raw byte so that out-of-range values can be
/// represented; they are rejected when the packet is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connack {
    /// Broker resumed an existing session.
    pub session_present: bool,
    /// Raw return code, see [`ConnackCode`].
    pub return_code: u8,
}

impl Connack {
    /// Body length is always two bytes.
    pub(crate) const BODY_LEN: usize = 2;

    /// Creates a CONNACK with the given code.
    #[inline]
    #[must_use]
    pub const fn new(code: ConnackCode) -> Self {
        Self {
            session_present: false,
            return_code: code as u8,
        }
    }

    /// Creates an accepting CONNACK.
    #[inline]
    #[must_use]
    pub const fn accepted() -> Self {
        Self::new(ConnackCode::Accepted)
    }

    /// Returns the typed return code.
    pub fn code(&self) -> Result<ConnackCode, PacketError> {
        ConnackCode::try_from(self.return_code)
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        self.code()?;
        w.u8(u8::from(self.session_present))?;
        w.u8(self.return_code)
    }

    pub(crate) fn decode_body(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let flags = r.u8("acknowledge flags")?;
        if flags & !1 != 0 {
            return Err(PacketError::InvalidConnectFlags(flags));
        }
        let return_code = r.u8("return code")?;
        ConnackCode::try_from(return_code)?;
        r.finish()?;

        Ok(Self {
            session_present: flags & 1 == 1,
            return_code,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::packet::{ControlPacket, FixedHeader, Packet, PacketType};

    fn encode(packet: &ControlPacket) -> Result<Vec<u8>, PacketError> {
        let mut buf = vec![0u8; packet.encoded_len()];
        let n = packet.encode_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<ControlPacket, PacketError> {
        let packet_type = PacketType::from_nibble(bytes[0] >> 4).unwrap();
        let header = FixedHeader::new(packet_type, bytes[0] & 0x0F, bytes.len() - 2);
        ControlPacket::decode(header, &bytes[2..])
    }

    #[test]
    fn test_default_connect_bytes() {
        let bytes = encode(&ControlPacket::Connect(Connect::default())).unwrap();
        assert_eq!(
            bytes,
            [
                0x10, 12, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_connect_with_credentials_and_will() {
        let connect = Connect {
            client_id: "sensor-1".into(),
            keep_alive: 30,
            clean_session: false,
            will: Some(Will {
                topic: "sensors/1/status".into(),
                payload: b"offline".to_vec(),
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            username: Some("user".into()),
            password: Some(b"secret".to_vec()),
            protocol_level: 4,
        };
        let packet = ControlPacket::Connect(connect.clone());
        let bytes = encode(&packet).unwrap();
        assert_eq!(bytes.len(), packet.encoded_len());
        assert_eq!(bytes[9], 0b1110_1100);

        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_mqisdp_connect() {
        let connect = Connect {
            protocol_level: 3,
            ..Connect::new("legacy")
        };
        let packet = ControlPacket::Connect(connect);
        let bytes = encode(&packet).unwrap();
        assert_eq!(&bytes[4..10], b"MQIsdp");
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_password_without_username_rejected() {
        let connect = Connect {
            password: Some(b"secret".to_vec()),
            ..Connect::new("c")
        };
        assert!(matches!(
            encode(&ControlPacket::Connect(connect)),
            Err(PacketError::InvalidConnectFlags(_))
        ));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let mut bytes = encode(&ControlPacket::Connect(Connect::default())).unwrap();
        bytes[7] = b'X';
        assert_eq!(
            decode(&bytes),
            Err(PacketError::InvalidProtocolName("MQTX".into()))
        );
    }

    #[test]
    fn test_reserved_connect_flag_rejected() {
        let mut bytes = encode(&ControlPacket::Connect(Connect::default())).unwrap();
        bytes[9] |= FLAG_RESERVED;
        assert!(matches!(
            decode(&bytes),
            Err(PacketError::InvalidConnectFlags(_))
        ));
    }

    #[test]
    fn test_connack_bytes() {
        let bytes = encode(&ControlPacket::Connack(Connack::accepted())).unwrap();
        assert_eq!(bytes, [0x20, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_connack_invalid_return_code() {
        let connack = Connack {
            session_present: false,
            return_code: 11,
        };
        assert_eq!(
            encode(&ControlPacket::Connack(connack)),
            Err(PacketError::InvalidReturnCode(11))
        );
        assert_eq!(
            decode(&[0x20, 0x02, 0x00, 0x06]),
            Err(PacketError::InvalidReturnCode(6))
        );
    }

    #[test]
    fn test_connack_code_display() {
        let connack = Connack::new(ConnackCode::NotAuthorized);
        assert_eq!(connack.code().unwrap().to_string(), "Not authorized");
    }
}
