//! SUBSCRIBE, SUBACK and UNSUBSCRIBE packets.

// ============================================================================
// Imports
// ============================================================================

use crate::error::PacketError;

use super::publish::QoS;
use super::wire::{Reader, Writer, check_field, field_len};

/// SUBACK failure return code.
const SUBACK_FAILURE: u8 = 0x80;

fn check_packet_id(packet_id: u16) -> Result<(), PacketError> {
    if packet_id == 0 {
        return Err(PacketError::MissingPacketId);
    }
    Ok(())
}

fn check_filter(filter: &str) -> Result<(), PacketError> {
    if filter.is_empty() {
        return Err(PacketError::InvalidTopic(String::new()));
    }
    check_field(filter.len())
}

// ============================================================================
// Subscribe
// ============================================================================

/// A topic filter with its requested QoS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic filter, wildcards allowed.
    pub filter: String,
    /// Maximum QoS requested.
    pub qos: QoS,
}

/// Subscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// Packet identifier.
    pub packet_id: u16,
    /// Requested subscriptions; must not be empty.
    pub subscriptions: Vec<Subscription>,
}

impl Subscribe {
    pub(crate) fn body_len(&self) -> usize {
        2 + self
            .subscriptions
            .iter()
            .map(|s| field_len(s.filter.len()) + 1)
            .sum::<usize>()
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        check_packet_id(self.packet_id)?;
        if self.subscriptions.is_empty() {
            return Err(PacketError::EmptyPayload);
        }
        for subscription in &self.subscriptions {
            check_filter(&subscription.filter)?;
        }

        w.u16(self.packet_id)?;
        for subscription in &self.subscriptions {
            w.string(&subscription.filter)?;
            w.u8(subscription.qos as u8)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let packet_id = r.u16("packet id")?;
        check_packet_id(packet_id)?;

        let mut subscriptions = Vec::new();
        while r.remaining() > 0 {
            let filter = r.string("topic filter")?;
            check_filter(&filter)?;
            let qos = QoS::try_from(r.u8("requested qos")?)?;
            subscriptions.push(Subscription { filter, qos });
        }
        if subscriptions.is_empty() {
            return Err(PacketError::EmptyPayload);
        }

        Ok(Self {
            packet_id,
            subscriptions,
        })
    }
}

// ============================================================================
// Suback
// ============================================================================

/// Per-filter result in a SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubackCode {
    /// Subscription granted at this QoS.
    Granted(QoS),
    /// Subscription refused.
    Failure,
}

impl SubackCode {
    fn as_u8(self) -> u8 {
        match self {
            Self::Granted(qos) => qos as u8,
            Self::Failure => SUBACK_FAILURE,
        }
    }

    fn from_u8(code: u8) -> Result<Self, PacketError> {
        match code {
            SUBACK_FAILURE => Ok(Self::Failure),
            0..=2 => QoS::try_from(code).map(Self::Granted),
            other => Err(PacketError::InvalidReturnCode(other)),
        }
    }
}

/// Subscribe acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suback {
    /// Identifier of the acknowledged SUBSCRIBE.
    pub packet_id: u16,
    /// One code per requested subscription, in order.
    pub return_codes: Vec<SubackCode>,
}

impl Suback {
    pub(crate) fn body_len(&self) -> usize {
        2 + self.return_codes.len()
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        check_packet_id(self.packet_id)?;
        if self.return_codes.is_empty() {
            return Err(PacketError::EmptyPayload);
        }

        w.u16(self.packet_id)?;
        for code in &self.return_codes {
            w.u8(code.as_u8())?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let packet_id = r.u16("packet id")?;
        check_packet_id(packet_id)?;

        let return_codes = r
            .rest()
            .iter()
            .map(|&code| SubackCode::from_u8(code))
            .collect::<Result<Vec<_>, _>>()?;
        if return_codes.is_empty() {
            return Err(PacketError::EmptyPayload);
        }

        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}

// ============================================================================
// Unsubscribe
// ============================================================================

/// Unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    /// Packet identifier.
    pub packet_id: u16,
    /// Topic filters to remove; must not be empty.
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub(crate) fn body_len(&self) -> usize {
        2 + self.filters.iter().map(|f| field_len(f.len())).sum::<usize>()
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), PacketError> {
        check_packet_id(self.packet_id)?;
        if self.filters.is_empty() {
            return Err(PacketError::EmptyPayload);
        }
        for filter in &self.filters {
            check_filter(filter)?;
        }

        w.u16(self.packet_id)?;
        for filter in &self.filters {
            w.string(filter)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(r: &mut Reader<'_>) -> Result<Self, PacketError> {
        let packet_id = r.u16("packet id")?;
        check_packet_id(packet_id)?;

        let mut filters = Vec::new();
        while r.remaining() > 0 {
            let filter = r.string("topic filter")?;
            check_filter(&filter)?;
            filters.push(filter);
        }
        if filters.is_empty() {
            return Err(PacketError::EmptyPayload);
        }

        Ok(Self { packet_id, filters })
    }
}

// ============================================================================
// Tests
// ============================================================================
