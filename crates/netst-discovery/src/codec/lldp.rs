//! IEEE 802.1AB LLDPDU
//!
//! Each TLV starts with a 16-bit header: 7 bits of type, 9 bits of length.
//! The LLDPDU is terminated by an End TLV (type 0, length 0).

use netst_core::{format_mac, Capabilities, ChassisId, DiscoveryFrame, DiscoveryProtocol};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::trace;

use super::{read_u16, text_value, tlv_text, DecodeError, EncodeError};

const TLV_END: u8 = 0;
const TLV_CHASSIS_ID: u8 = 1;
const TLV_PORT_ID: u8 = 2;
const TLV_TTL: u8 = 3;
const TLV_SYSTEM_NAME: u8 = 5;
const TLV_SYSTEM_DESCRIPTION: u8 = 6;
const TLV_CAPABILITIES: u8 = 7;
const TLV_MANAGEMENT_ADDRESS: u8 = 8;

const CHASSIS_SUBTYPE_MAC: u8 = 4;
const CHASSIS_SUBTYPE_LOCAL: u8 = 7;
const PORT_SUBTYPE_MAC: u8 = 3;
const PORT_SUBTYPE_INTERFACE_NAME: u8 = 5;

// IANA address family numbers
const ADDRESS_FAMILY_IPV4: u8 = 1;
const ADDRESS_FAMILY_IPV6: u8 = 2;

const MAX_TLV_LEN: usize = 0x01ff;

fn missing(field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        protocol: DiscoveryProtocol::Lldp,
        field,
    }
}

fn decode_chassis(value: &[u8]) -> Result<ChassisId, DecodeError> {
    let (&subtype, id) = value.split_first().ok_or(DecodeError::Truncated("chassis id"))?;
    Ok(match (subtype, <[u8; 6]>::try_from(id)) {
        (CHASSIS_SUBTYPE_MAC, Ok(mac)) => ChassisId::Mac(mac),
        _ => ChassisId::Name(tlv_text(id)),
    })
}

fn decode_port(value: &[u8]) -> Result<String, DecodeError> {
    let (&subtype, id) = value.split_first().ok_or(DecodeError::Truncated("port id"))?;
    Ok(match (subtype, <[u8; 6]>::try_from(id)) {
        (PORT_SUBTYPE_MAC, Ok(mac)) => format_mac(&mac),
        _ => tlv_text(id),
    })
}

/// Address from a management address TLV; unknown families are ignored
fn decode_management_address(value: &[u8]) -> Result<Option<IpAddr>, DecodeError> {
    let string_len = usize::from(*value.first().ok_or(DecodeError::Truncated("management address"))?);
    let address = value
        .get(1..1 + string_len)
        .ok_or(DecodeError::Truncated("management address"))?;
    let Some((&family, bytes)) = address.split_first() else {
        return Ok(None);
    };
    Ok(match family {
        ADDRESS_FAMILY_IPV4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        ADDRESS_FAMILY_IPV6 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    })
}

pub(super) fn decode(body: &[u8]) -> Result<DiscoveryFrame, DecodeError> {
    let mut chassis_id = None;
    let mut port_id = None;
    let mut ttl = None;
    let mut system_name = None;
    let mut system_description = None;
    let mut capabilities = Capabilities::empty();
    let mut management_address = None;

    let mut pos = 0;
    loop {
        let header = read_u16(body, pos).ok_or(DecodeError::Truncated("LLDP TLV header"))?;
        let tlv_type = (header >> 9) as u8;
        let len = usize::from(header & 0x01ff);
        pos += 2;
        let value = body
            .get(pos..pos + len)
            .ok_or(DecodeError::Truncated("LLDP TLV"))?;
        pos += len;

        match tlv_type {
            TLV_END => break,
            TLV_CHASSIS_ID => chassis_id = Some(decode_chassis(value)?),
            TLV_PORT_ID => port_id = Some(decode_port(value)?),
            TLV_TTL => {
                let secs = read_u16(value, 0).ok_or(DecodeError::Truncated("TTL"))?;
                ttl = Some(Duration::from_secs(u64::from(secs)));
            }
            TLV_SYSTEM_NAME => system_name = Some(tlv_text(value)),
            TLV_SYSTEM_DESCRIPTION => system_description = Some(tlv_text(value)),
            TLV_CAPABILITIES => {
                let enabled = read_u16(value, 2).ok_or(DecodeError::Truncated("capabilities"))?;
                capabilities = Capabilities::from_bits(enabled);
            }
            TLV_MANAGEMENT_ADDRESS if management_address.is_none() => {
                management_address = decode_management_address(value)?;
            }
            other => trace!(tlv_type = other, len = len, "Skipping LLDP TLV"),
        }
    }

    let mut frame = DiscoveryFrame::new(
        DiscoveryProtocol::Lldp,
        chassis_id.ok_or_else(|| missing("chassis id"))?,
        port_id.ok_or_else(|| missing("port id"))?,
        ttl.ok_or_else(|| missing("TTL"))?,
    );
    frame.system_name = system_name;
    frame.system_description = system_description;
    frame.capabilities = capabilities;
    frame.management_address = management_address;
    Ok(frame)
}

fn push_tlv(
    out: &mut Vec<u8>,
    tlv_type: u8,
    value: &[u8],
    field: &'static str,
) -> Result<(), EncodeError> {
    if value.len() > MAX_TLV_LEN {
        return Err(EncodeError::FieldTooLong {
            protocol: DiscoveryProtocol::Lldp,
            field,
        });
    }
    let header = (u16::from(tlv_type) << 9) | value.len() as u16;
    out.extend_from_slice(&header.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

fn with_subtype(subtype: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(subtype);
    out.extend_from_slice(value);
    out
}

fn text<'a>(value: &'a str, field: &'static str) -> Result<&'a [u8], EncodeError> {
    text_value(DiscoveryProtocol::Lldp, value, field)
}

/// Encode an LLDPDU. There is no basic TLV for a platform string, so frames
/// carrying one are rejected.
pub(super) fn encode(frame: &DiscoveryFrame) -> Result<Vec<u8>, EncodeError> {
    if frame.platform.is_some() {
        return Err(EncodeError::Unrepresentable {
            protocol: DiscoveryProtocol::Lldp,
            field: "platform",
        });
    }
    let mut out = Vec::new();

    let chassis = match &frame.chassis_id {
        ChassisId::Mac(mac) => with_subtype(CHASSIS_SUBTYPE_MAC, mac),
        ChassisId::Name(name) => with_subtype(CHASSIS_SUBTYPE_LOCAL, text(name, "chassis id")?),
    };
    push_tlv(&mut out, TLV_CHASSIS_ID, &chassis, "chassis id")?;
    push_tlv(
        &mut out,
        TLV_PORT_ID,
        &with_subtype(PORT_SUBTYPE_INTERFACE_NAME, text(&frame.port_id, "port id")?),
        "port id",
    )?;

    let ttl = u16::try_from(frame.ttl.as_secs()).map_err(|_| EncodeError::FieldTooLong {
        protocol: DiscoveryProtocol::Lldp,
        field: "TTL",
    })?;
    push_tlv(&mut out, TLV_TTL, &ttl.to_be_bytes(), "TTL")?;

    if let Some(name) = &frame.system_name {
        push_tlv(&mut out, TLV_SYSTEM_NAME, text(name, "system name")?, "system name")?;
    }
    if let Some(description) = &frame.system_description {
        push_tlv(
            &mut out,
            TLV_SYSTEM_DESCRIPTION,
            text(description, "system description")?,
            "system description",
        )?;
    }
    if !frame.capabilities.is_empty() {
        let bits = frame.capabilities.bits().to_be_bytes();
        push_tlv(
            &mut out,
            TLV_CAPABILITIES,
            &[bits[0], bits[1], bits[0], bits[1]],
            "capabilities",
        )?;
    }
    if let Some(addr) = frame.management_address {
        let (family, bytes) = match addr {
            IpAddr::V4(v4) => (ADDRESS_FAMILY_IPV4, v4.octets().to_vec()),
            IpAddr::V6(v6) => (ADDRESS_FAMILY_IPV6, v6.octets().to_vec()),
        };
        let mut value = vec![bytes.len() as u8 + 1, family];
        value.extend_from_slice(&bytes);
        // Interface numbering: unknown subtype, index 0, no OID
        value.extend_from_slice(&[1, 0, 0, 0, 0, 0]);
        push_tlv(&mut out, TLV_MANAGEMENT_ADDRESS, &value, "management address")?;
    }

    push_tlv(&mut out, TLV_END, &[], "end")?;
    Ok(out)
}
