//! Cisco Discovery Protocol, version 2
//!
//! After the LLC/SNAP header comes a 4 byte header (version, TTL in seconds,
//! checksum) and a list of TLVs. TLV lengths include their own 4 byte header.

use netst_core::{Capabilities, ChassisId, DiscoveryFrame, DiscoveryProtocol};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::trace;

use super::{read_u16, read_u32, text_value, tlv_text, DecodeError, EncodeError};

/// LLC DSAP/SSAP/control, Cisco OUI, CDP protocol ID
pub(super) const SNAP_HEADER: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x0c, 0x20, 0x00];

const CDP_VERSION: u8 = 2;
const HEADER_LEN: usize = 4;
const TLV_HEADER_LEN: usize = 4;

const TLV_DEVICE_ID: u16 = 0x0001;
const TLV_ADDRESSES: u16 = 0x0002;
const TLV_PORT_ID: u16 = 0x0003;
const TLV_CAPABILITIES: u16 = 0x0004;
const TLV_VERSION: u16 = 0x0005;
const TLV_PLATFORM: u16 = 0x0006;
const TLV_SYSTEM_NAME: u16 = 0x0014;
const TLV_MANAGEMENT_ADDRESSES: u16 = 0x0016;

// Address protocol encodings used in address TLVs
const PROTO_TYPE_NLPID: u8 = 1;
const PROTO_TYPE_8022: u8 = 2;
const NLPID_IPV4: [u8; 1] = [0xcc];
const SNAP_IPV6: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x86, 0xdd];

fn missing(field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        protocol: DiscoveryProtocol::Cdp,
        field,
    }
}

/// First IP address in an address TLV
fn decode_addresses(value: &[u8]) -> Result<Option<IpAddr>, DecodeError> {
    let truncated = DecodeError::Truncated("address TLV");
    let count = read_u32(value, 0).ok_or(truncated.clone())?;
    let mut pos = 4;

    for _ in 0..count {
        let proto_type = *value.get(pos).ok_or(truncated.clone())?;
        let proto_len = usize::from(*value.get(pos + 1).ok_or(truncated.clone())?);
        let protocol = value.get(pos + 2..pos + 2 + proto_len).ok_or(truncated.clone())?;
        pos += 2 + proto_len;

        let addr_len = usize::from(read_u16(value, pos).ok_or(truncated.clone())?);
        let address = value.get(pos + 2..pos + 2 + addr_len).ok_or(truncated.clone())?;
        pos += 2 + addr_len;

        let ip = match (proto_type, protocol) {
            (PROTO_TYPE_NLPID, p) if p == NLPID_IPV4 => {
                <[u8; 4]>::try_from(address).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b)))
            }
            (PROTO_TYPE_8022, p) if p == SNAP_IPV6 => {
                <[u8; 16]>::try_from(address).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b)))
            }
            _ => None,
        };
        if ip.is_some() {
            return Ok(ip);
        }
    }
    Ok(None)
}

/// Decode a CDP payload starting at the version byte
pub(super) fn decode(body: &[u8]) -> Result<DiscoveryFrame, DecodeError> {
    if body.len() < HEADER_LEN {
        return Err(DecodeError::Truncated("CDP header"));
    }
    let ttl = Duration::from_secs(u64::from(body[1]));

    let mut device_id = None;
    let mut port_id = None;
    let mut system_name = None;
    let mut system_description = None;
    let mut platform = None;
    let mut capabilities = Capabilities::empty();
    let mut address = None;
    let mut management_address = None;

    let mut pos = HEADER_LEN;
    while pos < body.len() {
        let (tlv_type, len) = match (read_u16(body, pos), read_u16(body, pos + 2)) {
            (Some(t), Some(l)) => (t, usize::from(l)),
            _ => return Err(DecodeError::Truncated("CDP TLV header")),
        };
        if len < TLV_HEADER_LEN {
            return Err(DecodeError::Truncated("CDP TLV"));
        }
        let value = body
            .get(pos + TLV_HEADER_LEN..pos + len)
            .ok_or(DecodeError::Truncated("CDP TLV"))?;
        pos += len;

        match tlv_type {
            // Device IDs are names, even when they look like a MAC
            TLV_DEVICE_ID => device_id = Some(ChassisId::Name(tlv_text(value))),
            TLV_PORT_ID => port_id = Some(tlv_text(value)),
            TLV_ADDRESSES if address.is_none() => address = decode_addresses(value)?,
            TLV_MANAGEMENT_ADDRESSES if management_address.is_none() => {
                management_address = decode_addresses(value)?
            }
            TLV_CAPABILITIES => {
                let bits = read_u32(value, 0).ok_or(DecodeError::Truncated("capabilities"))?;
                capabilities = Capabilities::from_cdp_bits(bits);
            }
            TLV_VERSION => system_description = Some(tlv_text(value)),
            TLV_PLATFORM => platform = Some(tlv_text(value)),
            TLV_SYSTEM_NAME => system_name = Some(tlv_text(value)),
            other => trace!(tlv_type = other, len = len, "Skipping CDP TLV"),
        }
    }

    let mut frame = DiscoveryFrame::new(
        DiscoveryProtocol::Cdp,
        device_id.ok_or_else(|| missing("device id"))?,
        port_id.ok_or_else(|| missing("port id"))?,
        ttl,
    );
    frame.system_name = system_name;
    frame.system_description = system_description;
    frame.platform = platform;
    frame.capabilities = capabilities;
    frame.management_address = management_address.or(address);
    Ok(frame)
}

/// Internet checksum over the CDP payload.
///
/// An odd trailing byte is padded with zero on the right.
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn push_tlv(
    out: &mut Vec<u8>,
    tlv_type: u16,
    value: &[u8],
    field: &'static str,
) -> Result<(), EncodeError> {
    let len = u16::try_from(value.len() + TLV_HEADER_LEN).map_err(|_| EncodeError::FieldTooLong {
        protocol: DiscoveryProtocol::Cdp,
        field,
    })?;
    out.extend_from_slice(&tlv_type.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

fn encode_address(addr: IpAddr) -> Vec<u8> {
    let mut out = 1u32.to_be_bytes().to_vec();
    match addr {
        IpAddr::V4(v4) => {
            out.extend_from_slice(&[PROTO_TYPE_NLPID, NLPID_IPV4.len() as u8]);
            out.extend_from_slice(&NLPID_IPV4);
            out.extend_from_slice(&4u16.to_be_bytes());
            out.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            out.extend_from_slice(&[PROTO_TYPE_8022, SNAP_IPV6.len() as u8]);
            out.extend_from_slice(&SNAP_IPV6);
            out.extend_from_slice(&16u16.to_be_bytes());
            out.extend_from_slice(&v6.octets());
        }
    }
    out
}

fn unrepresentable(field: &'static str) -> EncodeError {
    EncodeError::Unrepresentable {
        protocol: DiscoveryProtocol::Cdp,
        field,
    }
}

fn text<'a>(value: &'a str, field: &'static str) -> Result<&'a [u8], EncodeError> {
    text_value(DiscoveryProtocol::Cdp, value, field)
}

/// Encode a CDP payload (header and TLVs, no LLC/SNAP).
///
/// CDP has no MAC form of the device ID, and only some capabilities have a
/// CDP bit. Frames using anything else are rejected.
pub(super) fn encode(frame: &DiscoveryFrame) -> Result<Vec<u8>, EncodeError> {
    let ttl = u8::try_from(frame.ttl.as_secs()).map_err(|_| EncodeError::FieldTooLong {
        protocol: DiscoveryProtocol::Cdp,
        field: "TTL",
    })?;
    let ChassisId::Name(device_id) = &frame.chassis_id else {
        return Err(unrepresentable("MAC chassis id"));
    };
    let mut out = vec![CDP_VERSION, ttl, 0, 0];

    push_tlv(&mut out, TLV_DEVICE_ID, text(device_id, "device id")?, "device id")?;
    if let Some(addr) = frame.management_address {
        push_tlv(&mut out, TLV_ADDRESSES, &encode_address(addr), "addresses")?;
    }
    push_tlv(&mut out, TLV_PORT_ID, text(&frame.port_id, "port id")?, "port id")?;
    if !frame.capabilities.is_empty() {
        let bits = frame
            .capabilities
            .to_cdp_bits()
            .ok_or_else(|| unrepresentable("capabilities"))?;
        push_tlv(&mut out, TLV_CAPABILITIES, &bits.to_be_bytes(), "capabilities")?;
    }
    if let Some(version) = &frame.system_description {
        push_tlv(
            &mut out,
            TLV_VERSION,
            text(version, "software version")?,
            "software version",
        )?;
    }
    if let Some(platform) = &frame.platform {
        push_tlv(&mut out, TLV_PLATFORM, text(platform, "platform")?, "platform")?;
    }
    if let Some(name) = &frame.system_name {
        push_tlv(&mut out, TLV_SYSTEM_NAME, text(name, "system name")?, "system name")?;
    }
    if let Some(addr) = frame.management_address {
        push_tlv(
            &mut out,
            TLV_MANAGEMENT_ADDRESSES,
            &encode_address(addr),
            "management addresses",
        )?;
    }

    let sum = checksum(&out);
    out[2..4].copy_from_slice(&sum.to_be_bytes());
    Ok(out)
}
