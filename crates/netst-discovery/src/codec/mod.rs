//! LLDP and CDP frame codec
//!
//! [`decode`] takes a full Ethernet frame as read from the wire and returns
//! a protocol-neutral [`DiscoveryFrame`]. The protocol is picked from the
//! Ethernet header: EtherType 0x88CC for LLDP, an 802.3 length field plus
//! the Cisco LLC/SNAP header for CDP. An 802.1Q tag in front is skipped.
//!
//! [`encode`] produces frames in the same layout and exists mainly to build
//! fixtures for tests.

mod cdp;
mod lldp;

use netst_core::{DiscoveryFrame, DiscoveryProtocol};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::vlan::VlanPacket;
use pnet::util::MacAddr;
use thiserror::Error;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
/// Largest value of the type/length field that is a length, not an EtherType
const MAX_8023_LENGTH: u16 = 1500;
/// Frames shorter than this are zero padded on encode
const MIN_FRAME_LEN: usize = 60;

pub(crate) const LLDP_MULTICAST: MacAddr = MacAddr(0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e);
pub(crate) const CDP_MULTICAST: MacAddr = MacAddr(0x01, 0x00, 0x0c, 0xcc, 0xcc, 0xcc);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{protocol} frame has no {field}")]
    MissingField {
        protocol: DiscoveryProtocol,
        field: &'static str,
    },
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("not an LLDP or CDP frame")]
    UnsupportedProtocol,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} is too long for a {protocol} TLV")]
    FieldTooLong {
        protocol: DiscoveryProtocol,
        field: &'static str,
    },
    /// The field has no form in this protocol that decodes back to the same value
    #[error("{field} cannot be carried by {protocol}")]
    Unrepresentable {
        protocol: DiscoveryProtocol,
        field: &'static str,
    },
}

/// Find the discovery payload inside an Ethernet frame.
///
/// For CDP the payload is cut to the 802.3 length, so trailing padding is
/// never read as TLVs. The LLC/SNAP header is stripped.
fn locate(raw: &[u8]) -> Result<(DiscoveryProtocol, &[u8]), DecodeError> {
    let ethernet = EthernetPacket::new(raw).ok_or(DecodeError::Truncated("ethernet header"))?;
    let mut ethertype = ethernet.get_ethertype();
    let mut offset = ETHERNET_HEADER_LEN;

    if ethertype == EtherTypes::Vlan {
        let tag = VlanPacket::new(&raw[offset..]).ok_or(DecodeError::Truncated("802.1Q tag"))?;
        ethertype = tag.get_ethertype();
        offset += VLAN_TAG_LEN;
    }

    let body = &raw[offset..];
    match ethertype {
        EtherTypes::Lldp => Ok((DiscoveryProtocol::Lldp, body)),
        EtherType(length) if length <= MAX_8023_LENGTH => {
            let snap = cdp::SNAP_HEADER.len();
            if !body.starts_with(&cdp::SNAP_HEADER) {
                return Err(if body.len() < snap && cdp::SNAP_HEADER.starts_with(body) {
                    DecodeError::Truncated("LLC/SNAP header")
                } else {
                    DecodeError::UnsupportedProtocol
                });
            }
            let length = usize::from(length);
            if length > body.len() {
                return Err(DecodeError::Truncated("802.3 payload"));
            }
            if length < snap {
                return Err(DecodeError::Truncated("LLC/SNAP header"));
            }
            Ok((DiscoveryProtocol::Cdp, &body[snap..length]))
        }
        _ => Err(DecodeError::UnsupportedProtocol),
    }
}

/// Which discovery protocol a raw frame carries, if any
pub fn detect(raw: &[u8]) -> Option<DiscoveryProtocol> {
    locate(raw).ok().map(|(protocol, _)| protocol)
}

/// Decode an LLDP or CDP Ethernet frame
pub fn decode(raw: &[u8]) -> Result<DiscoveryFrame, DecodeError> {
    match locate(raw)? {
        (DiscoveryProtocol::Lldp, body) => lldp::decode(body),
        (DiscoveryProtocol::Cdp, body) => cdp::decode(body),
    }
}

/// Encode a frame as an Ethernet frame addressed to the protocol's multicast group.
///
/// The source address is the chassis MAC when the chassis is identified by
/// one, otherwise all zeros.
pub fn encode(frame: &DiscoveryFrame) -> Result<Vec<u8>, EncodeError> {
    let (destination, ethertype, payload) = match frame.protocol {
        DiscoveryProtocol::Lldp => (LLDP_MULTICAST, EtherTypes::Lldp, lldp::encode(frame)?),
        DiscoveryProtocol::Cdp => {
            let mut payload = cdp::SNAP_HEADER.to_vec();
            payload.extend(cdp::encode(frame)?);
            let length = u16::try_from(payload.len())
                .ok()
                .filter(|len| *len <= MAX_8023_LENGTH)
                .ok_or(EncodeError::FieldTooLong {
                    protocol: DiscoveryProtocol::Cdp,
                    field: "frame",
                })?;
            (CDP_MULTICAST, EtherType(length), payload)
        }
    };

    let source = match frame.chassis_id {
        netst_core::ChassisId::Mac(m) => MacAddr(m[0], m[1], m[2], m[3], m[4], m[5]),
        netst_core::ChassisId::Name(_) => MacAddr::zero(),
    };

    let mut buffer = vec![0u8; (ETHERNET_HEADER_LEN + payload.len()).max(MIN_FRAME_LEN)];
    {
        // The buffer is always at least a full header long
        if let Some(mut ethernet) = MutableEthernetPacket::new(&mut buffer[..ETHERNET_HEADER_LEN]) {
            ethernet.set_destination(destination);
            ethernet.set_source(source);
            ethernet.set_ethertype(ethertype);
        }
    }
    buffer[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + payload.len()].copy_from_slice(&payload);
    Ok(buffer)
}

/// Read a big-endian u16 at `at`
pub(crate) fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Read a big-endian u32 at `at`
pub(crate) fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Text TLV value, with trailing NULs some devices append removed
pub(crate) fn tlv_text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .to_string()
}

/// Text for a TLV value. A trailing NUL would be stripped by [`tlv_text`].
pub(crate) fn text_value<'a>(
    protocol: DiscoveryProtocol,
    text: &'a str,
    field: &'static str,
) -> Result<&'a [u8], EncodeError> {
    if text.ends_with('\0') {
        return Err(EncodeError::Unrepresentable { protocol, field });
    }
    Ok(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netst_core::{Capabilities, ChassisId};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    fn lldp_frame() -> DiscoveryFrame {
        let mut frame = DiscoveryFrame::new(
            DiscoveryProtocol::Lldp,
            ChassisId::Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            "Gi1/0/24",
            Duration::from_secs(120),
        );
        frame.system_name = Some("core-sw1".to_string());
        frame.system_description = Some("Cisco IOS Software, C3850".to_string());
        frame.capabilities = Capabilities::BRIDGE | Capabilities::ROUTER;
        frame.management_address = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        frame
    }

    fn cdp_frame() -> DiscoveryFrame {
        let mut frame = DiscoveryFrame::new(
            DiscoveryProtocol::Cdp,
            ChassisId::Name("edge-sw2.lab".to_string()),
            "GigabitEthernet0/3",
            Duration::from_secs(180),
        );
        frame.system_name = Some("edge-sw2".to_string());
        frame.system_description = Some("Cisco IOS Software, Version 15.2(7)E".to_string());
        frame.platform = Some("cisco WS-C2960X-48TS-L".to_string());
        frame.capabilities = Capabilities::BRIDGE | Capabilities::ROUTER;
        frame.management_address = Some(IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 2)));
        frame
    }

    #[test]
    fn test_round_trip_both_protocols() {
        for frame in [lldp_frame(), cdp_frame()] {
            let raw = encode(&frame).unwrap();
            assert_eq!(detect(&raw), Some(frame.protocol));
            assert_eq!(decode(&raw).unwrap(), frame);
        }
    }

    #[test]
    fn test_minimal_frames_round_trip() {
        let lldp = DiscoveryFrame::new(
            DiscoveryProtocol::Lldp,
            ChassisId::Name("host-a".to_string()),
            "eth0",
            Duration::from_secs(30),
        );
        let cdp = DiscoveryFrame::new(
            DiscoveryProtocol::Cdp,
            ChassisId::Name("router-b".to_string()),
            "Fa0/1",
            Duration::from_secs(0),
        );
        for frame in [lldp, cdp] {
            let raw = encode(&frame).unwrap();
            assert_eq!(raw.len(), MIN_FRAME_LEN);
            assert_eq!(decode(&raw).unwrap(), frame);
        }
    }

    #[test]
    fn test_encode_uses_multicast_destination() {
        let raw = encode(&lldp_frame()).unwrap();
        assert_eq!(&raw[..6], &[0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e]);
        assert_eq!(&raw[6..12], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(&raw[12..14], &[0x88, 0xcc]);

        let raw = encode(&cdp_frame()).unwrap();
        assert_eq!(&raw[..6], &[0x01, 0x00, 0x0c, 0xcc, 0xcc, 0xcc]);
        assert_eq!(&raw[6..12], &[0; 6]);
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let raw = encode(&lldp_frame()).unwrap();
        let mut tagged = raw[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x64]);
        tagged.extend_from_slice(&raw[12..]);

        assert_eq!(detect(&tagged), Some(DiscoveryProtocol::Lldp));
        assert_eq!(decode(&tagged).unwrap(), lldp_frame());
    }

    #[test]
    fn test_other_traffic_is_unsupported() {
        let mut ipv4 = vec![0u8; 60];
        ipv4[12] = 0x08;
        assert_eq!(detect(&ipv4), None);
        assert_eq!(decode(&ipv4).unwrap_err(), DecodeError::UnsupportedProtocol);

        // 802.3 length without the Cisco SNAP header (e.g. STP)
        let mut stp = vec![0u8; 60];
        stp[13] = 0x26;
        stp[14..17].copy_from_slice(&[0x42, 0x42, 0x03]);
        assert_eq!(detect(&stp), None);
    }

    #[test]
    fn test_every_truncation_is_an_error() {
        for raw in [encode(&lldp_frame()).unwrap(), encode(&cdp_frame()).unwrap()] {
            let full = decode(&raw).unwrap();
            for len in 0..raw.len() {
                // Cutting into padding after the End TLV still decodes
                match decode(&raw[..len]) {
                    Ok(frame) => assert_eq!(frame, full),
                    Err(DecodeError::Truncated(_)) | Err(DecodeError::MissingField { .. }) => {}
                    Err(other) => panic!("len {}: unexpected {:?}", len, other),
                }
            }
            assert!(matches!(decode(&raw[..10]), Err(DecodeError::Truncated(_))));
        }
    }

    /// Every field value a frame can hold in one protocol decodes back unchanged
    #[test]
    fn test_round_trip_field_table() {
        let every_lldp = (0..8).fold(Capabilities::empty(), |acc, bit| {
            acc | Capabilities::from_bits(1 << bit)
        });
        let every_cdp = Capabilities::ROUTER
            | Capabilities::BRIDGE
            | Capabilities::STATION
            | Capabilities::REPEATER
            | Capabilities::TELEPHONE;

        let cases: Vec<(&str, DiscoveryFrame)> = vec![
            ("lldp every capability", {
                let mut frame = lldp_frame();
                frame.capabilities = every_lldp;
                frame
            }),
            ("cdp every capability", {
                let mut frame = cdp_frame();
                frame.capabilities = every_cdp;
                frame
            }),
            ("cdp mac-like device id", {
                let mut frame = cdp_frame();
                frame.chassis_id = ChassisId::Name("0011.2233.4455".to_string());
                frame
            }),
            ("cdp colon mac-like device id", {
                let mut frame = cdp_frame();
                frame.chassis_id = ChassisId::Name("aa:bb:cc:dd:ee:ff".to_string());
                frame
            }),
            ("lldp mac-like name", {
                let mut frame = lldp_frame();
                frame.chassis_id = ChassisId::Name("001122334455".to_string());
                frame
            }),
            ("lldp six byte name", {
                let mut frame = lldp_frame();
                frame.chassis_id = ChassisId::Name("sw-a01".to_string());
                frame
            }),
            ("cdp empty text", {
                let mut frame = cdp_frame();
                frame.system_name = Some(String::new());
                frame.platform = Some(String::new());
                frame
            }),
            ("lldp withdrawal", {
                let mut frame = lldp_frame();
                frame.ttl = Duration::ZERO;
                frame
            }),
            ("lldp longest ttl", {
                let mut frame = lldp_frame();
                frame.ttl = Duration::from_secs(u64::from(u16::MAX));
                frame
            }),
        ];

        for (name, frame) in cases {
            let raw = encode(&frame).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(decode(&raw).as_ref(), Ok(&frame), "{}", name);
        }
    }

    /// Values that would decode differently are refused instead of encoded
    #[test]
    fn test_lossy_fields_rejected() {
        let cases: Vec<(&str, DiscoveryFrame, &str)> = vec![
            ("cdp mac chassis", {
                let mut frame = cdp_frame();
                frame.chassis_id = ChassisId::Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
                frame
            }, "MAC chassis id"),
            ("cdp other", {
                let mut frame = cdp_frame();
                frame.capabilities = Capabilities::OTHER;
                frame
            }, "capabilities"),
            ("cdp wlan", {
                let mut frame = cdp_frame();
                frame.capabilities = Capabilities::ROUTER | Capabilities::WLAN_AP;
                frame
            }, "capabilities"),
            ("cdp docsis", {
                let mut frame = cdp_frame();
                frame.capabilities = Capabilities::DOCSIS;
                frame
            }, "capabilities"),
            ("lldp platform", {
                let mut frame = lldp_frame();
                frame.platform = Some("cisco WS-C3850".to_string());
                frame
            }, "platform"),
            ("lldp trailing nul", {
                let mut frame = lldp_frame();
                frame.system_name = Some("core-sw1\0".to_string());
                frame
            }, "system name"),
            ("lldp nul chassis name", {
                let mut frame = lldp_frame();
                frame.chassis_id = ChassisId::Name("host\0".to_string());
                frame
            }, "chassis id"),
            ("cdp trailing nul", {
                let mut frame = cdp_frame();
                frame.system_description = Some("IOS\0\0".to_string());
                frame
            }, "software version"),
        ];

        for (name, frame, expected) in cases {
            match encode(&frame) {
                Err(EncodeError::Unrepresentable { protocol, field }) => {
                    assert_eq!(protocol, frame.protocol, "{}", name);
                    assert_eq!(field, expected, "{}", name);
                }
                other => panic!("{}: unexpected {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_oversized_field_rejected() {
        let mut frame = lldp_frame();
        frame.system_description = Some("x".repeat(600));
        assert!(matches!(
            encode(&frame),
            Err(EncodeError::FieldTooLong { field: "system description", .. })
        ));
    }
}
