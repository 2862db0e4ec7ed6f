//! Text adapters for neighbour tables printed by device CLIs
//!
//! Active retrieval runs a vendor command over SSH and hands the output to
//! the adapter named by the command's [`ParserTag`]. Every adapter yields the
//! same [`DiscoveryFrame`] the wire codec produces.

use netst_core::{Capabilities, ChassisId, DiscoveryFrame, DiscoveryProtocol, ParserTag};
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Hold time assumed when LLDP output does not show one
pub const DEFAULT_LLDP_TTL: Duration = Duration::from_secs(120);
/// Hold time assumed when CDP output does not show one
pub const DEFAULT_CDP_TTL: Duration = Duration::from_secs(180);

#[derive(Error, Debug)]
pub enum TextError {
    #[error("{0} is not enabled on the device")]
    ProtocolDisabled(DiscoveryProtocol),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A neighbour parsed from CLI output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNeighbor {
    /// Interface on the queried device the neighbour was heard on, if shown
    pub local_interface: Option<String>,
    pub frame: DiscoveryFrame,
}

/// Parse `output` with the adapter selected by `parser`
pub fn parse(parser: ParserTag, output: &str) -> Result<Vec<ParsedNeighbor>, TextError> {
    // Devices reached over SSH often answer with CRLF line endings
    let output = output.replace("\r\n", "\n");
    let neighbors = match parser {
        ParserTag::CiscoLldpDetail => parse_cisco_lldp_detail(&output)?,
        ParserTag::CiscoCdpDetail => parse_cisco_cdp_detail(&output)?,
        ParserTag::LldpcliKeyvalue => parse_lldpcli_keyvalue(&output)?,
    };
    debug!(parser = ?parser, neighbors = neighbors.len(), "Parsed neighbour output");
    Ok(neighbors)
}

/// Patterns are compiled on first use and shared afterwards
fn compiled<T>(
    cell: &'static OnceLock<Result<T, regex::Error>>,
    compile: impl FnOnce() -> Result<T, regex::Error>,
) -> Result<&'static T, TextError> {
    cell.get_or_init(compile)
        .as_ref()
        .map_err(|e| TextError::Pattern(e.clone()))
}

struct Common {
    separator: Regex,
    lldp_disabled: Regex,
    cdp_disabled: Regex,
}

impl Common {
    fn get() -> Result<&'static Self, TextError> {
        static PATTERNS: OnceLock<Result<Common, regex::Error>> = OnceLock::new();
        compiled(&PATTERNS, || {
            Ok(Common {
                separator: Regex::new(r"(?m)^-{5,}[ \t]*$")?,
                // IOS answers with exactly this line when the protocol is off
                lldp_disabled: Regex::new(r"(?m)^[ \t]*%[ \t]*LLDP is not enabled\.?[ \t]*$")?,
                cdp_disabled: Regex::new(r"(?m)^[ \t]*%[ \t]*CDP is not enabled\.?[ \t]*$")?,
            })
        })
    }
}

fn check_enabled(output: &str, protocol: DiscoveryProtocol) -> Result<(), TextError> {
    let common = Common::get()?;
    let disabled = match protocol {
        DiscoveryProtocol::Lldp => &common.lldp_disabled,
        DiscoveryProtocol::Cdp => &common.cdp_disabled,
    };
    if disabled.is_match(output) {
        return Err(TextError::ProtocolDisabled(protocol));
    }
    Ok(())
}

fn capture<'a>(re: &Regex, block: &'a str) -> Option<&'a str> {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn split_blocks(output: &str) -> Result<Vec<&str>, TextError> {
    Ok(Common::get()?.separator.split(output).collect())
}

struct CiscoLldp {
    local_intf: Regex,
    chassis_id: Regex,
    port_id: Regex,
    system_name: Regex,
    system_description: Regex,
    time_remaining: Regex,
    capabilities: Regex,
    address: Regex,
}

impl CiscoLldp {
    fn get() -> Result<&'static Self, TextError> {
        static PATTERNS: OnceLock<Result<CiscoLldp, regex::Error>> = OnceLock::new();
        compiled(&PATTERNS, || {
            Ok(CiscoLldp {
                local_intf: Regex::new(r"(?m)^Local Intf:\s*(\S+)")?,
                chassis_id: Regex::new(r"(?m)^Chassis id:\s*(\S+)")?,
                port_id: Regex::new(r"(?m)^Port id:\s*(\S+)")?,
                system_name: Regex::new(r"(?m)^System Name:\s*(\S+)")?,
                system_description: Regex::new(r"(?m)^System Description:\s*(\S.*)$")?,
                time_remaining: Regex::new(r"(?m)^Time remaining:\s*(\d+)\s*seconds")?,
                capabilities: Regex::new(r"(?m)^Enabled Capabilities:\s*(\S+)")?,
                address: Regex::new(r"(?m)^\s*IP(?:V6)?:\s*([0-9A-Fa-f:.]+)")?,
            })
        })
    }
}

/// Cisco IOS `show lldp neighbors detail`
fn parse_cisco_lldp_detail(output: &str) -> Result<Vec<ParsedNeighbor>, TextError> {
    check_enabled(output, DiscoveryProtocol::Lldp)?;
    let re = CiscoLldp::get()?;

    let mut neighbors = Vec::new();
    for block in split_blocks(output)? {
        let (Some(chassis), Some(port)) = (capture(&re.chassis_id, block), capture(&re.port_id, block))
        else {
            continue;
        };

        let ttl = capture(&re.time_remaining, block)
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LLDP_TTL);

        let mut frame =
            DiscoveryFrame::new(DiscoveryProtocol::Lldp, ChassisId::from_text(chassis), port, ttl);
        frame.system_name = capture(&re.system_name, block).map(str::to_string);
        frame.system_description = capture(&re.system_description, block).map(str::to_string);
        frame.capabilities = capture(&re.capabilities, block)
            .map(Capabilities::from_cisco_codes)
            .unwrap_or_default();
        frame.management_address = re
            .address
            .captures_iter(block)
            .find_map(|c| c[1].parse::<IpAddr>().ok());

        neighbors.push(ParsedNeighbor {
            local_interface: capture(&re.local_intf, block).map(str::to_string),
            frame,
        });
    }
    Ok(neighbors)
}

struct CiscoCdp {
    device_id: Regex,
    entry_address: Regex,
    platform: Regex,
    capabilities: Regex,
    interface: Regex,
    port_id: Regex,
    holdtime: Regex,
    version: Regex,
    management: Regex,
}

impl CiscoCdp {
    fn get() -> Result<&'static Self, TextError> {
        static PATTERNS: OnceLock<Result<CiscoCdp, regex::Error>> = OnceLock::new();
        compiled(&PATTERNS, || {
            Ok(CiscoCdp {
                device_id: Regex::new(r"Device ID:\s*(\S+)")?,
                entry_address: Regex::new(r"IP(?:v6)? address:\s*([0-9A-Fa-f:.]+)")?,
                platform: Regex::new(r"Platform:\s*([^,\n]+)")?,
                capabilities: Regex::new(r"Capabilities:\s*([^\n]*)")?,
                interface: Regex::new(r"Interface:\s*([^,\s]+)")?,
                port_id: Regex::new(r"Port ID \(outgoing port\):\s*(\S+)")?,
                holdtime: Regex::new(r"Holdtime\s*:\s*(\d+)\s*sec")?,
                version: Regex::new(r"(?m)^Version\s*:\s*(\S.*)$")?,
                management: Regex::new(
                    r"Management address\(es\):\s*IP(?:v6)? address:\s*([0-9A-Fa-f:.]+)",
                )?,
            })
        })
    }
}

/// Cisco IOS `show cdp neighbors detail`
fn parse_cisco_cdp_detail(output: &str) -> Result<Vec<ParsedNeighbor>, TextError> {
    check_enabled(output, DiscoveryProtocol::Cdp)?;
    let re = CiscoCdp::get()?;

    let mut neighbors = Vec::new();
    for block in split_blocks(output)? {
        let (Some(device), Some(port)) = (capture(&re.device_id, block), capture(&re.port_id, block))
        else {
            continue;
        };

        let ttl = capture(&re.holdtime, block)
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CDP_TTL);

        // Same as the wire codec: a CDP device ID is a name
        let mut frame = DiscoveryFrame::new(
            DiscoveryProtocol::Cdp,
            ChassisId::Name(device.to_string()),
            port,
            ttl,
        );
        frame.system_name = Some(device.to_string());
        frame.system_description = capture(&re.version, block).map(str::to_string);
        frame.platform = capture(&re.platform, block).map(str::to_string);
        frame.capabilities = capture(&re.capabilities, block)
            .map(Capabilities::from_cdp_words)
            .unwrap_or_default();
        // The management address wins over the entry address
        frame.management_address = capture(&re.management, block)
            .or_else(|| capture(&re.entry_address, block))
            .and_then(|s| s.parse().ok());

        neighbors.push(ParsedNeighbor {
            local_interface: capture(&re.interface, block).map(str::to_string),
            frame,
        });
    }
    Ok(neighbors)
}

/// Top-level sections of an lldpcli neighbour key, after the interface name
const LLDPCLI_SECTIONS: [&str; 10] = [
    "via", "rid", "age", "chassis", "port", "vlan", "ppvid", "pi", "lldp-med", "unknown-tlvs",
];

/// Split `lldp.<interface>.<field>=<value>`.
///
/// Interface names can contain dots (`eth0.100`), so the field begins at
/// the first known section rather than the second dot.
fn lldpcli_entry(line: &str) -> Option<(&str, &str, &str)> {
    let (key, value) = line.trim().split_once('=')?;
    let rest = key.strip_prefix("lldp.")?;
    let dot = rest.match_indices('.').map(|(i, _)| i).find(|&i| {
        rest[i + 1..]
            .split('.')
            .next()
            .is_some_and(|section| LLDPCLI_SECTIONS.contains(&section))
    })?;
    Some((&rest[..dot], &rest[dot + 1..], value.trim()))
}

/// Fields of one lldpcli neighbour; keys such as `chassis.mgmt-ip` repeat
type LldpcliFields<'a> = HashMap<&'a str, Vec<&'a str>>;

/// lldpd `lldpcli show neighbors -f keyvalue`.
///
/// Each neighbour's keys are contiguous and begin with `via`, so a new
/// interface or a second `via` starts the next neighbour.
fn parse_lldpcli_keyvalue(output: &str) -> Result<Vec<ParsedNeighbor>, TextError> {
    check_enabled(output, DiscoveryProtocol::Lldp)?;

    let mut groups: Vec<(&str, LldpcliFields)> = Vec::new();
    for (interface, field, value) in output.lines().filter_map(lldpcli_entry) {
        let same_neighbor = groups.last().is_some_and(|(current, fields)| {
            *current == interface && !(field == "via" && fields.contains_key("via"))
        });
        if !same_neighbor {
            groups.push((interface, HashMap::new()));
        }
        if let Some((_, fields)) = groups.last_mut() {
            fields.entry(field).or_default().push(value);
        }
    }

    Ok(groups
        .iter()
        .filter_map(|(interface, fields)| build_lldpcli_neighbor(interface, fields))
        .collect())
}

fn lldpcli_capability(name: &str) -> Option<Capabilities> {
    match name.to_lowercase().as_str() {
        "other" => Some(Capabilities::OTHER),
        "repeater" => Some(Capabilities::REPEATER),
        "bridge" => Some(Capabilities::BRIDGE),
        "wlan" => Some(Capabilities::WLAN_AP),
        "router" => Some(Capabilities::ROUTER),
        "tel" => Some(Capabilities::TELEPHONE),
        "docsis" => Some(Capabilities::DOCSIS),
        "station" => Some(Capabilities::STATION),
        _ => None,
    }
}

fn build_lldpcli_neighbor(interface: &str, fields: &LldpcliFields) -> Option<ParsedNeighbor> {
    let get = |key: &str| fields.get(key).and_then(|values| values.first()).copied();
    let first = |keys: &[&str]| keys.iter().find_map(|key| get(*key));

    let chassis = first(&["chassis.mac", "chassis.id", "chassis.local", "chassis.name"])?;
    let port = first(&["port.ifname", "port.id", "port.mac", "port.local"])?;

    // lldpd also relays CDP it hears; `via` says which protocol it was
    let protocol = match get("via") {
        Some(via) if via.starts_with("CDP") => DiscoveryProtocol::Cdp,
        _ => DiscoveryProtocol::Lldp,
    };
    let ttl = first(&["port.ttl", "chassis.ttl"])
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(match protocol {
            DiscoveryProtocol::Lldp => DEFAULT_LLDP_TTL,
            DiscoveryProtocol::Cdp => DEFAULT_CDP_TTL,
        });

    let mut frame = DiscoveryFrame::new(protocol, ChassisId::from_text(chassis), port, ttl);
    frame.system_name = get("chassis.name").map(str::to_string);
    frame.system_description = get("chassis.descr").map(str::to_string);
    frame.management_address = fields
        .get("chassis.mgmt-ip")
        .into_iter()
        .flatten()
        .filter_map(|v| v.parse::<IpAddr>().ok())
        .min();
    frame.capabilities = fields
        .iter()
        .filter_map(|(key, values)| {
            let name = key.strip_prefix("chassis.")?.strip_suffix(".enabled")?;
            values
                .contains(&"on")
                .then(|| lldpcli_capability(name))
                .flatten()
        })
        .fold(Capabilities::empty(), |acc, cap| acc | cap);

    Some(ParsedNeighbor {
        local_interface: Some(interface.to_string()),
        frame,
    })
}
