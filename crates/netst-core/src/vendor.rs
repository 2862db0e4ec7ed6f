//! Vendor command table for active neighbour retrieval
//!
//! Which CLI command prints a device's neighbour table, and which text
//! adapter understands its output, is configuration data keyed by vendor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::target::VendorTag;

/// Text adapter able to read a particular command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserTag {
    /// Cisco `show lldp neighbors detail`
    CiscoLldpDetail,
    /// Cisco `show cdp neighbors detail`
    CiscoCdpDetail,
    /// lldpd `lldpcli show neighbors -f keyvalue`
    LldpcliKeyvalue,
}

/// One command to run on a device and the adapter for its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCommand {
    pub command: String,
    pub parser: ParserTag,
}

impl VendorCommand {
    pub fn new(command: impl Into<String>, parser: ParserTag) -> Self {
        Self {
            command: command.into(),
            parser,
        }
    }
}

/// Mapping from vendor to the neighbour commands to run on its devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCommandTable {
    entries: BTreeMap<VendorTag, Vec<VendorCommand>>,
}

impl Default for VendorCommandTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            VendorTag::Cisco,
            vec![
                VendorCommand::new("show lldp neighbors detail", ParserTag::CiscoLldpDetail),
                VendorCommand::new("show cdp neighbors detail", ParserTag::CiscoCdpDetail),
            ],
        );
        entries.insert(
            VendorTag::Linux,
            vec![VendorCommand::new(
                "lldpcli show neighbors -f keyvalue",
                ParserTag::LldpcliKeyvalue,
            )],
        );
        Self { entries }
    }
}

impl VendorCommandTable {
    pub fn commands(&self, vendor: VendorTag) -> Option<&[VendorCommand]> {
        self.entries
            .get(&vendor)
            .map(Vec::as_slice)
            .filter(|cmds| !cmds.is_empty())
    }

    /// Replace the command list for a vendor
    pub fn set(&mut self, vendor: VendorTag, commands: Vec<VendorCommand>) {
        self.entries.insert(vendor, commands);
    }

    pub fn vendors(&self) -> impl Iterator<Item = VendorTag> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = VendorCommandTable::default();
        let cisco = table.commands(VendorTag::Cisco).unwrap();
        assert_eq!(cisco.len(), 2);
        assert_eq!(cisco[0].parser, ParserTag::CiscoLldpDetail);
        assert_eq!(cisco[1].command, "show cdp neighbors detail");
        assert!(table.commands(VendorTag::Extreme).is_none());
    }

    #[test]
    fn test_override_vendor() {
        let mut table = VendorCommandTable::default();
        table.set(
            VendorTag::Extreme,
            vec![VendorCommand::new(
                "run script lldp.sh",
                ParserTag::LldpcliKeyvalue,
            )],
        );
        assert_eq!(table.commands(VendorTag::Extreme).unwrap().len(), 1);

        table.set(VendorTag::Cisco, Vec::new());
        assert!(table.commands(VendorTag::Cisco).is_none());
    }

    #[test]
    fn test_parser_tag_names() {
        let tag: ParserTag = serde_json::from_str(r#""cisco_cdp_detail""#).unwrap();
        assert_eq!(tag, ParserTag::CiscoCdpDetail);
    }
}
