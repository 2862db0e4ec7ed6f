//! Port list parsing for scan requests

use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortRangeError {
    #[error("empty port specification")]
    Empty,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("port 0 cannot be scanned")]
    ZeroPort,
    #[error("reversed range {0}-{1}")]
    Reversed(u16, u16),
}

/// Sorted, de-duplicated set of ports, parsed from input like `22,80,8000-8010`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortRange {
    ports: Vec<u16>,
}

impl PortRange {
    pub fn from_ports(ports: impl IntoIterator<Item = u16>) -> Result<Self, PortRangeError> {
        let set: BTreeSet<u16> = ports.into_iter().collect();
        if set.contains(&0) {
            return Err(PortRangeError::ZeroPort);
        }
        Ok(Self {
            ports: set.into_iter().collect(),
        })
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn into_vec(self) -> Vec<u16> {
        self.ports
    }
}

fn parse_port(s: &str) -> Result<u16, PortRangeError> {
    let port: u16 = s
        .trim()
        .parse()
        .map_err(|_| PortRangeError::InvalidPort(s.trim().to_string()))?;
    if port == 0 {
        return Err(PortRangeError::ZeroPort);
    }
    Ok(port)
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = BTreeSet::new();

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_port(start)?;
                    let end = parse_port(end)?;
                    if start > end {
                        return Err(PortRangeError::Reversed(start, end));
                    }
                    set.extend(start..=end);
                }
                None => {
                    set.insert(parse_port(part)?);
                }
            }
        }

        if set.is_empty() {
            return Err(PortRangeError::Empty);
        }

        Ok(Self {
            ports: set.into_iter().collect(),
        })
    }
}
