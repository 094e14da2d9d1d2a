//! Resolved typed configuration consumed by the core.
//!
//! Parsing configuration files is explicitly out of scope (spec §1); what
//! the core needs is the shape in §6. `Config::from_toml_str` is a thin
//! convenience for tests and the `bbsd` binary, not the crate's focus.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LineType {
    Telnet,
    Serial,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FlowControl {
    None,
    Rts,
    Xon,
    Dtr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum Parity {
    N,
    E,
    O,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct SerialConfig {
    pub driver: String,
    pub port: u32,
    pub baud: u32,
    pub bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

impl SerialConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(300..=115200).contains(&self.baud) {
            return Err(format!("baud {} out of range 300-115200", self.baud));
        }
        if !matches!(self.bits, 5..=8) {
            return Err(format!("word size {} out of range 5-8", self.bits));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(format!("stop bits {} must be 1 or 2", self.stop_bits));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct LineConfig {
    pub line_type: LineType,
    pub enabled: bool,
    pub idle_timeout_secs: u32,
    pub serial: Option<SerialConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct FtnAddress {
    pub zone: u16,
    pub net: u16,
    pub node: u16,
    pub point: u16,
}

impl FtnAddress {
    pub const fn new(zone: u16, net: u16, node: u16, point: u16) -> Self {
        FtnAddress {
            zone,
            net,
            node,
            point,
        }
    }

    /// Points resolve to their boss node for routing purposes (spec §4.9
    /// "Netmail routing": "Points resolve to their boss node (point=0)").
    pub fn boss(self) -> Self {
        FtnAddress { point: 0, ..self }
    }
}

impl std::fmt::Display for FtnAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.point == 0 {
            write!(f, "{}:{}/{}", self.zone, self.net, self.node)
        } else {
            write!(f, "{}:{}/{}.{}", self.zone, self.net, self.node, self.point)
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct AkaConfig {
    pub address: FtnAddress,
    pub domain: String,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct UplinkConfig {
    pub address: FtnAddress,
    pub password: String,
    pub groups: Vec<char>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct DownlinkConfig {
    pub address: FtnAddress,
    pub password: String,
    pub subscribed_areas: Vec<String>,
    pub allowed_echoes: Vec<String>,
    pub allowed_groups: Vec<char>,
    pub allowed_files: Vec<String>,
    pub max_areas: usize,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct Config {
    pub root: PathBuf,
    pub bbs_name: String,
    pub telnet_port: u16,
    pub lines: Vec<LineConfig>,
    pub akas: Vec<AkaConfig>,
    pub uplinks: Vec<UplinkConfig>,
    pub downlinks: Vec<DownlinkConfig>,
    pub binkp_port: u16,
    pub origin_lines: Vec<String>,
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("Resources/Data")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("Logs")
    }

    pub fn ftn_inbound_dir(&self, domain: &str) -> PathBuf {
        self.root.join("FTN/Inbound").join(domain)
    }

    pub fn ftn_outbound_dir(&self, domain: &str) -> PathBuf {
        self.root.join("FTN/Outbound").join(domain)
    }

    pub fn nodelist_dir(&self, network: &str) -> PathBuf {
        self.root.join("FTN/Nodelists").join(network)
    }

    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_validates_baud_and_word_format() {
        let mut s = SerialConfig {
            driver: "uart".into(),
            port: 0,
            baud: 9600,
            bits: 8,
            parity: Parity::N,
            stop_bits: 1,
            flow_control: FlowControl::None,
        };
        assert!(s.validate().is_ok());
        s.baud = 200;
        assert!(s.validate().is_err());
    }

    #[test]
    fn point_address_resolves_to_boss() {
        let addr = FtnAddress::new(1, 234, 5, 6);
        assert_eq!(addr.boss(), FtnAddress::new(1, 234, 5, 0));
    }

    #[test]
    fn address_display_omits_point_when_zero() {
        assert_eq!(FtnAddress::new(1, 2, 3, 0).to_string(), "1:2/3");
        assert_eq!(FtnAddress::new(1, 2, 3, 4).to_string(), "1:2/3.4");
    }
}
