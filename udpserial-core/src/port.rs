//! Port specification
//!
//! A [`PortSpec`] describes one serial↔UDP bridge: the serial line parameters, the
//! packet separator used to cut the serial stream into datagrams, and the two UDP
//! endpoints.

use serde::{Deserialize, Serialize};

/// Transport parameters of one bridged port
///
/// The serialized field names are shared with existing `config.json` files and must
/// not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Logical port name, unique within a configuration
    pub name: String,
    #[serde(rename = "baudrate")]
    pub baud_rate: u32,
    #[serde(rename = "databits")]
    pub data_bits: u8,
    #[serde(rename = "stopbits")]
    pub stop_bits: u8,
    /// Escaped separator literal, e.g. `\n`. Empty means no separator.
    #[serde(rename = "packetSeparator", default)]
    pub packet_separator: String,
    /// Address datagrams are received on (forwarded to serial)
    #[serde(rename = "udpInputIP")]
    pub udp_input_ip: String,
    #[serde(rename = "udpInputPort")]
    pub udp_input_port: u16,
    /// Address serial frames are sent to
    #[serde(rename = "udpOutputIP")]
    pub udp_output_ip: String,
    #[serde(rename = "udpOutputPort")]
    pub udp_output_port: u16,
}

impl PortSpec {
    /// Listen address in `host:port` form, resolved at open time
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.udp_input_ip, self.udp_input_port)
    }

    /// Destination address in `host:port` form, resolved at open time
    pub fn destination_address(&self) -> String {
        format!("{}:{}", self.udp_output_ip, self.udp_output_port)
    }

    /// Decoded separator byte, if one is configured
    pub fn separator(&self) -> Option<u8> {
        decode_separator(&self.packet_separator)
    }
}

/// Decode an escaped separator literal into the byte that ends a frame
///
/// `\n`, `\r`, `\0` and `\t` are unescaped; the separator is the first byte of the
/// decoded text. An empty literal yields `None`.
pub fn decode_separator(literal: &str) -> Option<u8> {
    let decoded = literal
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\0", "\0")
        .replace("\\t", "\t");
    decoded.as_bytes().first().copied()
}
