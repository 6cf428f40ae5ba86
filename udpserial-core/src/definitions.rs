//! Device mapping (`definitions.json`)
//!
//! Maps logical port names to device paths and lists the baud rates offered to
//! operators. The baud rate catalog is advisory only.

use crate::error::{UdpSerialError, UdpSerialResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Mapping of one logical port name to a tty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub tty: String,
}

/// Contents of the definitions file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub ports: Vec<PortDefinition>,
    #[serde(default)]
    pub baudrates: Vec<u32>,
}

impl Definitions {
    /// Load the device mapping from `path`
    ///
    /// Unlike the port configuration, the device mapping must exist: without it no
    /// bridge can ever open, so the caller treats this error as fatal.
    pub fn load(path: &Path) -> UdpSerialResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            UdpSerialError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Device path of a logical port
    pub fn device_path(&self, name: &str) -> UdpSerialResult<&str> {
        self.ports
            .iter()
            .find(|definition| definition.name == name)
            .map(|definition| definition.tty.as_str())
            .ok_or_else(|| {
                UdpSerialError::NotFound(format!("no such port name {} in definitions", name))
            })
    }

    /// Whether `baud_rate` is in the catalog (an empty catalog allows everything)
    pub fn is_known_baud_rate(&self, baud_rate: u32) -> bool {
        self.baudrates.is_empty() || self.baudrates.contains(&baud_rate)
    }

    /// Logical names that have a device mapping
    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(|definition| definition.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"{
        "ports": [
            {"name": "com1", "tty": "/dev/ttyS0"},
            {"name": "com2", "tty": "/dev/ttyUSB0"}
        ],
        "baudrates": [9600, 115200]
    }"#;

    #[test]
    fn test_load_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("definitions.json");
        fs::write(&path, DEFINITIONS).unwrap();

        let definitions = Definitions::load(&path).unwrap();
        assert_eq!(definitions.device_path("com2").unwrap(), "/dev/ttyUSB0");
        assert!(matches!(
            definitions.device_path("com3"),
            Err(UdpSerialError::NotFound(_))
        ));
        assert_eq!(definitions.port_names().collect::<Vec<_>>(), ["com1", "com2"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Definitions::load(&dir.path().join("definitions.json"));
        assert!(matches!(result, Err(UdpSerialError::Config(_))));
    }

    #[test]
    fn test_baud_rate_catalog() {
        let definitions: Definitions = serde_json::from_str(DEFINITIONS).unwrap();
        assert!(definitions.is_known_baud_rate(9600));
        assert!(!definitions.is_known_baud_rate(57600));
        assert!(Definitions::default().is_known_baud_rate(57600));
    }
}
