//! Persisted port configuration (`config.json`)

use crate::error::{UdpSerialError, UdpSerialResult};
use crate::port::PortSpec;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Service configuration: the ordered list of bridged ports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ports: Vec<PortSpec>,
}

/// Older files were written with `"ports": null` for an empty configuration
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Config {
    /// Create a configuration from a list of port specs
    pub fn new(ports: Vec<PortSpec>) -> Self {
        Self { ports }
    }

    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> UdpSerialResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the configuration to JSON text
    pub fn to_json(&self) -> UdpSerialResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load the configuration from `path`
    ///
    /// A missing file is not an error: an empty configuration is written in its place
    /// and returned. A file that exists but cannot be parsed is an error.
    pub fn load(path: &Path) -> UdpSerialResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{}: {}", path.display(), e);
                log::info!("creating empty configuration file {}", path.display());
                let config = Config::default();
                if let Err(e) = config.save(path) {
                    log::error!("{}", e);
                }
                Ok(config)
            }
            Err(e) => Err(UdpSerialError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write the configuration to `path`
    pub fn save(&self, path: &Path) -> UdpSerialResult<()> {
        fs::write(path, self.to_json()?).map_err(|e| {
            UdpSerialError::Config(format!("cannot write {}: {}", path.display(), e))
        })
    }

    /// Find the spec of a port by name
    pub fn port(&self, name: &str) -> UdpSerialResult<&PortSpec> {
        self.ports
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| {
                UdpSerialError::NotFound(format!("no such port {} in configuration", name))
            })
    }

    /// Check that every port name is unique
    pub fn validate(&self) -> UdpSerialResult<()> {
        let mut seen = HashSet::new();
        for spec in &self.ports {
            if !seen.insert(spec.name.as_str()) {
                return Err(UdpSerialError::Config(format!(
                    "port {} is configured more than once",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> PortSpec {
        PortSpec {
            name: name.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            packet_separator: String::new(),
            udp_input_ip: "127.0.0.1".to_string(),
            udp_input_port: 7000,
            udp_output_ip: "127.0.0.1".to_string(),
            udp_output_port: 7001,
        }
    }

    #[test]
    fn test_load_missing_file_creates_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load(&path).unwrap();
        assert!(config.ports.is_empty());
        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config::new(vec![spec("com1"), spec("com2")]);

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.port("com2").unwrap().name, "com2");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(&path), Err(UdpSerialError::Json(_))));
    }

    #[test]
    fn test_null_ports_reads_as_empty() {
        let config = Config::from_json(r#"{"ports":null}"#).unwrap();
        assert!(config.ports.is_empty());
    }

    #[test]
    fn test_unknown_port_is_not_found() {
        let config = Config::new(vec![spec("com1")]);
        assert!(matches!(
            config.port("com9"),
            Err(UdpSerialError::NotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        assert!(Config::new(vec![spec("a"), spec("b")]).validate().is_ok());
        assert!(matches!(
            Config::new(vec![spec("a"), spec("a")]).validate(),
            Err(UdpSerialError::Config(_))
        ));
    }
}
