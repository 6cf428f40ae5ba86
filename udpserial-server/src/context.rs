//! Service context
//!
//! The [`Context`] is built once at process start and shared by `Arc` with the
//! supervisor and the sampler. It owns the active configuration, the device mapping
//! and the statistics table, and is the [`PortCatalog`] bridges resolve through.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use udpserial_core::{
    Config, Definitions, PortCatalog, PortSpec, Statistics, UdpSerialError, UdpSerialResult,
};

pub struct Context {
    config: RwLock<Config>,
    definitions: Definitions,
    statistics: Statistics,
    /// Where the configuration is persisted, if anywhere
    config_path: Option<PathBuf>,
}

impl Context {
    /// Load the device mapping and the configuration from disk
    ///
    /// # Errors
    /// Any error here is fatal for the process: the device mapping is missing or
    /// malformed, the configuration is malformed, or it names a port twice.
    pub fn init(
        config_path: impl Into<PathBuf>,
        definitions_path: impl AsRef<Path>,
    ) -> UdpSerialResult<Self> {
        let definitions = Definitions::load(definitions_path.as_ref())?;
        log::info!(
            "Known ports: {}",
            definitions.port_names().collect::<Vec<_>>().join(", ")
        );
        let config_path = config_path.into();
        let config = Config::load(&config_path)?;

        let mut context = Self::from_parts(config, definitions)?;
        context.config_path = Some(config_path);
        Ok(context)
    }

    /// Build a context from already loaded parts, without persistence
    pub fn from_parts(config: Config, definitions: Definitions) -> UdpSerialResult<Self> {
        check_config(&config, &definitions)?;
        Ok(Self {
            config: RwLock::new(config),
            definitions,
            statistics: Statistics::new(),
            config_path: None,
        })
    }

    /// Copy of the active configuration
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Validate, persist and activate a new configuration
    ///
    /// Running bridges are not touched; the caller restarts them afterwards.
    pub fn replace_config(&self, config: Config) -> UdpSerialResult<()> {
        check_config(&config, &self.definitions)?;
        if let Some(path) = &self.config_path {
            config.save(path)?;
        }
        log::info!("Configuration replaced, {} ports", config.ports.len());
        *self.config.write() = config;
        Ok(())
    }

    /// Re-read the configuration file and activate it
    ///
    /// On error the active configuration is kept.
    pub fn reload_config(&self) -> UdpSerialResult<()> {
        let path = self.config_path.as_ref().ok_or_else(|| {
            UdpSerialError::Config("configuration is not backed by a file".to_string())
        })?;
        let config = Config::load(path)?;
        check_config(&config, &self.definitions)?;
        log::info!(
            "Configuration reloaded from {}, {} ports",
            path.display(),
            config.ports.len()
        );
        *self.config.write() = config;
        Ok(())
    }
}

impl PortCatalog for Context {
    fn resolve_device_path(&self, name: &str) -> UdpSerialResult<String> {
        self.definitions.device_path(name).map(str::to_string)
    }

    fn current_port_specs(&self) -> Vec<PortSpec> {
        self.config.read().ports.clone()
    }

    fn lookup_spec(&self, name: &str) -> UdpSerialResult<PortSpec> {
        self.config.read().port(name).cloned()
    }
}

/// Reject duplicate names; warn about what will only fail once a bridge opens
fn check_config(config: &Config, definitions: &Definitions) -> UdpSerialResult<()> {
    config.validate()?;
    for spec in &config.ports {
        if definitions.device_path(&spec.name).is_err() {
            log::warn!("[{}] port has no device mapping", spec.name);
        }
        if !definitions.is_known_baud_rate(spec.baud_rate) {
            log::warn!("[{}] unusual baud rate {}", spec.name, spec.baud_rate);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use udpserial_core::PortDefinition;

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

    fn definitions() -> Definitions {
        Definitions {
            ports: vec![PortDefinition {
                name: "com1".to_string(),
                tty: "/dev/ttyS0".to_string(),
            }],
            baudrates: vec![9600],
        }
    }

    #[test]
    fn test_catalog_lookups() {
        let ctx = Context::from_parts(Config::new(vec![spec("com1")]), definitions()).unwrap();
        assert_eq!(ctx.resolve_device_path("com1").unwrap(), "/dev/ttyS0");
        assert!(matches!(
            ctx.resolve_device_path("com9"),
            Err(UdpSerialError::NotFound(_))
        ));
        assert_eq!(ctx.lookup_spec("com1").unwrap(), spec("com1"));
        assert!(ctx.lookup_spec("com2").is_err());
        assert_eq!(ctx.current_port_specs().len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = Config::new(vec![spec("com1"), spec("com1")]);
        assert!(matches!(
            Context::from_parts(config, definitions()),
            Err(UdpSerialError::Config(_))
        ));

        let ctx = Context::from_parts(Config::default(), definitions()).unwrap();
        let result = ctx.replace_config(Config::new(vec![spec("a"), spec("a")]));
        assert!(result.is_err());
        assert!(ctx.config().ports.is_empty());
    }

    #[test]
    fn test_init_requires_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let result = Context::init(dir.path().join("config.json"), dir.path().join("missing.json"));
        assert!(matches!(result, Err(UdpSerialError::Config(_))));
    }

    #[test]
    fn test_init_creates_missing_config_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let definitions_path = dir.path().join("definitions.json");
        fs::write(&definitions_path, r#"{"ports":[{"name":"com1","tty":"/dev/ttyS0"}]}"#)
            .unwrap();

        let ctx = Context::init(&config_path, &definitions_path).unwrap();
        assert!(config_path.exists());
        assert!(ctx.current_port_specs().is_empty());

        Config::new(vec![spec("com1")]).save(&config_path).unwrap();
        ctx.reload_config().unwrap();
        assert_eq!(ctx.current_port_specs(), vec![spec("com1")]);

        fs::write(&config_path, "{ not json").unwrap();
        assert!(ctx.reload_config().is_err());
        assert_eq!(ctx.current_port_specs(), vec![spec("com1")]);
    }

    #[test]
    fn test_replace_config_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let definitions_path = dir.path().join("definitions.json");
        fs::write(&definitions_path, r#"{"ports":[],"baudrates":[]}"#).unwrap();

        let ctx = Context::init(&config_path, &definitions_path).unwrap();
        ctx.replace_config(Config::new(vec![spec("com2")])).unwrap();

        let stored = Config::load(&config_path).unwrap();
        assert_eq!(stored.ports, vec![spec("com2")]);
    }

    #[test]
    fn test_reload_without_file_fails() {
        let ctx = Context::from_parts(Config::default(), definitions()).unwrap();
        assert!(matches!(ctx.reload_config(), Err(UdpSerialError::Config(_))));
    }
}
