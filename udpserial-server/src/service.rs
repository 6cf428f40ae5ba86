//! Running service: supervisor plus sampler over one context

use crate::context::Context;
use crate::sampler::Sampler;
use crate::supervisor::{
    RestartOutcome, StopReport, Supervisor, SupervisorHandle, SupervisorSettings,
    SupervisorStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use udpserial_core::{Config, StatisticsSnapshot, UdpSerialResult};
use udpserial_transport::SerialOpener;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub supervisor: SupervisorSettings,
    /// Sampling period of the rate counters
    pub sample_interval: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSettings::default(),
            sample_interval: Duration::from_secs(1),
        }
    }
}

pub struct Service {
    context: Arc<Context>,
    supervisor: SupervisorHandle,
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
}

impl Service {
    /// Launch the configured bridges and start sampling
    pub fn start(
        context: Arc<Context>,
        opener: Arc<dyn SerialOpener>,
        settings: ServiceSettings,
    ) -> Self {
        let supervisor = Supervisor::spawn(context.clone(), opener, settings.supervisor);
        let cancel = CancellationToken::new();
        let sampler = tokio::spawn(
            Sampler::new(context.clone(), settings.sample_interval).run(cancel.clone()),
        );
        Self {
            context,
            supervisor,
            cancel,
            sampler,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    pub async fn restart_all(&self) -> UdpSerialResult<RestartOutcome> {
        self.supervisor.restart_all().await
    }

    /// Re-read the configuration file, then restart every bridge
    pub async fn reload_and_restart(&self) -> UdpSerialResult<RestartOutcome> {
        self.context.reload_config()?;
        self.supervisor.restart_all().await
    }

    /// Persist and activate `config`, then restart every bridge
    pub async fn apply_config(&self, config: Config) -> UdpSerialResult<RestartOutcome> {
        self.context.replace_config(config)?;
        self.supervisor.restart_all().await
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.context.statistics().snapshot()
    }

    pub async fn status(&self) -> UdpSerialResult<SupervisorStatus> {
        self.supervisor.status().await
    }

    /// Stop every bridge and the sampler
    pub async fn shutdown(self) -> UdpSerialResult<StopReport> {
        let report = self.supervisor.shutdown().await;
        self.cancel.cancel();
        if let Err(e) = self.sampler.await {
            log::error!("Sampler task failed: {}", e);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tokio::net::UdpSocket;
    use udpserial_core::{Definitions, PortDefinition, PortSpec, UdpSerialError};
    use udpserial_transport::{SerialIo, SerialSettings};

    /// Opener whose devices echo nothing and never close
    struct ParkedOpener(parking_lot::Mutex<Vec<tokio::io::DuplexStream>>);

    #[async_trait]
    impl SerialOpener for ParkedOpener {
        async fn open(&self, _settings: &SerialSettings) -> UdpSerialResult<Box<dyn SerialIo>> {
            let (device, serial) = tokio::io::duplex(4096);
            self.0.lock().push(device);
            Ok(Box::new(serial))
        }
    }

    fn spec(name: &str, listen_port: u16) -> PortSpec {
        PortSpec {
            name: name.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            packet_separator: String::new(),
            udp_input_ip: "127.0.0.1".to_string(),
            udp_input_port: listen_port,
            udp_output_ip: "127.0.0.1".to_string(),
            udp_output_port: 9,
        }
    }

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            supervisor: SupervisorSettings {
                backoff: Duration::from_millis(50),
                ..SupervisorSettings::default()
            },
            sample_interval: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_traffic_shows_up_in_snapshot() {
        let listen_port = free_udp_port();
        let definitions = Definitions {
            ports: vec![PortDefinition {
                name: "com1".to_string(),
                tty: "/dev/ttyS0".to_string(),
            }],
            baudrates: Vec::new(),
        };
        let ctx = Context::from_parts(Config::new(vec![spec("com1", listen_port)]), definitions)
            .unwrap();
        let opener = Arc::new(ParkedOpener(parking_lot::Mutex::default()));
        let service = Service::start(Arc::new(ctx), opener, settings());

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            peer.send_to(b"ping", ("127.0.0.1", listen_port)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            if service.snapshot().ports["com1"].udp_to_serial_rate > 0 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
        }

        let json = serde_json::to_value(service.snapshot()).unwrap();
        assert!(json["ports"]["com1"]["udp2serialRate"].as_u64().unwrap() >= 4);
        assert_eq!(json["ports"]["com1"]["lostPackets"], 0);

        let report = service.shutdown().await.unwrap();
        assert_eq!(report.expected, 1);
        assert_eq!(report.abandoned, 0);
    }

    #[tokio::test]
    async fn test_reload_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let definitions_path = dir.path().join("definitions.json");
        fs::write(
            &definitions_path,
            r#"{"ports":[{"name":"com1","tty":"/dev/ttyS0"},{"name":"com2","tty":"/dev/ttyS1"}]}"#,
        )
        .unwrap();
        Config::new(vec![spec("com1", free_udp_port())])
            .save(&config_path)
            .unwrap();

        let ctx = Arc::new(Context::init(&config_path, &definitions_path).unwrap());
        let opener = Arc::new(ParkedOpener(parking_lot::Mutex::default()));
        let service = Service::start(ctx, opener, settings());

        Config::new(vec![spec("com2", free_udp_port())])
            .save(&config_path)
            .unwrap();
        let outcome = service.reload_and_restart().await.unwrap();
        assert!(matches!(outcome, RestartOutcome::Restarted { launched: 1, .. }));
        assert_eq!(service.status().await.unwrap().port_names(), vec!["com2"]);

        fs::write(&config_path, "[").unwrap();
        assert!(matches!(
            service.reload_and_restart().await,
            Err(UdpSerialError::Json(_))
        ));
        assert_eq!(service.status().await.unwrap().port_names(), vec!["com2"]);

        service.shutdown().await.unwrap();
    }
}
