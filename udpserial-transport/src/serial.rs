//! Serial port endpoint

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use udpserial_core::{PortSpec, UdpSerialError, UdpSerialResult};

/// Byte stream of an opened serial device
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// Serial port settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Create new serial settings with 8N1 framing
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }

    /// Build settings for `spec` on the device at `device_path`
    ///
    /// # Errors
    /// Returns `Open` if the data or stop bits are not supported by the line
    pub fn for_port(device_path: &str, spec: &PortSpec) -> UdpSerialResult<Self> {
        let data_bits = match spec.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(UdpSerialError::open(
                    device_path,
                    format!("unsupported data bits {}", other),
                ));
            }
        };
        let stop_bits = match spec.stop_bits {
            1 => tokio_serial::StopBits::One,
            2 => tokio_serial::StopBits::Two,
            other => {
                return Err(UdpSerialError::open(
                    device_path,
                    format!("unsupported stop bits {}", other),
                ));
            }
        };

        Ok(Self {
            data_bits,
            stop_bits,
            ..Self::new(device_path.to_string(), spec.baud_rate)
        })
    }
}

/// Opens serial devices for bridges
#[async_trait]
pub trait SerialOpener: Send + Sync {
    /// Open the device described by `settings`
    async fn open(&self, settings: &SerialSettings) -> UdpSerialResult<Box<dyn SerialIo>>;
}

/// [`SerialOpener`] backed by `tokio-serial`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialOpener;

#[async_trait]
impl SerialOpener for TokioSerialOpener {
    async fn open(&self, settings: &SerialSettings) -> UdpSerialResult<Box<dyn SerialIo>> {
        let builder = tokio_serial::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control);

        let stream = SerialStream::open(&builder)
            .map_err(|e| UdpSerialError::open(&settings.port_name, e))?;

        log::info!(
            "Opened {} at {} baud",
            settings.port_name,
            settings.baud_rate
        );
        Ok(Box::new(stream))
    }
}
