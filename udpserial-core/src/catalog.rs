//! Lookup interface between the bridge engine / supervisor and configuration storage

use crate::error::UdpSerialResult;
use crate::port::PortSpec;

/// Read access to the active configuration and the device mapping
///
/// Bridges resolve their device path through this trait at open time; the supervisor
/// reads the port list on start and restart and looks a single spec up when relaunching
/// a port that died.
pub trait PortCatalog: Send + Sync {
    /// Device path of a logical port name, or `NotFound`
    fn resolve_device_path(&self, name: &str) -> UdpSerialResult<String>;

    /// The active port specs, in configuration order
    fn current_port_specs(&self) -> Vec<PortSpec>;

    /// The active spec of one port, or `NotFound`
    fn lookup_spec(&self, name: &str) -> UdpSerialResult<PortSpec>;
}
