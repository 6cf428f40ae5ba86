//! Per-port traffic counters and the statistics table
//!
//! A bridge increments its [`PortCounters`] from its forwarding tasks while the sampler
//! periodically moves the running byte counts into the rate fields. All fields are
//! atomics so the hot path never takes a lock; the table lock is only held by the
//! sampler tick, table rebuilds and snapshots, and never across I/O.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one port
#[derive(Debug, Default)]
pub struct PortCounters {
    udp_to_serial: AtomicU64,
    serial_to_udp: AtomicU64,
    udp_to_serial_rate: AtomicU64,
    serial_to_udp_rate: AtomicU64,
    lost_packets: AtomicU64,
    errors: AtomicU64,
}

impl PortCounters {
    /// Create counters with every field at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Account bytes received from UDP and queued for the serial device
    pub fn add_udp_to_serial(&self, bytes: usize) {
        self.udp_to_serial.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Account bytes framed from the serial device and queued for UDP
    pub fn add_serial_to_udp(&self, bytes: usize) {
        self.serial_to_udp.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn increment_lost_packets(&self) {
        self.lost_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes moved UDP→serial since the last sample
    pub fn pending_udp_to_serial(&self) -> u64 {
        self.udp_to_serial.load(Ordering::Relaxed)
    }

    /// Bytes moved serial→UDP since the last sample
    pub fn pending_serial_to_udp(&self) -> u64 {
        self.serial_to_udp.load(Ordering::Relaxed)
    }

    pub fn lost_packets(&self) -> u64 {
        self.lost_packets.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Move the running byte counts into the rate fields and restart them at zero
    fn rotate(&self) {
        let udp_to_serial = self.udp_to_serial.swap(0, Ordering::AcqRel);
        let serial_to_udp = self.serial_to_udp.swap(0, Ordering::AcqRel);
        self.udp_to_serial_rate.store(udp_to_serial, Ordering::Release);
        self.serial_to_udp_rate.store(serial_to_udp, Ordering::Release);
    }

    fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            udp_to_serial_rate: self.udp_to_serial_rate.load(Ordering::Acquire),
            serial_to_udp_rate: self.serial_to_udp_rate.load(Ordering::Acquire),
            lost_packets: self.lost_packets(),
            errors: self.errors(),
        }
    }
}

/// Externally visible statistics of one port
///
/// The serialized field names are a public contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSnapshot {
    #[serde(rename = "udp2serialRate")]
    pub udp_to_serial_rate: u64,
    #[serde(rename = "serial2udpRate")]
    pub serial_to_udp_rate: u64,
    #[serde(rename = "lostPackets")]
    pub lost_packets: u64,
    pub errors: u64,
}

/// Externally visible statistics of every port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub ports: BTreeMap<String, PortSnapshot>,
}

/// Table of counters keyed by port name
#[derive(Debug, Default)]
pub struct Statistics {
    ports: RwLock<HashMap<String, Arc<PortCounters>>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table with zeroed counters for `names`
    ///
    /// Bridges still holding counters from the previous table keep writing into
    /// entries nobody reads any more.
    pub fn rebuild<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let fresh = names
            .into_iter()
            .map(|name| (name.to_string(), Arc::new(PortCounters::new())))
            .collect();
        *self.ports.write() = fresh;
    }

    /// Counters of a port, if registered
    pub fn counters(&self, name: &str) -> Option<Arc<PortCounters>> {
        self.ports.read().get(name).cloned()
    }

    /// Counters of a port, registering zeroed counters if absent
    pub fn counters_or_insert(&self, name: &str) -> Arc<PortCounters> {
        if let Some(counters) = self.counters(name) {
            return counters;
        }
        self.ports
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Names of the registered ports, sorted
    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// One sampling tick: convert the running counts of every port into rates
    pub fn sample(&self) {
        let ports = self.ports.write();
        for counters in ports.values() {
            counters.rotate();
        }
    }

    /// Copy the visible fields of every port
    ///
    /// Excludes a concurrent [`Statistics::sample`], so the result is never a mix of
    /// two ticks.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let ports = self.ports.read();
        StatisticsSnapshot {
            ports: ports
                .iter()
                .map(|(name, counters)| (name.clone(), counters.snapshot()))
                .collect(),
        }
    }
}
