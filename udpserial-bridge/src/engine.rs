//! Bridge engine
//!
//! A [`Bridge`] owns one serial device and the two UDP sockets of one port and
//! forwards traffic in both directions until it is killed. Its running state is made
//! of five duties joined on the bridge task:
//!
//! - receiving datagrams and queueing them for the serial device,
//! - writing queued datagrams to the serial device, one at a time and in order,
//! - reading the serial device and cutting the byte stream into frames,
//! - sending frames to the UDP destination,
//! - waiting for the kill request and signalling cancellation.
//!
//! Every blocking operation is raced against the bridge's [`CancellationToken`], which
//! only the kill duty triggers. Once all duties have returned the device and sockets
//! are dropped and the bridge reports its death.

use crate::control::{BridgeId, DeathNotice, KillRequest};
use crate::frame::{DEFAULT_FRAME_CAPACITY, Frame, FrameAccumulator};
use crate::state::BridgeState;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use udpserial_core::{PortCatalog, PortCounters, PortSpec, UdpSerialError, UdpSerialResult};
use udpserial_transport::{
    DatagramSink, MAX_DATAGRAM_SIZE, SerialIo, SerialOpener, SerialSettings, UdpEndpoints,
    UdpSettings,
};

/// Tunables of the bridge engine
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Largest frame sent to UDP
    pub frame_capacity: usize,
    /// Silence on the serial line after which pending bytes are sent
    pub idle_timeout: Duration,
    /// Frames waiting for the UDP sender
    pub frame_queue_capacity: usize,
    /// Datagrams waiting for the serial writer
    pub write_queue_capacity: usize,
    /// Bytes requested from the serial device per read
    pub serial_read_chunk: usize,
    /// Receive buffer of the listen socket
    pub datagram_size: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            idle_timeout: Duration::from_millis(5),
            frame_queue_capacity: 64,
            write_queue_capacity: 64,
            serial_read_chunk: 256,
            datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

/// Collaborators shared by every bridge a supervisor launches
#[derive(Clone)]
pub struct BridgeEnvironment {
    pub catalog: Arc<dyn PortCatalog>,
    pub opener: Arc<dyn SerialOpener>,
    pub deaths: mpsc::UnboundedSender<DeathNotice>,
    pub settings: BridgeSettings,
}

/// Supervisor side of a launched bridge
#[derive(Debug)]
pub struct BridgeLink {
    pub kill: mpsc::Sender<KillRequest>,
    pub state: watch::Receiver<BridgeState>,
}

/// One serial↔UDP bridge
pub struct Bridge {
    id: BridgeId,
    spec: PortSpec,
    counters: Arc<PortCounters>,
    env: BridgeEnvironment,
    kill: mpsc::Receiver<KillRequest>,
    state: watch::Sender<BridgeState>,
}

impl Bridge {
    /// Create a bridge for `spec` and the link its supervisor controls it through
    ///
    /// Nothing is opened until [`Bridge::run`] is awaited.
    pub fn new(
        id: BridgeId,
        spec: PortSpec,
        counters: Arc<PortCounters>,
        env: &BridgeEnvironment,
    ) -> (Self, BridgeLink) {
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(BridgeState::Opening);
        let bridge = Self {
            id,
            spec,
            counters,
            env: env.clone(),
            kill: kill_rx,
            state: state_tx,
        };
        let link = BridgeLink {
            kill: kill_tx,
            state: state_rx,
        };
        (bridge, link)
    }

    /// Open the resources, forward traffic until killed, then report death
    ///
    /// Open failures are counted as errors and end the bridge without entering the
    /// running state. The death notice is sent in every case.
    pub async fn run(mut self) {
        let port = self.spec.name.clone();
        log::info!("[{}] Starting bridge {}", port, self.id);

        match self.open().await {
            Ok((serial, udp)) => {
                transition(&self.state, BridgeState::Running);
                self.serve(serial, udp).await;
            }
            Err(e) => {
                log::error!("[{}] {}", port, e);
                self.counters.increment_errors();
            }
        }
        transition(&self.state, BridgeState::Terminated);

        log::warn!("[{}] Bridge {} reached end", port, self.id);
        let notice = DeathNotice { id: self.id, port };
        if self.env.deaths.send(notice).is_err() {
            log::debug!("supervisor gone, death of bridge {} not reported", self.id);
        }
    }

    async fn open(&self) -> UdpSerialResult<(Box<dyn SerialIo>, UdpEndpoints)> {
        let device = self.env.catalog.resolve_device_path(&self.spec.name)?;
        let serial_settings = SerialSettings::for_port(&device, &self.spec)?;
        let serial = self.env.opener.open(&serial_settings).await?;
        let udp = UdpEndpoints::open(&UdpSettings::for_port(&self.spec)).await?;
        Ok((serial, udp))
    }

    async fn serve(&mut self, serial: Box<dyn SerialIo>, udp: UdpEndpoints) {
        let port = self.spec.name.as_str();
        let settings = &self.env.settings;
        let cancel = CancellationToken::new();

        let (reader, writer) = tokio::io::split(serial);
        let (frame_tx, frame_rx) = mpsc::channel(settings.frame_queue_capacity);
        let (write_tx, write_rx) = mpsc::channel(settings.write_queue_capacity);
        let accumulator = FrameAccumulator::new(settings.frame_capacity, self.spec.separator());

        tokio::join!(
            receive_datagrams(
                port,
                udp.receiver,
                write_tx,
                self.counters.clone(),
                settings.datagram_size,
                cancel.clone(),
            ),
            write_serial(port, writer, write_rx, cancel.clone()),
            frame_serial(
                port,
                reader,
                frame_tx,
                self.counters.clone(),
                accumulator,
                settings.idle_timeout,
                settings.serial_read_chunk,
                cancel.clone(),
            ),
            send_frames(port, udp.sender, frame_rx, self.counters.clone(), cancel.clone()),
            await_kill(port, &mut self.kill, &self.state, cancel.clone()),
        );
    }
}

fn transition(state: &watch::Sender<BridgeState>, next: BridgeState) {
    state.send_modify(|current| match current.validate_transition(next) {
        Ok(()) => {
            log::trace!("bridge {} -> {}", current.as_str(), next.as_str());
            *current = next;
        }
        Err(e) => log::error!("{}", e),
    });
}

async fn await_kill(
    port: &str,
    kill: &mut mpsc::Receiver<KillRequest>,
    state: &watch::Sender<BridgeState>,
    cancel: CancellationToken,
) {
    match kill.recv().await {
        Some(request) => {
            log::info!("[{}] Bridge received kill signal", port);
            request.acknowledge();
        }
        None => log::info!("[{}] Supervisor released the bridge", port),
    }
    transition(state, BridgeState::Draining);
    cancel.cancel();
}

async fn receive_datagrams(
    port: &str,
    socket: UdpSocket,
    writes: mpsc::Sender<Bytes>,
    counters: Arc<PortCounters>,
    datagram_size: usize,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; datagram_size];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, _)) => {
                counters.add_udp_to_serial(len);
                let datagram = Bytes::copy_from_slice(&buf[..len]);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = writes.send(datagram) => if sent.is_err() { break },
                }
            }
            Err(e) => log::warn!("[{}] UDP receive failed: {}", port, e),
        }
    }
    log::info!("[{}] udp2serial duty stopped", port);
}

async fn write_serial<W: AsyncWrite + Unpin>(
    port: &str,
    mut writer: W,
    mut writes: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    let mut failing = false;
    loop {
        let datagram = tokio::select! {
            _ = cancel.cancelled() => break,
            datagram = writes.recv() => match datagram {
                Some(datagram) => datagram,
                None => break,
            },
        };
        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = writer.write_all(&datagram) => written,
        };
        match written {
            Ok(()) => failing = false,
            Err(e) => {
                // Report once per outage, not once per datagram.
                if !failing {
                    log::warn!("[{}] {}", port, UdpSerialError::from(e));
                }
                failing = true;
            }
        }
    }
    log::info!("[{}] serial writer duty stopped", port);
}

#[allow(clippy::too_many_arguments)]
async fn frame_serial<R: AsyncRead + Unpin>(
    port: &str,
    mut reader: R,
    frames: mpsc::Sender<Frame>,
    counters: Arc<PortCounters>,
    mut accumulator: FrameAccumulator,
    idle_timeout: Duration,
    read_chunk: usize,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; read_chunk];
    let mut failing = false;
    'framing: loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = tokio::time::timeout(idle_timeout, reader.read(&mut buf)) => read,
        };
        match read {
            Ok(Ok(len)) if len > 0 => {
                failing = false;
                for &byte in &buf[..len] {
                    if let Some(frame) = accumulator.push(byte) {
                        if !enqueue(frame, &frames, &counters, &cancel).await {
                            break 'framing;
                        }
                    }
                }
                continue;
            }
            // Idle window elapsed with nothing new
            Err(_) => {}
            Ok(Ok(_)) => {
                if !failing {
                    log::warn!("[{}] serial device reached end of stream", port);
                }
                failing = true;
                if !idle(idle_timeout, &cancel).await {
                    break;
                }
            }
            Ok(Err(e)) => {
                if !failing {
                    log::warn!("[{}] {}", port, UdpSerialError::from(e));
                }
                failing = true;
                if !idle(idle_timeout, &cancel).await {
                    break;
                }
            }
        }
        if let Some(frame) = accumulator.flush() {
            if !enqueue(frame, &frames, &counters, &cancel).await {
                break;
            }
        }
    }
    log::info!("[{}] serial framer duty stopped", port);
}

/// Sleep for one idle window; `false` if cancelled meanwhile
async fn idle(idle_timeout: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(idle_timeout) => true,
    }
}

/// Hand a frame to the sender, blocking while its queue is full
async fn enqueue(
    frame: Frame,
    frames: &mpsc::Sender<Frame>,
    counters: &PortCounters,
    cancel: &CancellationToken,
) -> bool {
    let len = frame.len();
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = frames.send(frame) => {
            if sent.is_err() {
                return false;
            }
            counters.add_serial_to_udp(len);
            true
        }
    }
}

async fn send_frames(
    port: &str,
    sink: Arc<dyn DatagramSink>,
    mut frames: mpsc::Receiver<Frame>,
    counters: Arc<PortCounters>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(&frame) => sent,
        };
        if let Err(source) = sent {
            counters.increment_lost_packets();
            let lost = UdpSerialError::LostPacket {
                size: frame.len(),
                source,
            };
            log::debug!("[{}] {}", port, lost);
        }
    }
    log::info!("[{}] udp sender duty stopped", port);
}
