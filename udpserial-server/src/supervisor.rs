//! Bridge supervisor
//!
//! The supervisor keeps one bridge alive per configured port and implements the two
//! bulk operations, stop-all and restart-all. It runs as a single control task that
//! owns the handle table and every flag; callers talk to it through a cloneable
//! [`SupervisorHandle`] and receive their answer on a oneshot channel.
//!
//! A stop-all is a state of the control task rather than a blocking call, so commands
//! keep being served while it waits for deaths. This is what lets a second stop-all or
//! restart-all return `AlreadyInProgress` instead of broadcasting again.

use crate::context::Context;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until, timeout};
use udpserial_bridge::{
    Bridge, BridgeEnvironment, BridgeId, BridgeSettings, BridgeState, DeathNotice, KillRequest,
};
use udpserial_core::{PortCatalog, PortSpec, UdpSerialError, UdpSerialResult};
use udpserial_transport::SerialOpener;

/// Tunables of the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Delay before a dead bridge is relaunched
    pub backoff: Duration,
    /// How long a single kill delivery waits for its acknowledgement
    pub kill_timeout: Duration,
    /// How long a stop-all waits for deaths before abandoning the rest
    pub stop_deadline: Duration,
    pub bridge: BridgeSettings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            kill_timeout: Duration::from_millis(1250),
            stop_deadline: Duration::from_secs(5),
            bridge: BridgeSettings::default(),
        }
    }
}

/// Result of one completed stop-all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Bridges live when the stop began
    pub expected: usize,
    /// Deaths of those bridges observed before the deadline
    pub observed: usize,
    /// Bridges removed from the table without a death
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Completed(StopReport),
    AlreadyInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted { stopped: StopReport, launched: usize },
    AlreadyInProgress,
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Live bridges by port name, sorted
    pub bridges: Vec<(String, BridgeState)>,
    pub restarting: bool,
    pub suppress_restart: bool,
    pub kill_broadcasts: u64,
    /// Kill deliveries that timed out without acknowledgement
    pub unacknowledged_kills: u64,
    pub stale_deaths: u64,
}

impl SupervisorStatus {
    pub fn port_names(&self) -> Vec<&str> {
        self.bridges.iter().map(|(name, _)| name.as_str()).collect()
    }
}

enum Command {
    StopAll(oneshot::Sender<StopOutcome>),
    RestartAll(oneshot::Sender<RestartOutcome>),
    Status(oneshot::Sender<SupervisorStatus>),
    Shutdown(oneshot::Sender<StopReport>),
}

/// Client side of the supervisor control task
///
/// Dropping every handle stops the control task; its bridges then see their kill
/// channel close and drain on their own.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
}

impl SupervisorHandle {
    /// Kill every bridge and wait for their deaths, bounded by the stop deadline
    pub async fn stop_all(&self) -> UdpSerialResult<StopOutcome> {
        self.request(Command::StopAll).await
    }

    /// Stop every bridge, rebuild the counters and launch the current configuration
    pub async fn restart_all(&self) -> UdpSerialResult<RestartOutcome> {
        self.request(Command::RestartAll).await
    }

    pub async fn status(&self) -> UdpSerialResult<SupervisorStatus> {
        self.request(Command::Status).await
    }

    /// Stop every bridge and end the control task
    pub async fn shutdown(&self) -> UdpSerialResult<StopReport> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> UdpSerialResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| UdpSerialError::SupervisorUnavailable)?;
        reply_rx
            .await
            .map_err(|_| UdpSerialError::SupervisorUnavailable)
    }
}

/// Supervisor-side record of a live bridge
struct BridgeHandle {
    id: BridgeId,
    kill: mpsc::Sender<KillRequest>,
    state: watch::Receiver<BridgeState>,
}

/// Relaunch of a dead port, due after the backoff
struct Relaunch {
    port: String,
    epoch: u64,
}

/// Outcome of one kill delivery
enum Delivery {
    Acknowledged,
    Gone,
    TimedOut,
}

/// What to do once the pending stop completes
enum AfterStop {
    Report(oneshot::Sender<StopOutcome>),
    Restart(oneshot::Sender<RestartOutcome>),
    Exit(oneshot::Sender<StopReport>),
}

struct PendingStop {
    expected: usize,
    observed: usize,
    awaiting: HashSet<BridgeId>,
    deadline: Instant,
    after: AfterStop,
}

pub struct Supervisor {
    context: Arc<Context>,
    env: BridgeEnvironment,
    settings: SupervisorSettings,
    handles: HashMap<String, BridgeHandle>,
    next_id: u64,
    /// Bumped whenever a stop begins; relaunches scheduled before are void
    epoch: u64,
    restarting: bool,
    suppress_restart: bool,
    kill_broadcasts: u64,
    stale_deaths: u64,
    stop: Option<PendingStop>,
    deliveries: JoinSet<(String, Delivery)>,
    unacknowledged_kills: u64,
    shutdown_waiters: Vec<oneshot::Sender<StopReport>>,
    exiting: bool,
    deaths: mpsc::UnboundedReceiver<DeathNotice>,
    relaunch_tx: mpsc::UnboundedSender<Relaunch>,
    relaunches: mpsc::UnboundedReceiver<Relaunch>,
}

impl Supervisor {
    /// Spawn the control task and launch one bridge per configured port
    pub fn spawn(
        context: Arc<Context>,
        opener: Arc<dyn SerialOpener>,
        settings: SupervisorSettings,
    ) -> SupervisorHandle {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (deaths_tx, deaths_rx) = mpsc::unbounded_channel();
        let (relaunch_tx, relaunch_rx) = mpsc::unbounded_channel();

        let env = BridgeEnvironment {
            catalog: context.clone(),
            opener,
            deaths: deaths_tx,
            settings: settings.bridge.clone(),
        };
        let supervisor = Self {
            context,
            env,
            settings,
            handles: HashMap::new(),
            next_id: 0,
            epoch: 0,
            restarting: false,
            suppress_restart: false,
            kill_broadcasts: 0,
            stale_deaths: 0,
            stop: None,
            deliveries: JoinSet::new(),
            unacknowledged_kills: 0,
            shutdown_waiters: Vec::new(),
            exiting: false,
            deaths: deaths_rx,
            relaunch_tx,
            relaunches: relaunch_rx,
        };
        tokio::spawn(supervisor.run(commands_rx));

        SupervisorHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let launched = self.launch_all();
        log::info!("Supervisor started {} bridges", launched);

        while !self.exiting {
            let deadline = self.stop.as_ref().map(|stop| stop.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        log::info!("All supervisor handles dropped");
                        break;
                    }
                },
                Some(notice) = self.deaths.recv() => self.on_death(notice),
                Some(relaunch) = self.relaunches.recv() => self.on_relaunch(relaunch),
                Some(joined) = self.deliveries.join_next() => self.on_delivery(joined),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_stop_deadline();
                }
            }
        }
        log::info!("Supervisor stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::StopAll(reply) => {
                if self.restarting {
                    log::info!("Stop-all already in progress");
                    let _ = reply.send(StopOutcome::AlreadyInProgress);
                } else {
                    self.begin_stop(AfterStop::Report(reply));
                }
            }
            Command::RestartAll(reply) => {
                if self.restarting {
                    log::info!("Restart already in progress");
                    let _ = reply.send(RestartOutcome::AlreadyInProgress);
                } else {
                    self.begin_stop(AfterStop::Restart(reply));
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown(reply) => {
                if self.restarting {
                    self.shutdown_waiters.push(reply);
                } else {
                    self.begin_stop(AfterStop::Exit(reply));
                }
            }
        }
    }

    fn status(&self) -> SupervisorStatus {
        let mut bridges: Vec<(String, BridgeState)> = self
            .handles
            .iter()
            .map(|(port, handle)| (port.clone(), *handle.state.borrow()))
            .collect();
        bridges.sort_by(|a, b| a.0.cmp(&b.0));
        SupervisorStatus {
            bridges,
            restarting: self.restarting,
            suppress_restart: self.suppress_restart,
            kill_broadcasts: self.kill_broadcasts,
            unacknowledged_kills: self.unacknowledged_kills,
            stale_deaths: self.stale_deaths,
        }
    }

    /// Rebuild the counters table and launch the current configuration
    fn launch_all(&mut self) -> usize {
        let specs = self.context.current_port_specs();
        self.context
            .statistics()
            .rebuild(specs.iter().map(|spec| spec.name.as_str()));
        let launched = specs.len();
        for spec in specs {
            self.launch(spec);
        }
        launched
    }

    fn launch(&mut self, spec: PortSpec) {
        self.next_id += 1;
        let id = BridgeId(self.next_id);
        let port = spec.name.clone();
        let counters = self.context.statistics().counters_or_insert(&port);

        let (bridge, link) = Bridge::new(id, spec, counters, &self.env);
        tokio::spawn(bridge.run());
        log::debug!("[{}] launched bridge {}", port, id);

        self.handles.insert(
            port,
            BridgeHandle {
                id,
                kill: link.kill,
                state: link.state,
            },
        );
    }

    fn on_death(&mut self, notice: DeathNotice) {
        match self.handles.get(&notice.port) {
            Some(handle) if handle.id == notice.id => {
                self.handles.remove(&notice.port);
            }
            _ => {
                self.stale_deaths += 1;
                log::debug!(
                    "[{}] ignoring death of abandoned bridge {}",
                    notice.port,
                    notice.id
                );
                return;
            }
        }

        if let Some(stop) = self.stop.as_mut() {
            if stop.awaiting.remove(&notice.id) {
                stop.observed += 1;
            }
            if stop.awaiting.is_empty() {
                self.finish_stop();
            }
            return;
        }

        if self.suppress_restart {
            return;
        }
        log::info!(
            "[{}] Bridge died, relaunching in {:?}",
            notice.port,
            self.settings.backoff
        );
        let relaunch = Relaunch {
            port: notice.port,
            epoch: self.epoch,
        };
        let relaunch_tx = self.relaunch_tx.clone();
        let backoff = self.settings.backoff;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = relaunch_tx.send(relaunch);
        });
    }

    fn on_relaunch(&mut self, relaunch: Relaunch) {
        if relaunch.epoch != self.epoch
            || self.stop.is_some()
            || self.suppress_restart
            || self.handles.contains_key(&relaunch.port)
        {
            log::debug!("[{}] relaunch skipped", relaunch.port);
            return;
        }
        match self.context.lookup_spec(&relaunch.port) {
            Ok(spec) => self.launch(spec),
            Err(e) => log::warn!("[{}] not relaunched: {}", relaunch.port, e),
        }
    }

    fn begin_stop(&mut self, after: AfterStop) {
        self.restarting = true;
        self.suppress_restart = true;
        self.epoch += 1;
        self.kill_broadcasts += 1;

        let awaiting: HashSet<BridgeId> = self.handles.values().map(|handle| handle.id).collect();
        log::info!("Stopping {} bridges", awaiting.len());
        self.broadcast_kill();

        let done = awaiting.is_empty();
        self.stop = Some(PendingStop {
            expected: awaiting.len(),
            observed: 0,
            awaiting,
            deadline: Instant::now() + self.settings.stop_deadline,
            after,
        });
        if done {
            self.finish_stop();
        }
    }

    /// Deliver a kill request to every live bridge, each bounded by the kill timeout
    ///
    /// Deliveries run on the supervisor's own set and are aborted if it exits.
    fn broadcast_kill(&mut self) {
        for (port, handle) in &self.handles {
            let port = port.clone();
            let kill = handle.kill.clone();
            let kill_timeout = self.settings.kill_timeout;
            self.deliveries.spawn(async move {
                let (request, acked) = KillRequest::new();
                let delivered = timeout(kill_timeout, async move {
                    kill.send(request).await.ok()?;
                    acked.await.ok()
                })
                .await;
                let outcome = match delivered {
                    Ok(Some(())) => Delivery::Acknowledged,
                    Ok(None) => Delivery::Gone,
                    Err(_) => Delivery::TimedOut,
                };
                (port, outcome)
            });
        }
    }

    fn on_delivery(&mut self, joined: Result<(String, Delivery), JoinError>) {
        match joined {
            Ok((port, Delivery::Acknowledged)) => log::debug!("[{}] kill acknowledged", port),
            Ok((port, Delivery::Gone)) => log::debug!("[{}] bridge already gone", port),
            Ok((port, Delivery::TimedOut)) => {
                self.unacknowledged_kills += 1;
                log::warn!("{}", UdpSerialError::KillTimeout(port));
            }
            Err(e) => log::error!("kill delivery failed: {}", e),
        }
    }

    fn on_stop_deadline(&mut self) {
        if let Some(stop) = self.stop.as_ref() {
            log::warn!(
                "Stop deadline reached, abandoning {} bridges",
                stop.awaiting.len()
            );
            let awaiting = stop.awaiting.clone();
            self.handles.retain(|_, handle| !awaiting.contains(&handle.id));
        }
        self.finish_stop();
    }

    fn finish_stop(&mut self) {
        let Some(stop) = self.stop.take() else {
            return;
        };
        let report = StopReport {
            expected: stop.expected,
            observed: stop.observed,
            abandoned: stop.awaiting.len(),
        };
        log::info!(
            "Stop complete: {} expected, {} observed, {} abandoned",
            report.expected,
            report.observed,
            report.abandoned
        );
        self.suppress_restart = false;
        self.restarting = false;

        match stop.after {
            AfterStop::Report(reply) => {
                let _ = reply.send(StopOutcome::Completed(report));
            }
            AfterStop::Restart(reply) => {
                let launched = self.launch_all();
                log::info!("Restart launched {} bridges", launched);
                let _ = reply.send(RestartOutcome::Restarted {
                    stopped: report,
                    launched,
                });
            }
            AfterStop::Exit(reply) => {
                let _ = reply.send(report);
                for waiter in self.shutdown_waiters.drain(..) {
                    let _ = waiter.send(report);
                }
                self.exiting = true;
                return;
            }
        }

        if !self.shutdown_waiters.is_empty() {
            let reply = self.shutdown_waiters.remove(0);
            self.begin_stop(AfterStop::Exit(reply));
        }
    }
}
