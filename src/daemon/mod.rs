//! The NICE daemon: one position in the overlay tree.
//!
//! A daemon owns its [`Topology`] and mutates it only from its own event
//! loop. The loop handles one inbound exchange at a time, reacts to timer
//! ticks and to commands from [`DaemonHandle`]s, and between events runs
//! the pending-registration, liveness and transfer-culling steps.

pub mod admission;
mod exchange;
mod promotion;
mod recovery;
mod register;
mod status;

pub use admission::{decide_admission, Admission};
pub use register::RegisterOutcome;
pub use status::{query_status, walk_tree};

use crate::config::Settings;
use crate::error::{NiceError, Result};
use crate::events::dispatcher::emit_system;
use crate::events::model::LogLevel;
use crate::host::{CpuBenchmark, FixedLoad, LoadProbe, LogOnlyTransfer, TransferAgent, TransferQueue};
use crate::network::events::emit_network_event;
use crate::network::{bind_listener, Connection, RegState, Request, StatusReport, Wish};
use crate::timer::{TimerEvent, TimerId, Timers};
use crate::topology::window::local_offset_minutes;
use crate::topology::{PeerInfo, Topology};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Periodic and one-shot work scheduled on the daemon's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    MeasureLoad,
    Rebalance,
    RetryRegister,
    Liveness,
}

enum Command {
    Status(oneshot::Sender<StatusReport>),
    ExchangeNow(oneshot::Sender<()>),
    ElectNow {
        force: bool,
        reply: oneshot::Sender<Option<SocketAddr>>,
    },
    Transfer(Wish),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Inbound(std::io::Result<(TcpStream, SocketAddr)>),
    Alarm(Alarm),
    Command(Command),
}

/// Control surface for a running daemon. Cheap to clone.
#[derive(Clone)]
pub struct DaemonHandle {
    tx: mpsc::Sender<Command>,
    addr: SocketAddr,
}

impl DaemonHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(make(tx)).await.map_err(|_| NiceError::Stopped)?;
        rx.await.map_err(|_| NiceError::Stopped)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.ask(Command::Status).await
    }

    /// Run a load exchange with every child now instead of waiting for the period.
    pub async fn exchange_now(&self) -> Result<()> {
        self.ask(Command::ExchangeNow).await
    }

    /// Run child election now. `force` skips the random throttle.
    /// Returns the promoted child, if any.
    pub async fn elect_now(&self, force: bool) -> Result<Option<SocketAddr>> {
        self.ask(|reply| Command::ElectNow { force, reply }).await
    }

    /// Ask the parent, at its next exchange, to move an application for us.
    pub async fn request_transfer(&self, wish: Wish) -> Result<()> {
        self.tx
            .send(Command::Transfer(wish))
            .await
            .map_err(|_| NiceError::Stopped)
    }

    /// Tell parent and children we are leaving, then stop the loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.ask(Command::Shutdown).await
    }
}

pub struct Daemon {
    settings: Settings,
    topo: Topology,
    state: RegState,
    listener: TcpListener,
    local: SocketAddr,
    timers: Timers<Alarm>,
    alarms: mpsc::UnboundedReceiver<TimerEvent<Alarm>>,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    rng: StdRng,
    probe: Box<dyn LoadProbe>,
    transfers: TransferQueue,
    /// Branching factor our parent last told us.
    parent_limit: Option<usize>,
    pending_register: Option<SocketAddr>,
    last_parent: Option<SocketAddr>,
    retry_alarm: Option<TimerId>,
    stop: Option<oneshot::Sender<()>>,
    stopping: bool,
}

impl Daemon {
    /// Bind the listening socket and build the initial table. Nothing is
    /// sent until [`Daemon::run`].
    pub async fn bind(settings: Settings) -> Result<Self> {
        let listener = bind_listener(&settings.listen, "daemon").await?;
        let local = listener.local_addr()?;
        let mut probe: Box<dyn LoadProbe> = match settings.fixed_load {
            Some(load) => Box::new(FixedLoad(load)),
            None => Box::new(CpuBenchmark::new(settings.priority)),
        };
        let me = PeerInfo::at(local)
            .with_window(settings.window)
            .with_barrier(settings.barrier)
            .with_load(probe.measure());
        let mut topo = Topology::new(me, settings.max_children);
        topo.set_root(settings.root.map(PeerInfo::at));

        let (timers, alarms) = Timers::spawn();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let transfers = TransferQueue::new(
            Arc::new(LogOnlyTransfer),
            settings.timing.timeouts.transfer,
        );
        let (state, pending_register) = if settings.is_root {
            (RegState::Active, None)
        } else {
            (RegState::Unregistered, settings.parent)
        };
        Ok(Self {
            last_parent: settings.parent,
            settings,
            topo,
            state,
            listener,
            local,
            timers,
            alarms,
            cmd_tx,
            cmd_rx,
            rng: StdRng::from_entropy(),
            probe,
            transfers,
            parent_limit: None,
            pending_register,
            retry_alarm: None,
            stop: None,
            stopping: false,
        })
    }

    pub fn with_load_probe(mut self, mut probe: Box<dyn LoadProbe>) -> Self {
        self.topo.me_mut().load = probe.measure();
        self.probe = probe;
        self
    }

    pub fn with_transfer_agent(mut self, agent: Arc<dyn TransferAgent>) -> Self {
        self.transfers = TransferQueue::new(agent, self.settings.timing.timeouts.transfer);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            tx: self.cmd_tx.clone(),
            addr: self.local,
        }
    }

    /// Run the loop on its own task.
    pub fn spawn(self) -> (DaemonHandle, JoinHandle<Result<()>>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Serve until shut down. Returns an error only for hard failures
    /// (registration rejected); the caller should exit on it.
    pub async fn run(mut self) -> Result<()> {
        emit_system(
            "daemon",
            LogLevel::Info,
            "daemon_start",
            Some(format!(
                "listen={} root={} barrier={} max_children={} window={}",
                self.local,
                self.settings.is_root,
                self.settings.barrier,
                self.topo.max_children(),
                self.topo.me().window
            )),
        );
        self.arm_alarms();
        loop {
            self.housekeeping().await?;
            if self.stopping {
                break;
            }
            let event = tokio::select! {
                accepted = self.listener.accept() => Event::Inbound(accepted),
                Some(tick) = self.alarms.recv() => Event::Alarm(tick.payload),
                Some(cmd) = self.cmd_rx.recv() => Event::Command(cmd),
            };
            match event {
                Event::Inbound(Ok((stream, _))) => self.serve(stream).await,
                Event::Inbound(Err(e)) => emit_network_event(
                    "daemon",
                    LogLevel::Warn,
                    "accept_error",
                    None,
                    Some(e.to_string()),
                    true,
                ),
                Event::Alarm(alarm) => self.on_alarm(alarm).await?,
                Event::Command(cmd) => self.on_command(cmd).await,
            }
        }
        self.leave().await;
        if let Some(done) = self.stop.take() {
            let _ = done.send(());
        }
        Ok(())
    }

    fn arm_alarms(&mut self) {
        let timing = self.settings.timing.clone();
        self.timers
            .set_interrupt(timing.measure, Alarm::MeasureLoad, true);
        self.timers
            .set_interrupt(timing.exchange, Alarm::Rebalance, true);
        self.timers
            .set_interrupt(timing.exchange, Alarm::Liveness, true);
    }

    async fn housekeeping(&mut self) -> Result<()> {
        if let Some(target) = self.pending_register.take() {
            self.attempt_registration(target).await?;
        }
        self.check_liveness();
        for done in self.transfers.cull() {
            let (level, detail) = match &done.result {
                Ok(()) => (LogLevel::Debug, format!("{} done", done.wish.app)),
                Err(e) => (LogLevel::Warn, format!("{} failed: {}", done.wish.app, e)),
            };
            emit_network_event(
                "transfer",
                level,
                "transfer_finished",
                Some(done.peer.to_string()),
                Some(detail),
                false,
            );
        }
        Ok(())
    }

    async fn on_alarm(&mut self, alarm: Alarm) -> Result<()> {
        match alarm {
            Alarm::MeasureLoad => {
                let load = self.probe.measure();
                self.topo.me_mut().load = load;
            }
            Alarm::Rebalance => {
                self.exchange_with_children().await;
                self.elect_child(false).await;
            }
            Alarm::RetryRegister => {
                self.retry_alarm = None;
                if matches!(self.state, RegState::Orphan | RegState::Unregistered) {
                    self.retry_registration().await?;
                }
            }
            Alarm::Liveness => self.check_liveness(),
        }
        Ok(())
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Status(reply) => {
                let _ = reply.send(self.status_report());
            }
            Command::ExchangeNow(reply) => {
                self.exchange_with_children().await;
                let _ = reply.send(());
            }
            Command::ElectNow { force, reply } => {
                let promoted = self.elect_child(force).await;
                let _ = reply.send(promoted);
            }
            Command::Transfer(wish) => self.transfers.request(wish),
            Command::Shutdown(reply) => {
                self.stopping = true;
                self.stop = Some(reply);
            }
        }
    }

    async fn serve(&mut self, stream: TcpStream) {
        let mut conn = match Connection::from_stream(stream, self.settings.timing.timeouts) {
            Ok(c) => c,
            Err(e) => {
                emit_network_event("daemon", LogLevel::Debug, "accept_dropped", None, Some(e.to_string()), false);
                return;
            }
        };
        let peer = conn.peer_addr();
        let request: Request = match conn.recv_first().await {
            Ok(r) => r,
            Err(e) => {
                emit_network_event(
                    "daemon",
                    LogLevel::Debug,
                    "bad_request",
                    Some(peer.to_string()),
                    Some(e.to_string()),
                    false,
                );
                return;
            }
        };
        let kind = request.kind();
        let off = local_offset_minutes();
        let result = match request {
            Request::Register {
                version,
                port,
                load,
                barrier,
                depth,
                window,
            } => {
                let newcomer = PeerInfo::at(SocketAddr::new(peer.ip(), port))
                    .with_load(load)
                    .with_depth(depth)
                    .with_window(window.from_utc(off))
                    .with_barrier(barrier)
                    .touched(Instant::now());
                self.serve_register(&mut conn, &version, newcomer).await
            }
            Request::Exchange {
                port,
                depth,
                load,
                max_children,
                window,
            } => {
                let from = PeerInfo::at(SocketAddr::new(peer.ip(), port))
                    .with_depth(depth)
                    .with_load(load)
                    .with_window(window.from_utc(off));
                self.serve_exchange(&mut conn, from, max_children).await
            }
            Request::Promote { port, new_parent } => {
                self.serve_promote(&mut conn, SocketAddr::new(peer.ip(), port), new_parent)
                    .await
            }
            Request::Unregister { port } => {
                self.serve_unregister(SocketAddr::new(peer.ip(), port));
                Ok(())
            }
            Request::Orphan { port } => {
                self.serve_orphan(&mut conn, SocketAddr::new(peer.ip(), port))
                    .await
            }
            Request::Status => {
                let report = self.status_report();
                conn.send(&report).await
            }
        };
        if let Err(e) = result {
            emit_network_event(
                "daemon",
                LogLevel::Warn,
                "serve_failed",
                Some(peer.to_string()),
                Some(format!("{}: {}", kind, e)),
                true,
            );
        }
        conn.finish().await;
    }

    /// Whether `addr` names this daemon's own listener.
    fn is_me(&self, addr: SocketAddr) -> bool {
        addr == self.local
            || (addr.port() == self.local.port()
                && self.local.ip().is_unspecified()
                && addr.ip().is_loopback())
    }

    /// Branching factor in force: the root's (or a barrier's) own setting,
    /// otherwise the smaller of ours and the one handed down by the parent.
    fn apply_branching(&mut self) {
        let configured = self.settings.max_children;
        let limit = if self.settings.is_root || self.settings.barrier {
            configured
        } else {
            self.parent_limit.map_or(configured, |p| p.min(configured))
        };
        self.topo.set_max_children(limit);
    }
}
