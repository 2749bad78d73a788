//! Application node: the dispatcher a worker process runs to talk to its
//! neighbors in the tree.
//!
//! Sending is [`ApiNode::talk`]. Receiving happens only when the owner calls
//! [`ApiNode::poll_in`], from either its main loop or a timer tick. Handlers
//! not marked safe never run from a tick or inside a critical window: a
//! synchronous sender is told to retry, an asynchronous message is queued as
//! a [`Signal`] and delivered on the next main-loop poll.

use super::handler::{Call, HandlerFlags, HandlerTable, Protocol, ProtocolId, Handler};
use super::signal::{Signal, SignalQueue};
use super::wire::{ApiHeader, Verdict};
use crate::config::Settings;
use crate::constants::DEFAULT_SIGNAL_CAPACITY;
use crate::error::{NiceError, Result};
use crate::events::dispatcher;
use crate::events::model::{HandlerEvent, LogEvent, LogLevel};
use crate::network::events::emit_network_event;
use crate::network::{bind_listener, needs_swap, Connection, Timeouts, NATIVE_BIG_ENDIAN};
use crate::topology::Slot;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// "bind:port" to listen on
    pub listen: String,
    /// Process id to present; defaults to the real one.
    pub pid: Option<u32>,
    pub is_root: bool,
    pub barrier: bool,
    pub signal_capacity: usize,
    pub timeouts: Timeouts,
}

impl NodeSettings {
    /// Ephemeral loopback port, everything else default.
    pub fn local() -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            pid: None,
            is_root: false,
            barrier: false,
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
            timeouts: Timeouts::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            listen: settings.api_listen.clone(),
            pid: None,
            is_root: settings.is_root,
            barrier: settings.barrier,
            signal_capacity: settings.signal_capacity,
            timeouts: settings.timing.timeouts,
        }
    }
}

/// A neighbor as this node knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiPeer {
    pub addr: SocketAddr,
    pub pid: u32,
    /// Slot this node occupies in the peer's table.
    pub seen_as: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollContext {
    MainLoop,
    TimerTick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkOutcome<T> {
    /// Accepted; carries what the client closure returned.
    Completed(T),
    /// Asynchronous message handed over; no answer is expected.
    Sent,
    /// Receiver was busy. Send again.
    Deferred,
    /// Receiver considered the message stale. Nothing to do.
    Ignored,
}

pub type ClientFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

enum Screen {
    Refuse(&'static str),
    Defer,
    Queue,
    Ignore,
    Run { from: ApiPeer, epoch: u64 },
}

pub struct ApiNode {
    settings: NodeSettings,
    pid: u32,
    listener: TcpListener,
    local: SocketAddr,
    handlers: HandlerTable,
    peers: HashMap<Slot, ApiPeer>,
    epochs: HashMap<Slot, u64>,
    signals: SignalQueue,
    critical: usize,
    shutting_down: bool,
}

fn emit_verdict(id: ProtocolId, peer: SocketAddr, verdict: &str, epoch: u64) {
    let level = match verdict {
        "refuse" => LogLevel::Warn,
        "accept" => LogLevel::Debug,
        _ => LogLevel::Info,
    };
    let mut meta = dispatcher::meta("api", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Handler(HandlerEvent {
        meta,
        protocol: id,
        peer: Some(peer.to_string()),
        verdict: verdict.to_string(),
        epoch,
    }));
}

impl ApiNode {
    pub async fn bind(settings: NodeSettings) -> Result<Self> {
        let listener = bind_listener(&settings.listen, "api").await?;
        let local = listener.local_addr()?;
        Ok(Self {
            pid: settings.pid.unwrap_or_else(std::process::id),
            signals: SignalQueue::new(settings.signal_capacity),
            settings,
            listener,
            local,
            handlers: HandlerTable::new(),
            peers: HashMap::new(),
            epochs: HashMap::new(),
            critical: 0,
            shutting_down: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn register_handler(&mut self, proto: Protocol, handler: Arc<dyn Handler>) -> Result<()> {
        self.handlers.register(proto, handler)
    }

    /// Record who sits in `slot`. A different peer starts again at epoch 0.
    pub fn set_peer(&mut self, slot: Slot, peer: ApiPeer) {
        if self.peers.insert(slot, peer) != Some(peer) {
            self.epochs.remove(&slot);
        }
    }

    pub fn forget_peer(&mut self, slot: Slot) -> Option<ApiPeer> {
        self.epochs.remove(&slot);
        self.peers.remove(&slot)
    }

    pub fn peer(&self, slot: Slot) -> Option<&ApiPeer> {
        self.peers.get(&slot)
    }

    pub fn epoch(&self, slot: Slot) -> u64 {
        self.epochs.get(&slot).copied().unwrap_or(0)
    }

    /// Start a section in which unsafe handlers must not run. Nests.
    pub fn enter_critical(&mut self) {
        self.critical += 1;
    }

    pub fn leave_critical(&mut self) {
        self.critical = self.critical.saturating_sub(1);
    }

    pub fn in_critical(&self) -> bool {
        self.critical > 0
    }

    pub fn pending_signals(&self) -> usize {
        self.signals.len()
    }

    /// Refuse everything from now on.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// Send protocol `proto` to the peer in `slot`.
    ///
    /// For a synchronous protocol `client` runs once the receiver accepts,
    /// with the open connection and whether raw words need swapping. For an
    /// asynchronous one only the header is sent and `client` is not called.
    pub async fn talk<T, F>(&mut self, slot: Slot, proto: Protocol, client: F) -> Result<TalkOutcome<T>>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Connection, bool) -> ClientFuture<'c, T> + Send,
    {
        let peer = *self
            .peers
            .get(&slot)
            .ok_or_else(|| NiceError::Unknown(format!("peer in slot {}", slot)))?;
        let mut conn = Connection::connect(peer.addr, self.settings.timeouts).await?;
        conn.send(&ApiHeader {
            id: proto.id,
            claimed: peer.seen_as,
            port: self.local.port(),
            pid: peer.pid,
            epoch: self.epoch(slot),
            big_endian: NATIVE_BIG_ENDIAN,
        })
        .await?;
        if !proto.flags.synchronous {
            conn.finish().await;
            return Ok(TalkOutcome::Sent);
        }
        let verdict: Verdict = conn.recv_first().await?;
        match verdict {
            Verdict::Accept { big_endian } => {
                if proto.flags.increments_epoch {
                    *self.epochs.entry(slot).or_insert(0) += 1;
                }
                let out = client(&mut conn, needs_swap(big_endian)).await?;
                conn.finish().await;
                Ok(TalkOutcome::Completed(out))
            }
            Verdict::Defer => Ok(TalkOutcome::Deferred),
            Verdict::Ignore => Ok(TalkOutcome::Ignored),
            Verdict::Refuse => Err(NiceError::Refused { peer: peer.addr }),
        }
    }

    /// Send a protocol that carries nothing beyond its header.
    pub async fn notify(&mut self, slot: Slot, proto: Protocol) -> Result<TalkOutcome<()>> {
        self.talk(slot, proto, |_, _| Box::pin(async { Ok(()) })).await
    }

    /// Service queued signals (main loop only), then every connection that
    /// arrives within `wait` plus any already waiting behind it. Returns how
    /// many messages were looked at.
    pub async fn poll_in(&mut self, context: PollContext, wait: Duration) -> Result<usize> {
        let mut handled = 0;
        if context == PollContext::MainLoop && !self.in_critical() {
            handled += self.drain_signals().await;
        }
        let first = match tokio::time::timeout(wait, self.listener.accept()).await {
            Ok(accepted) => accepted?,
            Err(_) => return Ok(handled),
        };
        self.serve(first.0, context).await;
        handled += 1;
        while let Ok(Ok((stream, _))) =
            tokio::time::timeout(Duration::ZERO, self.listener.accept()).await
        {
            self.serve(stream, context).await;
            handled += 1;
        }
        Ok(handled)
    }

    async fn drain_signals(&mut self) -> usize {
        let mut handled = 0;
        while let Some(sig) = self.signals.pop() {
            let Some((flags, handler)) = self
                .handlers
                .get(sig.id)
                .map(|r| (r.flags, r.handler.clone()))
            else {
                continue;
            };
            match self.admit(flags, sig.claimed, sig.from, sig.pid, sig.epoch) {
                Screen::Run { from, epoch } => {
                    emit_verdict(sig.id, sig.from, "deliver", epoch);
                    let call = Call {
                        id: sig.id,
                        from,
                        epoch,
                        swap: needs_swap(sig.big_endian),
                        conn: None,
                    };
                    if let Err(e) = handler.handle(call).await {
                        emit_network_event(
                            "api",
                            LogLevel::Warn,
                            "handler_failed",
                            Some(sig.from.to_string()),
                            Some(format!("protocol {}: {}", sig.id, e)),
                            true,
                        );
                    }
                    handled += 1;
                }
                Screen::Ignore => emit_verdict(sig.id, sig.from, "ignore", sig.epoch),
                _ => emit_verdict(sig.id, sig.from, "refuse", sig.epoch),
            }
        }
        handled
    }

    /// Identity, pid and epoch checks shared by live and deferred messages.
    fn admit(
        &mut self,
        flags: HandlerFlags,
        claimed: Slot,
        from: SocketAddr,
        pid: u32,
        epoch: u64,
    ) -> Screen {
        let known = self.peers.get(&claimed).filter(|p| p.addr == from).copied();
        let peer = match known {
            Some(p) if pid == self.pid => p,
            Some(_) => return Screen::Refuse("pid mismatch"),
            None if flags.root_only && (self.settings.is_root || self.settings.barrier) => {
                // Strangers have no epoch with us.
                return Screen::Run {
                    from: ApiPeer {
                        addr: from,
                        pid: 0,
                        seen_as: claimed,
                    },
                    epoch,
                };
            }
            None => return Screen::Refuse("unknown peer"),
        };
        let current = self.epoch(claimed);
        if flags.requires_epoch_match && epoch != current {
            return Screen::Ignore;
        }
        let epoch = if flags.increments_epoch {
            let e = self.epochs.entry(claimed).or_insert(0);
            *e += 1;
            *e
        } else {
            current
        };
        Screen::Run { from: peer, epoch }
    }

    fn screen(&mut self, header: &ApiHeader, flags: HandlerFlags, from: SocketAddr, context: PollContext) -> Screen {
        if self.shutting_down {
            return Screen::Refuse("shutting down");
        }
        if self.signals.is_full() {
            return Screen::Refuse("signal queue full");
        }
        let unsafe_now = !flags.safe && (context == PollContext::TimerTick || self.in_critical());
        if unsafe_now {
            return if flags.synchronous {
                Screen::Defer
            } else {
                Screen::Queue
            };
        }
        self.admit(flags, header.claimed, from, header.pid, header.epoch)
    }

    async fn serve(&mut self, stream: TcpStream, context: PollContext) {
        let mut conn = match Connection::from_stream(stream, self.settings.timeouts) {
            Ok(c) => c,
            Err(_) => return,
        };
        let header: ApiHeader = match conn.recv_first().await {
            Ok(h) => h,
            Err(e) => {
                emit_network_event(
                    "api",
                    LogLevel::Debug,
                    "bad_header",
                    Some(conn.peer_addr().to_string()),
                    Some(e.to_string()),
                    false,
                );
                return;
            }
        };
        let from = SocketAddr::new(conn.peer_addr().ip(), header.port);
        let Some((flags, handler)) = self
            .handlers
            .get(header.id)
            .map(|r| (r.flags, r.handler.clone()))
        else {
            emit_verdict(header.id, from, "refuse", header.epoch);
            let _ = conn.send(&Verdict::Refuse).await;
            return;
        };

        let result = match self.screen(&header, flags, from, context) {
            Screen::Refuse(reason) => {
                emit_network_event(
                    "api",
                    LogLevel::Debug,
                    "message_refused",
                    Some(from.to_string()),
                    Some(format!("protocol {}: {}", header.id, reason)),
                    false,
                );
                emit_verdict(header.id, from, "refuse", header.epoch);
                if flags.synchronous {
                    conn.send(&Verdict::Refuse).await
                } else {
                    Ok(())
                }
            }
            Screen::Defer => {
                emit_verdict(header.id, from, "defer", header.epoch);
                conn.send(&Verdict::Defer).await
            }
            Screen::Queue => {
                let queued = self.signals.push(Signal {
                    id: header.id,
                    claimed: header.claimed,
                    from,
                    pid: header.pid,
                    epoch: header.epoch,
                    big_endian: header.big_endian,
                });
                emit_verdict(header.id, from, if queued { "queue" } else { "refuse" }, header.epoch);
                Ok(())
            }
            Screen::Ignore => {
                emit_verdict(header.id, from, "ignore", header.epoch);
                if flags.synchronous {
                    conn.send(&Verdict::Ignore).await
                } else {
                    Ok(())
                }
            }
            Screen::Run { from: peer, epoch } => {
                emit_verdict(header.id, from, "accept", epoch);
                let swap = needs_swap(header.big_endian);
                if flags.synchronous {
                    match conn
                        .send(&Verdict::Accept {
                            big_endian: NATIVE_BIG_ENDIAN,
                        })
                        .await
                    {
                        Ok(()) => {
                            handler
                                .handle(Call {
                                    id: header.id,
                                    from: peer,
                                    epoch,
                                    swap,
                                    conn: Some(&mut conn),
                                })
                                .await
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    handler
                        .handle(Call {
                            id: header.id,
                            from: peer,
                            epoch,
                            swap,
                            conn: None,
                        })
                        .await
                }
            }
        };
        if let Err(e) = result {
            emit_network_event(
                "api",
                LogLevel::Warn,
                "handler_failed",
                Some(from.to_string()),
                Some(format!("protocol {}: {}", header.id, e)),
                true,
            );
        }
        conn.finish().await;
    }
}
