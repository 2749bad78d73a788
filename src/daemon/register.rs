//! Child side of registration. Registration is the only exchange a child
//! starts; everything else is initiated by the parent.

use super::{Alarm, Daemon};
use crate::constants::{MAX_REDIRECTS, PROTOCOL_VERSION};
use crate::emit_topology_event;
use crate::error::{NiceError, Result};
use crate::events::model::LogLevel;
use crate::network::{Connection, RegState, RegisterReply, Request};
use crate::topology::window::local_offset_minutes;
use crate::topology::PeerInfo;
use std::net::SocketAddr;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// We are now a child of this daemon.
    Accepted(SocketAddr),
    /// Nobody took us this time; try again later.
    RetryLater,
    /// Authentication failed. Do not try again.
    Rejected { peer: SocketAddr, reason: String },
}

impl Daemon {
    /// Register with `target`, following redirects, and fall back once to
    /// the root on any soft failure.
    pub async fn register(&mut self, target: SocketAddr) -> RegisterOutcome {
        let first = match self.register_bounded(target).await {
            Ok(parent) => return RegisterOutcome::Accepted(parent),
            Err(NiceError::Rejected { peer, reason }) => {
                return RegisterOutcome::Rejected { peer, reason }
            }
            Err(e) => e,
        };
        emit_topology_event!(
            LogLevel::Warn,
            "register_failed",
            Some(target),
            None,
            self.topo.child_count(),
            Some(first.to_string())
        );
        let root = match self.settings.root {
            Some(root) if root != target => root,
            _ => return RegisterOutcome::RetryLater,
        };
        match self.register_bounded(root).await {
            Ok(parent) => RegisterOutcome::Accepted(parent),
            Err(NiceError::Rejected { peer, reason }) => RegisterOutcome::Rejected { peer, reason },
            Err(e) => {
                emit_topology_event!(
                    LogLevel::Warn,
                    "register_failed",
                    Some(root),
                    None,
                    self.topo.child_count(),
                    Some(e.to_string())
                );
                RegisterOutcome::RetryLater
            }
        }
    }

    /// One registration walk under a single protocol deadline.
    async fn register_bounded(&mut self, target: SocketAddr) -> Result<SocketAddr> {
        let deadline = self
            .timers
            .set_timeout(self.settings.timing.timeouts.protocol);
        tokio::select! {
            res = self.follow_redirects(target) => res,
            _ = deadline => Err(NiceError::Timeout { what: "registration" }),
        }
    }

    async fn follow_redirects(&mut self, target: SocketAddr) -> Result<SocketAddr> {
        let mut next = target;
        for _ in 0..MAX_REDIRECTS {
            if self.is_me(next) {
                return Err(NiceError::Protocol(format!("redirected to ourselves ({})", next)));
            }
            let off = local_offset_minutes();
            let me = self.topo.me().clone();
            let mut conn = Connection::connect(next, self.settings.timing.timeouts).await?;
            conn.send(&Request::Register {
                version: PROTOCOL_VERSION.to_string(),
                port: self.local.port(),
                load: me.load,
                barrier: me.barrier,
                depth: me.depth,
                window: me.window.to_utc(off),
            })
            .await?;
            let reply: RegisterReply = conn.recv_first().await?;
            conn.finish().await;
            match reply {
                RegisterReply::Accepted {
                    depth,
                    load,
                    max_children,
                    window,
                } => {
                    let parent = PeerInfo::at(next)
                        .with_depth(depth)
                        .with_load(load)
                        .with_window(window.from_utc(off))
                        .touched(Instant::now());
                    self.adopt_parent(parent, max_children);
                    return Ok(next);
                }
                RegisterReply::Redirect { addr } => {
                    emit_topology_event!(
                        LogLevel::Debug,
                        "register_redirected",
                        Some(next),
                        None,
                        self.topo.child_count(),
                        Some(format!("to {}", addr))
                    );
                    next = addr;
                }
                RegisterReply::Rejected { reason } => {
                    return Err(NiceError::Rejected { peer: next, reason })
                }
            }
        }
        Err(NiceError::Protocol(format!(
            "gave up after {} redirects",
            MAX_REDIRECTS
        )))
    }

    fn adopt_parent(&mut self, parent: PeerInfo, limit: usize) {
        self.last_parent = parent.addr;
        self.topo.set_parent(Some(parent));
        self.parent_limit = Some(limit);
        self.apply_branching();
    }

    /// Run one registration and move the state machine accordingly.
    /// Only a hard rejection is returned as an error.
    pub(super) async fn attempt_registration(&mut self, target: SocketAddr) -> Result<()> {
        let previous = self.state;
        self.state = RegState::Registering;
        match self.register(target).await {
            RegisterOutcome::Accepted(parent) => {
                self.state = RegState::Active;
                if let Some(id) = self.retry_alarm.take() {
                    self.timers.clear(id);
                }
                emit_topology_event!(
                    LogLevel::Info,
                    "registered",
                    Some(parent),
                    Some(self.topo.me().depth),
                    self.topo.child_count(),
                    Some(format!("max_children={}", self.topo.max_children()))
                );
                Ok(())
            }
            RegisterOutcome::RetryLater => {
                self.state = if previous == RegState::Unregistered {
                    RegState::Unregistered
                } else {
                    RegState::Orphan
                };
                self.arm_retry();
                Ok(())
            }
            RegisterOutcome::Rejected { peer, reason } => {
                emit_topology_event!(
                    LogLevel::Error,
                    "registration_rejected",
                    Some(peer),
                    None,
                    self.topo.child_count(),
                    Some(reason.clone())
                );
                Err(NiceError::Rejected { peer, reason })
            }
        }
    }

    pub(super) fn arm_retry(&mut self) {
        if self.retry_alarm.is_none() {
            let id = self
                .timers
                .set_interrupt(self.settings.timing.orphan_retry, Alarm::RetryRegister, false);
            self.retry_alarm = Some(id);
        }
    }
}
