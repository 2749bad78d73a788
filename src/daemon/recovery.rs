// src/daemon/recovery.rs
// Liveness timeouts, orphan mode and graceful teardown.

use super::Daemon;
use crate::emit_topology_event;
use crate::error::Result;
use crate::events::dispatcher::emit_system;
use crate::events::model::LogLevel;
use crate::network::{Ack, Connection, RegState, Request};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio::time::Instant;

impl Daemon {
    /// Drop silent children; orphan ourselves if the parent went silent.
    pub(super) fn check_liveness(&mut self) {
        let now = Instant::now();
        let limit = self.settings.timing.child_drop;
        for i in self.topo.silent_children(now, limit) {
            if let Some(child) = self.topo.drop_child(i) {
                emit_topology_event!(
                    LogLevel::Info,
                    "child_timeout",
                    child.addr,
                    None,
                    self.topo.child_count(),
                    None
                );
            }
        }
        if self.state == RegState::Active
            && self
                .topo
                .parent_silent(now, self.settings.timing.parent_drop)
        {
            self.become_orphan("parent_timeout");
        }
    }

    pub(super) fn become_orphan(&mut self, why: &str) {
        self.state = RegState::Orphan;
        if let Some(parent) = self.topo.parent_addr() {
            self.last_parent = Some(parent);
        }
        emit_topology_event!(
            LogLevel::Warn,
            "orphaned",
            self.last_parent,
            None,
            self.topo.child_count(),
            Some(why.to_string())
        );
        self.arm_retry();
    }

    /// Try the last parent, then the root.
    pub(super) async fn retry_registration(&mut self) -> Result<()> {
        match self
            .last_parent
            .or(self.settings.root)
            .or(self.settings.parent)
        {
            Some(target) => self.attempt_registration(target).await,
            None => Ok(()),
        }
    }

    pub(super) fn serve_unregister(&mut self, sender: SocketAddr) {
        if self.topo.drop_child_by_addr(sender).is_some() {
            emit_topology_event!(
                LogLevel::Info,
                "child_unregistered",
                Some(sender),
                None,
                self.topo.child_count(),
                None
            );
        }
    }

    /// Our parent disowned us: acknowledge, then go straight back to it so it
    /// can send us somewhere else.
    pub(super) async fn serve_orphan(&mut self, conn: &mut Connection, sender: SocketAddr) -> Result<()> {
        conn.send(&Ack::Ok).await?;
        if Some(sender) == self.topo.parent_addr() && !self.settings.is_root {
            self.become_orphan("disowned");
            self.pending_register = Some(sender);
        }
        Ok(())
    }

    /// Tell `child` it is no longer ours. Runs detached: the child may be
    /// busy talking to us, and its answer changes nothing here.
    pub(super) fn send_orphan_notice(&self, child: SocketAddr) -> JoinHandle<()> {
        let timeouts = self.settings.timing.timeouts;
        let port = self.local.port();
        tokio::spawn(async move {
            let res: Result<Ack> = async {
                let mut conn = Connection::connect(child, timeouts).await?;
                conn.send(&Request::Orphan { port }).await?;
                let ack = conn.recv_first().await?;
                conn.finish().await;
                Ok(ack)
            }
            .await;
            if let Err(e) = res {
                emit_topology_event!(
                    LogLevel::Debug,
                    "orphan_notice_failed",
                    Some(child),
                    None,
                    0,
                    Some(e.to_string())
                );
            }
        })
    }

    /// Graceful exit: unregister from the parent, disown every child.
    pub(super) async fn leave(&mut self) {
        emit_system("daemon", LogLevel::Info, "daemon_stopping", None);
        if let (Some(parent), RegState::Active) = (self.topo.parent_addr(), self.state) {
            let timeouts = self.settings.timing.timeouts;
            let port = self.local.port();
            let res: Result<()> = async {
                let mut conn = Connection::connect(parent, timeouts).await?;
                conn.send(&Request::Unregister { port }).await?;
                conn.finish().await;
                Ok(())
            }
            .await;
            if let Err(e) = res {
                emit_topology_event!(
                    LogLevel::Debug,
                    "unregister_failed",
                    Some(parent),
                    None,
                    self.topo.child_count(),
                    Some(e.to_string())
                );
            }
        }
        let notices: Vec<JoinHandle<()>> = self
            .topo
            .children()
            .iter()
            .filter_map(|c| c.addr)
            .map(|addr| self.send_orphan_notice(addr))
            .collect();
        for notice in notices {
            let _ = notice.await;
        }
        self.state = RegState::Unregistered;
    }
}
