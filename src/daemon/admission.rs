// src/daemon/admission.rs
// Parent side of registration: who gets a slot, who gets evicted, and
// where everyone else is sent.

use super::Daemon;
use crate::constants::PROTOCOL_VERSION;
use crate::emit_topology_event;
use crate::error::{NiceError, Result};
use crate::events::model::LogLevel;
use crate::network::{Connection, RegisterReply};
use crate::topology::window::local_offset_minutes;
use crate::topology::{best_match, strictly_better, MatchPrefs, PeerInfo, Target, Topology};
use rand::Rng;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Evict child `i` and take the newcomer in its place.
    Replace(usize),
    Redirect(SocketAddr),
}

/// Decide what to do with `newcomer`, who is not currently a child.
///
/// With a free slot the newcomer is accepted. Otherwise the worst current
/// child (least overlap with us, deepest, busiest) is replaced if the
/// newcomer strictly beats it. Failing that, the newcomer is sent to the
/// child that suits it best, skipping barrier children. If every child is a
/// barrier node, an ordinary newcomer goes to the root and a barrier
/// newcomer displaces the worst child instead, so barriers sink to the leaves.
pub fn decide_admission<R: Rng + ?Sized>(
    topo: &Topology,
    newcomer: &PeerInfo,
    rng: &mut R,
) -> Admission {
    if topo.has_vacancy() {
        return Admission::Accept;
    }
    let me = Target::of(topo.me());
    let children = topo.children();
    let worst = match best_match(&me, children, MatchPrefs::WORST, rng) {
        Some(i) => i,
        None => return Admission::Accept,
    };
    if strictly_better(&me, newcomer, &children[worst]) {
        return Admission::Replace(worst);
    }
    let home = Target::of(newcomer);
    if let Some(addr) = best_match(&home, children, MatchPrefs::BEST_HOME, rng)
        .and_then(|i| children[i].addr)
    {
        return Admission::Redirect(addr);
    }
    if !newcomer.barrier {
        if let Some(root) = topo.root().and_then(|r| r.addr) {
            if Some(root) != newcomer.addr {
                return Admission::Redirect(root);
            }
        }
    }
    Admission::Replace(worst)
}

impl Daemon {
    pub(super) async fn serve_register(
        &mut self,
        conn: &mut Connection,
        version: &str,
        newcomer: PeerInfo,
    ) -> Result<()> {
        let addr = newcomer
            .addr
            .ok_or_else(|| NiceError::Protocol("registrant without address".into()))?;

        // A reconnect after reboot looks like a new registration.
        if self.topo.drop_child_by_addr(addr).is_some() {
            emit_topology_event!(
                LogLevel::Debug,
                "stale_child_dropped",
                Some(addr),
                None,
                self.topo.child_count(),
                None
            );
        }

        let refusal = if version != PROTOCOL_VERSION {
            Some(format!("version {} does not match {}", version, PROTOCOL_VERSION))
        } else if addr.ip().is_loopback() && !self.settings.allow_loopback {
            Some("registrations from loopback addresses are not accepted".to_string())
        } else if self.is_me(addr) {
            Some("a daemon cannot register with itself".to_string())
        } else {
            None
        };
        if let Some(reason) = refusal {
            emit_topology_event!(
                LogLevel::Warn,
                "registration_rejected",
                Some(addr),
                None,
                self.topo.child_count(),
                Some(reason.clone())
            );
            return conn.send(&RegisterReply::Rejected { reason }).await;
        }

        // Our own parent asking to become our child would close a loop.
        let decision = match (self.topo.parent_addr(), self.topo.root().and_then(|r| r.addr)) {
            (Some(parent), Some(root)) if parent == addr && root != addr => Admission::Redirect(root),
            _ => decide_admission(&self.topo, &newcomer, &mut self.rng),
        };

        match decision {
            Admission::Accept => {
                self.topo
                    .add_child(newcomer)
                    .map_err(|e| NiceError::Protocol(e.to_string()))?;
                conn.send(&self.accepted_reply()).await?;
                emit_topology_event!(
                    LogLevel::Info,
                    "child_accepted",
                    Some(addr),
                    Some(self.topo.me().depth),
                    self.topo.child_count(),
                    None
                );
            }
            Admission::Replace(i) => {
                let evicted = self.topo.drop_child(i);
                self.topo
                    .add_child(newcomer)
                    .map_err(|e| NiceError::Protocol(e.to_string()))?;
                conn.send(&self.accepted_reply()).await?;
                let evicted = evicted.and_then(|c| c.addr);
                emit_topology_event!(
                    LogLevel::Info,
                    "child_replaced",
                    Some(addr),
                    Some(self.topo.me().depth),
                    self.topo.child_count(),
                    evicted.map(|e| format!("evicted {}", e))
                );
                if let Some(old) = evicted {
                    self.send_orphan_notice(old);
                }
            }
            Admission::Redirect(to) => {
                conn.send(&RegisterReply::Redirect { addr: to }).await?;
                emit_topology_event!(
                    LogLevel::Debug,
                    "registrant_redirected",
                    Some(addr),
                    None,
                    self.topo.child_count(),
                    Some(format!("to {}", to))
                );
            }
        }
        Ok(())
    }

    fn accepted_reply(&self) -> RegisterReply {
        let me = self.topo.me();
        RegisterReply::Accepted {
            depth: me.depth,
            load: me.load,
            max_children: self.topo.max_children(),
            window: me.window.to_utc(local_offset_minutes()),
        }
    }
}
