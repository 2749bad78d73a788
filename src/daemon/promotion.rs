//! Shortening the tree: a daemon hands one of its children up to its own
//! parent.

use super::Daemon;
use crate::emit_topology_event;
use crate::error::Result;
use crate::events::dispatcher;
use crate::events::model::{LogEvent, LogLevel, PromotionEvent};
use crate::network::{Ack, Connection, RegState, Request};
use crate::topology::{best_match, strictly_better, MatchPrefs, Target};
use rand::Rng;
use std::net::SocketAddr;

impl Daemon {
    /// Pick a child to promote and promote it. Returns the promoted child.
    ///
    /// The child chosen is the one that suits our parent best. It is promoted
    /// when the parent has room, or when it would be a strictly better child
    /// for the parent than we are. Unless `force`d, the attempt only goes
    /// ahead with probability `1 / (1 + |our depth - parent depth|)`.
    pub(super) async fn elect_child(&mut self, force: bool) -> Option<SocketAddr> {
        if self.settings.is_root || self.settings.barrier || self.state != RegState::Active {
            return None;
        }
        let parent = self.topo.parent()?.clone();
        let parent_addr = parent.addr?;
        if self.topo.child_count() == 0 {
            return None;
        }
        let me = self.topo.me().clone();
        if !force {
            let gap = me.depth.abs_diff(parent.depth);
            if !self.rng.gen_bool(1.0 / (1.0 + f64::from(gap))) {
                return None;
            }
        }
        let target = Target::of(&parent);
        let pick = best_match(&target, self.topo.children(), MatchPrefs::BEST_HOME, &mut self.rng)?;
        let candidate = self.topo.child(pick)?.clone();
        if parent.depth != 0 && !strictly_better(&target, &candidate, &me) {
            return None;
        }
        let child = candidate.addr?;
        match self.promote(child, parent_addr).await {
            Ok(true) => Some(child),
            Ok(false) => None,
            Err(e) => {
                emit_topology_event!(
                    LogLevel::Debug,
                    "promote_failed",
                    Some(child),
                    None,
                    self.topo.child_count(),
                    Some(e.to_string())
                );
                None
            }
        }
    }

    /// Tell `child` to re-register with `new_parent`. On acceptance the slot
    /// is released and, since a vacancy just opened, our depth drops to 0.
    pub async fn promote(&mut self, child: SocketAddr, new_parent: SocketAddr) -> Result<bool> {
        let mut conn = Connection::connect(child, self.settings.timing.timeouts).await?;
        conn.send(&Request::Promote {
            port: self.local.port(),
            new_parent,
        })
        .await?;
        let ack: Ack = conn.recv_first().await?;
        conn.finish().await;

        let accepted = matches!(ack, Ack::Ok);
        let mut meta = dispatcher::meta("topology", LogLevel::Info);
        meta.corr_id = Some(dispatcher::correlation_id());
        dispatcher::emit(LogEvent::Promotion(PromotionEvent {
            meta,
            child: child.to_string(),
            from: self.local.to_string(),
            to: new_parent.to_string(),
            success: accepted,
        }));
        if let Ack::Refused { reason } = ack {
            emit_topology_event!(
                LogLevel::Info,
                "promotion_refused",
                Some(child),
                None,
                self.topo.child_count(),
                Some(reason)
            );
            return Ok(false);
        }
        self.topo.drop_child_by_addr(child);
        self.topo.me_mut().depth = 0;
        Ok(true)
    }

    /// Child side of promotion.
    pub(super) async fn serve_promote(
        &mut self,
        conn: &mut Connection,
        sender: SocketAddr,
        new_parent: SocketAddr,
    ) -> Result<()> {
        let reached_as = SocketAddr::new(conn.local_addr().ip(), self.local.port());
        let refusal = if Some(sender) != self.topo.parent_addr() {
            Some("sender is not our parent")
        } else if self.settings.is_root {
            Some("the root does not re-register")
        } else if new_parent == reached_as || self.is_me(new_parent) {
            Some("new parent is this daemon")
        } else {
            None
        };
        if let Some(reason) = refusal {
            return conn
                .send(&Ack::Refused {
                    reason: reason.to_string(),
                })
                .await;
        }
        conn.send(&Ack::Ok).await?;
        self.pending_register = Some(new_parent);
        self.last_parent = Some(new_parent);
        emit_topology_event!(
            LogLevel::Info,
            "promoted",
            Some(new_parent),
            Some(self.topo.me().depth),
            self.topo.child_count(),
            Some(format!("by {}", sender))
        );
        Ok(())
    }
}
