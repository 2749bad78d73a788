// src/daemon/exchange.rs
// Periodic load exchange, run by a parent against each of its children.

use super::Daemon;
use crate::emit_topology_event;
use crate::error::{NiceError, Result};
use crate::events::model::LogLevel;
use crate::network::{Connection, ExchangeReply, RegState, Request, Wish};
use crate::topology::window::local_offset_minutes;
use crate::topology::{best_match, MatchPrefs, PeerInfo, Target};
use std::net::SocketAddr;
use tokio::time::Instant;

/// More wishes than this in one report is treated as a broken peer.
const MAX_WISHES_PER_REPORT: usize = 1024;

impl Daemon {
    /// Visit every child once, then recompute depth and trim to the
    /// branching factor.
    pub(super) async fn exchange_with_children(&mut self) {
        let targets: Vec<SocketAddr> = self.topo.children().iter().filter_map(|c| c.addr).collect();
        let me = self.topo.me().clone();
        let request = Request::Exchange {
            port: self.local.port(),
            depth: me.depth,
            load: me.load,
            max_children: self.topo.max_children(),
            window: me.window.to_utc(local_offset_minutes()),
        };
        for addr in targets {
            if let Err(e) = self.exchange_one(addr, &request).await {
                emit_topology_event!(
                    LogLevel::Debug,
                    "exchange_failed",
                    Some(addr),
                    None,
                    self.topo.child_count(),
                    Some(e.to_string())
                );
            }
        }
        self.enforce_branching();
        let depth = self.topo.recompute_depth();
        emit_topology_event!(
            LogLevel::Debug,
            "exchange_done",
            None::<SocketAddr>,
            Some(depth),
            self.topo.child_count(),
            None
        );
    }

    async fn exchange_one(&mut self, addr: SocketAddr, request: &Request) -> Result<()> {
        let mut conn = Connection::connect(addr, self.settings.timing.timeouts).await?;
        conn.send(request).await?;
        let reply: ExchangeReply = conn.recv_first().await?;
        match reply {
            ExchangeReply::NotYourChild => {
                self.topo.drop_child_by_addr(addr);
                emit_topology_event!(
                    LogLevel::Info,
                    "pseudo_parent_dropped",
                    Some(addr),
                    None,
                    self.topo.child_count(),
                    None
                );
            }
            ExchangeReply::Report {
                depth,
                load,
                window,
                barrier,
                wishes,
            } => {
                if wishes > MAX_WISHES_PER_REPORT {
                    return Err(NiceError::Protocol(format!(
                        "{} reports {} wishes",
                        addr, wishes
                    )));
                }
                let mut list = Vec::with_capacity(wishes);
                for _ in 0..wishes {
                    list.push(conn.recv::<Wish>().await?);
                }
                let off = local_offset_minutes();
                if let Some(child) = self
                    .topo
                    .find_child(addr)
                    .and_then(|i| self.topo.child_mut(i))
                {
                    child.depth = depth;
                    child.load = load;
                    child.window = window.from_utc(off);
                    child.barrier = barrier;
                    child.touch(Instant::now());
                }
                for wish in list {
                    self.transfers.enqueue(wish, addr);
                }
            }
        }
        conn.finish().await;
        Ok(())
    }

    /// Evict worst-match children until we are within the branching factor.
    pub(super) fn enforce_branching(&mut self) {
        while self.topo.excess_children() > 0 {
            let me = Target::of(self.topo.me());
            let worst = match best_match(&me, self.topo.children(), MatchPrefs::WORST, &mut self.rng) {
                Some(i) => i,
                None => break,
            };
            if let Some(evicted) = self.topo.drop_child(worst).and_then(|c| c.addr) {
                emit_topology_event!(
                    LogLevel::Info,
                    "child_evicted",
                    Some(evicted),
                    None,
                    self.topo.child_count(),
                    Some(format!("branching factor {}", self.topo.max_children()))
                );
                self.send_orphan_notice(evicted);
            }
        }
    }

    /// Child side: answer our parent with our state and any pending wishes.
    pub(super) async fn serve_exchange(
        &mut self,
        conn: &mut Connection,
        from: PeerInfo,
        max_children: usize,
    ) -> Result<()> {
        let sender = from.addr;
        if sender.is_none() || sender != self.topo.parent_addr() {
            return conn.send(&ExchangeReply::NotYourChild).await;
        }
        if let Some(parent) = self.topo.parent_mut() {
            parent.depth = from.depth;
            parent.load = from.load;
            parent.window = from.window;
            parent.touch(Instant::now());
        }
        self.parent_limit = Some(max_children);
        self.apply_branching();
        if self.state == RegState::Orphan {
            self.state = RegState::Active;
            if let Some(id) = self.retry_alarm.take() {
                self.timers.clear(id);
            }
            emit_topology_event!(
                LogLevel::Info,
                "parent_regained",
                sender,
                None,
                self.topo.child_count(),
                None
            );
        }

        let wishes = self.transfers.take_outbound();
        let me = self.topo.me();
        let report = ExchangeReply::Report {
            depth: me.depth,
            load: me.load,
            window: me.window.to_utc(local_offset_minutes()),
            barrier: me.barrier,
            wishes: wishes.len(),
        };
        let mut sent = conn.send(&report).await;
        for wish in &wishes {
            if sent.is_err() {
                break;
            }
            sent = conn.send(wish).await;
        }
        if sent.is_err() {
            // Report them again next time.
            for wish in wishes {
                self.transfers.request(wish);
            }
        }
        sent
    }
}
