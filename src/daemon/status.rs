use super::Daemon;
use crate::constants::full_version;
use crate::error::Result;
use crate::network::{Connection, PeerReport, Request, StatusReport, Timeouts};
use crate::topology::window::local_minute_of_day;
use crate::topology::PeerInfo;
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::time::Instant;

fn peer_report(peer: &PeerInfo, now: Instant) -> PeerReport {
    PeerReport {
        addr: peer.addr,
        depth: peer.depth,
        load: peer.load,
        window: peer.window.to_string(),
        barrier: peer.barrier,
        silent_secs: peer
            .last_contact
            .map(|t| now.saturating_duration_since(t).as_secs()),
    }
}

impl Daemon {
    pub(super) fn status_report(&self) -> StatusReport {
        let now = Instant::now();
        let me = self.topo.me();
        StatusReport {
            version: full_version(),
            listen: self.local,
            state: self.state,
            is_root: self.settings.is_root,
            barrier: me.barrier,
            depth: me.depth,
            load: me.load,
            max_children: self.topo.max_children(),
            window: me.window.to_string(),
            available: me.window.contains(local_minute_of_day()),
            parent: self.topo.parent().map(|p| peer_report(p, now)),
            children: self
                .topo
                .children()
                .iter()
                .map(|c| peer_report(c, now))
                .collect(),
        }
    }
}

/// Ask the daemon at `addr` for its status.
pub async fn query_status(addr: SocketAddr, timeouts: Timeouts) -> Result<StatusReport> {
    let mut conn = Connection::connect(addr, timeouts).await?;
    conn.send(&Request::Status).await?;
    let report = conn.recv_first().await?;
    conn.finish().await;
    Ok(report)
}

/// Walk the tree below `addr`, depth first. Each entry carries its level
/// below the starting daemon. Unreachable daemons are reported as errors in
/// place and their subtrees skipped.
pub async fn walk_tree(
    addr: SocketAddr,
    timeouts: Timeouts,
) -> Vec<(usize, SocketAddr, Result<StatusReport>)> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(0usize, addr)];
    while let Some((level, next)) = stack.pop() {
        if !seen.insert(next) {
            continue;
        }
        let res = query_status(next, timeouts).await;
        if let Ok(report) = &res {
            for child in report.children.iter().rev() {
                if let Some(c) = child.addr {
                    stack.push((level + 1, c));
                }
            }
        }
        out.push((level, next, res));
    }
    out
}
