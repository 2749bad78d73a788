use super::window::SchedWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Logical role a peer occupies relative to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Me,
    Parent,
    Root,
    /// Zero-based child index; children are always densely packed.
    Child(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Me => write!(f, "self"),
            Slot::Parent => write!(f, "parent"),
            Slot::Root => write!(f, "root"),
            Slot::Child(i) => write!(f, "child#{}", i),
        }
    }
}

/// Everything this node knows about one neighbor (or itself).
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    /// Listening address (peer IP + advertised port).
    pub addr: Option<SocketAddr>,
    /// Benchmark score; lower means less busy.
    pub load: i64,
    /// Hops to the nearest vacancy at or below the peer.
    pub depth: u32,
    /// Local-time scheduling window.
    pub window: SchedWindow,
    pub barrier: bool,
    pub last_contact: Option<Instant>,
}

impl Default for PeerInfo {
    fn default() -> Self {
        Self {
            addr: None,
            load: 0,
            depth: 0,
            window: SchedWindow::ALWAYS,
            barrier: false,
            last_contact: None,
        }
    }
}

impl PeerInfo {
    pub fn at(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr),
            ..Self::default()
        }
    }

    pub fn with_load(mut self, load: i64) -> Self {
        self.load = load;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_window(mut self, window: SchedWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_barrier(mut self, barrier: bool) -> Self {
        self.barrier = barrier;
        self
    }

    pub fn touched(mut self, now: Instant) -> Self {
        self.last_contact = Some(now);
        self
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_contact = Some(now);
    }

    /// True when no contact has been recorded within `limit` of `now`.
    /// A peer never heard from counts as silent.
    pub fn silent_for(&self, now: Instant, limit: std::time::Duration) -> bool {
        match self.last_contact {
            Some(t) => now.saturating_duration_since(t) > limit,
            None => true,
        }
    }
}
