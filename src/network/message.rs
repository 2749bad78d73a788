// src/network/message.rs
//
// Daemon-to-daemon frames. Every exchange opens with one `Request`; the
// replies that may follow depend on the request kind.

use crate::topology::SchedWindow;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Child asks to join. Window is in UTC.
    #[serde(rename = "REGISTER")]
    Register {
        version: String,
        port: u16,
        load: i64,
        barrier: bool,
        depth: u32,
        window: SchedWindow,
    },
    /// Parent's periodic state push. Window is in UTC.
    #[serde(rename = "EXCHANGE")]
    Exchange {
        port: u16,
        depth: u32,
        load: i64,
        max_children: usize,
        window: SchedWindow,
    },
    /// Parent tells a child to re-register with `new_parent`.
    #[serde(rename = "PROMOTE")]
    Promote { port: u16, new_parent: SocketAddr },
    /// Child leaves; no reply.
    #[serde(rename = "UNREGISTER")]
    Unregister { port: u16 },
    /// Parent disowns the child; always acknowledged.
    #[serde(rename = "ORPHAN")]
    Orphan { port: u16 },
    #[serde(rename = "STATUS")]
    Status,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Exchange { .. } => "exchange",
            Request::Promote { .. } => "promote",
            Request::Unregister { .. } => "unregister",
            Request::Orphan { .. } => "orphan",
            Request::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegisterReply {
    /// Authentication failed; the registrant must give up for good.
    #[serde(rename = "REJECTED")]
    Rejected { reason: String },
    /// Registrant is now our child. Window is in UTC.
    #[serde(rename = "ACCEPTED")]
    Accepted {
        depth: u32,
        load: i64,
        max_children: usize,
        window: SchedWindow,
    },
    /// Try this daemon instead.
    #[serde(rename = "REDIRECT")]
    Redirect { addr: SocketAddr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeReply {
    /// Sender is not our parent; it should forget us.
    #[serde(rename = "NOT_YOUR_CHILD")]
    NotYourChild,
    /// Followed by `wishes` lines of [`Wish`]. Window is in UTC.
    #[serde(rename = "REPORT")]
    Report {
        depth: u32,
        load: i64,
        window: SchedWindow,
        barrier: bool,
        wishes: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WishKind {
    Get,
    Put,
}

/// Pending request to receive or send a copy of a worker application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wish {
    pub app: String,
    pub kind: WishKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ack {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "REFUSED")]
    Refused { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegState {
    Unregistered,
    Registering,
    Active,
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReport {
    pub addr: Option<SocketAddr>,
    pub depth: u32,
    pub load: i64,
    /// Local time of the reporting daemon.
    pub window: String,
    pub barrier: bool,
    /// Seconds since last contact, if any.
    pub silent_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub listen: SocketAddr,
    pub state: RegState,
    pub is_root: bool,
    pub barrier: bool,
    pub depth: u32,
    pub load: i64,
    pub max_children: usize,
    pub window: String,
    pub available: bool,
    pub parent: Option<PeerReport>,
    pub children: Vec<PeerReport>,
}
