use super::handler::ProtocolId;
use crate::topology::Slot;
use serde::{Deserialize, Serialize};

/// First frame of every application message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHeader {
    pub id: ProtocolId,
    /// Slot the sender occupies in the receiver's table.
    pub claimed: Slot,
    /// Sender's listening port; paired with the connection's source address.
    pub port: u16,
    /// Process id the sender believes the receiver has.
    pub pid: u32,
    /// Sender's epoch with the receiver.
    pub epoch: u64,
    pub big_endian: bool,
}

/// Receiver's answer to a synchronous header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "ACCEPT")]
    Accept { big_endian: bool },
    /// Busy in a non-reentrant section; send again right away.
    #[serde(rename = "DEFER")]
    Defer,
    /// Stale or duplicate; nothing was done, and that is fine.
    #[serde(rename = "IGNORE")]
    Ignore,
    #[serde(rename = "REFUSE")]
    Refuse,
}
