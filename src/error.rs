//! Error taxonomy shared by the daemon and the application dispatcher.
//!
//! Hard errors (rejection, configuration, bind) end the process; everything
//! else is soft and left to the caller to retry or fall back.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NiceError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A bounded read, write or connect ran out of time.
    #[error("timed out during {what}")]
    Timeout { what: &'static str },

    /// Peer hung up before the exchange completed.
    #[error("connection closed by {peer}")]
    Closed { peer: SocketAddr },

    /// Line could not be decoded into the expected frame.
    #[error("malformed frame from {peer}: {source}")]
    Frame {
        peer: SocketAddr,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame from {peer} exceeds {limit} bytes")]
    Oversized { peer: SocketAddr, limit: usize },

    /// Peer replied with something the protocol does not allow at this point.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Remote dispatcher refused the message.
    #[error("refused by {peer}")]
    Refused { peer: SocketAddr },

    /// Registration target failed authentication for us; do not retry.
    #[error("registration rejected by {peer}: {reason}")]
    Rejected { peer: SocketAddr, reason: String },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// The event loop behind a control handle is gone.
    #[error("daemon has stopped")]
    Stopped,

    /// Requested slot or handler does not exist locally.
    #[error("unknown {0}")]
    Unknown(String),
}

impl NiceError {
    /// Hard errors terminate the daemon instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NiceError::Rejected { .. } | NiceError::Bind { .. } | NiceError::Config(_)
        )
    }
}

pub type Result<T, E = NiceError> = std::result::Result<T, E>;
