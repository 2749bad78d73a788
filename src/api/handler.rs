// src/api/handler.rs

use super::node::ApiPeer;
use crate::error::{NiceError, Result};
use crate::network::Connection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub type ProtocolId = u32;

/// Fixed properties of one protocol. Both ends must agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerFlags {
    /// The sender waits for a verdict and then talks to the handler.
    pub synchronous: bool,
    /// May run from a timer tick or inside a critical window.
    pub safe: bool,
    /// A root or barrier node serves it even from peers it does not know.
    pub root_only: bool,
    pub increments_epoch: bool,
    pub requires_epoch_match: bool,
}

impl HandlerFlags {
    pub const fn synchronous() -> Self {
        Self {
            synchronous: true,
            safe: false,
            root_only: false,
            increments_epoch: false,
            requires_epoch_match: false,
        }
    }

    pub const fn asynchronous() -> Self {
        Self {
            synchronous: false,
            ..Self::synchronous()
        }
    }

    pub const fn safe(mut self) -> Self {
        self.safe = true;
        self
    }

    pub const fn root_only(mut self) -> Self {
        self.root_only = true;
        self
    }

    pub const fn increments_epoch(mut self) -> Self {
        self.increments_epoch = true;
        self
    }

    pub const fn requires_epoch_match(mut self) -> Self {
        self.requires_epoch_match = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub id: ProtocolId,
    pub flags: HandlerFlags,
}

impl Protocol {
    pub const fn new(id: ProtocolId, flags: HandlerFlags) -> Self {
        Self { id, flags }
    }
}

/// One delivery to a handler.
pub struct Call<'a> {
    pub id: ProtocolId,
    pub from: ApiPeer,
    /// Epoch with `from` after any increment this message caused.
    pub epoch: u64,
    /// Raw words from the sender must be byte-swapped.
    pub swap: bool,
    /// Open connection to the sender; `None` for asynchronous and deferred deliveries.
    pub conn: Option<&'a mut Connection>,
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, call: Call<'_>) -> Result<()>;
}

pub(crate) struct Registered {
    pub flags: HandlerFlags,
    pub handler: Arc<dyn Handler>,
}

/// Protocol id to handler. Filled at startup, read-only afterwards.
#[derive(Default)]
pub struct HandlerTable {
    entries: HashMap<ProtocolId, Registered>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, proto: Protocol, handler: Arc<dyn Handler>) -> Result<()> {
        if proto.flags.increments_epoch && !proto.flags.synchronous {
            return Err(NiceError::Config(format!(
                "protocol {}: only synchronous protocols may increment the epoch",
                proto.id
            )));
        }
        if self.entries.contains_key(&proto.id) {
            return Err(NiceError::Config(format!(
                "protocol {} registered twice",
                proto.id
            )));
        }
        self.entries.insert(
            proto.id,
            Registered {
                flags: proto.flags,
                handler,
            },
        );
        Ok(())
    }

    pub(crate) fn get(&self, id: ProtocolId) -> Option<&Registered> {
        self.entries.get(&id)
    }

    pub fn flags(&self, id: ProtocolId) -> Option<HandlerFlags> {
        self.entries.get(&id).map(|r| r.flags)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
