// src/host/transfer.rs
// Hand-off point to the application transfer subsystem.

use crate::error::{NiceError, Result};
use crate::events::model::LogLevel;
use crate::network::events::emit_network_event;
use crate::network::{Wish, WishKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Moves one application between this daemon and `peer`.
#[async_trait]
pub trait TransferAgent: Send + Sync {
    async fn transfer(&self, wish: &Wish, peer: SocketAddr) -> Result<()>;
}

/// Accepts every wish and does nothing. Used when no installer is wired in.
pub struct LogOnlyTransfer;

#[async_trait]
impl TransferAgent for LogOnlyTransfer {
    async fn transfer(&self, wish: &Wish, peer: SocketAddr) -> Result<()> {
        let verb = match wish.kind {
            WishKind::Get => "get",
            WishKind::Put => "put",
        };
        emit_network_event(
            "transfer",
            LogLevel::Debug,
            "transfer_skipped",
            Some(peer.to_string()),
            Some(format!("{} {}", verb, wish.app)),
            false,
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct TransferDone {
    pub wish: Wish,
    pub peer: SocketAddr,
    pub result: Result<()>,
}

pub struct TransferQueue {
    agent: Arc<dyn TransferAgent>,
    limit: Duration,
    in_flight: HashSet<(Wish, SocketAddr)>,
    outbound: Vec<Wish>,
    done_tx: mpsc::UnboundedSender<TransferDone>,
    done_rx: mpsc::UnboundedReceiver<TransferDone>,
}

impl TransferQueue {
    pub fn new(agent: Arc<dyn TransferAgent>, limit: Duration) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            agent,
            limit,
            in_flight: HashSet::new(),
            outbound: Vec::new(),
            done_tx,
            done_rx,
        }
    }

    /// Start serving a wish reported by `peer`. A wish already in flight for
    /// the same peer is not started twice.
    pub fn enqueue(&mut self, wish: Wish, peer: SocketAddr) -> bool {
        if !self.in_flight.insert((wish.clone(), peer)) {
            return false;
        }
        let agent = self.agent.clone();
        let tx = self.done_tx.clone();
        let limit = self.limit;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, agent.transfer(&wish, peer)).await {
                Ok(r) => r,
                Err(_) => Err(NiceError::Timeout { what: "transfer" }),
            };
            let _ = tx.send(TransferDone { wish, peer, result });
        });
        true
    }

    /// Collect finished transfers without waiting.
    pub fn cull(&mut self) -> Vec<TransferDone> {
        let mut done = Vec::new();
        while let Ok(d) = self.done_rx.try_recv() {
            self.in_flight.remove(&(d.wish.clone(), d.peer));
            done.push(d);
        }
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queue a wish of our own to report to the parent at its next exchange.
    pub fn request(&mut self, wish: Wish) {
        if !self.outbound.contains(&wish) {
            self.outbound.push(wish);
        }
    }

    pub fn take_outbound(&mut self) -> Vec<Wish> {
        std::mem::take(&mut self.outbound)
    }
}
