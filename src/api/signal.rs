// src/api/signal.rs

use super::handler::ProtocolId;
use crate::topology::Slot;
use std::collections::VecDeque;
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub id: ProtocolId,
    pub claimed: Slot,
    pub from: SocketAddr,
    pub pid: u32,
    pub epoch: u64,
    pub big_endian: bool,
}

/// Bounded FIFO of deferred signals.
#[derive(Debug)]
pub struct SignalQueue {
    cells: VecDeque<Signal>,
    capacity: usize,
}

impl SignalQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false, dropping `signal`, when the queue is full.
    pub fn push(&mut self, signal: Signal) -> bool {
        if self.is_full() {
            return false;
        }
        self.cells.push_back(signal);
        true
    }

    pub fn pop(&mut self) -> Option<Signal> {
        self.cells.pop_front()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.cells.len() >= self.capacity
    }
}
