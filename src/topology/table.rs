// src/topology/table.rs

use super::peer::{PeerInfo, Slot};
use crate::constants::MAX_CHILDREN;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("all {0} child slots are taken")]
    Full(usize),
    #[error("{0} is already a child")]
    Duplicate(SocketAddr),
    #[error("child has no address")]
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct Topology {
    me: PeerInfo,
    parent: Option<PeerInfo>,
    root: Option<PeerInfo>,
    children: Vec<PeerInfo>,
    max_children: usize,
}

impl Topology {
    pub fn new(me: PeerInfo, max_children: usize) -> Self {
        Self {
            me,
            parent: None,
            root: None,
            children: Vec::with_capacity(MAX_CHILDREN),
            max_children: max_children.clamp(1, MAX_CHILDREN),
        }
    }

    pub fn me(&self) -> &PeerInfo {
        &self.me
    }

    pub fn me_mut(&mut self) -> &mut PeerInfo {
        &mut self.me
    }

    pub fn parent(&self) -> Option<&PeerInfo> {
        self.parent.as_ref()
    }

    pub fn parent_mut(&mut self) -> Option<&mut PeerInfo> {
        self.parent.as_mut()
    }

    pub fn parent_addr(&self) -> Option<SocketAddr> {
        self.parent.as_ref().and_then(|p| p.addr)
    }

    pub fn set_parent(&mut self, parent: Option<PeerInfo>) {
        self.parent = parent;
    }

    pub fn root(&self) -> Option<&PeerInfo> {
        self.root.as_ref()
    }

    pub fn set_root(&mut self, root: Option<PeerInfo>) {
        self.root = root;
    }

    pub fn slot(&self, slot: Slot) -> Option<&PeerInfo> {
        match slot {
            Slot::Me => Some(&self.me),
            Slot::Parent => self.parent.as_ref(),
            Slot::Root => self.root.as_ref(),
            Slot::Child(i) => self.children.get(i),
        }
    }

    pub fn max_children(&self) -> usize {
        self.max_children
    }

    /// Change the branching factor. Returns how many children exceed the new limit.
    pub fn set_max_children(&mut self, max: usize) -> usize {
        self.max_children = max.clamp(1, MAX_CHILDREN);
        self.excess_children()
    }

    pub fn excess_children(&self) -> usize {
        self.children.len().saturating_sub(self.max_children)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_vacancy(&self) -> bool {
        self.children.len() < self.max_children
    }

    pub fn children(&self) -> &[PeerInfo] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&PeerInfo> {
        self.children.get(index)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut PeerInfo> {
        self.children.get_mut(index)
    }

    pub fn find_child(&self, addr: SocketAddr) -> Option<usize> {
        self.children.iter().position(|c| c.addr == Some(addr))
    }

    /// Admit a child into the next free slot.
    pub fn add_child(&mut self, child: PeerInfo) -> Result<usize, TopologyError> {
        let addr = child.addr.ok_or(TopologyError::Anonymous)?;
        if self.find_child(addr).is_some() {
            return Err(TopologyError::Duplicate(addr));
        }
        if !self.has_vacancy() {
            return Err(TopologyError::Full(self.max_children));
        }
        self.children.push(child);
        Ok(self.children.len() - 1)
    }

    /// Remove child `index`; the last child moves into the freed slot.
    /// Out-of-range indices are ignored.
    pub fn drop_child(&mut self, index: usize) -> Option<PeerInfo> {
        if index < self.children.len() {
            Some(self.children.swap_remove(index))
        } else {
            None
        }
    }

    pub fn drop_child_by_addr(&mut self, addr: SocketAddr) -> Option<PeerInfo> {
        self.find_child(addr).and_then(|i| self.drop_child(i))
    }

    /// Recompute and store own depth: 0 with a free slot, else one more than the shallowest child.
    pub fn recompute_depth(&mut self) -> u32 {
        self.me.depth = if self.has_vacancy() {
            0
        } else {
            1 + self.children.iter().map(|c| c.depth).min().unwrap_or(0)
        };
        self.me.depth
    }

    /// Children with no contact within `limit`, highest index first so they
    /// can be dropped one by one without disturbing the remaining indices.
    pub fn silent_children(&self, now: Instant, limit: Duration) -> Vec<usize> {
        let mut stale: Vec<usize> = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.silent_for(now, limit))
            .map(|(i, _)| i)
            .collect();
        stale.reverse();
        stale
    }

    pub fn parent_silent(&self, now: Instant, limit: Duration) -> bool {
        self.parent
            .as_ref()
            .map(|p| p.silent_for(now, limit))
            .unwrap_or(false)
    }
}
