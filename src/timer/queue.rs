//! Ordered list of logical timers sharing one real alarm.
//!
//! Each cell stores its delay *relative to the cell before it*, so the sum
//! of delays from the head through any cell is that cell's absolute fire
//! time from "now", and only the head delay ever needs a real alarm.
//! Units are whole seconds.

use std::collections::VecDeque;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delivers a tick; recurring interrupts re-arm at the same interval.
    Interrupt { recurring: bool },
    /// One-shot deadline that abandons whatever is waiting on it.
    Timeout,
}

impl TimerKind {
    pub fn recurring(&self) -> bool {
        matches!(self, TimerKind::Interrupt { recurring: true })
    }
}

#[derive(Debug, Clone)]
struct Cell {
    id: TimerId,
    delay: u64,
    interval: u64,
    kind: TimerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub kind: TimerKind,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    cells: VecDeque<Cell>,
    next_id: TimerId,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Seconds until the head cell fires.
    pub fn next_delay(&self) -> Option<u64> {
        self.cells.front().map(|c| c.delay)
    }

    /// `(id, relative delay)` for every pending cell, in firing order.
    pub fn pending(&self) -> Vec<(TimerId, u64)> {
        self.cells.iter().map(|c| (c.id, c.delay)).collect()
    }

    /// Seconds from now until `id` fires.
    pub fn fire_time(&self, id: TimerId) -> Option<u64> {
        let mut acc = 0;
        for c in &self.cells {
            acc += c.delay;
            if c.id == id {
                return Some(acc);
            }
        }
        None
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.cells.iter().any(|c| c.id == id)
    }

    /// Schedule a new cell `interval` seconds from now.
    pub fn insert(&mut self, interval: u64, kind: TimerKind) -> TimerId {
        self.insert_with_delay(interval, interval, kind)
    }

    /// Schedule with a first delay that differs from the re-arm interval.
    pub fn insert_with_delay(&mut self, delay: u64, interval: u64, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.place(Cell {
            id,
            delay,
            interval,
            kind,
        });
        id
    }

    fn place(&mut self, mut cell: Cell) {
        let mut pos = 0;
        // Cells due at the same moment keep insertion order.
        while pos < self.cells.len() && self.cells[pos].delay <= cell.delay {
            cell.delay -= self.cells[pos].delay;
            pos += 1;
        }
        if let Some(next) = self.cells.get_mut(pos) {
            next.delay -= cell.delay;
        }
        self.cells.insert(pos, cell);
    }

    /// Remove a pending cell. Unknown ids are a no-op.
    pub fn remove(&mut self, id: TimerId) -> bool {
        let Some(pos) = self.cells.iter().position(|c| c.id == id) else {
            return false;
        };
        if let Some(cell) = self.cells.remove(pos) {
            if let Some(next) = self.cells.get_mut(pos) {
                next.delay += cell.delay;
            }
        }
        true
    }

    /// Let `elapsed` seconds pass. Returns every cell that came due, in
    /// order; recurring cells are re-inserted at their original interval.
    pub fn advance(&mut self, elapsed: u64) -> Vec<Fired> {
        let mut left = elapsed;
        let mut fired = Vec::new();
        while let Some(head) = self.cells.front() {
            if head.delay > left {
                break;
            }
            left -= head.delay;
            if let Some(cell) = self.cells.pop_front() {
                fired.push(cell);
            }
        }
        if let Some(head) = self.cells.front_mut() {
            head.delay -= left;
        }
        let out = fired
            .iter()
            .map(|c| Fired {
                id: c.id,
                kind: c.kind,
            })
            .collect();
        for mut cell in fired {
            if cell.kind.recurring() {
                cell.delay = cell.interval;
                self.place(cell);
            }
        }
        out
    }
}
