//! Host load estimation.
//!
//! A lower score means a less busy machine. The daemon re-measures on its
//! own schedule and reports the latest score to its parent.

use std::hint::black_box;
use std::time::Instant;

pub trait LoadProbe: Send {
    fn measure(&mut self) -> i64;
}

/// Times a fixed integer workload and weights it by the scheduling priority
/// the worker will run at: a worker at nice 19 gets the machine only when
/// nothing else wants it, so the same timing counts for more.
#[derive(Debug, Clone)]
pub struct CpuBenchmark {
    priority: i32,
    rounds: u32,
}

impl CpuBenchmark {
    pub fn new(priority: i32) -> Self {
        Self {
            priority: priority.clamp(-20, 19),
            rounds: 200_000,
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    fn workload(&self) -> u64 {
        let mut acc: u64 = 0x9e37_79b9_7f4a_7c15;
        for i in 0..self.rounds {
            acc ^= acc << 13;
            acc ^= acc >> 7;
            acc ^= acc << 17;
            acc = acc.wrapping_add(u64::from(i));
        }
        acc
    }
}

impl LoadProbe for CpuBenchmark {
    fn measure(&mut self) -> i64 {
        let started = Instant::now();
        black_box(self.workload());
        let micros = started.elapsed().as_micros().min(i64::MAX as u128) as i64;
        // nice -20 -> weight 1, nice 19 -> weight 40
        let weight = i64::from(self.priority + 21);
        micros.saturating_mul(weight).max(1)
    }
}

/// Reports the same score every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub i64);

impl LoadProbe for FixedLoad {
    fn measure(&mut self) -> i64 {
        self.0
    }
}
