// src/topology/matching.rs
// Multi-criteria best/worst match among candidate peers.

use super::peer::PeerInfo;
use super::window::SchedWindow;
use rand::Rng;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    High,
    Low,
}

impl Prefer {
    fn order<T: Ord>(self, a: T, b: T) -> Ordering {
        match self {
            Prefer::High => a.cmp(&b),
            Prefer::Low => b.cmp(&a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPrefs {
    pub exclude_barrier: bool,
    pub overlap: Prefer,
    /// `Low` favors shallow candidates.
    pub depth: Prefer,
    pub load: Prefer,
}

impl MatchPrefs {
    /// Where should a newcomer live: big overlap, close to a vacancy, idle. Never inside a barrier.
    pub const BEST_HOME: MatchPrefs = MatchPrefs {
        exclude_barrier: true,
        overlap: Prefer::High,
        depth: Prefer::Low,
        load: Prefer::Low,
    };

    /// Same ordering as [`BEST_HOME`](Self::BEST_HOME) but barrier peers compete too.
    pub const BEST: MatchPrefs = MatchPrefs {
        exclude_barrier: false,
        overlap: Prefer::High,
        depth: Prefer::Low,
        load: Prefer::Low,
    };

    /// Which child fits us least: small overlap, deep, busy.
    pub const WORST: MatchPrefs = MatchPrefs {
        exclude_barrier: false,
        overlap: Prefer::Low,
        depth: Prefer::High,
        load: Prefer::High,
    };
}

/// The point candidates are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub window: SchedWindow,
    pub depth: u32,
    pub load: i64,
}

impl Target {
    pub fn of(peer: &PeerInfo) -> Self {
        Self {
            window: peer.window,
            depth: peer.depth,
            load: peer.load,
        }
    }
}

/// Compare two candidates for `target`; `Greater` means `a` is preferred.
pub fn compare(target: &Target, a: &PeerInfo, b: &PeerInfo, prefs: MatchPrefs) -> Ordering {
    let oa = a.window.overlap(&target.window);
    let ob = b.window.overlap(&target.window);
    prefs
        .overlap
        .order(oa, ob)
        .then_with(|| prefs.depth.order(a.depth, b.depth))
        .then_with(|| prefs.load.order(a.load, b.load))
}

/// True when `a` is strictly better than `b` as a home for / companion of `target`.
pub fn strictly_better(target: &Target, a: &PeerInfo, b: &PeerInfo) -> bool {
    compare(target, a, b, MatchPrefs::BEST) == Ordering::Greater
}

/// Index (into `candidates`) of the preferred candidate, or `None` if none qualify.
pub fn best_match<R: Rng + ?Sized>(
    target: &Target,
    candidates: &[PeerInfo],
    prefs: MatchPrefs,
    rng: &mut R,
) -> Option<usize> {
    best_match_where(target, candidates, prefs, rng, |_| true)
}

/// Like [`best_match`] but only considers candidates accepted by `keep`.
pub fn best_match_where<R, F>(
    target: &Target,
    candidates: &[PeerInfo],
    prefs: MatchPrefs,
    rng: &mut R,
    keep: F,
) -> Option<usize>
where
    R: Rng + ?Sized,
    F: Fn(&PeerInfo) -> bool,
{
    let mut best: Option<usize> = None;
    let mut ties = 0u32;
    for (i, cand) in candidates.iter().enumerate() {
        if prefs.exclude_barrier && cand.barrier {
            continue;
        }
        if !keep(cand) {
            continue;
        }
        match best {
            None => {
                best = Some(i);
                ties = 1;
            }
            Some(b) => match compare(target, cand, &candidates[b], prefs) {
                Ordering::Greater => {
                    best = Some(i);
                    ties = 1;
                }
                Ordering::Equal => {
                    ties += 1;
                    if rng.gen_range(0..ties) == 0 {
                        best = Some(i);
                    }
                }
                Ordering::Less => {}
            },
        }
    }
    best
}
