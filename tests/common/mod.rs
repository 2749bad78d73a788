#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use nice::config::Settings;
use nice::daemon::{Daemon, DaemonHandle};
use nice::error::Result;
use nice::network::{StatusReport, Timeouts};
use tokio::task::JoinHandle;

/// Loopback-friendly settings with periodic work pushed far out, so tests
/// drive exchanges and elections by hand.
pub fn quiet(mut s: Settings) -> Settings {
    s.allow_loopback = true;
    s.fixed_load = Some(10);
    s.timing.exchange = Duration::from_secs(3600);
    s.timing.measure = Duration::from_secs(3600);
    s.timing.child_drop = Duration::from_secs(3 * 3600);
    s.timing.parent_drop = Duration::from_secs(5 * 3600);
    s.timing.orphan_retry = Duration::from_secs(1);
    s.timing.timeouts = fast_timeouts();
    s
}

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(2),
        protocol: Duration::from_secs(5),
        transfer: Duration::from_secs(5),
    }
}

pub fn root(max_children: usize) -> Settings {
    let mut s = quiet(Settings::root());
    s.max_children = max_children;
    s
}

pub fn child(parent: SocketAddr, max_children: usize) -> Settings {
    let mut s = quiet(Settings::child_of(parent));
    s.max_children = max_children;
    s
}

pub async fn start(settings: Settings) -> (DaemonHandle, JoinHandle<Result<()>>) {
    Daemon::bind(settings).await.expect("bind").spawn()
}

const PATIENCE: Duration = Duration::from_secs(10);

/// Poll the daemon's status until `pred` holds; returns the matching report.
pub async fn wait_for(h: &DaemonHandle, what: &str, pred: impl Fn(&StatusReport) -> bool) -> StatusReport {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    loop {
        let report = status(h).await;
        if pred(&report) {
            return report;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}: last status {:?}", what, report);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Poll a plain condition until it holds.
pub async fn until(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

pub async fn status(h: &DaemonHandle) -> StatusReport {
    h.status().await.expect("daemon running")
}

pub fn child_addrs(report: &StatusReport) -> Vec<SocketAddr> {
    report.children.iter().filter_map(|c| c.addr).collect()
}

pub fn parent_addr(report: &StatusReport) -> Option<SocketAddr> {
    report.parent.as_ref().and_then(|p| p.addr)
}
