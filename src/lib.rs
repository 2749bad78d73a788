//! # NICE
//!
//! Overlay daemon that lets idle machines organize themselves into a rooted
//! load-balancing tree, keep it balanced as load and availability change,
//! and recover from peers that go quiet.
//!
//! ## Key Modules
//! * `topology` – Per-daemon neighborhood table and the best/worst-match comparator.
//! * `timer` – Many logical timers driven by one sleeping task.
//! * `network` – One-exchange-per-connection framing and the daemon wire messages.
//! * `daemon` – Registration, admission, load exchange, promotion and recovery.
//! * `api` – Epoch-sequenced dispatcher for application processes in the tree.
//! * `host` – Load benchmark and transfer hand-off.
//! * `config` – TOML config with command-line overrides, validated into `Settings`.
//! * `events` – Structured logging/events dispatcher.

pub mod api;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod error;
pub mod events;
pub mod host;
pub mod network;
pub mod prelude; // curated re-exports
pub mod timer;
pub mod topology;

pub use error::{NiceError, Result};
