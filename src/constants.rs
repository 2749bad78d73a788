//! Central place for application-wide constants and default values.

/// Default application name used in logs and the ctl banner.
pub const DEFAULT_APP_NAME: &str = "NICE";

/// Left padding used to align log lines with those that include emoji prefixes.
pub const ICON_PLACEHOLDER: &str = "   "; // Three spaces for alignment

/// Version string every joining daemon must present verbatim (bump when wire format changes)
pub const PROTOCOL_VERSION: &str = "nice/3";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default daemon listening port.
pub const DEFAULT_PORT: u16 = 4400;
/// Default application dispatcher port.
pub const DEFAULT_API_PORT: u16 = 4401;

/// Hard upper bound on the branching factor; the configured value is clamped to this.
pub const MAX_CHILDREN: usize = 32;
/// Default branching factor when the config does not set one.
pub const DEFAULT_MAX_CHILDREN: usize = 4;

/// Redirect hops a registering daemon follows before falling back to the root.
pub const MAX_REDIRECTS: usize = 16;

/// Longest accepted wire line (bytes, excluding the terminator).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Default seconds between load exchanges with children.
pub const DEFAULT_EXCHANGE_SECS: u64 = 30;
/// Default seconds between benchmark runs.
pub const DEFAULT_MEASURE_SECS: u64 = 60;
/// Children silent for this many exchange periods are dropped.
pub const DEFAULT_CHILD_DROP_FACTOR: f64 = 2.5;
/// A parent silent for this many exchange periods orphans us.
pub const DEFAULT_PARENT_DROP_FACTOR: f64 = 4.5;
/// Bound on the connect / authenticate step.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 8;
/// Bound on completing one request/reply exchange.
pub const DEFAULT_PROTOCOL_TIMEOUT_SECS: u64 = 120;
/// Bound on one application transfer.
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 600;
/// Seconds between registration attempts while orphaned.
pub const DEFAULT_ORPHAN_RETRY_SECS: u64 = 10;

/// Deferred signals an application node will hold before refusing new messages.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 256;

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!("v{} (protocol={})", APP_VERSION, PROTOCOL_VERSION)
}
