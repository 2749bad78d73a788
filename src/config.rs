use crate::constants::*;
use crate::error::NiceError;
use crate::network::Timeouts;
use crate::topology::SchedWindow;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Daemon listening port (0 picks an ephemeral port)
    pub port: Option<u16>,
    /// Interface to bind (default 0.0.0.0)
    pub bind: Option<String>,
    /// host:port of the daemon to register with. Required unless `is_root`.
    pub parent: Option<String>,
    /// host:port of the tree root. Defaults to `parent`.
    pub root: Option<String>,
    /// Run as the root of the tree
    pub is_root: Option<bool>,
    /// Branching factor (1..=MAX_CHILDREN, default DEFAULT_MAX_CHILDREN)
    pub max_children: Option<usize>,
    /// Local-time availability window "HH:MM-HH:MM" or "always"
    pub window: Option<String>,
    /// Segregate our descendants into a private sub-network
    pub barrier: Option<bool>,
    /// Scheduling priority the worker runs at (-20..=19)
    pub priority: Option<i32>,
    /// Lower the console level to debug
    pub debug: Option<bool>,
    /// Accept registrations from loopback addresses (tests, single-host setups)
    pub allow_loopback: Option<bool>,
    /// Report this load instead of running the benchmark
    pub fixed_load: Option<i64>,
    pub timing: Option<TimingConfig>,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TimingConfig {
    pub exchange_secs: Option<u64>,
    pub measure_secs: Option<u64>,
    pub child_drop_factor: Option<f64>,
    pub parent_drop_factor: Option<f64>,
    pub orphan_retry_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub protocol_timeout_secs: Option<u64>,
    pub transfer_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Path to JSON line event log (rotated). If unset, defaults to logs/nice_events.jsonl
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiConfig {
    /// Port application nodes on this host listen on
    pub port: Option<u16>,
    /// Deferred signals held before new messages are refused
    pub signal_capacity: Option<usize>,
}

/// Values supplied on the command line. Each one that is set wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub parent: Option<String>,
    pub root: Option<String>,
    pub is_root: Option<bool>,
    pub max_children: Option<usize>,
    pub window: Option<String>,
    pub barrier: Option<bool>,
    pub priority: Option<i32>,
    pub debug: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(self, cfg: &mut Config) {
        if let Some(p) = self.port {
            cfg.port = Some(p);
        }
        if let Some(p) = self.parent {
            cfg.parent = Some(p);
        }
        if let Some(r) = self.root {
            cfg.root = Some(r);
        }
        if let Some(r) = self.is_root {
            cfg.is_root = Some(r);
        }
        if let Some(m) = self.max_children {
            cfg.max_children = Some(m);
        }
        if let Some(w) = self.window {
            cfg.window = Some(w);
        }
        if let Some(b) = self.barrier {
            cfg.barrier = Some(b);
        }
        if let Some(p) = self.priority {
            cfg.priority = Some(p);
        }
        if let Some(d) = self.debug {
            cfg.debug = Some(d);
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("invalid config: {}", e))
    }

    /// Read a TOML config file. A missing file yields `Ok(None)`; a file that
    /// exists but does not parse is an error.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map(Some)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!("cannot read {}: {}", path.display(), e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub exchange: Duration,
    pub measure: Duration,
    pub child_drop: Duration,
    pub parent_drop: Duration,
    pub orphan_retry: Duration,
    pub timeouts: Timeouts,
}

impl Default for Timing {
    fn default() -> Self {
        let exchange = Duration::from_secs(DEFAULT_EXCHANGE_SECS);
        Self {
            exchange,
            measure: Duration::from_secs(DEFAULT_MEASURE_SECS),
            child_drop: exchange.mul_f64(DEFAULT_CHILD_DROP_FACTOR),
            parent_drop: exchange.mul_f64(DEFAULT_PARENT_DROP_FACTOR),
            orphan_retry: Duration::from_secs(DEFAULT_ORPHAN_RETRY_SECS),
            timeouts: Timeouts::default(),
        }
    }
}

/// Validated daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// "bind:port" to listen on
    pub listen: String,
    pub parent: Option<SocketAddr>,
    pub root: Option<SocketAddr>,
    pub is_root: bool,
    pub max_children: usize,
    pub window: SchedWindow,
    pub barrier: bool,
    pub priority: i32,
    pub debug: bool,
    pub allow_loopback: bool,
    pub fixed_load: Option<i64>,
    pub timing: Timing,
    /// "bind:port" application nodes on this host listen on
    pub api_listen: String,
    pub signal_capacity: usize,
}

fn resolve(what: &str, value: &str) -> Result<SocketAddr, NiceError> {
    value
        .to_socket_addrs()
        .map_err(|e| NiceError::Config(format!("{} '{}': {}", what, value, e)))?
        .next()
        .ok_or_else(|| NiceError::Config(format!("{} '{}' resolves to nothing", what, value)))
}

impl Settings {
    /// Settings for a root daemon on an ephemeral loopback port.
    pub fn root() -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            parent: None,
            root: None,
            is_root: true,
            max_children: DEFAULT_MAX_CHILDREN,
            window: SchedWindow::ALWAYS,
            barrier: false,
            priority: 0,
            debug: false,
            allow_loopback: false,
            fixed_load: None,
            timing: Timing::default(),
            api_listen: "127.0.0.1:0".into(),
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
        }
    }

    /// Settings for a daemon that registers with `parent` and treats it as root.
    pub fn child_of(parent: SocketAddr) -> Self {
        Self {
            parent: Some(parent),
            root: Some(parent),
            is_root: false,
            ..Self::root()
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, NiceError> {
        let is_root = cfg.is_root.unwrap_or(false);
        let max_children = cfg.max_children.unwrap_or(DEFAULT_MAX_CHILDREN);
        if !(1..=MAX_CHILDREN).contains(&max_children) {
            return Err(NiceError::Config(format!(
                "max_children {} outside 1..={}",
                max_children, MAX_CHILDREN
            )));
        }
        let window = match cfg.window.as_deref() {
            Some(w) => w
                .parse::<SchedWindow>()
                .map_err(|e| NiceError::Config(format!("window: {}", e)))?,
            None => SchedWindow::ALWAYS,
        };
        let priority = cfg.priority.unwrap_or(0);
        if !(-20..=19).contains(&priority) {
            return Err(NiceError::Config(format!(
                "priority {} outside -20..=19",
                priority
            )));
        }

        let parent = match cfg.parent.as_deref() {
            Some(p) => Some(resolve("parent", p)?),
            None => None,
        };
        if parent.is_none() && !is_root {
            return Err(NiceError::Config(
                "a parent is required unless is_root is set".into(),
            ));
        }
        let root = match cfg.root.as_deref() {
            Some(r) => Some(resolve("root", r)?),
            None => parent,
        };

        let t = cfg.timing.clone().unwrap_or_default();
        let child_factor = t.child_drop_factor.unwrap_or(DEFAULT_CHILD_DROP_FACTOR);
        let parent_factor = t.parent_drop_factor.unwrap_or(DEFAULT_PARENT_DROP_FACTOR);
        let exchange = Duration::from_secs(t.exchange_secs.unwrap_or(DEFAULT_EXCHANGE_SECS).max(1));
        let drop_after = |name: &str, factor: f64| -> Result<Duration, NiceError> {
            // NaN fails the comparison too.
            if !(factor > 1.0 && factor.is_finite()) {
                return Err(NiceError::Config(format!(
                    "{} must be a finite number greater than 1, got {}",
                    name, factor
                )));
            }
            Duration::try_from_secs_f64(exchange.as_secs_f64() * factor).map_err(|_| {
                NiceError::Config(format!("{} {} overflows the exchange period", name, factor))
            })
        };
        let child_drop = drop_after("child_drop_factor", child_factor)?;
        let parent_drop = drop_after("parent_drop_factor", parent_factor)?;
        let secs = |v: Option<u64>, d: u64| Duration::from_secs(v.unwrap_or(d).max(1));
        let timing = Timing {
            exchange,
            measure: secs(t.measure_secs, DEFAULT_MEASURE_SECS),
            child_drop,
            parent_drop,
            orphan_retry: secs(t.orphan_retry_secs, DEFAULT_ORPHAN_RETRY_SECS),
            timeouts: Timeouts {
                connect: secs(t.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS),
                protocol: secs(t.protocol_timeout_secs, DEFAULT_PROTOCOL_TIMEOUT_SECS),
                transfer: secs(t.transfer_timeout_secs, DEFAULT_TRANSFER_TIMEOUT_SECS),
            },
        };

        let api = cfg.api.clone().unwrap_or_default();
        let bind = cfg.bind.as_deref().unwrap_or("0.0.0.0");
        Ok(Self {
            listen: format!("{}:{}", bind, cfg.port.unwrap_or(DEFAULT_PORT)),
            parent,
            root,
            is_root,
            max_children,
            window,
            barrier: cfg.barrier.unwrap_or(false),
            priority,
            debug: cfg.debug.unwrap_or(false),
            allow_loopback: cfg.allow_loopback.unwrap_or(false),
            fixed_load: cfg.fixed_load,
            timing,
            api_listen: format!("{}:{}", bind, api.port.unwrap_or(DEFAULT_API_PORT)),
            signal_capacity: api.signal_capacity.unwrap_or(DEFAULT_SIGNAL_CAPACITY).max(1),
        })
    }
}
