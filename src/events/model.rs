use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub ts: SystemTime,
    pub level: LogLevel,
    pub corr_id: Option<String>,
    pub session_id: String,
    pub component: &'static str,
    pub suppress_console: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub meta: EventMeta,
    pub action: String,
    pub addr: Option<String>,
    pub detail: Option<String>,
}

/// Change to this daemon's neighborhood: admission, redirect, eviction, timeout, orphaning.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyEvent {
    pub meta: EventMeta,
    pub action: String,
    pub peer: Option<String>,
    pub depth: Option<u32>,
    pub children: usize,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromotionEvent {
    pub meta: EventMeta,
    pub child: String,
    pub from: String,
    pub to: String,
    pub success: bool,
}

/// Dispatcher verdict for one application-level message.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerEvent {
    pub meta: EventMeta,
    pub protocol: u32,
    pub peer: Option<String>,
    pub verdict: String,
    pub epoch: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Network(NetworkEvent),
    Topology(TopologyEvent),
    Promotion(PromotionEvent),
    Handler(HandlerEvent),
    System(SystemEvent),
}

impl LogEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            LogEvent::Network(e) => &e.meta,
            LogEvent::Topology(e) => &e.meta,
            LogEvent::Promotion(e) => &e.meta,
            LogEvent::Handler(e) => &e.meta,
            LogEvent::System(e) => &e.meta,
        }
    }
}
