// src/network/listener.rs

use crate::error::{NiceError, Result};
use crate::events::model::LogLevel;
use crate::network::events::emit_network_event;
use tokio::net::TcpListener;

/// Bind the single accept socket a daemon or application node serves from.
pub async fn bind_listener(addr: &str, component: &'static str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| NiceError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local = listener.local_addr()?;
    emit_network_event(
        component,
        LogLevel::Info,
        "listener_bind",
        Some(local.to_string()),
        None,
        true,
    );
    Ok(listener)
}
