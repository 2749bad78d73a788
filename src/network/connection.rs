// src/network/connection.rs
//
// One exchange per TCP connection: JSON lines for control frames, raw
// fixed-size word records for bulk data. Every read and write is bounded.

use crate::constants::MAX_LINE_BYTES;
use crate::error::{NiceError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// True on hosts that store words most-significant byte first.
pub const NATIVE_BIG_ENDIAN: bool = cfg!(target_endian = "big");

/// Whether words from a peer with the given byte order must be swapped here.
pub fn needs_swap(peer_big_endian: bool) -> bool {
    peer_big_endian != NATIVE_BIG_ENDIAN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connect and first (authenticating) frame.
    pub connect: Duration,
    /// Remaining frames of one request/reply exchange.
    pub protocol: Duration,
    /// Bulk word records.
    pub transfer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            protocol: Duration::from_secs(DEFAULT_PROTOCOL_TIMEOUT_SECS),
            transfer: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

async fn bounded<F, T>(limit: Duration, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(NiceError::from),
        Err(_) => Err(NiceError::Timeout { what }),
    }
}

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    local: SocketAddr,
    timeouts: Timeouts,
}

impl Connection {
    pub async fn connect(addr: SocketAddr, timeouts: Timeouts) -> Result<Self> {
        let stream = bounded(timeouts.connect, "connect", TcpStream::connect(addr)).await?;
        Self::from_stream(stream, timeouts)
    }

    pub fn from_stream(stream: TcpStream, timeouts: Timeouts) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        let _ = stream.set_nodelay(true);
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
            peer,
            local,
            timeouts,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Write one frame as a single JSON line.
    pub async fn send<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let mut line = serde_json::to_vec(msg).map_err(|source| NiceError::Frame {
            peer: self.peer,
            source,
        })?;
        line.push(b'\n');
        let writer = &mut self.writer;
        bounded(self.timeouts.protocol, "send", async move {
            writer.write_all(&line).await?;
            writer.flush().await
        })
        .await
    }

    /// Read the first frame of an exchange under the short connect bound.
    pub async fn recv_first<M: DeserializeOwned>(&mut self) -> Result<M> {
        let limit = self.timeouts.connect;
        self.recv_within(limit).await
    }

    /// Read the next frame under the protocol bound.
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        let limit = self.timeouts.protocol;
        self.recv_within(limit).await
    }

    async fn recv_within<M: DeserializeOwned>(&mut self, limit: Duration) -> Result<M> {
        let mut line = String::new();
        let peer = self.peer;
        let reader = &mut self.reader;
        let read = bounded(limit, "receive", async {
            let mut capped = reader.take(MAX_LINE_BYTES as u64 + 1);
            capped.read_line(&mut line).await
        })
        .await?;
        if read == 0 {
            return Err(NiceError::Closed { peer });
        }
        if read > MAX_LINE_BYTES && !line.ends_with('\n') {
            return Err(NiceError::Oversized {
                peer,
                limit: MAX_LINE_BYTES,
            });
        }
        let trimmed = line.trim_end_matches(['\n', '\r', '\0']);
        serde_json::from_str(trimmed).map_err(|source| NiceError::Frame { peer, source })
    }

    /// Write raw words in native byte order; the receiver swaps if needed.
    pub async fn send_words(&mut self, words: &[u32]) -> Result<()> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        let writer = &mut self.writer;
        bounded(self.timeouts.transfer, "send records", async move {
            writer.write_all(&bytes).await?;
            writer.flush().await
        })
        .await
    }

    /// Read exactly `count` words, swapping byte order when `swap` is set.
    pub async fn recv_words(&mut self, count: usize, swap: bool) -> Result<Vec<u32>> {
        let mut bytes = vec![0u8; count * 4];
        let peer = self.peer;
        let reader = &mut self.reader;
        let res = bounded(self.timeouts.transfer, "receive records", async {
            reader.read_exact(&mut bytes).await
        })
        .await;
        match res {
            Ok(_) => {}
            Err(NiceError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(NiceError::Closed { peer })
            }
            Err(e) => return Err(e),
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| {
                let w = u32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
                if swap {
                    w.swap_bytes()
                } else {
                    w
                }
            })
            .collect())
    }

    /// Half-close our side so the peer sees end-of-stream.
    pub async fn finish(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
