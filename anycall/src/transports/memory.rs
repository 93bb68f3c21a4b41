// Copyright 2024. The Anycall Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use once_cell::sync::Lazy;
use tokio::{
    io::DuplexStream,
    sync::mpsc,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::Transport;

/// In-memory transport for tests and single-process use.
///
/// Listeners live in a process-global registry keyed by a numeric port;
/// dialling hands one half of a `tokio::io::duplex` pair to the listener.
/// Addresses have the form `memory:<port>`; `memory:0` allocates a port.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport;

impl MemoryTransport {
    pub fn new() -> Self {
        Default::default()
    }
}

const BUFFER_SIZE: usize = 64 * 1024;

static LISTENERS: Lazy<Mutex<HashMap<u64, mpsc::UnboundedSender<DuplexStream>>>> =
    Lazy::new(Default::default);
static NEXT_PORT: AtomicU64 = AtomicU64::new(1);

fn parse_port(addr: &str) -> io::Result<u64> {
    addr.strip_prefix("memory:")
        .and_then(|port| port.parse().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid memory address `{}`", addr),
            )
        })
}

fn lock_listeners() -> io::Result<std::sync::MutexGuard<'static, HashMap<u64, mpsc::UnboundedSender<DuplexStream>>>> {
    LISTENERS
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory listener registry poisoned"))
}

#[async_trait]
impl Transport for MemoryTransport {
    type Listener = MemoryInbound;
    type Output = DuplexStream;

    async fn listen(&self, addr: &str) -> io::Result<(Self::Listener, String)> {
        let mut port = parse_port(addr)?;
        let mut listeners = lock_listeners()?;
        if port == 0 {
            port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
            while listeners.contains_key(&port) {
                port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
            }
        } else if listeners.contains_key(&port) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("memory port {} is already in use", port),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        listeners.insert(port, tx);
        let inbound = MemoryInbound {
            rx: UnboundedReceiverStream::new(rx),
            port,
        };
        Ok((inbound, format!("memory:{}", port)))
    }

    async fn dial(&self, addr: &str) -> io::Result<Self::Output> {
        let port = parse_port(addr)?;
        let tx = lock_listeners()?.get(&port).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("nothing is listening on memory port {}", port),
            )
        })?;

        let (local, remote) = tokio::io::duplex(BUFFER_SIZE);
        tx.send(remote).map_err(|_| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("memory listener on port {} has shut down", port),
            )
        })?;
        Ok(local)
    }
}

/// Inbound connection stream of a memory listener. Dropping it frees the
/// port.
pub struct MemoryInbound {
    rx: UnboundedReceiverStream<DuplexStream>,
    port: u64,
}

impl Stream for MemoryInbound {
    type Item = io::Result<DuplexStream>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx).map(|maybe| maybe.map(Ok))
    }
}

impl Drop for MemoryInbound {
    fn drop(&mut self) {
        if let Ok(mut listeners) = LISTENERS.lock() {
            listeners.remove(&self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn it_connects_a_dialer_to_a_listener() {
        let transport = MemoryTransport::new();
        let (mut listener, addr) = transport.listen("memory:0").await.unwrap();
        assert!(addr.starts_with("memory:"));

        let (dialled, accepted) =
            futures::future::join(transport.dial(&addr), listener.next()).await;
        let mut dialled = dialled.unwrap();
        let mut accepted = accepted.unwrap().unwrap();

        dialled.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn dialling_a_free_port_is_refused() {
        let err = MemoryTransport::new().dial("memory:999999").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn dropping_the_listener_frees_the_port() {
        let transport = MemoryTransport::new();
        let (listener, addr) = transport.listen("memory:0").await.unwrap();
        drop(listener);
        let err = transport.dial(&addr).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
