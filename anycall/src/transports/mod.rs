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

//! Stream transports.
//!
//! A [`Transport`] produces listening and dialling byte-stream endpoints from
//! string addresses. Peer ids double as dial addresses, so the address format
//! is transport-specific (`host:port` for TCP, `memory:<port>` in-memory).

mod memory;
mod tcp;

use std::io;

use async_trait::async_trait;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};

pub use memory::{MemoryInbound, MemoryTransport};
pub use tcp::{TcpInbound, TcpTransport};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The stream produced by dialling or accepting.
    type Output: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    /// Stream of inbound connections produced by [`listen`](Self::listen).
    type Listener: Stream<Item = io::Result<Self::Output>> + Send + Unpin + 'static;

    /// Bind a listening endpoint. Returns the listener and the resolved
    /// address (port 0 is replaced by the actual port).
    async fn listen(&self, addr: &str) -> io::Result<(Self::Listener, String)>;

    /// Open an outbound stream to a peer's listening endpoint.
    async fn dial(&self, addr: &str) -> io::Result<Self::Output>;
}
