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

//! # RPC layer
//!
//! Presents local callables as addressable, remotely invocable procedures.
//!
//! A process registers an [`RpcFunction`] and publishes the resulting
//! [`FunctionUrl`]; any peer can build an [`RpcStub`] from that url and
//! invoke it with positional and keyword arguments. Results, failures and
//! cancellations are routed back over the connection pool. A periodic ping
//! loop asserts, for every call in flight, that the remote still tracks it;
//! calls whose peer has vanished fail with [`RpcError::LostPeer`] instead of
//! hanging forever.

mod codec;
mod error;
mod function;
mod handle;
mod message;
mod stub;
mod system;
mod url;

pub use codec::{CodecError, JsonCodec, ValueCodec};
pub use error::RpcError;
pub use function::{CallArgs, FunctionId, RpcCallable, RpcFunction};
pub use handle::PendingCall;
pub use message::{CallId, FailureKind, RpcFailure, RpcMessage, Value};
pub use stub::RpcStub;
pub use system::{RpcConfig, RpcSystem, RpcSystemBuilder};
pub use url::{FunctionUrl, UrlError, URL_SCHEME};

use crate::{packet::PacketError, transports::TcpTransport};

/// Create a TCP based [`RpcSystem`] listening on the loopback interface.
/// Port 0 picks a free port; the system's peer id is derived from the
/// resolved address at [`open`](RpcSystem::open).
pub fn create_tcp_rpc_system(port: u16) -> Result<RpcSystem<TcpTransport>, PacketError> {
    RpcSystemBuilder::new()
        .with_listen_address(format!("127.0.0.1:{}", port))
        .build(TcpTransport::new())
}
