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

use thiserror::Error;

use crate::{
    packet::{PacketError, TypeName},
    peer::PeerId,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to connect to peer `{peer}`: {message}")]
    ConnectFailed { peer: PeerId, message: String },
    #[error("session closed before the packet could be written")]
    SessionClosed,
    #[error("the connection pool has been shut down")]
    Shutdown,
    #[error("a peer id must be configured when no listen address is set")]
    PeerIdRequired,
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a single session fails. Session failures are contained: the
/// offending session closes, the pool carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("received packet type `{type_name}` before the handshake")]
    PacketBeforeHandshake { type_name: TypeName },
    #[error("handshake payload is not valid utf-8")]
    InvalidHandshake(#[from] std::str::Utf8Error),
    #[error("peer identified as `{actual}` but `{expected}` was expected")]
    UnexpectedPeerId { expected: PeerId, actual: PeerId },
    #[error("timed out waiting for the peer's handshake")]
    HandshakeTimeout,
    #[error("stream closed before the handshake completed")]
    StreamClosed,
    #[error("session was closed while waiting for the handshake")]
    Closed,
    #[error(transparent)]
    Packet(#[from] PacketError),
}
