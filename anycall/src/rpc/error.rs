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

use super::{
    codec::CodecError,
    message::{FailureKind, RpcFailure},
    url::UrlError,
};
use crate::connection_pool::PoolError;

/// Errors surfaced to callers of the RPC layer. The first six kinds mirror
/// the wire-level [`FailureKind`]s; the rest are local.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("the call references an unregistered function")]
    UnknownFunction,
    #[error("the peer does not know about this call")]
    UnknownCall,
    #[error("the call was cancelled")]
    Cancelled,
    #[error("timed out waiting for the peer")]
    TimedOut,
    #[error("lost communication with the peer during the call")]
    LostPeer,
    #[error("remote call failed ({kind}): {message}")]
    Remote { kind: String, message: String },
    #[error("the rpc system has been shut down")]
    Shutdown,
    #[error("the rpc system is not open")]
    NotOpen,
    #[error("the rpc system is already open")]
    AlreadyOpen,
    #[error("malformed function url: {0}")]
    MalformedUrl(#[from] UrlError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<RpcFailure> for RpcError {
    fn from(failure: RpcFailure) -> Self {
        match failure.kind {
            FailureKind::UnknownFunction => RpcError::UnknownFunction,
            FailureKind::UnknownCall => RpcError::UnknownCall,
            FailureKind::Cancelled => RpcError::Cancelled,
            FailureKind::Timeout => RpcError::TimedOut,
            FailureKind::LostPeer => RpcError::LostPeer,
            FailureKind::Remote(kind) => RpcError::Remote {
                kind,
                message: failure.message,
            },
        }
    }
}
