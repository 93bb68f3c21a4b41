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

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::function::FunctionId;

/// Dynamic value passed to and returned from remote functions.
pub type Value = serde_json::Value;

/// Process-unique identifier of an outbound call. Together with the remote
/// peer id, `(PeerId, CallId)` is the global key of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub(crate) fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The four message kinds of the RPC wire protocol, carried as the payload of
/// the single `RPC` packet type and encoded by the pluggable value codec.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RpcMessage {
    Call {
        call_id: CallId,
        function_id: FunctionId,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    },
    CallReturn {
        call_id: CallId,
        retval: Value,
    },
    CallFail {
        call_id: CallId,
        failure: RpcFailure,
    },
    CallCancel {
        call_id: CallId,
    },
}

/// A raised error, reified so it can cross the wire. The receiving side
/// reconstructs a locally raisable [`RpcError`](super::RpcError) from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RpcFailure {
    pub fn new<T: Into<String>>(kind: FailureKind, message: T) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A failure of a user-defined kind, for errors raised by callables.
    pub fn remote<K: Into<String>, T: Into<String>>(kind: K, message: T) -> Self {
        Self::new(FailureKind::Remote(kind.into()), message)
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RpcFailure {}

/// Fixed set of failure kinds understood by every peer, plus the open
/// `Remote` kind carrying the original error's tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownFunction,
    UnknownCall,
    Cancelled,
    Timeout,
    LostPeer,
    Remote(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnknownFunction => write!(f, "UnknownFunction"),
            FailureKind::UnknownCall => write!(f, "UnknownCall"),
            FailureKind::Cancelled => write!(f, "Cancelled"),
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::LostPeer => write!(f, "LostPeer"),
            FailureKind::Remote(kind) => write!(f, "{}", kind),
        }
    }
}
