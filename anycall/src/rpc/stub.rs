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
    fmt,
    hash::{Hash, Hasher},
};

use tokio::sync::{mpsc, oneshot};

use super::{
    error::RpcError,
    function::FunctionId,
    handle::PendingCall,
    message::Value,
    system::RpcRequest,
    url::FunctionUrl,
};
use crate::peer::PeerId;

/// An invocable reference to a function exposed by a remote peer, built from
/// its url. Stubs compare equal when they point at the same remote function.
#[derive(Clone)]
pub struct RpcStub {
    peer: PeerId,
    function_id: FunctionId,
    request_tx: mpsc::Sender<RpcRequest>,
}

impl RpcStub {
    pub(crate) fn new(peer: PeerId, function_id: FunctionId, request_tx: mpsc::Sender<RpcRequest>) -> Self {
        Self {
            peer,
            function_id,
            request_tx,
        }
    }

    pub fn url(&self) -> FunctionUrl {
        FunctionUrl::new(self.peer.clone(), self.function_id)
    }

    /// Start a remote call and return its completion handle.
    #[tracing::instrument(level = "trace", skip(self, args, kwargs), fields(peer = %self.peer))]
    pub async fn invoke(
        &self,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> Result<PendingCall, RpcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(RpcRequest::InvokeFunction {
                peer: self.peer.clone(),
                function_id: self.function_id,
                args,
                kwargs,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RpcError::Shutdown)?;
        reply_rx.await.map_err(|_| RpcError::Shutdown)?
    }

    /// Invoke and wait for the result.
    pub async fn call(&self, args: Vec<Value>, kwargs: HashMap<String, Value>) -> Result<Value, RpcError> {
        self.invoke(args, kwargs).await?.await
    }
}

impl fmt::Debug for RpcStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcStub({})", self.url())
    }
}

impl PartialEq for RpcStub {
    fn eq(&self, other: &Self) -> bool {
        self.peer == other.peer && self.function_id == other.function_id
    }
}

impl Eq for RpcStub {}

impl Hash for RpcStub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.peer.hash(state);
        self.function_id.hash(state);
    }
}
