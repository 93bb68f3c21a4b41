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
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::{mpsc, oneshot};

use super::{
    error::RpcError,
    message::{CallId, Value},
    system::RpcRequest,
};
use crate::peer::PeerId;

/// A pending remote call: the caller-side completion handle.
///
/// Awaiting it yields the call's result. It resolves exactly once, by a
/// `CallReturn`/`CallFail` from the peer, by [`cancel`](Self::cancel), by the
/// ping loop deciding the peer is gone, or with
/// [`RpcError::Shutdown`] when the system closes. Dropping the handle does
/// not cancel the remote call.
#[derive(Debug)]
pub struct PendingCall {
    peer: PeerId,
    call_id: CallId,
    request_tx: mpsc::Sender<RpcRequest>,
    result_rx: oneshot::Receiver<Result<Value, RpcError>>,
}

impl PendingCall {
    pub(crate) fn new(
        peer: PeerId,
        call_id: CallId,
        request_tx: mpsc::Sender<RpcRequest>,
        result_rx: oneshot::Receiver<Result<Value, RpcError>>,
    ) -> Self {
        Self {
            peer,
            call_id,
            request_tx,
            result_rx,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Cancel the call: it resolves immediately with [`RpcError::Cancelled`]
    /// and a best-effort `CallCancel` is sent to the peer. If a response has
    /// already resolved the call this is a no-op.
    pub async fn cancel(&mut self) {
        let _ = self
            .request_tx
            .send(RpcRequest::CancelCall {
                peer: self.peer.clone(),
                call_id: self.call_id,
            })
            .await;
    }
}

impl Future for PendingCall {
    type Output = Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result_rx).poll(cx).map(|result| match result {
            Ok(result) => result,
            // The actor dropped the sender without resolving; it has shut down
            Err(_) => Err(RpcError::Shutdown),
        })
    }
}
