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
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use anycall_shutdown::{Shutdown, ShutdownSignal};
use bytes::Bytes;
use futures::future;
use log::*;
use once_cell::sync::OnceCell;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
    time::MissedTickBehavior,
};

use super::{
    codec::{JsonCodec, ValueCodec},
    error::RpcError,
    function::{CallArgs, FunctionId, FunctionRegistry, RpcFunction},
    handle::PendingCall,
    message::{CallId, FailureKind, RpcFailure, RpcMessage, Value},
    stub::RpcStub,
    url::FunctionUrl,
};
use crate::{
    connection_pool::{ConnectionPool, InboundPacket, PoolConfig, PoolHandle},
    packet::PacketError,
    peer::PeerId,
    transports::Transport,
};

const LOG_TARGET: &str = "anycall::rpc";

/// The single packet type all RPC traffic is carried under.
pub(crate) const RPC_TYPE: &str = "RPC";

const REQUEST_BUFFER_SIZE: usize = 128;

/// Configuration of the RPC layer.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Every `ping_interval` the system probes, for each call it has in
    /// flight, whether the remote still tracks that call.
    pub ping_interval: Duration,
    /// A ping unanswered for this long fails the watched call with
    /// [`RpcError::LostPeer`].
    pub ping_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5 * 60),
            ping_timeout: Duration::from_secs(60),
        }
    }
}

/// Builder for an [`RpcSystem`].
pub struct RpcSystemBuilder {
    config: RpcConfig,
    pool_config: PoolConfig,
    codec: Arc<dyn ValueCodec>,
    shutdown_signal: Option<ShutdownSignal>,
}

impl Default for RpcSystemBuilder {
    fn default() -> Self {
        Self {
            config: RpcConfig::default(),
            pool_config: PoolConfig::default(),
            codec: Arc::new(JsonCodec),
            shutdown_signal: None,
        }
    }
}

impl RpcSystemBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_listen_address<T: Into<String>>(mut self, addr: T) -> Self {
        self.pool_config.listen_address = Some(addr.into());
        self
    }

    /// Override the peer id derived from the listen address. Required for
    /// client-only nodes (no listen address).
    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.pool_config.peer_id = Some(peer_id);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Tie the system's lifetime to an external shutdown signal. Without
    /// this, the system owns its own [`Shutdown`] and triggers it when it is
    /// closed or dropped.
    pub fn with_shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    pub fn build<TTransport: Transport>(
        self,
        transport: TTransport,
    ) -> Result<RpcSystem<TTransport>, PacketError> {
        let own_peer_id = OnceCell::new();
        if let Some(peer_id) = &self.pool_config.peer_id {
            // With an explicit peer id, urls can be built before open
            let _ = own_peer_id.set(peer_id.clone());
        }
        let mut pool = ConnectionPool::new(self.pool_config, transport);
        pool.register_type(RPC_TYPE)?;
        Ok(RpcSystem {
            shared: Arc::new(Shared {
                config: self.config,
                codec: self.codec,
                functions: RwLock::new(FunctionRegistry::default()),
                own_peer_id,
            }),
            pool: Some(pool),
            request_tx: None,
            shutdown: None,
            shutdown_signal: self.shutdown_signal,
        })
    }
}

struct Shared {
    config: RpcConfig,
    codec: Arc<dyn ValueCodec>,
    functions: RwLock<FunctionRegistry>,
    own_peer_id: OnceCell<PeerId>,
}

/// A process's RPC runtime.
///
/// Local callables registered through [`get_function_url`](Self::get_function_url)
/// become invocable by any peer holding their url;
/// [`create_function_stub`](Self::create_function_stub) is the other
/// direction. [`open`](Self::open) starts the connection pool, the message
/// dispatch actor and the ping loop.
pub struct RpcSystem<TTransport> {
    shared: Arc<Shared>,
    pool: Option<ConnectionPool<TTransport>>,
    request_tx: Option<mpsc::Sender<RpcRequest>>,
    shutdown: Option<Shutdown>,
    shutdown_signal: Option<ShutdownSignal>,
}

impl<TTransport> RpcSystem<TTransport>
where TTransport: Transport
{
    /// Open the underlying connection pool and start dispatching. Not
    /// idempotent; a system opens once.
    pub async fn open(&mut self) -> Result<(), RpcError> {
        if self.request_tx.is_some() {
            return Err(RpcError::AlreadyOpen);
        }
        let pool = self.pool.take().ok_or(RpcError::AlreadyOpen)?;

        let shutdown_signal = match &self.shutdown_signal {
            Some(signal) => signal.clone(),
            None => {
                let shutdown = Shutdown::new();
                let signal = shutdown.to_signal();
                self.shutdown = Some(shutdown);
                signal
            },
        };

        let (pool_handle, inbound_rx) = pool.open(shutdown_signal.clone()).await?;
        let _ = self.shared.own_peer_id.set(pool_handle.own_peer_id().clone());

        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
        self.request_tx = Some(request_tx.clone());

        let actor = RpcSystemActor {
            shared: Arc::clone(&self.shared),
            pool: pool_handle,
            request_tx,
            request_rx,
            inbound_rx: Some(inbound_rx),
            local_to_remote: HashMap::new(),
            remote_to_local: HashMap::new(),
            ping_iteration: None,
            shutdown_signal,
        };
        tokio::spawn(actor.run());
        Ok(())
    }

    /// Stop the ping loop, fail every pending outbound call with
    /// [`RpcError::Shutdown`], cancel every running local invocation and
    /// close the pool.
    pub async fn close(&mut self) -> Result<(), RpcError> {
        let request_tx = self.request_tx.take().ok_or(RpcError::NotOpen)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        if request_tx
            .send(RpcRequest::Close { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
        if let Some(mut shutdown) = self.shutdown.take() {
            shutdown.trigger();
        }
        Ok(())
    }

    /// This process's own peer id. Available once the system is open, or
    /// immediately if an explicit peer id was configured.
    pub fn own_peer_id(&self) -> Option<&PeerId> {
        self.shared.own_peer_id.get()
    }

    /// Register `function` (idempotently) and return the url under which
    /// remote peers can invoke it.
    pub fn get_function_url(&self, function: &RpcFunction) -> Result<FunctionUrl, RpcError> {
        let peer = self
            .shared
            .own_peer_id
            .get()
            .cloned()
            .ok_or(RpcError::NotOpen)?;
        let id = self
            .shared
            .functions
            .write()
            .expect("function registry lock poisoned")
            .get_or_assign(function);
        Ok(FunctionUrl::new(peer, id))
    }

    /// Build an invocable stub for a remote function url.
    pub fn create_function_stub(&self, url: &str) -> Result<RpcStub, RpcError> {
        let url: FunctionUrl = url.parse()?;
        let request_tx = self.request_tx.clone().ok_or(RpcError::NotOpen)?;
        Ok(RpcStub::new(url.peer().clone(), url.function_id(), request_tx))
    }
}

pub(crate) enum RpcRequest {
    InvokeFunction {
        peer: PeerId,
        function_id: FunctionId,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        reply: oneshot::Sender<Result<PendingCall, RpcError>>,
    },
    CancelCall {
        peer: PeerId,
        call_id: CallId,
    },
    FailCall {
        peer: PeerId,
        call_id: CallId,
        error: RpcError,
    },
    CallCompleted {
        peer: PeerId,
        call_id: CallId,
        result: Result<Value, RpcFailure>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

type CallKey = (PeerId, CallId);

/// The dispatch actor. Exclusive owner of the two in-flight call tables:
///
/// - `local_to_remote`: calls this process initiated, holding the sender that
///   resolves the caller's [`PendingCall`].
/// - `remote_to_local`: calls this process is executing for a peer, holding
///   the sender that cancels the running invocation.
///
/// A `(peer, call_id)` key lives in at most one table and is removed exactly
/// once, whichever of response/cancel/timeout/shutdown gets there first.
struct RpcSystemActor {
    shared: Arc<Shared>,
    pool: PoolHandle,
    request_tx: mpsc::Sender<RpcRequest>,
    request_rx: mpsc::Receiver<RpcRequest>,
    inbound_rx: Option<mpsc::Receiver<InboundPacket>>,
    local_to_remote: HashMap<CallKey, oneshot::Sender<Result<Value, RpcError>>>,
    remote_to_local: HashMap<CallKey, oneshot::Sender<()>>,
    ping_iteration: Option<JoinHandle<()>>,
    shutdown_signal: ShutdownSignal,
}

impl RpcSystemActor {
    async fn run(mut self) {
        info!(
            target: LOG_TARGET,
            "rpc system started (peer id `{}`)", self.pool.own_peer_id()
        );

        let interval = self.shared.config.ping_interval;
        let mut ping_ticker = time::interval_at(
            Instant::now()
                .checked_add(interval)
                .expect("ping_interval causes overflow")
                .into(),
            interval,
        );
        ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(request) = self.request_rx.recv() => match request {
                    RpcRequest::Close { reply } => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    },
                    request => self.handle_request(request),
                },

                maybe_packet = Self::recv_inbound(&mut self.inbound_rx) => match maybe_packet {
                    Some(packet) => self.handle_inbound(packet),
                    None => {
                        debug!(target: LOG_TARGET, "pool inbound channel closed");
                        self.inbound_rx = None;
                    },
                },

                _ = ping_ticker.tick() => self.ping_tick(),

                _ = self.shutdown_signal.wait() => {
                    info!(
                        target: LOG_TARGET,
                        "rpc system is shutting down because it received the shutdown signal"
                    );
                    self.close().await;
                    break;
                },
            }
        }
    }

    async fn recv_inbound(rx: &mut Option<mpsc::Receiver<InboundPacket>>) -> Option<InboundPacket> {
        match rx {
            Some(rx) => rx.recv().await,
            None => future::pending().await,
        }
    }

    fn handle_request(&mut self, request: RpcRequest) {
        use RpcRequest::*;
        match request {
            InvokeFunction {
                peer,
                function_id,
                args,
                kwargs,
                reply,
            } => {
                let _ = reply.send(self.invoke_function(peer, function_id, args, kwargs));
            },
            CancelCall { peer, call_id } => self.cancel_local_call(peer, call_id),
            FailCall { peer, call_id, error } => self.fail_local_call(peer, call_id, error),
            CallCompleted { peer, call_id, result } => self.complete_remote_call(peer, call_id, result),
            Close { .. } => unreachable!("Close is handled by the run loop"),
        }
    }

    /// Start an outbound call. The table entry is created *before* the frame
    /// is handed to the pool, so a response racing the send always finds it.
    fn invoke_function(
        &mut self,
        peer: PeerId,
        function_id: FunctionId,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> Result<PendingCall, RpcError> {
        let call_id = CallId::random();
        let (result_tx, result_rx) = oneshot::channel();
        self.local_to_remote.insert((peer.clone(), call_id), result_tx);

        let message = RpcMessage::Call {
            call_id,
            function_id,
            args,
            kwargs,
        };
        let payload = match self.shared.codec.encode(&message) {
            Ok(payload) => payload,
            Err(err) => {
                self.local_to_remote.remove(&(peer.clone(), call_id));
                return Err(err.into());
            },
        };
        trace!(
            target: LOG_TARGET,
            "invoking function {} on `{}` as call {}", function_id, peer, call_id
        );
        self.spawn_send(peer.clone(), payload, Some(call_id));
        Ok(PendingCall::new(peer, call_id, self.request_tx.clone(), result_rx))
    }

    /// Write an encoded message to the pool without blocking the actor. A
    /// failed send fails the given call; failures of responses are logged
    /// and dropped.
    fn spawn_send(&self, peer: PeerId, payload: Bytes, fail_call: Option<CallId>) {
        let pool = self.pool.clone();
        let request_tx = self.request_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = pool.send(peer.clone(), RPC_TYPE, payload).await {
                match fail_call {
                    Some(call_id) => {
                        let _ = request_tx
                            .send(RpcRequest::FailCall {
                                peer,
                                call_id,
                                error: err.into(),
                            })
                            .await;
                    },
                    None => {
                        warn!(
                            target: LOG_TARGET,
                            "failed to send rpc message to `{}`: {}", peer, err
                        );
                    },
                }
            }
        });
    }

    fn send_reply(&self, peer: PeerId, message: RpcMessage) {
        match self.shared.codec.encode(&message) {
            Ok(payload) => self.spawn_send(peer, payload, None),
            Err(err) => error!(target: LOG_TARGET, "failed to encode rpc reply: {}", err),
        }
    }

    fn handle_inbound(&mut self, packet: InboundPacket) {
        if packet.type_name.as_str() != RPC_TYPE {
            warn!(
                target: LOG_TARGET,
                "ignoring unexpected packet type `{}` from `{}`", packet.type_name, packet.peer
            );
            return;
        }
        let message = match self.shared.codec.decode(&packet.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    "failed to decode rpc message from `{}`: {}", packet.peer, err
                );
                return;
            },
        };
        trace!(target: LOG_TARGET, "received from `{}`: {:?}", packet.peer, message);
        match message {
            RpcMessage::Call {
                call_id,
                function_id,
                args,
                kwargs,
            } => self.handle_call(packet.peer, call_id, function_id, args, kwargs),
            RpcMessage::CallReturn { call_id, retval } => {
                self.resolve_local_call(packet.peer, call_id, Ok(retval))
            },
            RpcMessage::CallFail { call_id, failure } => {
                self.resolve_local_call(packet.peer, call_id, Err(failure.into()))
            },
            RpcMessage::CallCancel { call_id } => self.cancel_remote_call(packet.peer, call_id),
        }
    }

    fn handle_call(
        &mut self,
        peer: PeerId,
        call_id: CallId,
        function_id: FunctionId,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) {
        // Liveness probes need the call table, so they are answered inline
        // rather than dispatched like user functions.
        if function_id == FunctionId::ping() {
            self.handle_ping(peer, call_id, args);
            return;
        }

        let function = self
            .shared
            .functions
            .read()
            .expect("function registry lock poisoned")
            .get(function_id);
        let function = match function {
            Some(function) => function,
            None => {
                debug!(
                    target: LOG_TARGET,
                    "call {} from `{}` references unknown function {}", call_id, peer, function_id
                );
                self.send_reply(peer, RpcMessage::CallFail {
                    call_id,
                    failure: RpcFailure::new(
                        FailureKind::UnknownFunction,
                        format!("no function registered under id {}", function_id),
                    ),
                });
                return;
            },
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.remote_to_local.insert((peer.clone(), call_id), cancel_tx);

        let request_tx = self.request_tx.clone();
        tokio::spawn(async move {
            let args = CallArgs::new(args, kwargs);
            tokio::select! {
                // Dropping the invocation future is the cancellation signal
                // to the callable
                _ = cancel_rx => {
                    debug!(target: LOG_TARGET, "invocation of call {} was cancelled", call_id);
                },
                result = function.call(args) => {
                    let _ = request_tx
                        .send(RpcRequest::CallCompleted { peer, call_id, result })
                        .await;
                },
            }
        });
    }

    /// A peer asks whether `(sender, probed_call_id)` is still being executed
    /// here. Succeeding keeps the caller's handle alive; failing makes it
    /// resolve with `UnknownCall`.
    fn handle_ping(&mut self, peer: PeerId, call_id: CallId, args: Vec<Value>) {
        let probed: Option<CallKey> = (|| {
            let sender = args.first()?.as_str()?;
            let probed_id = serde_json::from_value(args.get(1)?.clone()).ok()?;
            Some((PeerId::from(sender), probed_id))
        })();

        let message = match probed {
            Some(key) if self.remote_to_local.contains_key(&key) => RpcMessage::CallReturn {
                call_id,
                retval: Value::Null,
            },
            Some((sender, probed_id)) => {
                debug!(
                    target: LOG_TARGET,
                    "ping for unknown call {} from `{}`", probed_id, sender
                );
                RpcMessage::CallFail {
                    call_id,
                    failure: RpcFailure::new(
                        FailureKind::UnknownCall,
                        format!("no call {} from `{}` in progress", probed_id, sender),
                    ),
                }
            },
            None => RpcMessage::CallFail {
                call_id,
                failure: RpcFailure::new(FailureKind::UnknownCall, "malformed ping arguments"),
            },
        };
        self.send_reply(peer, message);
    }

    /// A response for a call we initiated.
    fn resolve_local_call(&mut self, peer: PeerId, call_id: CallId, result: Result<Value, RpcError>) {
        match self.local_to_remote.remove(&(peer.clone(), call_id)) {
            Some(result_tx) => {
                let _ = result_tx.send(result);
            },
            None => {
                // Protocol skew or a cancel/response race; never fatal
                warn!(
                    target: LOG_TARGET,
                    "received response for unknown call {} from `{}`", call_id, peer
                );
            },
        }
    }

    /// Local invocation finished; respond unless the peer cancelled first.
    fn complete_remote_call(&mut self, peer: PeerId, call_id: CallId, result: Result<Value, RpcFailure>) {
        if self.remote_to_local.remove(&(peer.clone(), call_id)).is_none() {
            // Cancelled; the peer no longer expects a response
            return;
        }
        let message = match result {
            Ok(retval) => RpcMessage::CallReturn { call_id, retval },
            Err(failure) => RpcMessage::CallFail { call_id, failure },
        };
        self.send_reply(peer, message);
    }

    /// Caller-side cancellation: resolve locally right away, tell the peer on
    /// a best-effort basis.
    fn cancel_local_call(&mut self, peer: PeerId, call_id: CallId) {
        if let Some(result_tx) = self.local_to_remote.remove(&(peer.clone(), call_id)) {
            let _ = result_tx.send(Err(RpcError::Cancelled));
            self.send_reply(peer, RpcMessage::CallCancel { call_id });
        }
    }

    /// Fail a call we initiated (failed send, failed or timed-out ping).
    /// Benign if the call has resolved in the meantime.
    fn fail_local_call(&mut self, peer: PeerId, call_id: CallId, error: RpcError) {
        if let Some(result_tx) = self.local_to_remote.remove(&(peer, call_id)) {
            let _ = result_tx.send(Err(error));
        }
    }

    /// `CallCancel` from the peer: stop the local invocation. Absence means
    /// the response was already dispatched and won the race.
    fn cancel_remote_call(&mut self, peer: PeerId, call_id: CallId) {
        match self.remote_to_local.remove(&(peer.clone(), call_id)) {
            Some(cancel_tx) => {
                let _ = cancel_tx.send(());
            },
            None => {
                trace!(
                    target: LOG_TARGET,
                    "cancel for call {} from `{}` arrived after the response", call_id, peer
                );
            },
        }
    }

    fn ping_tick(&mut self) {
        if self.local_to_remote.is_empty() {
            return;
        }
        if let Some(iteration) = &self.ping_iteration {
            // Iterations never overlap; a tick firing mid-iteration is dropped
            if !iteration.is_finished() {
                debug!(
                    target: LOG_TARGET,
                    "skipping ping tick, previous iteration still in flight"
                );
                return;
            }
        }

        let keys: Vec<CallKey> = self.local_to_remote.keys().cloned().collect();
        debug!(
            target: LOG_TARGET,
            "pinging peers for {} call(s) in flight", keys.len()
        );
        self.ping_iteration = Some(tokio::spawn(ping_iteration(
            self.pool.own_peer_id().clone(),
            keys,
            self.request_tx.clone(),
            self.shared.config.ping_timeout,
        )));
    }

    async fn close(&mut self) {
        debug!(target: LOG_TARGET, "rpc system closing");
        if let Some(iteration) = self.ping_iteration.take() {
            iteration.abort();
        }
        // Every call we initiated resolves with a shutdown error...
        for (_, result_tx) in self.local_to_remote.drain() {
            let _ = result_tx.send(Err(RpcError::Shutdown));
        }
        // ...and every invocation we run for a peer is cancelled.
        for (_, cancel_tx) in self.remote_to_local.drain() {
            let _ = cancel_tx.send(());
        }
        // Sessions block on the inbound channel if no one consumes it; drop
        // our end before waiting on the pool.
        self.inbound_rx = None;
        if let Err(err) = self.pool.close().await {
            warn!(
                target: LOG_TARGET,
                "error while closing the connection pool: {}", err
            );
        }
    }
}

/// One pass of the ping loop: probe every peer that owes us a result.
async fn ping_iteration(
    own_peer_id: PeerId,
    keys: Vec<CallKey>,
    request_tx: mpsc::Sender<RpcRequest>,
    ping_timeout: Duration,
) {
    let pings = keys.into_iter().map(|(peer, call_id)| {
        ping_one(
            own_peer_id.clone(),
            peer,
            call_id,
            request_tx.clone(),
            ping_timeout,
        )
    });
    future::join_all(pings).await;
}

/// Probe whether `peer` still tracks `call_id`; fail the watched call if not.
async fn ping_one(
    own_peer_id: PeerId,
    peer: PeerId,
    call_id: CallId,
    request_tx: mpsc::Sender<RpcRequest>,
    ping_timeout: Duration,
) {
    let args = vec![
        Value::String(own_peer_id.as_str().to_owned()),
        Value::String(call_id.to_string()),
    ];
    let (reply_tx, reply_rx) = oneshot::channel();
    let invoke = RpcRequest::InvokeFunction {
        peer: peer.clone(),
        function_id: FunctionId::ping(),
        args,
        kwargs: HashMap::new(),
        reply: reply_tx,
    };
    if request_tx.send(invoke).await.is_err() {
        return;
    }
    let pending = match reply_rx.await {
        Ok(Ok(pending)) => pending,
        Ok(Err(err)) => {
            debug!(
                target: LOG_TARGET,
                "could not start ping to `{}` for call {}: {}", peer, call_id, err
            );
            let _ = request_tx
                .send(RpcRequest::FailCall {
                    peer,
                    call_id,
                    error: RpcError::LostPeer,
                })
                .await;
            return;
        },
        Err(_) => return,
    };
    let ping_call_id = pending.call_id();

    match time::timeout(ping_timeout, pending).await {
        Ok(Ok(_)) => {
            trace!(target: LOG_TARGET, "pong from `{}` for call {}", peer, call_id);
        },
        Ok(Err(err)) => {
            debug!(
                target: LOG_TARGET,
                "ping to `{}` for call {} failed: {}", peer, call_id, err
            );
            let error = match err {
                RpcError::UnknownCall => RpcError::UnknownCall,
                _ => RpcError::LostPeer,
            };
            let _ = request_tx
                .send(RpcRequest::FailCall { peer, call_id, error })
                .await;
        },
        Err(_) => {
            debug!(
                target: LOG_TARGET,
                "ping to `{}` for call {} timed out", peer, call_id
            );
            // Reap the ping's own table entry first; the transport is presumed
            // broken, so no CallCancel is sent for either call.
            let _ = request_tx
                .send(RpcRequest::FailCall {
                    peer: peer.clone(),
                    call_id: ping_call_id,
                    error: RpcError::TimedOut,
                })
                .await;
            let _ = request_tx
                .send(RpcRequest::FailCall {
                    peer,
                    call_id,
                    error: RpcError::LostPeer,
                })
                .await;
        },
    }
}
