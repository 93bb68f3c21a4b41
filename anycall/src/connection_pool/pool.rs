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
    collections::{HashMap, HashSet},
    io,
    sync::Arc,
};

use anycall_shutdown::ShutdownSignal;
use bytes::Bytes;
use futures::{future, StreamExt};
use log::*;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time,
};

use super::{
    error::PoolError,
    session::{
        Session,
        SessionCommand,
        SessionContext,
        SessionDirection,
        SessionEvent,
        SessionId,
        HANDSHAKE_TYPE,
    },
    InboundPacket,
    PoolConfig,
    PoolEvent,
};
use crate::{
    packet::{PacketError, TypeName, TypeRegistry},
    peer::PeerId,
    transports::Transport,
};

const LOG_TARGET: &str = "anycall::pool";

const REQUEST_BUFFER_SIZE: usize = 128;
const SESSION_EVENT_BUFFER_SIZE: usize = 32;
const EVENT_BUFFER_SIZE: usize = 32;

/// An unopened connection pool: configuration, a transport and the set of
/// registered packet types. [`open`](Self::open) spawns the actor and hands
/// back a [`PoolHandle`] plus the inbound packet channel.
pub struct ConnectionPool<TTransport> {
    config: PoolConfig,
    transport: TTransport,
    registry: TypeRegistry,
}

impl<TTransport> ConnectionPool<TTransport>
where TTransport: Transport
{
    pub fn new(config: PoolConfig, transport: TTransport) -> Self {
        Self {
            config,
            transport,
            registry: TypeRegistry::new(),
        }
    }

    /// Register a packet type name so it can be sent and received. Fails on a
    /// tag collision with a previously registered name.
    pub fn register_type(&mut self, name: &str) -> Result<(), PacketError> {
        self.registry.register(name)?;
        Ok(())
    }

    /// Bind the listener (if one is configured), resolve this process's own
    /// peer id and spawn the pool actor.
    ///
    /// The returned receiver carries every packet received from any peer.
    /// Callers must drain it (or drop it) for sessions to make progress.
    pub async fn open(
        mut self,
        shutdown_signal: ShutdownSignal,
    ) -> Result<(PoolHandle, mpsc::Receiver<InboundPacket>), PoolError> {
        self.registry.register(HANDSHAKE_TYPE)?;

        let (listener, listen_address, own_peer_id) = match &self.config.listen_address {
            Some(addr) => {
                let (listener, resolved) = self.transport.listen(addr).await?;
                info!(target: LOG_TARGET, "listening on {}", resolved);
                let peer_id = self
                    .config
                    .peer_id
                    .clone()
                    .unwrap_or_else(|| PeerId::from(resolved.clone()));
                (Some(listener), Some(resolved), peer_id)
            },
            None => {
                let peer_id = self.config.peer_id.clone().ok_or(PoolError::PeerIdRequired)?;
                (None, None, peer_id)
            },
        };

        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
        let (session_event_tx, session_event_rx) = mpsc::channel(SESSION_EVENT_BUFFER_SIZE);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_buffer_size);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        let handle = PoolHandle {
            own_peer_id: own_peer_id.clone(),
            listen_address,
            request_tx,
            event_tx: event_tx.clone(),
        };

        let actor = ConnectionPoolActor {
            config: self.config,
            transport: Arc::new(self.transport),
            registry: Arc::new(self.registry),
            own_peer_id,
            listener,
            request_rx,
            session_event_tx,
            session_event_rx,
            inbound_tx,
            event_tx,
            pending_sessions: HashMap::new(),
            live: HashMap::new(),
            pending_dials: HashMap::new(),
            shutdown_signal,
        };
        tokio::spawn(actor.run());

        Ok((handle, inbound_rx))
    }
}

pub(crate) enum PoolRequest {
    SendPacket {
        peer: PeerId,
        type_name: TypeName,
        payload: Bytes,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Request handle for an open [`ConnectionPool`]. Cheap to clone.
#[derive(Clone)]
pub struct PoolHandle {
    own_peer_id: PeerId,
    listen_address: Option<String>,
    request_tx: mpsc::Sender<PoolRequest>,
    event_tx: broadcast::Sender<PoolEvent>,
}

impl PoolHandle {
    pub fn own_peer_id(&self) -> &PeerId {
        &self.own_peer_id
    }

    /// The resolved listen address, if this pool accepts inbound sessions.
    pub fn listen_address(&self) -> Option<&str> {
        self.listen_address.as_deref()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// Send a packet to a peer, connecting on demand. Resolves once a live
    /// session has written the frame to its transport.
    #[tracing::instrument(level = "trace", skip(self, payload), fields(own = %self.own_peer_id))]
    pub async fn send(&self, peer: PeerId, type_name: &str, payload: Bytes) -> Result<(), PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(PoolRequest::SendPacket {
                peer,
                type_name: type_name.into(),
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PoolError::Shutdown)?;
        reply_rx.await.map_err(|_| PoolError::SessionClosed)?
    }

    /// Stop accepting, close every live session and wait until each has
    /// confirmed the close. Safe to call once; later calls are no-ops.
    pub async fn close(&self) -> Result<(), PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .request_tx
            .send(PoolRequest::Close { reply: reply_tx })
            .await
            .is_err()
        {
            // Already closed
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }
}

struct PendingSend {
    type_name: TypeName,
    payload: Bytes,
    reply: oneshot::Sender<Result<(), PoolError>>,
}

struct LiveSession {
    id: SessionId,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
}

/// The pool actor. Owns the listener, the per-peer session lists and the
/// sends queued behind in-flight dials. Every spawned session, live or still
/// in its handshake, is tracked so close can reach all of them.
struct ConnectionPoolActor<TTransport: Transport> {
    config: PoolConfig,
    transport: Arc<TTransport>,
    registry: Arc<TypeRegistry>,
    own_peer_id: PeerId,
    listener: Option<TTransport::Listener>,
    request_rx: mpsc::Receiver<PoolRequest>,
    session_event_tx: mpsc::Sender<SessionEvent>,
    session_event_rx: mpsc::Receiver<SessionEvent>,
    inbound_tx: mpsc::Sender<InboundPacket>,
    event_tx: broadcast::Sender<PoolEvent>,
    // Sessions that have not completed their handshake yet
    pending_sessions: HashMap<SessionId, mpsc::UnboundedSender<SessionCommand>>,
    live: HashMap<PeerId, Vec<LiveSession>>,
    pending_dials: HashMap<PeerId, Vec<PendingSend>>,
    shutdown_signal: ShutdownSignal,
}

impl<TTransport> ConnectionPoolActor<TTransport>
where TTransport: Transport
{
    async fn run(mut self) {
        info!(
            target: LOG_TARGET,
            "connection pool started (peer id `{}`)", self.own_peer_id
        );

        loop {
            tokio::select! {
                maybe_request = self.request_rx.recv() => match maybe_request {
                    Some(PoolRequest::SendPacket { peer, type_name, payload, reply }) => {
                        self.dispatch_send(peer, PendingSend { type_name, payload, reply });
                    },
                    Some(PoolRequest::Close { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                        break;
                    },
                    None => {
                        debug!(target: LOG_TARGET, "all pool handles dropped, closing");
                        self.close().await;
                        break;
                    },
                },

                maybe_socket = Self::accept(&mut self.listener) => match maybe_socket {
                    Some(Ok(socket)) => {
                        let id = Session::spawn(
                            socket,
                            SessionDirection::Inbound,
                            None,
                            self.session_context(),
                        );
                        trace!(target: LOG_TARGET, "accepted inbound session {}", id);
                    },
                    Some(Err(err)) => {
                        warn!(target: LOG_TARGET, "inbound accept failed: {}", err);
                    },
                    None => {
                        debug!(target: LOG_TARGET, "listener stream ended");
                        self.listener = None;
                    },
                },

                Some(event) = self.session_event_rx.recv() => {
                    self.handle_session_event(event);
                },

                _ = self.shutdown_signal.wait() => {
                    info!(
                        target: LOG_TARGET,
                        "connection pool is shutting down because it received the shutdown signal"
                    );
                    self.close().await;
                    break;
                },
            }
        }
    }

    async fn accept(
        listener: &mut Option<TTransport::Listener>,
    ) -> Option<io::Result<TTransport::Output>> {
        match listener {
            Some(listener) => listener.next().await,
            None => future::pending().await,
        }
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            own_peer_id: self.own_peer_id.clone(),
            registry: Arc::clone(&self.registry),
            event_tx: self.session_event_tx.clone(),
            inbound_tx: self.inbound_tx.clone(),
            handshake_timeout: self.config.handshake_timeout,
            max_frame_size: self.config.max_frame_size,
        }
    }

    fn dispatch_send(&mut self, peer: PeerId, send: PendingSend) {
        if let Err(send) = self.forward_to_live(&peer, send) {
            // No live session: queue the send and dial unless a dial for this
            // peer is already in flight.
            let first = !self.pending_dials.contains_key(&peer);
            self.pending_dials.entry(peer.clone()).or_default().push(send);
            if first {
                self.spawn_dial(peer);
            }
        }
    }

    /// Hand a send to the first live session of `peer`. Stale session handles
    /// discovered along the way are unregistered.
    fn forward_to_live(&mut self, peer: &PeerId, mut send: PendingSend) -> Result<(), PendingSend> {
        loop {
            let stale_id = {
                let sessions = match self.live.get_mut(peer) {
                    Some(sessions) if !sessions.is_empty() => sessions,
                    _ => return Err(send),
                };
                let command = SessionCommand::SendPacket {
                    type_name: send.type_name,
                    payload: send.payload,
                    reply: send.reply,
                };
                match sessions[0].command_tx.send(command) {
                    Ok(()) => return Ok(()),
                    Err(mpsc::error::SendError(command)) => {
                        match command {
                            SessionCommand::SendPacket { type_name, payload, reply } => {
                                send = PendingSend { type_name, payload, reply };
                            },
                            _ => unreachable!("send returns the command that was passed in"),
                        }
                        sessions[0].id
                    },
                }
            };
            self.remove_live_session(peer, stale_id);
        }
    }

    fn remove_live_session(&mut self, peer: &PeerId, id: SessionId) {
        if let Some(sessions) = self.live.get_mut(peer) {
            sessions.retain(|session| session.id != id);
            if sessions.is_empty() {
                self.live.remove(peer);
                debug!(target: LOG_TARGET, "no live sessions left for peer `{}`", peer);
                let _ = self.event_tx.send(PoolEvent::PeerDisconnected(peer.clone()));
            }
        }
    }

    fn spawn_dial(&self, peer: PeerId) {
        let transport = Arc::clone(&self.transport);
        let ctx = self.session_context();
        let dial_timeout = self.config.dial_timeout;
        tokio::spawn(async move {
            debug!(target: LOG_TARGET, "dialing peer `{}`", peer);
            match time::timeout(dial_timeout, transport.dial(peer.as_str())).await {
                Ok(Ok(socket)) => {
                    Session::spawn(socket, SessionDirection::Outbound, Some(peer), ctx);
                },
                Ok(Err(err)) => {
                    let message = err.to_string();
                    let _ = ctx
                        .event_tx
                        .send(SessionEvent::DialFailed { peer, message })
                        .await;
                },
                Err(_) => {
                    let message = "dial timed out".to_string();
                    let _ = ctx
                        .event_tx
                        .send(SessionEvent::DialFailed { peer, message })
                        .await;
                },
            }
        });
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        use SessionEvent::*;
        match event {
            Spawned { id, command_tx } => {
                trace!(target: LOG_TARGET, "session {} spawned", id);
                self.pending_sessions.insert(id, command_tx);
            },
            HandshakeComplete { id, peer, ack } => {
                // Spawned always precedes this event on the session's channel
                let command_tx = match self.pending_sessions.remove(&id) {
                    Some(command_tx) => command_tx,
                    None => {
                        error!(
                            target: LOG_TARGET,
                            "handshake-complete for untracked session {}", id
                        );
                        return;
                    },
                };
                debug!(target: LOG_TARGET, "session {} to peer `{}` is live", id, peer);
                let is_first = self.live.get(&peer).map(Vec::is_empty).unwrap_or(true);
                self.live
                    .entry(peer.clone())
                    .or_default()
                    .push(LiveSession { id, command_tx });
                if is_first {
                    let _ = self.event_tx.send(PoolEvent::PeerConnected(peer.clone()));
                }
                let _ = ack.send(());
                // Flush sends that were waiting for this peer
                if let Some(pending) = self.pending_dials.remove(&peer) {
                    for send in pending {
                        if let Err(send) = self.forward_to_live(&peer, send) {
                            let _ = send.reply.send(Err(PoolError::SessionClosed));
                        }
                    }
                }
            },
            HandshakeFailed { id, expected_peer, message } => {
                self.pending_sessions.remove(&id);
                match expected_peer {
                    Some(peer) => {
                        warn!(
                            target: LOG_TARGET,
                            "handshake with peer `{}` failed: {}", peer, message
                        );
                        self.fail_pending_sends(&peer, &message);
                    },
                    None => {
                        warn!(target: LOG_TARGET, "handshake on inbound session failed: {}", message);
                    },
                }
            },
            DialFailed { peer, message } => {
                warn!(target: LOG_TARGET, "failed to dial peer `{}`: {}", peer, message);
                self.fail_pending_sends(&peer, &message);
            },
            Closed { id, peer } => {
                debug!(target: LOG_TARGET, "session {} to peer `{}` closed", id, peer);
                self.remove_live_session(&peer, id);
            },
        }
    }

    fn fail_pending_sends(&mut self, peer: &PeerId, message: &str) {
        if let Some(pending) = self.pending_dials.remove(peer) {
            for send in pending {
                let _ = send.reply.send(Err(PoolError::ConnectFailed {
                    peer: peer.clone(),
                    message: message.to_owned(),
                }));
            }
        }
    }

    async fn close(&mut self) {
        info!(target: LOG_TARGET, "connection pool closing");
        // Stop accepting new inbound sessions
        self.listener = None;
        // No queued send can ever be flushed now
        for (_, pending) in self.pending_dials.drain() {
            for send in pending {
                let _ = send.reply.send(Err(PoolError::Shutdown));
            }
        }

        // Ask every session, live or still shaking hands, to close, then wait
        // until each one has observed its close.
        let mut waiting: HashSet<SessionId> = HashSet::new();
        for (id, command_tx) in &self.pending_sessions {
            if command_tx.send(SessionCommand::Close).is_ok() {
                waiting.insert(*id);
            }
        }
        for sessions in self.live.values() {
            for session in sessions {
                if session.command_tx.send(SessionCommand::Close).is_ok() {
                    waiting.insert(session.id);
                }
            }
        }
        while !waiting.is_empty() {
            match self.session_event_rx.recv().await {
                Some(SessionEvent::Spawned { id, command_tx }) => {
                    // A dial completed while closing; shut the new session
                    // down and wait for it as well
                    if command_tx.send(SessionCommand::Close).is_ok() {
                        waiting.insert(id);
                    }
                    self.pending_sessions.insert(id, command_tx);
                },
                Some(SessionEvent::Closed { id, peer }) => {
                    self.remove_live_session(&peer, id);
                    waiting.remove(&id);
                },
                Some(SessionEvent::HandshakeComplete { id, peer, ack }) => {
                    // Raced the close; dropping the ack makes the session shut
                    // itself down, so just wait for its close event
                    debug!(
                        target: LOG_TARGET,
                        "session {} to `{}` went live during close", id, peer
                    );
                    self.pending_sessions.remove(&id);
                    drop(ack);
                    waiting.insert(id);
                },
                Some(SessionEvent::HandshakeFailed { id, .. }) => {
                    self.pending_sessions.remove(&id);
                    waiting.remove(&id);
                },
                Some(SessionEvent::DialFailed { .. }) => {},
                None => break,
            }
        }
        self.pending_sessions.clear();
        debug!(target: LOG_TARGET, "connection pool closed");
    }
}
