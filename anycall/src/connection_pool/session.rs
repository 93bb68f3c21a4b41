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
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::*;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    time,
};
use tokio_util::codec::Framed;

use super::{error::SessionError, InboundPacket, PoolError};
use crate::{
    packet::{Packet, PacketCodec, TypeName, TypeRegistry},
    peer::PeerId,
};

const LOG_TARGET: &str = "anycall::pool::session";

/// Reserved packet type carrying the sender's own peer id.
pub(super) const HANDSHAKE_TYPE: &str = "__pool_handshake";

pub(super) type SessionId = usize;

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SessionDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for SessionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionDirection::Inbound => write!(f, "inbound"),
            SessionDirection::Outbound => write!(f, "outbound"),
        }
    }
}

#[derive(Debug)]
pub(super) enum SessionCommand {
    SendPacket {
        type_name: TypeName,
        payload: Bytes,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Close,
}

#[derive(Debug)]
pub(super) enum SessionEvent {
    /// A session task has started. `command_tx` is how the pool reaches it
    /// from now on. Always the first event a session emits, so the pool
    /// knows every session (pre-handshake included) it may have to close.
    Spawned {
        id: SessionId,
        command_tx: mpsc::UnboundedSender<SessionCommand>,
    },
    /// The handshake completed; the session may be used for routing. The
    /// session forwards no inbound packets until `ack` fires, so a consumer
    /// can never observe a packet from a peer the pool does not know yet.
    HandshakeComplete {
        id: SessionId,
        peer: PeerId,
        ack: oneshot::Sender<()>,
    },
    /// The session died before completing the handshake; it was never used
    /// for routing.
    HandshakeFailed {
        id: SessionId,
        expected_peer: Option<PeerId>,
        message: String,
    },
    /// A live session closed.
    Closed { id: SessionId, peer: PeerId },
    /// An outbound connect could not be established at all.
    DialFailed { peer: PeerId, message: String },
}

/// Everything a session needs from the pool that spawned it.
#[derive(Clone)]
pub(super) struct SessionContext {
    pub own_peer_id: PeerId,
    pub registry: Arc<TypeRegistry>,
    pub event_tx: mpsc::Sender<SessionEvent>,
    pub inbound_tx: mpsc::Sender<InboundPacket>,
    pub handshake_timeout: Duration,
    pub max_frame_size: usize,
}

/// A single stream to a peer.
///
/// The task sends its own peer id the moment the stream opens, then waits for
/// the peer's handshake. Until that arrives the session is not registered
/// anywhere; any other packet, a mismatched identity, or a timeout kills it.
/// Once live it pumps commands from the pool onto the stream and decoded
/// frames into the pool's inbound channel.
pub(super) struct Session<TSocket> {
    id: SessionId,
    direction: SessionDirection,
    expected_peer: Option<PeerId>,
    framed: Framed<TSocket, PacketCodec>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ctx: SessionContext,
}

impl<TSocket> Session<TSocket>
where TSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static
{
    pub fn spawn(
        socket: TSocket,
        direction: SessionDirection,
        expected_peer: Option<PeerId>,
        ctx: SessionContext,
    ) -> SessionId {
        let id = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let codec = PacketCodec::new(Arc::clone(&ctx.registry)).with_max_frame_size(ctx.max_frame_size);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let session = Session {
            id,
            direction,
            expected_peer,
            framed: Framed::new(socket, codec),
            command_tx,
            command_rx,
            ctx,
        };
        tokio::spawn(session.run());
        id
    }

    async fn run(mut self) {
        let spawned = SessionEvent::Spawned {
            id: self.id,
            command_tx: self.command_tx.clone(),
        };
        if self.ctx.event_tx.send(spawned).await.is_err() {
            // Pool is gone before we even started
            return;
        }

        match self.perform_handshake().await {
            Ok(peer) => {
                debug!(
                    target: LOG_TARGET,
                    "[{}] handshake complete, peer is `{}`", self, peer
                );
                let (ack_tx, ack_rx) = oneshot::channel();
                let event = SessionEvent::HandshakeComplete {
                    id: self.id,
                    peer: peer.clone(),
                    ack: ack_tx,
                };
                if self.ctx.event_tx.send(event).await.is_err() {
                    // Pool is gone; nothing to route for
                    return;
                }
                // Only pump packets once the pool has registered us
                if ack_rx.await.is_ok() {
                    self.run_live(&peer).await;
                }
                let _ = self
                    .ctx
                    .event_tx
                    .send(SessionEvent::Closed { id: self.id, peer })
                    .await;
            },
            Err(err) => {
                warn!(target: LOG_TARGET, "[{}] handshake failed: {}", self, err);
                let _ = self
                    .ctx
                    .event_tx
                    .send(SessionEvent::HandshakeFailed {
                        id: self.id,
                        expected_peer: self.expected_peer.clone(),
                        message: err.to_string(),
                    })
                    .await;
            },
        }
    }

    async fn perform_handshake(&mut self) -> Result<PeerId, SessionError> {
        let handshake = Packet::new(
            HANDSHAKE_TYPE,
            Bytes::copy_from_slice(self.ctx.own_peer_id.as_str().as_bytes()),
        );
        self.framed.send(handshake).await?;

        let timeout = self.ctx.handshake_timeout;
        time::timeout(timeout, self.read_handshake())
            .await
            .map_err(|_| SessionError::HandshakeTimeout)?
    }

    async fn read_handshake(&mut self) -> Result<PeerId, SessionError> {
        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => match maybe_command {
                    Some(SessionCommand::SendPacket { reply, .. }) => {
                        // The pool only routes sends to live sessions
                        let _ = reply.send(Err(PoolError::SessionClosed));
                    },
                    Some(SessionCommand::Close) | None => return Err(SessionError::Closed),
                },

                maybe_frame = self.framed.next() => return match maybe_frame {
                    Some(Ok(packet)) if packet.type_name.as_str() == HANDSHAKE_TYPE => {
                        let peer = std::str::from_utf8(&packet.payload).map_err(SessionError::InvalidHandshake)?;
                        let peer = PeerId::from(peer);
                        match &self.expected_peer {
                            Some(expected) if *expected != peer => Err(SessionError::UnexpectedPeerId {
                                expected: expected.clone(),
                                actual: peer,
                            }),
                            _ => Ok(peer),
                        }
                    },
                    Some(Ok(packet)) => Err(SessionError::PacketBeforeHandshake {
                        type_name: packet.type_name,
                    }),
                    Some(Err(err)) => Err(err.into()),
                    None => Err(SessionError::StreamClosed),
                },
            }
        }
    }

    async fn run_live(&mut self, peer: &PeerId) {
        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => match maybe_command {
                    Some(SessionCommand::SendPacket { type_name, payload, reply }) => {
                        let result = self.framed.send(Packet { type_name, payload }).await;
                        if let Err(err) = &result {
                            warn!(
                                target: LOG_TARGET,
                                "[{}] failed to write packet to `{}`: {}", self, peer, err
                            );
                        }
                        let failed = result.is_err();
                        let _ = reply.send(result.map_err(PoolError::from));
                        if failed {
                            break;
                        }
                    },
                    Some(SessionCommand::Close) | None => {
                        let _ = self.framed.close().await;
                        break;
                    },
                },

                maybe_frame = self.framed.next() => match maybe_frame {
                    Some(Ok(packet)) => {
                        if packet.type_name.as_str() == HANDSHAKE_TYPE {
                            // A second handshake means the peer's state machine
                            // has gone wrong; fail the session.
                            warn!(
                                target: LOG_TARGET,
                                "[{}] duplicate handshake from `{}`, closing session", self, peer
                            );
                            break;
                        }
                        let inbound = InboundPacket {
                            peer: peer.clone(),
                            type_name: packet.type_name,
                            payload: packet.payload,
                        };
                        if self.ctx.inbound_tx.send(inbound).await.is_err() {
                            // No one is consuming inbound packets anymore
                            break;
                        }
                    },
                    Some(Err(err)) => {
                        warn!(
                            target: LOG_TARGET,
                            "[{}] fatal protocol error on session to `{}`: {}", self, peer, err
                        );
                        break;
                    },
                    None => {
                        debug!(target: LOG_TARGET, "[{}] peer `{}` closed the stream", self, peer);
                        break;
                    },
                },
            }
        }
    }
}

impl<TSocket> fmt::Display for Session<TSocket> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session(id={}, direction={})", self.id, self.direction)
    }
}
