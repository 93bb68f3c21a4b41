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

//! # Connection Pool
//!
//! Multiplexes all traffic to a peer over pooled stream connections and makes
//! the peer id the addressable unit: [`PoolHandle::send`] delivers a packet to
//! a peer, opening a connection on demand, and inbound packets arrive tagged
//! with the peer that sent them.
//!
//! Every session starts with an identity handshake in which each side
//! declares its own [`PeerId`](crate::peer::PeerId) under the reserved
//! `__pool_handshake` packet type. Only sessions that completed the handshake
//! are used for routing. Both sides dialling each other at the same time is
//! fine; the redundant sessions coexist and drain naturally.

mod error;
mod pool;
mod session;

use std::time::Duration;

use bytes::Bytes;

use crate::{
    packet::{TypeName, DEFAULT_MAX_FRAME_SIZE},
    peer::PeerId,
};

pub use error::{PoolError, SessionError};
pub use pool::{ConnectionPool, PoolHandle};

/// Configuration for a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Address the listener binds to. `None` disables accepting inbound
    /// sessions (a client-only node).
    pub listen_address: Option<String>,
    /// This process's own peer id. When `None` it is derived from the
    /// resolved listen address, which is the canonical choice for TCP.
    pub peer_id: Option<PeerId>,
    /// How long a new session may take to complete the identity handshake.
    pub handshake_timeout: Duration,
    /// How long an outbound connect may take.
    pub dial_timeout: Duration,
    /// Upper bound on a single frame's payload.
    pub max_frame_size: usize,
    /// Buffer size of the inbound packet channel handed out by
    /// [`ConnectionPool::open`].
    pub inbound_buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            peer_id: None,
            handshake_timeout: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inbound_buffer_size: 100,
        }
    }
}

/// A packet received from a peer.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub peer: PeerId,
    pub type_name: TypeName,
    pub payload: Bytes,
}

/// Connectivity events published by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The first live session to this peer was established.
    PeerConnected(PeerId),
    /// The last live session to this peer was lost.
    PeerDisconnected(PeerId),
}
