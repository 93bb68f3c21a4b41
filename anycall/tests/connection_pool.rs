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

use std::time::Duration;

use anycall::{
    connection_pool::{ConnectionPool, InboundPacket, PoolConfig, PoolError, PoolEvent, PoolHandle},
    transports::{MemoryTransport, Transport},
    PeerId,
};
use anycall_shutdown::Shutdown;
use anycall_test_utils::{async_assert_eventually, collect_recv};
use bytes::Bytes;
use futures::StreamExt;
use tokio::{sync::mpsc, time};

const TEST_TYPE: &str = "test-packet";

async fn open_pool(
    config: PoolConfig,
    shutdown: &Shutdown,
) -> (PoolHandle, mpsc::Receiver<InboundPacket>) {
    let mut pool = ConnectionPool::new(config, MemoryTransport::new());
    pool.register_type(TEST_TYPE).unwrap();
    pool.open(shutdown.to_signal()).await.unwrap()
}

fn listening_config() -> PoolConfig {
    PoolConfig {
        listen_address: Some("memory:0".to_string()),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn send_connects_lazily_and_delivers() {
    // env_logger::init(); // Set `RUST_LOG=trace`
    let shutdown = Shutdown::new();
    let (pool_a, mut inbound_a) = open_pool(listening_config(), &shutdown).await;
    let (pool_b, _inbound_b) = open_pool(listening_config(), &shutdown).await;

    let mut events_a = pool_a.subscribe_events();

    pool_b
        .send(pool_a.own_peer_id().clone(), TEST_TYPE, Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let packets = collect_recv!(inbound_a, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(packets[0].peer, *pool_b.own_peer_id());
    assert_eq!(packets[0].type_name.as_str(), TEST_TYPE);
    assert_eq!(&packets[0].payload[..], b"hello");

    let events = collect_recv!(events_a, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(events[0], PoolEvent::PeerConnected(pool_b.own_peer_id().clone()));
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_reuse_the_session_and_preserve_order() {
    let shutdown = Shutdown::new();
    let (pool_a, mut inbound_a) = open_pool(listening_config(), &shutdown).await;
    let (pool_b, _inbound_b) = open_pool(listening_config(), &shutdown).await;

    let mut events_a = pool_a.subscribe_events();

    for i in 0..5u8 {
        pool_b
            .send(pool_a.own_peer_id().clone(), TEST_TYPE, Bytes::from(vec![i]))
            .await
            .unwrap();
    }

    let packets = collect_recv!(inbound_a, take = 5, timeout = Duration::from_secs(5));
    let payloads: Vec<u8> = packets.iter().map(|p| p.payload[0]).collect();
    assert_eq!(payloads, vec![0, 1, 2, 3, 4]);

    // One session, one connect event
    let events = collect_recv!(events_a, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(events[0], PoolEvent::PeerConnected(pool_b.own_peer_id().clone()));
    assert!(events_a.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn replies_flow_over_the_inbound_session() {
    let shutdown = Shutdown::new();
    let (pool_a, mut inbound_a) = open_pool(listening_config(), &shutdown).await;

    // B cannot be dialled: no listener, explicit peer id
    let (pool_b, mut inbound_b) = open_pool(
        PoolConfig {
            peer_id: Some(PeerId::from("client-1")),
            ..Default::default()
        },
        &shutdown,
    )
    .await;

    pool_b
        .send(pool_a.own_peer_id().clone(), TEST_TYPE, Bytes::from_static(b"request"))
        .await
        .unwrap();
    let packets = collect_recv!(inbound_a, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(packets[0].peer, PeerId::from("client-1"));

    // A replies to B over the session B opened
    pool_a
        .send(PeerId::from("client-1"), TEST_TYPE, Bytes::from_static(b"response"))
        .await
        .unwrap();
    let packets = collect_recv!(inbound_b, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(packets[0].peer, *pool_a.own_peer_id());
    assert_eq!(&packets[0].payload[..], b"response");
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_identity_mismatch_fails_the_send() {
    let shutdown = Shutdown::new();

    // A claims an identity that differs from its dial address
    let (pool_a, _inbound_a) = open_pool(
        PoolConfig {
            listen_address: Some("memory:0".to_string()),
            peer_id: Some(PeerId::from("impostor")),
            ..Default::default()
        },
        &shutdown,
    )
    .await;
    let (pool_b, _inbound_b) = open_pool(listening_config(), &shutdown).await;

    // B dials A's real address, so it expects the peer to identify itself by
    // that address; the handshake declares `impostor` instead.
    let listen_addr = pool_a.listen_address().unwrap().to_owned();
    let err = pool_b
        .send(PeerId::from(listen_addr), TEST_TYPE, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::ConnectFailed { .. }), "got {:?}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_peers_cannot_be_reached() {
    let shutdown = Shutdown::new();
    let (pool, _inbound) = open_pool(listening_config(), &shutdown).await;

    let err = pool
        .send(PeerId::from("memory:999999"), TEST_TYPE, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::ConnectFailed { .. }), "got {:?}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_shuts_down_sessions_and_rejects_sends() {
    let shutdown = Shutdown::new();
    let (pool_a, mut inbound_a) = open_pool(listening_config(), &shutdown).await;
    let (pool_b, inbound_b) = open_pool(listening_config(), &shutdown).await;

    pool_b
        .send(pool_a.own_peer_id().clone(), TEST_TYPE, Bytes::from_static(b"hello"))
        .await
        .unwrap();
    let _ = collect_recv!(inbound_a, take = 1, timeout = Duration::from_secs(5));

    let mut events_a = pool_a.subscribe_events();

    // Sessions must not sit on a clogged inbound channel during close
    drop(inbound_b);
    time::timeout(Duration::from_secs(5), pool_b.close())
        .await
        .unwrap()
        .unwrap();

    // A observes the loss of its last session to B
    let events = collect_recv!(events_a, take = 1, timeout = Duration::from_secs(5));
    assert_eq!(events[0], PoolEvent::PeerDisconnected(pool_b.own_peer_id().clone()));

    // B's handles now refuse to send
    let err = pool_b
        .send(pool_a.own_peer_id().clone(), TEST_TYPE, Bytes::from_static(b"late"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, PoolError::Shutdown | PoolError::SessionClosed),
        "got {:?}",
        err
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn close_terminates_pre_handshake_sessions() {
    let shutdown = Shutdown::new();
    let (pool, inbound) = open_pool(listening_config(), &shutdown).await;
    drop(inbound);

    // A bare endpoint that accepts the stream but never handshakes
    let transport = MemoryTransport::new();
    let (mut listener, addr) = transport.listen("memory:0").await.unwrap();
    let peer = PeerId::from(addr);

    let send_pool = pool.clone();
    let send_peer = peer.clone();
    let send_task = tokio::spawn(async move {
        send_pool
            .send(send_peer, TEST_TYPE, Bytes::from_static(b"x"))
            .await
    });

    // The dial succeeds, leaving a session stuck waiting for a handshake
    // that will never come
    let accepted = time::timeout(Duration::from_secs(5), listener.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    time::sleep(Duration::from_millis(100)).await;

    // Close must command the pre-handshake session to stop rather than sit
    // out the handshake timeout
    time::timeout(Duration::from_secs(2), pool.close())
        .await
        .unwrap()
        .unwrap();
    drop(accepted);

    let err = send_task.await.unwrap().unwrap_err();
    assert!(
        matches!(err, PoolError::Shutdown | PoolError::ConnectFailed { .. }),
        "got {:?}",
        err
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_signal_closes_the_pool() {
    let mut shutdown = Shutdown::new();
    let (pool_a, inbound_a) = open_pool(listening_config(), &shutdown).await;
    drop(inbound_a);

    shutdown.trigger();

    // Once the actor has wound down, sends are rejected outright
    async_assert_eventually!(
        matches!(
            pool_a
                .send(PeerId::from("memory:999999"), TEST_TYPE, Bytes::from_static(b"x"))
                .await,
            Err(PoolError::Shutdown)
        ),
        expect = true,
        max_attempts = 20,
        interval = Duration::from_millis(100)
    );
}
