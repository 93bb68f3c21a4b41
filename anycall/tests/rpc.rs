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
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anycall::{
    rpc::{
        create_tcp_rpc_system,
        CallArgs,
        FunctionId,
        FunctionUrl,
        RpcError,
        RpcFailure,
        RpcFunction,
        RpcSystem,
        RpcSystemBuilder,
        Value,
    },
    transports::MemoryTransport,
    PeerId,
};
use serde_json::json;
use tokio::{
    sync::{mpsc, oneshot},
    time,
};

const FAST_PING_INTERVAL: Duration = Duration::from_secs(1);
const FAST_PING_TIMEOUT: Duration = Duration::from_millis(500);

async fn spawn_system() -> RpcSystem<MemoryTransport> {
    spawn_system_with_pings(FAST_PING_INTERVAL, FAST_PING_TIMEOUT).await
}

async fn spawn_system_with_pings(interval: Duration, timeout: Duration) -> RpcSystem<MemoryTransport> {
    let mut system = RpcSystemBuilder::new()
        .with_listen_address("memory:0")
        .with_ping_interval(interval)
        .with_ping_timeout(timeout)
        .build(MemoryTransport::new())
        .unwrap();
    system.open().await.unwrap();
    system
}

fn no_kwargs() -> HashMap<String, Value> {
    HashMap::new()
}

fn hello_world() -> RpcFunction {
    RpcFunction::new(|_args| async move { Ok(json!("Hello World!")) })
}

fn hello_entity() -> RpcFunction {
    RpcFunction::new(|args: CallArgs| async move {
        let entity = args
            .get(0, "entity")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::remote("TypeError", "missing argument `entity`"))?
            .to_owned();
        Ok(json!(format!("Hello {}!", entity)))
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn simple_call() {
    // env_logger::init(); // Set `RUST_LOG=trace`
    let rpc_a = spawn_system().await;
    let mut rpc_b = spawn_system().await;

    let myfunc = hello_world();
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let actual = stub.call(vec![], no_kwargs()).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));

    rpc_b.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn simple_call_over_tcp() {
    let mut rpc_a = create_tcp_rpc_system(0).unwrap();
    let mut rpc_b = create_tcp_rpc_system(0).unwrap();
    rpc_a.open().await.unwrap();
    rpc_b.open().await.unwrap();

    let myfunc = hello_world();
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let actual = stub.call(vec![], no_kwargs()).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));

    rpc_a.close().await.unwrap();
    rpc_b.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn positional_args() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let myfunc = hello_entity();
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let actual = stub.call(vec![json!("World")], no_kwargs()).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));
}

#[tokio::test(flavor = "multi_thread")]
async fn keyword_args() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let myfunc = hello_entity();
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let kwargs = [("entity".to_string(), json!("World"))].into_iter().collect();
    let actual = stub.call(vec![], kwargs).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));
}

#[tokio::test(flavor = "multi_thread")]
async fn deferred_completion() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let (resolve_tx, resolve_rx) = oneshot::channel::<String>();
    let resolve_rx = Arc::new(Mutex::new(Some(resolve_rx)));
    let myfunc = RpcFunction::new(move |_args| {
        let resolve_rx = resolve_rx.lock().unwrap().take();
        async move {
            match resolve_rx {
                Some(rx) => {
                    let value = rx.await.map_err(|_| RpcFailure::remote("RuntimeError", "resolver dropped"))?;
                    Ok(json!(value))
                },
                None => Err(RpcFailure::remote("RuntimeError", "invoked twice")),
            }
        }
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let pending = stub.invoke(vec![], no_kwargs()).await.unwrap();
    resolve_tx.send("Hello World!".to_string()).unwrap();
    let actual = pending.await.unwrap();
    assert_eq!(actual, json!("Hello World!"));
}

#[tokio::test(flavor = "multi_thread")]
async fn caller_cancellation_reaches_the_callee() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    // The callable never resolves. `started` fires when the invocation is
    // running on A; dropping the guard signals that it was cancelled.
    let (started_tx, mut started_rx) = mpsc::unbounded_channel::<()>();
    let (cancelled_tx, cancelled_rx) = oneshot::channel::<()>();
    let cancelled_tx = Arc::new(Mutex::new(Some(cancelled_tx)));

    struct CancelGuard(Option<oneshot::Sender<()>>);
    impl Drop for CancelGuard {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    let myfunc = RpcFunction::new(move |_args| {
        let _ = started_tx.send(());
        let guard = CancelGuard(cancelled_tx.lock().unwrap().take());
        async move {
            let _guard = guard;
            futures::future::pending::<()>().await;
            unreachable!()
        }
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let mut pending = stub.invoke(vec![], no_kwargs()).await.unwrap();

    // Wait until the call is actually running remotely, otherwise we would
    // only cancel the connection attempt
    time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .unwrap()
        .unwrap();

    pending.cancel().await;
    let result = pending.await;
    assert!(matches!(result, Err(RpcError::Cancelled)), "got {:?}", result);

    // A's local invocation observes the cancellation
    time::timeout(Duration::from_secs(5), cancelled_rx)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pings_do_not_fail_a_slow_call() {
    // Ping interval 1s, timeout 0.5s, call takes 2s: several ping exchanges
    // happen while the callable runs and none of them may kill the call.
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let myfunc = RpcFunction::new(|_args| async move {
        time::sleep(Duration::from_secs(2)).await;
        Ok(json!("Hello World!"))
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let started = Instant::now();
    let actual = stub.call(vec![], no_kwargs()).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_peer_fails_the_call() {
    let mut rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let (started_tx, mut started_rx) = mpsc::unbounded_channel::<()>();
    let myfunc = RpcFunction::new(move |_args| {
        let _ = started_tx.send(());
        async move {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let pending = stub.invoke(vec![], no_kwargs()).await.unwrap();
    time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .unwrap()
        .unwrap();

    // A goes away while the call is in flight; within ping_interval +
    // ping_timeout B's handle must fail with LostPeer.
    rpc_a.close().await.unwrap();

    let result = time::timeout(Duration::from_secs(5), pending).await.unwrap();
    assert!(matches!(result, Err(RpcError::LostPeer)), "got {:?}", result);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_function_is_reported_to_the_caller() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let url = FunctionUrl::new(
        rpc_a.own_peer_id().unwrap().clone(),
        FunctionId::random(),
    );
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let result = stub.call(vec![], no_kwargs()).await;
    assert!(matches!(result, Err(RpcError::UnknownFunction)), "got {:?}", result);
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_errors_are_reified() {
    let rpc_a = spawn_system().await;
    let rpc_b = spawn_system().await;

    let myfunc = RpcFunction::new(|_args| async move {
        Err::<Value, _>(RpcFailure::remote("ValueError", "no such entity"))
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    match stub.call(vec![], no_kwargs()).await {
        Err(RpcError::Remote { kind, message }) => {
            assert_eq!(kind, "ValueError");
            assert_eq!(message, "no such entity");
        },
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn function_urls_are_idempotent() {
    let rpc_a = spawn_system().await;

    let myfunc = hello_world();
    let url1 = rpc_a.get_function_url(&myfunc).unwrap();
    let url2 = rpc_a.get_function_url(&myfunc).unwrap();
    assert_eq!(url1, url2);

    let other = hello_world();
    let url3 = rpc_a.get_function_url(&other).unwrap();
    assert_ne!(url1, url3);

    // The url round-trips through its string form
    let parsed: FunctionUrl = url1.to_string().parse().unwrap();
    assert_eq!(parsed, url1);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_urls_are_rejected() {
    let rpc_b = spawn_system().await;

    for url in [
        "http://host:1/functions/0123456789abcdef0123456789abcdef",
        "anycall://host:1/other/0123456789abcdef0123456789abcdef",
        "anycall://host:1/functions/nothex",
    ] {
        match rpc_b.create_function_stub(url) {
            Err(RpcError::MalformedUrl(_)) => {},
            other => panic!("expected MalformedUrl for `{}`, got {:?}", url, other.map(|_| ())),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn close_resolves_pending_calls() {
    let rpc_a = spawn_system().await;
    let mut rpc_b = spawn_system().await;

    let (started_tx, mut started_rx) = mpsc::unbounded_channel::<()>();
    let myfunc = RpcFunction::new(move |_args| {
        let _ = started_tx.send(());
        async move {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    });
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let pending = stub.invoke(vec![], no_kwargs()).await.unwrap();
    time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .unwrap()
        .unwrap();

    rpc_b.close().await.unwrap();

    // No dangling handles after close
    let result = time::timeout(Duration::from_secs(5), pending).await.unwrap();
    assert!(matches!(result, Err(RpcError::Shutdown)), "got {:?}", result);

    // And the system refuses further work
    let result = stub.invoke(vec![], no_kwargs()).await;
    assert!(matches!(result, Err(RpcError::Shutdown)), "got {:?}", result);
    let result = rpc_b.create_function_stub(&url.to_string());
    assert!(matches!(result, Err(RpcError::NotOpen)), "got {:?}", result.map(|_| ()));
}

#[tokio::test(flavor = "multi_thread")]
async fn client_only_node_can_call_out() {
    let rpc_a = spawn_system().await;

    // B has no listener; it can still dial A and receive results over the
    // session it opened.
    let mut rpc_b = RpcSystemBuilder::new()
        .with_peer_id(PeerId::from("client-1"))
        .with_ping_interval(FAST_PING_INTERVAL)
        .with_ping_timeout(FAST_PING_TIMEOUT)
        .build(MemoryTransport::new())
        .unwrap();
    rpc_b.open().await.unwrap();

    let myfunc = hello_world();
    let url = rpc_a.get_function_url(&myfunc).unwrap();
    let stub = rpc_b.create_function_stub(&url.to_string()).unwrap();

    let actual = stub.call(vec![], no_kwargs()).await.unwrap();
    assert_eq!(actual, json!("Hello World!"));

    rpc_b.close().await.unwrap();
}
