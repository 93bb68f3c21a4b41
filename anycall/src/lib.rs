#![cfg_attr(not(debug_assertions), deny(unused_variables))]
#![cfg_attr(not(debug_assertions), deny(unused_imports))]
#![cfg_attr(not(debug_assertions), deny(dead_code))]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]
//! # Anycall
//!
//! A small peer-to-peer RPC runtime. Processes expose local functions under
//! stable `anycall://` urls and invoke functions exposed by remote peers over
//! pooled, reusable stream connections.
//!
//! The runtime is built from three layers:
//!
//! - [`packet`] - a framed packet codec carrying typed opaque payloads over a
//!   single byte stream.
//! - [`connection_pool`] - one multiplexed connection per peer, opened lazily
//!   with a peer-identity handshake and cleaned up on loss.
//! - [`rpc`] - the RPC layer: function registration, invocable stubs,
//!   in-flight call tracking in both directions, remote cancellation and a
//!   ping loop that fails calls whose peer has become unresponsive.
//!
//! Delivery is at-most-once and best-effort; anything stronger is up to the
//! caller.
//!
//! ```no_run
//! use anycall::rpc::{create_tcp_rpc_system, CallArgs, RpcFunction};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut system = create_tcp_rpc_system(0)?;
//! system.open().await?;
//!
//! let greet = RpcFunction::new(|args: CallArgs| async move {
//!     let name = args.get(0, "name").cloned().unwrap_or(json!("stranger"));
//!     Ok(json!(format!("Hello {}!", name.as_str().unwrap_or_default())))
//! });
//! let url = system.get_function_url(&greet)?;
//! // hand `url` to a remote peer; it builds a stub and calls `greet`
//! # Ok(())
//! # }
//! ```

pub mod connection_pool;
pub mod packet;
pub mod peer;
pub mod rpc;
pub mod transports;

pub use peer::PeerId;
pub use rpc::{create_tcp_rpc_system, RpcError, RpcSystem, RpcSystemBuilder};
