#![cfg_attr(not(debug_assertions), deny(unused_variables))]
#![cfg_attr(not(debug_assertions), deny(unused_imports))]
#![cfg_attr(not(debug_assertions), deny(dead_code))]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]
//! # Anycall Test Utilities
//!
//! Commonly useful helpers for testing the anycall codebase.
//!
//! ## Modules
//!
//! - `futures` - utilities which make testing future-based code easier
//! - `streams` - utilities for collecting from streams and channels

pub mod futures;
#[macro_use]
pub mod streams;
