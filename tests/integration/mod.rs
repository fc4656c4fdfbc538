//! Integration tests for microsvc
//!
//! Each test starts an in-process server on an ephemeral loopback port with
//! an in-memory span exporter, so no collector or container is needed.
//!
//! Run with: cargo test --test integration

mod helpers;

mod http_basic;
mod metrics;
mod trace_export;
