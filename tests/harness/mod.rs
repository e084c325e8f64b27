//! Shared helpers for the end-to-end scenario tests.
//!
//! Provides quick configurations on ephemeral ports, a standalone echo
//! server for client-role runs, and row assertions.

#![allow(dead_code)]

mod client;
mod metrics;
mod server;

pub use client::{closed_port, quick_config};
pub use metrics::{assert_clean_pass, assert_percentiles_zero};
pub use server::TestServer;
