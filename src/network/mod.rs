//! Network layer for the recorder
//!
//! Accepts HTTP/1.1 connections with hyper and hands every request to
//! [`crate::Recorder::handle`].

pub mod http;
mod server;

pub use server::RecorderServer;

/// Default maximum request body size
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
