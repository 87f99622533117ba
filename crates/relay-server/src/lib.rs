//! # relay-server
//!
//! Axum HTTP + WebSocket server for the relay gateway: connection registry,
//! per-connection session loops with single-flight dedup, chat log sink,
//! health/models endpoints, metrics, and graceful shutdown.

#![deny(unsafe_code)]

pub mod chatlog;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
