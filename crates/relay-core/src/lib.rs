//! # relay-core
//!
//! Foundation types for the relay gateway.
//!
//! This crate provides the shared vocabulary the other relay crates depend on:
//!
//! - **Branded IDs**: [`ids::ConnectionId`] as a newtype for type safety
//! - **Envelopes**: [`envelope::ClientEnvelope`] inbound and
//!   [`envelope::ServerMessage`] outbound wire frames
//! - **Dedup keys**: [`dedup::DedupKey`] minute-bucketed content hashes

#![deny(unsafe_code)]

pub mod dedup;
pub mod envelope;
pub mod ids;
