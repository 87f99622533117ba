//! WebSocket connection management, session state, and message fan-out.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client send handle, liveness tracking |
//! | `registry` | Membership set: register/unregister, addressed send, broadcast |
//! | `state` | Per-session Idle/Busy machine with dedup admission |
//! | `session` | WebSocket upgrade and the per-connection receive loop |
//!
//! ## Data Flow
//!
//! `session` reads frames → `state` admits or rejects → accepted envelopes
//! run through the orchestrator in a spawned task → results go back out via
//! `registry`/`connection` and are mirrored to the chat log sink.

pub mod connection;
pub mod registry;
pub mod session;
pub mod state;
