//! # hush-relay
//!
//! Zero-knowledge relay server for hush.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections and binds them to identities
//! - Routes end-to-end encrypted chat messages to every connection of the
//!   recipient
//! - Tunnels WebRTC call signaling (offer, answer, ICE candidates)
//! - Holds opaque uploads in a blind store that releases each one exactly once
//! - Never sees plaintext (relay is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! alice ──┐        WebSocket           ┌── bob (phone)
//!         ├───────────────────────────►├── bob (laptop)
//!         │                            │
//!     ┌───┴────────────────────────────┴───┐
//!     │             hush-relay             │
//!     │  registry ─ router ─ signaling     │
//!     │     │          │                   │
//!     │  blind store   └─► audit (SQLite)  │
//!     └────────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Frames are JSON objects `{"event": NAME, "data": {...}}`:
//! - join → joined
//! - private_message → incoming_message
//! - call-user → call-made
//! - make-answer → answer-made
//! - ice-candidate → ice-candidate-relayed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod signaling;
pub mod storage;
pub mod store;
