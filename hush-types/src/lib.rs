//! # hush-types
//!
//! Wire format types for the hush zero-knowledge chat relay.
//!
//! This crate provides the types shared between the relay and its clients:
//! - [`Identity`], [`ConnectionId`], [`ObjectHandle`] - Routing and addressing types
//! - [`ClientEvent`], [`ServerEvent`] - WebSocket frames in both directions
//! - [`EventKind`] - Classification of relayable events
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;

pub use error::TypesError;
pub use events::{
    AnswerMade, CallAnswer, CallMade, CallOffer, ChatMessage, ClientEvent, EventKind,
    IceCandidate, IceCandidateRelayed, Join, Joined, Leave, ServerEvent,
};
pub use ids::{ConnectionId, Identity, ObjectHandle, MAX_IDENTITY_LEN};
