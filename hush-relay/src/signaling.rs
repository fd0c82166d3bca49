//! Call signaling over the relay.
//!
//! Offers, answers and ICE candidates are forwarded as-is to the identity
//! named in `to`, annotated so the far end knows whom to answer. There is no
//! per-call state here: a dropped offer simply never gets an answer, and
//! call timeouts are the endpoints' business.

use crate::error::ProtocolResult;
use crate::router::{RelayEvent, RelayRouter, RouteOutcome};
use hush_types::{
    AnswerMade, CallAnswer, CallMade, CallOffer, ConnectionId, EventKind, IceCandidate,
    IceCandidateRelayed, Identity, ServerEvent,
};
use std::sync::Arc;

/// The connection a signaling event arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Issuing connection.
    pub connection: ConnectionId,
    /// Identity the connection has joined as, if any.
    pub identity: Option<Identity>,
}

impl Origin {
    /// The identity to stamp on forwarded events.
    ///
    /// A joined connection speaks for its bound identity; an unjoined one
    /// falls back to what the client claimed.
    fn stamp(&self, claimed: Identity) -> Identity {
        match &self.identity {
            Some(bound) => {
                if *bound != claimed {
                    tracing::debug!(
                        "Connection {:?} bound to {:?} claimed sender {:?}",
                        self.connection,
                        bound,
                        claimed
                    );
                }
                bound.clone()
            }
            None => claimed,
        }
    }
}

/// Forwards call-setup events through the relay router.
#[derive(Debug, Clone)]
pub struct SignalingCoordinator {
    router: Arc<RelayRouter>,
}

impl SignalingCoordinator {
    /// Create a coordinator over a router.
    pub fn new(router: Arc<RelayRouter>) -> Self {
        Self { router }
    }

    /// Forward a call offer to the callee as `call-made`.
    pub async fn offer(&self, origin: &Origin, offer: CallOffer) -> ProtocolResult<RouteOutcome> {
        let sender = origin.stamp(offer.sender);
        self.router
            .route(RelayEvent {
                kind: EventKind::CallOffer,
                sender: Some(sender.clone()),
                recipient: offer.to,
                body: ServerEvent::CallMade(CallMade {
                    offer: offer.offer,
                    socket: origin.connection,
                    sender,
                }),
            })
            .await
    }

    /// Forward a call answer to the caller as `answer-made`.
    pub async fn answer(&self, origin: &Origin, answer: CallAnswer) -> ProtocolResult<RouteOutcome> {
        self.router
            .route(RelayEvent {
                kind: EventKind::CallAnswer,
                sender: origin.identity.clone(),
                recipient: answer.to,
                body: ServerEvent::AnswerMade(AnswerMade {
                    answer: answer.answer,
                    socket: origin.connection,
                }),
            })
            .await
    }

    /// Forward an ICE candidate to the counterpart as `ice-candidate-relayed`.
    pub async fn ice_candidate(
        &self,
        origin: &Origin,
        candidate: IceCandidate,
    ) -> ProtocolResult<RouteOutcome> {
        let sender = origin.stamp(candidate.sender);
        self.router
            .route(RelayEvent {
                kind: EventKind::IceCandidate,
                sender: Some(sender.clone()),
                recipient: candidate.to,
                body: ServerEvent::IceCandidateRelayed(IceCandidateRelayed {
                    candidate: candidate.candidate,
                    sender,
                }),
            })
            .await
    }
}
