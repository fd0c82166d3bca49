//! WebSocket events exchanged between clients and the relay.
//!
//! Every frame is a JSON object `{"event": NAME, "data": {...}}`. Payload
//! fields (`ciphertext`, `offer`, `answer`, `candidate`) are opaque to the
//! relay and forwarded exactly as received.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{ConnectionId, Identity, TypesError};

/// The kinds of event the relay forwards between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Encrypted chat message
    ChatMessage,
    /// Call offer (session description)
    CallOffer,
    /// Call answer (session description)
    CallAnswer,
    /// ICE candidate for an in-progress call
    IceCandidate,
}

impl EventKind {
    /// Stable lowercase name, used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat-message",
            Self::CallOffer => "call-offer",
            Self::CallAnswer => "call-answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    /// Whether this kind belongs to the call-signaling exchange.
    pub fn is_signaling(&self) -> bool {
        !matches!(self, Self::ChatMessage)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frames sent by a client.
///
/// Decoding is hand-written so that payload-less events such as `leave`
/// accept `data` as `{}`, `null` or absent alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Bind this connection to an identity
    #[serde(rename = "join")]
    Join(Join),
    /// Unbind this connection without closing it
    #[serde(rename = "leave")]
    Leave(Leave),
    /// Relay an encrypted chat message
    #[serde(rename = "private_message")]
    PrivateMessage(ChatMessage),
    /// Start a call
    #[serde(rename = "call-user")]
    CallUser(CallOffer),
    /// Answer a call
    #[serde(rename = "make-answer")]
    MakeAnswer(CallAnswer),
    /// Trickle an ICE candidate
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceCandidate),
}

impl ClientEvent {
    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(text)?)
    }

}

const CLIENT_EVENTS: &[&str] = &[
    "join",
    "leave",
    "private_message",
    "call-user",
    "make-answer",
    "ice-candidate",
];

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

fn payload<T: DeserializeOwned, E: de::Error>(data: Value) -> Result<T, E> {
    serde_json::from_value(data).map_err(E::custom)
}

impl<'de> Deserialize<'de> for ClientEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let frame = RawFrame::deserialize(deserializer)?;
        match frame.event.as_str() {
            "join" => payload(frame.data).map(Self::Join),
            "leave" => Ok(Self::Leave(Leave::default())),
            "private_message" => payload(frame.data).map(Self::PrivateMessage),
            "call-user" => payload(frame.data).map(Self::CallUser),
            "make-answer" => payload(frame.data).map(Self::MakeAnswer),
            "ice-candidate" => payload(frame.data).map(Self::IceCandidate),
            other => Err(de::Error::unknown_variant(other, CLIENT_EVENTS)),
        }
    }
}

/// Frames pushed by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges a join
    #[serde(rename = "joined")]
    Joined(Joined),
    /// A chat message addressed to this identity
    #[serde(rename = "incoming_message")]
    IncomingMessage(ChatMessage),
    /// An incoming call offer
    #[serde(rename = "call-made")]
    CallMade(CallMade),
    /// The callee's answer
    #[serde(rename = "answer-made")]
    AnswerMade(AnswerMade),
    /// An ICE candidate from the counterpart
    #[serde(rename = "ice-candidate-relayed")]
    IceCandidateRelayed(IceCandidateRelayed),
    /// A request from this connection could not be processed
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ServerEvent {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Identity to bind this connection to
    #[serde(alias = "username")]
    pub identity: Identity,
}

/// Leave request. Carries nothing; any payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leave {}

/// Join acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joined {
    /// Identity the connection is now bound to
    pub identity: Identity,
    /// Handle the relay assigned to this connection
    pub socket: ConnectionId,
}

/// An encrypted chat message.
///
/// Sent by the client as `private_message` and forwarded unchanged as
/// `incoming_message`. Fields other than the three routing/payload fields
/// (for example `iv`, `ttl`, `type`) are carried along verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Claimed author
    pub sender: Identity,
    /// Addressee
    pub recipient: Identity,
    /// Opaque ciphertext
    pub ciphertext: String,
    /// Any additional opaque fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Create a message without extra fields.
    pub fn new(sender: Identity, recipient: Identity, ciphertext: impl Into<String>) -> Self {
        Self {
            sender,
            recipient,
            ciphertext: ciphertext.into(),
            extra: Map::new(),
        }
    }
}

/// Call offer as sent by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOffer {
    /// Opaque session description
    pub offer: Value,
    /// Callee
    pub to: Identity,
    /// Caller
    pub sender: Identity,
}

/// Call offer as delivered to the callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMade {
    /// Opaque session description
    pub offer: Value,
    /// Connection that issued the offer
    pub socket: ConnectionId,
    /// Caller
    pub sender: Identity,
}

/// Call answer as sent by the callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAnswer {
    /// Opaque session description
    pub answer: Value,
    /// Caller
    pub to: Identity,
}

/// Call answer as delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMade {
    /// Opaque session description
    pub answer: Value,
    /// Connection that issued the answer
    pub socket: ConnectionId,
}

/// ICE candidate as sent by either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Opaque candidate
    pub candidate: Value,
    /// Counterpart
    pub to: Identity,
    /// Originator
    pub sender: Identity,
}

/// ICE candidate as delivered to the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateRelayed {
    /// Opaque candidate
    pub candidate: Value,
    /// Originator
    pub sender: Identity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn parses_join_with_username_alias() {
        let event = ClientEvent::from_json(r#"{"event":"join","data":{"username":"alice"}}"#)
            .unwrap();
        assert_eq!(event, ClientEvent::Join(Join { identity: id("alice") }));

        let event = ClientEvent::from_json(r#"{"event":"join","data":{"identity":"alice"}}"#)
            .unwrap();
        assert_eq!(event, ClientEvent::Join(Join { identity: id("alice") }));
    }

    #[test]
    fn parses_leave_with_any_payload() {
        for text in [
            r#"{"event":"leave"}"#,
            r#"{"event":"leave","data":null}"#,
            r#"{"event":"leave","data":{}}"#,
        ] {
            assert_eq!(
                ClientEvent::from_json(text).unwrap(),
                ClientEvent::Leave(Leave::default()),
                "{text}"
            );
        }
    }

    #[test]
    fn leave_encodes_empty_object() {
        let text = serde_json::to_string(&ClientEvent::Leave(Leave::default())).unwrap();
        assert_eq!(text, r#"{"event":"leave","data":{}}"#);
    }

    #[test]
    fn payload_events_require_data() {
        assert!(ClientEvent::from_json(r#"{"event":"join"}"#).is_err());
        assert!(ClientEvent::from_json(r#"{"event":"call-user","data":null}"#).is_err());
    }

    #[test]
    fn private_message_keeps_extra_fields() {
        let text = r#"{"event":"private_message","data":{"sender":"alice","recipient":"bob","ciphertext":"xyz","iv":"abc","ttl":30,"type":"text"}}"#;
        let event = ClientEvent::from_json(text).unwrap();

        let ClientEvent::PrivateMessage(msg) = event else {
            panic!("expected PrivateMessage");
        };
        assert_eq!(msg.sender, id("alice"));
        assert_eq!(msg.recipient, id("bob"));
        assert_eq!(msg.ciphertext, "xyz");
        assert_eq!(msg.extra.get("iv"), Some(&json!("abc")));
        assert_eq!(msg.extra.get("ttl"), Some(&json!(30)));

        // Forwarded form carries the same fields
        let out = ServerEvent::IncomingMessage(msg).to_json().unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["event"], "incoming_message");
        assert_eq!(value["data"]["type"], "text");
        assert_eq!(value["data"]["iv"], "abc");
        assert_eq!(value["data"]["ciphertext"], "xyz");
    }

    #[test]
    fn signaling_events_use_original_names() {
        let offer = ClientEvent::from_json(
            r#"{"event":"call-user","data":{"offer":{"type":"offer","sdp":"v=0"},"to":"bob","sender":"alice"}}"#,
        )
        .unwrap();
        assert!(matches!(offer, ClientEvent::CallUser(ref o) if o.to == id("bob")));

        let answer = ClientEvent::from_json(
            r#"{"event":"make-answer","data":{"answer":"sdp2","to":"alice"}}"#,
        )
        .unwrap();
        assert!(matches!(answer, ClientEvent::MakeAnswer(ref a) if a.answer == json!("sdp2")));

        let ice = ClientEvent::from_json(
            r#"{"event":"ice-candidate","data":{"candidate":{"candidate":"c1"},"to":"bob","sender":"alice"}}"#,
        )
        .unwrap();
        assert!(matches!(ice, ClientEvent::IceCandidate(ref c) if c.sender == id("alice")));
    }

    #[test]
    fn server_event_names() {
        let socket = ConnectionId::new();
        let made = ServerEvent::CallMade(CallMade {
            offer: json!("sdp1"),
            socket,
            sender: id("alice"),
        });
        let value: Value = serde_json::from_str(&made.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "call-made");
        assert_eq!(value["data"]["socket"], socket.to_string());

        let err = ServerEvent::error("bad frame");
        let value: Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["message"], "bad frame");
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(ClientEvent::from_json(r#"{"event":"teleport","data":{}}"#).is_err());
        assert!(ClientEvent::from_json("not json").is_err());
    }

    #[test]
    fn rejects_invalid_identity_in_payload() {
        let text = r#"{"event":"private_message","data":{"sender":"","recipient":"bob","ciphertext":"x"}}"#;
        assert!(ClientEvent::from_json(text).is_err());
    }

    #[test]
    fn signaling_kinds() {
        assert!(!EventKind::ChatMessage.is_signaling());
        assert!(EventKind::CallOffer.is_signaling());
        assert!(EventKind::CallAnswer.is_signaling());
        assert!(EventKind::IceCandidate.is_signaling());
        assert_eq!(EventKind::IceCandidate.to_string(), "ice-candidate");
    }
}
