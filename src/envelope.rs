//! Envelope codec: the wire shape of every bridge message.
//!
//! Every message a bridge puts on the relay is a JSON object:
//!
//! ```text
//! { "kind": "mirror", "source": "main", "action"?: "...", "payload"?: any,
//!   "id"?: "main-1", "replyTo"?: "sub-4" }
//! ```
//!
//! On decode the object is validated and turned into a typed [`Body`], so the
//! bridge never has to reason about which optional fields are set. The hub
//! never decodes envelopes; it relays raw JSON.
//!
//! Legacy plain-text mirror messages (`{"type": "mirror", "source", "text"}`)
//! decode into [`Body::Legacy`], and a legacy body holding text encodes back
//! into that shape so older clients can read it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::ENVELOPE_KIND;

/// Errors produced while decoding an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Not a JSON object, or a required field has the wrong type.
    Malformed(String),
    /// The `kind` marker is not ours (unrelated traffic).
    ForeignKind(String),
    /// The `source` field is empty.
    EmptySource,
    /// `replyTo` appears together with `action` or `id`.
    ConflictingRoles,
    /// `id` appears without an `action`.
    MissingAction,
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed envelope: {msg}"),
            Self::ForeignKind(kind) => write!(f, "Foreign envelope kind: {kind}"),
            Self::EmptySource => write!(f, "Envelope source is empty"),
            Self::ConflictingRoles => write!(f, "Envelope has both replyTo and action/id"),
            Self::MissingAction => write!(f, "Envelope has an id but no action"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// Role-specific contents of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Fire-and-forget action.
    Notification {
        /// Action name.
        action: String,
        /// Application data (`null` when absent).
        payload: Value,
    },
    /// Action that expects a reply correlated by `id`.
    Request {
        /// Action name.
        action: String,
        /// Correlation token the reply must echo in `replyTo`.
        id: String,
        /// Application data (`null` when absent).
        payload: Value,
    },
    /// Reply to an earlier request.
    Reply {
        /// The `id` of the request being answered.
        reply_to: String,
        /// `{"result": ..}` or `{"error": ".."}`.
        payload: Value,
    },
    /// Plain-text mirror payload from clients that predate actions.
    Legacy {
        /// The mirrored content.
        payload: Value,
    },
}

/// A validated bridge message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Client identity of the sender.
    pub source: String,
    /// What the message is.
    pub body: Body,
}

/// Raw wire form, used only for decoding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(alias = "type")]
    kind: String,
    source: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl Envelope {
    /// Build a notification envelope.
    pub fn notification(source: &str, action: &str, payload: Value) -> Self {
        Self {
            source: source.to_string(),
            body: Body::Notification {
                action: action.to_string(),
                payload,
            },
        }
    }

    /// Build a request envelope.
    pub fn request(source: &str, action: &str, id: String, payload: Value) -> Self {
        Self {
            source: source.to_string(),
            body: Body::Request {
                action: action.to_string(),
                id,
                payload,
            },
        }
    }

    /// Build a reply envelope for request `reply_to`.
    pub fn reply(source: &str, reply_to: String, reply: &ReplyPayload) -> Self {
        Self {
            source: source.to_string(),
            body: Body::Reply {
                reply_to,
                payload: reply.to_value(),
            },
        }
    }

    /// Build a legacy plain-text mirror envelope.
    pub fn legacy(source: &str, text: &str) -> Self {
        Self {
            source: source.to_string(),
            body: Body::Legacy {
                payload: Value::String(text.to_string()),
            },
        }
    }

    /// Action name, if this is a notification or request.
    pub fn action(&self) -> Option<&str> {
        match &self.body {
            Body::Notification { action, .. } | Body::Request { action, .. } => Some(action),
            Body::Reply { .. } | Body::Legacy { .. } => None,
        }
    }

    /// Decode and validate an envelope from a relayed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the value is not a well-formed bridge
    /// envelope.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        if !value.is_object() {
            return Err(EnvelopeError::Malformed("not a JSON object".to_string()));
        }
        let wire: WireEnvelope =
            serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        if wire.kind != ENVELOPE_KIND {
            return Err(EnvelopeError::ForeignKind(wire.kind));
        }
        if wire.source.is_empty() {
            return Err(EnvelopeError::EmptySource);
        }

        let payload = wire.payload.unwrap_or(Value::Null);
        let body = match (wire.action, wire.id, wire.reply_to) {
            (Some(_), _, Some(_)) | (None, Some(_), Some(_)) => {
                return Err(EnvelopeError::ConflictingRoles);
            }
            (None, Some(_), None) => return Err(EnvelopeError::MissingAction),
            (None, None, Some(reply_to)) => Body::Reply { reply_to, payload },
            (Some(action), Some(id), None) => Body::Request {
                action,
                id,
                payload,
            },
            (Some(action), None, None) => Body::Notification { action, payload },
            (None, None, None) => Body::Legacy {
                payload: match wire.text {
                    Some(text) if payload.is_null() => Value::String(text),
                    _ => payload,
                },
            },
        };

        Ok(Self {
            source: wire.source,
            body,
        })
    }

    /// Encode this envelope into its wire JSON object.
    ///
    /// Absent optional fields are omitted, and a `null` payload is omitted.
    /// Legacy text is written as `{"type", "source", "text"}`.
    pub fn to_value(&self) -> Value {
        if let Body::Legacy {
            payload: Value::String(text),
        } = &self.body
        {
            return serde_json::json!({
                "type": ENVELOPE_KIND,
                "source": self.source,
                "text": text,
            });
        }

        let mut obj = Map::new();
        obj.insert("kind".into(), Value::from(ENVELOPE_KIND));
        obj.insert("source".into(), Value::from(self.source.as_str()));

        let payload = match &self.body {
            Body::Notification { action, payload } => {
                obj.insert("action".into(), Value::from(action.as_str()));
                payload
            }
            Body::Request {
                action,
                id,
                payload,
            } => {
                obj.insert("action".into(), Value::from(action.as_str()));
                obj.insert("id".into(), Value::from(id.as_str()));
                payload
            }
            Body::Reply { reply_to, payload } => {
                obj.insert("replyTo".into(), Value::from(reply_to.as_str()));
                payload
            }
            Body::Legacy { payload } => payload,
        };
        if !payload.is_null() {
            obj.insert("payload".into(), payload.clone());
        }

        Value::Object(obj)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Outcome carried by a reply envelope.
///
/// Serializes as `{"result": ..}` or `{"error": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPayload {
    /// A handler produced a value.
    Result(Value),
    /// No handler, or the handler failed.
    Error(String),
}

impl ReplyPayload {
    /// Error string used when a reply payload has neither shape.
    pub const MALFORMED: &'static str = "malformed-reply";

    /// Interpret a reply envelope's payload.
    pub fn from_wire(payload: Value) -> Self {
        serde_json::from_value(payload).unwrap_or_else(|_| Self::Error(Self::MALFORMED.to_string()))
    }

    /// Encode as the JSON payload of a reply envelope.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Result(value) => serde_json::json!({ "result": value }),
            Self::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Error(message) => Err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_request() {
        let env = Envelope::from_value(json!({
            "kind": "mirror",
            "source": "main",
            "action": "echo",
            "payload": {"v": 1},
            "id": "main-1"
        }))
        .unwrap();
        assert_eq!(env.source, "main");
        assert_eq!(
            env.body,
            Body::Request {
                action: "echo".into(),
                id: "main-1".into(),
                payload: json!({"v": 1}),
            }
        );
        assert_eq!(env.action(), Some("echo"));
    }

    #[test]
    fn test_missing_payload_is_null() {
        let env = Envelope::from_value(json!({
            "kind": "mirror",
            "source": "sub",
            "action": "presence:ping"
        }))
        .unwrap();
        assert_eq!(
            env.body,
            Body::Notification {
                action: "presence:ping".into(),
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn test_decodes_reply() {
        let env = Envelope::from_value(json!({
            "kind": "mirror",
            "source": "sub",
            "replyTo": "main-3",
            "payload": {"error": "no-handler"}
        }))
        .unwrap();
        match env.body {
            Body::Reply { reply_to, payload } => {
                assert_eq!(reply_to, "main-3");
                assert_eq!(
                    ReplyPayload::from_wire(payload),
                    ReplyPayload::Error("no-handler".into())
                );
            }
            other => panic!("Expected Reply, got: {other:?}"),
        }
    }

    #[test]
    fn test_decodes_legacy_text_message() {
        let env = Envelope::from_value(json!({
            "type": "mirror",
            "source": "main",
            "text": "hello"
        }))
        .unwrap();
        assert_eq!(
            env.body,
            Body::Legacy {
                payload: json!("hello")
            }
        );
        assert_eq!(env.action(), None);
    }

    #[test]
    fn test_legacy_text_encodes_for_old_clients() {
        let wire = Envelope::legacy("main", "hello").to_value();
        assert_eq!(wire, json!({"type": "mirror", "source": "main", "text": "hello"}));
        assert_eq!(
            Envelope::from_value(wire).unwrap(),
            Envelope::legacy("main", "hello")
        );

        // Non-text legacy payloads keep the current field names.
        let env = Envelope {
            source: "main".into(),
            body: Body::Legacy {
                payload: json!({"lines": 2}),
            },
        };
        assert_eq!(
            env.to_value(),
            json!({"kind": "mirror", "source": "main", "payload": {"lines": 2}})
        );
    }

    #[test]
    fn test_rejects_foreign_kind() {
        let err = Envelope::from_value(json!({"kind": "chat", "source": "x"})).unwrap_err();
        assert_eq!(err, EnvelopeError::ForeignKind("chat".into()));
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(matches!(
            Envelope::from_value(json!("just text")),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::from_value(json!({"kind": "mirror"})),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_empty_source() {
        let err = Envelope::from_value(json!({"kind": "mirror", "source": ""})).unwrap_err();
        assert_eq!(err, EnvelopeError::EmptySource);
    }

    #[test]
    fn test_rejects_reply_with_action() {
        let err = Envelope::from_value(json!({
            "kind": "mirror",
            "source": "a",
            "action": "echo",
            "replyTo": "b-1"
        }))
        .unwrap_err();
        assert_eq!(err, EnvelopeError::ConflictingRoles);

        let err = Envelope::from_value(json!({
            "kind": "mirror",
            "source": "a",
            "id": "a-1",
            "replyTo": "b-1"
        }))
        .unwrap_err();
        assert_eq!(err, EnvelopeError::ConflictingRoles);
    }

    #[test]
    fn test_rejects_id_without_action() {
        let err = Envelope::from_value(json!({"kind": "mirror", "source": "a", "id": "a-1"}))
            .unwrap_err();
        assert_eq!(err, EnvelopeError::MissingAction);
    }

    #[test]
    fn test_encoding_omits_absent_fields() {
        let value = Envelope::notification("main", "content:update", Value::Null).to_value();
        assert_eq!(
            value,
            json!({"kind": "mirror", "source": "main", "action": "content:update"})
        );

        let value =
            Envelope::reply("sub", "main-1".into(), &ReplyPayload::Result(json!(2))).to_value();
        assert_eq!(
            value,
            json!({"kind": "mirror", "source": "sub", "replyTo": "main-1", "payload": {"result": 2}})
        );
    }

    #[test]
    fn test_malformed_reply_payload() {
        assert_eq!(
            ReplyPayload::from_wire(json!({"unexpected": true})),
            ReplyPayload::Error(ReplyPayload::MALFORMED.into())
        );
        assert_eq!(
            ReplyPayload::from_wire(json!({"result": null})),
            ReplyPayload::Result(Value::Null)
        );
    }
}
