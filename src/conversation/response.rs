//! Normalization of conversation backend payloads
//!
//! The webhook's response shape is not fixed: the reply text may live under
//! `output`, `response` or `message`, may be plain text, may be a JSON
//! document wrapped in a markdown fence, or may already be an object.
//! Everything is reduced to a [`StructuredResponse`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Message used when no reply text can be found in a payload
pub const RESPONSE_NOT_FOUND: &str = "response not found";

/// Envelope fields that may carry the reply, in priority order
const PAYLOAD_FIELDS: [&str; 3] = ["output", "response", "message"];

/// A ```json fenced block, as emitted by LLM-backed workflows
static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("fence pattern is valid")
});

/// Conversation status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConversationStatus {
    /// Triage continues normally
    #[default]
    #[serde(rename = "normal")]
    Normal,
    /// Urgent situation; staff has been alerted
    #[serde(rename = "alerta_emergencia")]
    EmergencyAlert,
    /// Triage finished
    #[serde(rename = "triagem_concluida")]
    TriageComplete,
    /// Patient needs a human attendant
    #[serde(rename = "ajuda_humana")]
    NeedsHuman,
}

impl ConversationStatus {
    /// Parse a backend status value
    ///
    /// Accepts the backend's wire values and their English names.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "alerta_emergencia" | "emergency_alert" => Some(Self::EmergencyAlert),
            "triagem_concluida" | "triage_complete" => Some(Self::TriageComplete),
            "ajuda_humana" | "needs_human" => Some(Self::NeedsHuman),
            _ => None,
        }
    }

    /// Parse a backend status value, treating unknown values as [`Self::Normal`]
    #[must_use]
    pub fn lenient(value: &str) -> Self {
        Self::from_wire(value).unwrap_or_else(|| {
            tracing::warn!(status = value, "unknown conversation status, treating as normal");
            Self::Normal
        })
    }

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::EmergencyAlert => "alerta_emergencia",
            Self::TriageComplete => "triagem_concluida",
            Self::NeedsHuman => "ajuda_humana",
        }
    }

    /// Whether this status ends voice interaction and starts the return countdown
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized backend reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredResponse {
    pub message: String,
    pub status: ConversationStatus,
}

impl StructuredResponse {
    /// Create a response
    #[must_use]
    pub fn new(message: impl Into<String>, status: ConversationStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Placeholder used when the payload carries no usable reply
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(RESPONSE_NOT_FOUND, ConversationStatus::Normal)
    }
}

/// Reduce a raw backend response body to a [`StructuredResponse`]
///
/// Never fails: malformed payloads degrade to plain text or to the
/// [`RESPONSE_NOT_FOUND`] placeholder.
#[must_use]
pub fn parse_response(body: &Value) -> StructuredResponse {
    // Workflow engines may answer with every produced item
    let envelope = match body {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };

    // Non-JSON bodies arrive as a bare string
    if let Value::String(raw) = envelope {
        return parse_text_payload(raw, None);
    }

    let envelope_status = envelope
        .get("status")
        .and_then(Value::as_str)
        .map(ConversationStatus::lenient);

    let Some(payload) = extract_payload(envelope) else {
        tracing::warn!("conversation response carries no reply field");
        return StructuredResponse::not_found();
    };

    match payload {
        Value::String(raw) => parse_text_payload(raw, envelope_status),
        Value::Object(_) => structured_fields(payload).unwrap_or_else(|| {
            tracing::warn!("conversation reply object lacks message or status");
            StructuredResponse::not_found()
        }),
        _ => {
            tracing::warn!(payload = %payload, "unexpected conversation reply type");
            StructuredResponse::not_found()
        }
    }
}

/// Remove a ```json fence around `raw`, if present
#[must_use]
pub fn strip_json_fence(raw: &str) -> &str {
    if !raw.contains("```json") {
        return raw;
    }

    JSON_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str())
}

fn parse_text_payload(raw: &str, envelope_status: Option<ConversationStatus>) -> StructuredResponse {
    let unwrapped = strip_json_fence(raw);
    let fallback_status = envelope_status.unwrap_or_default();

    match serde_json::from_str::<Value>(unwrapped) {
        Ok(decoded) => structured_fields(&decoded)
            .unwrap_or_else(|| StructuredResponse::new(raw, fallback_status)),
        Err(_) => StructuredResponse::new(unwrapped, fallback_status),
    }
}

/// `{message, status}` with both fields present and non-empty
fn structured_fields(value: &Value) -> Option<StructuredResponse> {
    let message = value.get("message")?.as_str().filter(|m| !m.is_empty())?;
    let status = value.get("status")?.as_str().filter(|s| !s.is_empty())?;

    Some(StructuredResponse::new(
        message,
        ConversationStatus::lenient(status),
    ))
}

/// First reply field holding a meaningful value
fn extract_payload(envelope: &Value) -> Option<&Value> {
    PAYLOAD_FIELDS
        .iter()
        .filter_map(|field| envelope.get(field))
        .find(|value| is_present(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(_) | Value::Array(_) | Value::Object(_) => true,
    }
}
