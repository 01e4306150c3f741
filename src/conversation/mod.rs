//! Conversation backend
//!
//! Sends patient utterances to the remote triage workflow and reduces its
//! replies to a [`StructuredResponse`].

mod client;
mod response;

pub use client::{ConversationClient, ConversationError, DEFAULT_TIMEOUT, WebhookClient};
pub use response::{
    ConversationStatus, RESPONSE_NOT_FOUND, StructuredResponse, parse_response, strip_json_fence,
};
