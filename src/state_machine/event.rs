//! Inbound events from the messaging transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundBody {
    Text { text: String },
    /// A shared GPS pin
    Location { latitude: f64, longitude: f64 },
}

/// One inbound message, already parsed and verified by the webhook layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Sender handle (phone number)
    pub user_key: String,
    pub body: InboundBody,
    /// Transport message id, when the transport provides one
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn text(user_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            body: InboundBody::Text { text: text.into() },
            message_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn location(user_key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            user_key: user_key.into(),
            body: InboundBody::Location {
                latitude,
                longitude,
            },
            message_id: None,
            received_at: Utc::now(),
        }
    }

    /// Trimmed text, or `None` for non-text bodies
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            InboundBody::Text { text } => Some(text.trim()),
            InboundBody::Location { .. } => None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self.body {
            InboundBody::Location {
                latitude,
                longitude,
            } => Some((latitude, longitude)),
            InboundBody::Text { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.body {
            InboundBody::Text { .. } => "text",
            InboundBody::Location { .. } => "location",
        }
    }
}
