//! Outbound messaging transports and the swappable handle the runtime
//! sends through

use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{bounded, check_status, CollaboratorError, Transport};

/// Process-wide transport slot. `replace` publishes a new transport
/// atomically; sends already in flight finish on the one they loaded.
pub struct TransportHandle {
    current: ArcSwap<Box<dyn Transport>>,
    timeout: Duration,
}

impl TransportHandle {
    pub fn new(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            current: ArcSwap::from_pointee(transport),
            timeout,
        }
    }

    pub fn current(&self) -> Arc<Box<dyn Transport>> {
        self.current.load_full()
    }

    /// Publish `transport` to all future sends
    pub fn replace(&self, transport: Box<dyn Transport>) {
        let name = transport.name().to_string();
        let previous = self.current.swap(Arc::new(transport));
        tracing::info!(previous = previous.name(), current = %name, "Transport replaced");
    }

    pub async fn send(&self, to: &str, text: &str) -> Result<(), CollaboratorError> {
        let transport = self.current();
        bounded("transport", self.timeout, transport.send(to, text)).await
    }
}

// ============================================================================
// WhatsApp Cloud API
// ============================================================================

#[derive(Serialize)]
struct TextPayload<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    body: &'a str,
    preview_url: bool,
}

/// Sends text messages through the WhatsApp Cloud API messages endpoint
pub struct CloudApiTransport {
    client: Client,
    api_url: String,
    access_token: String,
}

impl CloudApiTransport {
    pub fn new(
        api_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl Transport for CloudApiTransport {
    fn name(&self) -> &str {
        "whatsapp_cloud_api"
    }

    async fn send(&self, to: &str, text: &str) -> Result<(), CollaboratorError> {
        let payload = TextPayload {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: TextBody {
                body: text,
                preview_url: false,
            },
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// Log-only transport
// ============================================================================

/// Writes outbound messages to the log instead of delivering them. Used
/// when no messaging credentials are configured.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, to: &str, text: &str) -> Result<(), CollaboratorError> {
        tracing::info!(to, text, "Outbound message (not delivered)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::RecordingTransport;

    #[tokio::test]
    async fn replace_switches_future_sends() {
        let first = RecordingTransport::new();
        let second = RecordingTransport::new();
        let handle = TransportHandle::new(Box::new(first.clone()), Duration::from_secs(1));

        handle.send("u1", "one").await.unwrap();
        let held = handle.current();
        handle.replace(Box::new(second.clone()));
        handle.send("u1", "two").await.unwrap();
        // a handle loaded before the swap keeps working
        held.send("u1", "three").await.unwrap();

        assert_eq!(first.texts(), vec!["one", "three"]);
        assert_eq!(second.texts(), vec!["two"]);
    }

    #[test]
    fn payload_matches_cloud_api_shape() {
        let payload = TextPayload {
            messaging_product: "whatsapp",
            to: "263771000001",
            kind: "text",
            text: TextBody {
                body: "hi",
                preview_url: false,
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"]["body"], "hi");
        assert_eq!(json["messaging_product"], "whatsapp");
    }
}
