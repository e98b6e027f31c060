//! HTTP intent classifier

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_status, CollaboratorError, IntentClassifier};

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    service: Option<String>,
}

/// Posts `{"text": ..}` and expects `{"service": "plumber" | null}`.
/// The answer is not trusted: the state machine only accepts services
/// its keyword catalog knows.
pub struct HttpIntentClassifier {
    client: Client,
    url: String,
}

impl HttpIntentClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, text: &str) -> Result<Option<String>, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { text })
            .send()
            .await?;
        let body: ClassifyResponse = check_status(response).await?.json().await?;
        Ok(body.service.filter(|s| !s.trim().is_empty()))
    }
}
