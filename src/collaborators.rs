//! External collaborators: the messaging transport, the reverse geocoder
//! and the intent classifier

mod classifier;
mod geocoder;
mod transport;

pub use classifier::HttpIntentClassifier;
pub use geocoder::{NominatimGeocoder, DEFAULT_NOMINATIM_URL};
pub use transport::{CloudApiTransport, LogTransport, TransportHandle};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CollaboratorError::Timeout("request")
        } else if e.is_connect() {
            CollaboratorError::Unexpected(format!("Connection failed: {e}"))
        } else {
            CollaboratorError::Unexpected(format!("Request failed: {e}"))
        }
    }
}

/// Bound a collaborator call by `limit`
pub async fn bounded<T, F>(what: &'static str, limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(CollaboratorError::Timeout(what)))
}

/// Delivers text messages to a user handle
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, to: &str, text: &str) -> Result<(), CollaboratorError>;
}

/// Coordinates to a "Suburb, City" place name
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<String, CollaboratorError>;
}

/// Free text to a service type, if the classifier has an opinion
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Option<String>, CollaboratorError>;
}

/// Map a non-success response to `CollaboratorError::Http`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Http {
        status: status.as_u16(),
        body,
    })
}
