//! API request and response types

use serde::{Deserialize, Serialize};

use crate::db::Provider;
use crate::runtime::TurnOutcome;

#[derive(Debug, Serialize, Deserialize)]
pub struct InboundResponse {
    pub state: String,
    pub version: u64,
    pub delivered: usize,
    pub duplicate: bool,
    pub rolled_back: bool,
}

impl From<TurnOutcome> for InboundResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            state: outcome.state.to_string(),
            version: outcome.version,
            delivered: outcome.delivered,
            duplicate: outcome.duplicate,
            rolled_back: outcome.rolled_back,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub service: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<Provider>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
