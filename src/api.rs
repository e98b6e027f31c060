//! HTTP ingress: inbound events from the webhook layer and a read-only
//! provider directory

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::{ErrorResponse, InboundResponse, ProvidersResponse};

use crate::runtime::ConversationRuntime;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ConversationRuntime>,
}

impl AppState {
    pub fn new(runtime: Arc<ConversationRuntime>) -> Self {
        Self { runtime }
    }
}
