//! HTTP request handlers

use super::types::{ErrorResponse, InboundResponse, ProviderQuery, ProvidersResponse};
use super::AppState;
use crate::runtime::RuntimeError;
use crate::state_machine::InboundEvent;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Parsed, verified messages from the webhook layer
        .route("/api/inbound", post(inbound))
        .route("/api/providers", get(list_providers))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Inbound events
// ============================================================

async fn inbound(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<InboundResponse>, AppError> {
    if event.user_key.trim().is_empty() {
        return Err(AppError::BadRequest("user_key is required".to_string()));
    }
    let outcome = state.runtime.handle(event).await?;
    Ok(Json(outcome.into()))
}

// ============================================================
// Provider directory
// ============================================================

async fn list_providers(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<ProvidersResponse>, AppError> {
    let providers = state
        .runtime
        .profiles()
        .providers_by_service_and_location(&query.service, &query.location)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ProvidersResponse { providers }))
}

async fn get_version() -> &'static str {
    concat!("hustlr ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    /// The upstream should redeliver later
    Unavailable(String),
    Internal(String),
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        tracing::error!(error = %e, "Inbound event not processed");
        AppError::Unavailable(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TransportHandle;
    use crate::db::{Provider, ProviderStatus};
    use crate::matching::ServiceCatalog;
    use crate::runtime::testing::{
        FlakySessionBackend, MemoryLedger, MemoryProfileStore, MemorySessionBackend, RecordingTransport,
    };
    use crate::runtime::{ConversationRuntime, RuntimeSettings};
    use crate::store::SessionBackend;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn state_with(sessions: Arc<dyn SessionBackend>, profiles: Arc<MemoryProfileStore>) -> AppState {
        let transport = TransportHandle::new(Box::new(RecordingTransport::new()), Duration::from_secs(1));
        let runtime = ConversationRuntime::new(
            sessions,
            profiles,
            Arc::new(MemoryLedger::new()),
            Arc::new(transport),
            Arc::new(ServiceCatalog::builtin()),
            RuntimeSettings::default(),
        );
        AppState::new(Arc::new(runtime))
    }

    #[tokio::test]
    async fn inbound_reports_outcome() {
        let state = state_with(
            Arc::new(MemorySessionBackend::new("memory")),
            Arc::new(MemoryProfileStore::new()),
        );
        let Json(body) = inbound(State(state), Json(InboundEvent::text("263771000001", "hi")))
            .await
            .unwrap();
        assert_eq!(body.state, "onboarding_name");
        assert_eq!(body.version, 1);
        assert_eq!(body.delivered, 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_503() {
        let state = state_with(
            Arc::new(FlakySessionBackend::failing("down")),
            Arc::new(MemoryProfileStore::new()),
        );
        let err = inbound(State(state), Json(InboundEvent::text("263771000001", "hi")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn blank_sender_is_rejected() {
        let state = state_with(
            Arc::new(MemorySessionBackend::new("memory")),
            Arc::new(MemoryProfileStore::new()),
        );
        let err = inbound(State(state), Json(InboundEvent::text("  ", "hi")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn providers_are_filtered() {
        let profiles = Arc::new(MemoryProfileStore::new());
        profiles.insert_provider(Provider {
            handle: "263772000002".into(),
            name: "Tendai Moyo".into(),
            service_type: "plumber".into(),
            location: "Avondale, Harare".into(),
            status: ProviderStatus::Active,
            registered_at: Utc::now(),
        });
        let state = state_with(Arc::new(MemorySessionBackend::new("memory")), profiles);

        let query = ProviderQuery {
            service: "plumber".into(),
            location: "Harare".into(),
        };
        let Json(body) = list_providers(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(body.providers.len(), 1);

        let query = ProviderQuery {
            service: "electrician".into(),
            location: "Harare".into(),
        };
        let Json(body) = list_providers(State(state), Query(query)).await.unwrap();
        assert!(body.providers.is_empty());
    }
}
