//! Hustlr - WhatsApp conversational booking backend
//!
//! Serves the inbound event API and wires the runtime to SQLite, sled and
//! the external collaborators.

use hustlr::api::{create_router, AppState};
use hustlr::collaborators::{
    CloudApiTransport, HttpIntentClassifier, LogTransport, NominatimGeocoder, Transport,
    TransportHandle,
};
use hustlr::config::{AppConfig, BackendKind, WhatsAppConfig};
use hustlr::db::Database;
use hustlr::matching::ServiceCatalog;
use hustlr::runtime::ConversationRuntime;
use hustlr::signals::{reload_transport_on_hangup, shutdown_signal};
use hustlr::store::{FallbackSessionStore, SessionBackend, SledSessionBackend, SqliteSessionBackend};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hustlr=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    for path in [&config.db_path, &config.sled_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Session backends in configured rank order
    let mut backends: Vec<Arc<dyn SessionBackend>> = Vec::new();
    for kind in &config.session_backends {
        match kind {
            BackendKind::Sqlite => backends.push(Arc::new(SqliteSessionBackend::new(db.clone()))),
            BackendKind::Sled => match SledSessionBackend::open(&config.sled_path) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => tracing::warn!(
                    path = %config.sled_path.display(),
                    error = %e,
                    "sled session backend unavailable, continuing without it"
                ),
            },
        }
    }
    if backends.is_empty() {
        return Err("no session backend could be opened".into());
    }
    let sessions = FallbackSessionStore::new(backends, config.breaker_threshold, config.breaker_cooldown);
    tracing::info!(
        backends = ?sessions.backend_names(),
        multi_instance = config.multi_instance,
        "Session store ready"
    );

    let catalog = match &config.service_keywords {
        Some(path) => ServiceCatalog::with_extra_file(path)?,
        None => ServiceCatalog::builtin(),
    };
    tracing::info!(services = catalog.services().len(), "Service catalog loaded");

    let transport = Arc::new(TransportHandle::new(
        build_transport(config.whatsapp.as_ref(), config.transport_timeout)?,
        config.transport_timeout,
    ));

    let mut runtime = ConversationRuntime::new(
        Arc::new(sessions),
        Arc::new(db.clone()),
        Arc::new(db),
        transport.clone(),
        Arc::new(catalog),
        config.runtime_settings(),
    );
    if let Some(url) = &config.geocoder_url {
        tracing::info!(url = %url, "Reverse geocoding enabled");
        runtime = runtime.with_geocoder(Arc::new(NominatimGeocoder::new(url, config.geocoder_timeout)?));
    }
    if let Some(url) = &config.classifier_url {
        tracing::info!(url = %url, "Intent classifier enabled");
        runtime = runtime.with_classifier(Arc::new(HttpIntentClassifier::new(url, config.classifier_timeout)?));
    }

    let whatsapp = config.whatsapp.clone();
    let timeout = config.transport_timeout;
    reload_transport_on_hangup(transport, move || build_transport(whatsapp.as_ref(), timeout))?;

    let app = create_router(AppState::new(Arc::new(runtime)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Hustlr server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Cloud API transport when credentials are configured, otherwise a
/// transport that only logs
fn build_transport(
    whatsapp: Option<&WhatsAppConfig>,
    timeout: Duration,
) -> Result<Box<dyn Transport>, String> {
    let Some(whatsapp) = whatsapp else {
        tracing::warn!("WhatsApp credentials not configured; outbound messages will only be logged");
        return Ok(Box::new(LogTransport));
    };
    let token = whatsapp
        .token
        .token()
        .map_err(|e| format!("reading WhatsApp access token: {e}"))?;
    let transport = CloudApiTransport::new(&whatsapp.messages_url, token, timeout)
        .map_err(|e| e.to_string())?;
    Ok(Box::new(transport))
}
