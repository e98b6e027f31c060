//! Session storage with ranked fallback backends
//!
//! Every backend implements versioned, conditional writes: a save only
//! lands when the stored copy is older than the session offered. The
//! [`FallbackSessionStore`] fronts an ordered list of backends, each
//! guarded by a [`CircuitBreaker`].

mod breaker;
mod sled;
mod sqlite;

pub use breaker::CircuitBreaker;
pub use self::sled::SledSessionBackend;
pub use sqlite::SqliteSessionBackend;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::DbError;
use crate::state_machine::Session;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no session backend available: {0}")]
    Unavailable(String),

    /// The stored session is at least as new as the one being written
    #[error("session {user_key} changed concurrently (stored version {found:?})")]
    Conflict {
        user_key: String,
        found: Option<u64>,
    },

    #[error("session encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] DbError),

    #[error("sled: {0}")]
    Sled(#[from] ::sled::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// A durable home for sessions
#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError>;

    /// Persist `session` unless the stored copy has a version greater than
    /// or equal to `session.version`, which is a `Conflict`.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SessionBackend + ?Sized> SessionBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        (**self).load(user_key).await
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        (**self).save(session).await
    }
}

struct Ranked {
    backend: Arc<dyn SessionBackend>,
    breaker: CircuitBreaker,
}

/// Ranked backends; the first is primary.
///
/// Loads and saves go to the first healthy backend, in rank order; a lower
/// rank is only consulted when every backend above it failed or has its
/// circuit open. Backends are never read side by side or synchronized.
pub struct FallbackSessionStore {
    backends: Vec<Ranked>,
}

impl FallbackSessionStore {
    pub fn new(
        backends: Vec<Arc<dyn SessionBackend>>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            backends: backends
                .into_iter()
                .map(|backend| Ranked {
                    backend,
                    breaker: CircuitBreaker::new(failure_threshold, cooldown),
                })
                .collect(),
        }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|r| r.backend.name()).collect()
    }

    fn record_failure(ranked: &Ranked, op: &str, error: &StoreError) {
        tracing::warn!(backend = ranked.backend.name(), op, error = %error, "Session backend failed");
        if ranked.breaker.record_failure() {
            tracing::error!(backend = ranked.backend.name(), "Session backend circuit opened");
        }
    }
}

#[async_trait]
impl SessionBackend for FallbackSessionStore {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        let mut errors = Vec::new();

        for ranked in &self.backends {
            if !ranked.breaker.allow() {
                errors.push(format!("{}: circuit open", ranked.backend.name()));
                continue;
            }
            match ranked.backend.load(user_key).await {
                Ok(found) => {
                    ranked.breaker.record_success();
                    return Ok(found);
                }
                Err(e) => {
                    Self::record_failure(ranked, "load", &e);
                    errors.push(format!("{}: {e}", ranked.backend.name()));
                }
            }
        }

        Err(StoreError::Unavailable(errors.join("; ")))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut errors = Vec::new();

        for ranked in &self.backends {
            if !ranked.breaker.allow() {
                errors.push(format!("{}: circuit open", ranked.backend.name()));
                continue;
            }
            match ranked.backend.save(session).await {
                Ok(()) => {
                    ranked.breaker.record_success();
                    tracing::debug!(
                        backend = ranked.backend.name(),
                        user_key = %session.user_key,
                        version = session.version,
                        "Session saved"
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    // The backend is healthy; the caller lost a race
                    ranked.breaker.record_success();
                    return Err(e);
                }
                Err(e) => {
                    Self::record_failure(ranked, "save", &e);
                    errors.push(format!("{}: {e}", ranked.backend.name()));
                }
            }
        }

        Err(StoreError::Unavailable(errors.join("; ")))
    }
}
