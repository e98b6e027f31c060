//! SQLite session backend

use async_trait::async_trait;

use super::{SessionBackend, StoreError};
use crate::db::{Database, SessionWrite};
use crate::state_machine::Session;

/// Sessions stored in the `sessions` table beside profiles and bookings
#[derive(Clone)]
pub struct SqliteSessionBackend {
    db: Database,
}

impl SqliteSessionBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        let user_key = user_key.to_string();
        Ok(self.db.blocking(move |db| db.load_session(&user_key)).await?)
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let body = session.clone();
        match self.db.blocking(move |db| db.save_session(&body)).await? {
            SessionWrite::Written => Ok(()),
            SessionWrite::Stale { found } => Err(StoreError::Conflict {
                user_key: session.user_key.clone(),
                found,
            }),
        }
    }
}
