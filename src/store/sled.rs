//! Embedded sled session backend

use async_trait::async_trait;
use std::path::Path;

use super::{SessionBackend, StoreError};
use crate::state_machine::Session;

const TREE: &str = "sessions";

/// Sessions as JSON values in a sled tree keyed by user key
#[derive(Clone)]
pub struct SledSessionBackend {
    tree: sled::Tree,
}

impl SledSessionBackend {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            tree: db.open_tree(TREE)?,
        })
    }

    /// Throwaway database, removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            tree: db.open_tree(TREE)?,
        })
    }

    fn decode(bytes: &[u8]) -> Result<Session, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[async_trait]
impl SessionBackend for SledSessionBackend {
    fn name(&self) -> &str {
        "sled"
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        self.tree
            .get(user_key.as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let key = session.user_key.as_bytes();
        let body = serde_json::to_vec(session)?;

        loop {
            let current = self.tree.get(key)?;
            if let Some(bytes) = &current {
                let stored = Self::decode(bytes)?;
                if stored.version >= session.version {
                    return Err(StoreError::Conflict {
                        user_key: session.user_key.clone(),
                        found: Some(stored.version),
                    });
                }
            }
            // Lost a race between get and swap: re-read and re-check
            if self
                .tree
                .compare_and_swap(key, current, Some(body.as_slice()))?
                .is_ok()
            {
                self.tree.flush()?;
                return Ok(());
            }
        }
    }
}
