//! SQLite persistence for profiles, providers, bookings and sessions.

mod schema;

pub use schema::*;

use crate::state_machine::Session;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt session body for {user_key}: {source}")]
    CorruptSession {
        user_key: String,
        source: serde_json::Error,
    },
    #[error("Corrupt column value: {0}")]
    CorruptColumn(#[from] UnknownVariant),
    #[error("Could not encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Database task failed: {0}")]
    Task(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Result of a versioned session write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    Written,
    /// Stored copy is at least as new as the one offered
    Stale { found: Option<u64> },
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        // Several instances may share one file
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run `f` on the blocking pool so a slow or locked database does not
    /// stall other users' turns
    pub async fn blocking<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn get_user(&self, user_key: &str) -> DbResult<Option<UserProfile>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT user_key, name, location, agreed_privacy_policy, onboarding_completed,
                        created_at, updated_at
                 FROM users WHERE user_key = ?1",
                params![user_key],
                |row| {
                    Ok(UserProfile {
                        user_key: row.get(0)?,
                        name: row.get(1)?,
                        location: row.get(2)?,
                        agreed_privacy_policy: row.get(3)?,
                        onboarding_completed: row.get(4)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                        updated_at: parse_datetime(&row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Insert or replace the mutable fields of a user profile.
    /// `None` fields keep whatever is stored.
    pub fn upsert_user(
        &self,
        user_key: &str,
        name: Option<&str>,
        location: Option<&str>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    ) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO users (user_key, name, location, agreed_privacy_policy, onboarding_completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_key) DO UPDATE SET
                name = COALESCE(excluded.name, users.name),
                location = COALESCE(excluded.location, users.location),
                agreed_privacy_policy = excluded.agreed_privacy_policy,
                onboarding_completed = excluded.onboarding_completed,
                updated_at = excluded.updated_at",
            params![user_key, name, location, agreed_privacy_policy, onboarding_completed, now],
        )?;
        Ok(())
    }

    pub fn update_user_location(&self, user_key: &str, location: &str) -> DbResult<bool> {
        let changed = self.conn().execute(
            "UPDATE users SET location = ?2, updated_at = ?3 WHERE user_key = ?1",
            params![user_key, location, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    // ==================== Provider Operations ====================

    pub fn get_provider(&self, handle: &str) -> DbResult<Option<Provider>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT handle, name, service_type, location, status, registered_at
             FROM providers WHERE handle = ?1",
        )?;
        let raw = stmt.query_row(params![handle], raw_provider).optional()?;
        raw.map(RawProvider::into_provider).transpose()
    }

    pub fn upsert_provider(&self, provider: &Provider) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO providers (handle, name, service_type, location, status, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(handle) DO UPDATE SET
                name = excluded.name,
                service_type = excluded.service_type,
                location = excluded.location,
                status = excluded.status",
            params![
                provider.handle,
                provider.name,
                provider.service_type,
                provider.location,
                provider.status.as_str(),
                provider.registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All matchable providers, ordered by name
    pub fn active_providers(&self) -> DbResult<Vec<Provider>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT handle, name, service_type, location, status, registered_at
             FROM providers WHERE status = 'active'
             ORDER BY name, handle",
        )?;
        let rows = stmt.query_map([], raw_provider)?;
        let mut providers = Vec::new();
        for row in rows {
            providers.push(row?.into_provider()?);
        }
        Ok(providers)
    }

    // ==================== Booking Operations ====================

    pub fn create_booking(&self, booking: &Booking) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO bookings (id, user_key, provider_handle, provider_name, service_type,
                                   issue, requested_time, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                booking.id,
                booking.user_key,
                booking.provider_handle,
                booking.provider_name,
                booking.service_type,
                booking.issue,
                booking.requested_time,
                booking.status.as_str(),
                booking.created_at.to_rfc3339(),
                booking.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_booking(&self, id: &str) -> DbResult<Option<Booking>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{BOOKING_SELECT} WHERE id = ?1"))?;
        let raw = stmt.query_row(params![id], raw_booking).optional()?;
        raw.map(RawBooking::into_booking).transpose()
    }

    /// Move a booking to `status` only if its current status allows it.
    ///
    /// The update is conditional on the predecessor status, so two instances
    /// racing on the same booking cannot both apply a transition.
    pub fn update_booking_status(&self, id: &str, status: BookingStatus) -> DbResult<StatusUpdate> {
        let conn = self.conn();
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM bookings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(StatusUpdate::NotFound);
        };
        let current: BookingStatus = current.parse()?;
        if !current.can_transition_to(status) {
            return Ok(StatusUpdate::Rejected { current });
        }

        let changed = conn.execute(
            "UPDATE bookings SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
            params![id, status.as_str(), Utc::now().to_rfc3339(), current.as_str()],
        )?;
        if changed == 0 {
            // Lost a race between the read and the write
            let now: String = conn.query_row(
                "SELECT status FROM bookings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            return Ok(StatusUpdate::Rejected {
                current: now.parse()?,
            });
        }
        Ok(StatusUpdate::Applied {
            from: current,
            to: status,
        })
    }

    pub fn find_pending_by_provider(&self, handle: &str) -> DbResult<Option<Booking>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{BOOKING_SELECT} WHERE provider_handle = ?1 AND status = 'pending'
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))?;
        let raw = stmt.query_row(params![handle], raw_booking).optional()?;
        raw.map(RawBooking::into_booking).transpose()
    }

    pub fn latest_for_provider(&self, handle: &str) -> DbResult<Option<Booking>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{BOOKING_SELECT} WHERE provider_handle = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))?;
        let raw = stmt.query_row(params![handle], raw_booking).optional()?;
        raw.map(RawBooking::into_booking).transpose()
    }

    // ==================== Session Operations ====================

    pub fn load_session(&self, user_key: &str) -> DbResult<Option<Session>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM sessions WHERE user_key = ?1",
                params![user_key],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| {
            serde_json::from_str(&b).map_err(|source| DbError::CorruptSession {
                user_key: user_key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Write `session` if no stored copy exists or the stored version is
    /// lower than `session.version`.
    pub fn save_session(&self, session: &Session) -> DbResult<SessionWrite> {
        let body = serde_json::to_string(session)?;
        let version = i64::try_from(session.version).unwrap_or(i64::MAX);
        let conn = self.conn();

        let changed = conn.execute(
            "INSERT INTO sessions (user_key, version, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_key) DO UPDATE SET
                version = excluded.version,
                body = excluded.body,
                updated_at = excluded.updated_at
             WHERE sessions.version < excluded.version",
            params![
                session.user_key,
                version,
                body,
                session.updated_at.to_rfc3339(),
            ],
        )?;

        if changed == 1 {
            return Ok(SessionWrite::Written);
        }

        let found: Option<i64> = conn
            .query_row(
                "SELECT version FROM sessions WHERE user_key = ?1",
                params![session.user_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(SessionWrite::Stale {
            found: found.and_then(|v| u64::try_from(v).ok()),
        })
    }
}

const BOOKING_SELECT: &str = "SELECT id, user_key, provider_handle, provider_name, service_type,
        issue, requested_time, status, created_at, updated_at FROM bookings";

struct RawProvider {
    handle: String,
    name: String,
    service_type: String,
    location: String,
    status: String,
    registered_at: String,
}

impl RawProvider {
    fn into_provider(self) -> DbResult<Provider> {
        Ok(Provider {
            handle: self.handle,
            name: self.name,
            service_type: self.service_type,
            location: self.location,
            status: self.status.parse()?,
            registered_at: parse_datetime(&self.registered_at),
        })
    }
}

fn raw_provider(row: &Row<'_>) -> rusqlite::Result<RawProvider> {
    Ok(RawProvider {
        handle: row.get(0)?,
        name: row.get(1)?,
        service_type: row.get(2)?,
        location: row.get(3)?,
        status: row.get(4)?,
        registered_at: row.get(5)?,
    })
}

struct RawBooking {
    id: String,
    user_key: String,
    provider_handle: String,
    provider_name: String,
    service_type: String,
    issue: String,
    requested_time: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawBooking {
    fn into_booking(self) -> DbResult<Booking> {
        Ok(Booking {
            id: self.id,
            user_key: self.user_key,
            provider_handle: self.provider_handle,
            provider_name: self.provider_name,
            service_type: self.service_type,
            issue: self.issue,
            requested_time: self.requested_time,
            status: self.status.parse()?,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

fn raw_booking(row: &Row<'_>) -> rusqlite::Result<RawBooking> {
    Ok(RawBooking {
        id: row.get(0)?,
        user_key: row.get(1)?,
        provider_handle: row.get(2)?,
        provider_name: row.get(3)?,
        service_type: row.get(4)?,
        issue: row.get(5)?,
        requested_time: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
