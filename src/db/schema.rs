//! Database schema and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_key TEXT PRIMARY KEY,
    name TEXT,
    location TEXT,
    agreed_privacy_policy BOOLEAN NOT NULL DEFAULT 0,
    onboarding_completed BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS providers (
    handle TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    service_type TEXT NOT NULL,
    location TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_providers_service ON providers(service_type, status);

CREATE TABLE IF NOT EXISTS bookings (
    id TEXT PRIMARY KEY,
    user_key TEXT NOT NULL,
    provider_handle TEXT NOT NULL,
    provider_name TEXT NOT NULL,
    service_type TEXT NOT NULL,
    issue TEXT NOT NULL,
    requested_time TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookings_provider ON bookings(provider_handle, status, created_at DESC);

CREATE TABLE IF NOT EXISTS sessions (
    user_key TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Field limits carried over from the provider/user registration models
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SERVICE_TYPE_LEN: usize = 50;
pub const MAX_LOCATION_LEN: usize = 100;

/// A requesting user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_key: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub agreed_privacy_policy: bool,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Whether the user has finished onboarding and can start booking
    pub fn is_complete(&self) -> bool {
        self.onboarding_completed
            && self.agreed_privacy_policy
            && self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Provider lifecycle status. `Pending -> Active` needs an external approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Pending,
    Inactive,
}

impl ProviderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Pending => "pending",
            ProviderStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProviderStatus::Active),
            "pending" => Ok(ProviderStatus::Pending),
            "inactive" => Ok(ProviderStatus::Inactive),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A service provider record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub handle: String,
    pub name: String,
    pub service_type: String,
    /// Free text, usually "Suburb, City" or "12 Some Street, City"
    pub location: String,
    pub status: ProviderStatus,
    pub registered_at: DateTime<Utc>,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }
}

/// Booking status.
///
/// Allowed moves: pending -> confirmed, pending -> declined,
/// confirmed -> completed. Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Declined,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Declined => "declined",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed | BookingStatus::Declined)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }

    /// The status a booking must currently hold for `self` to be applied
    pub fn required_predecessor(self) -> Option<BookingStatus> {
        match self {
            BookingStatus::Confirmed | BookingStatus::Declined => Some(BookingStatus::Pending),
            BookingStatus::Completed => Some(BookingStatus::Confirmed),
            BookingStatus::Pending => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "declined" => Ok(BookingStatus::Declined),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A booking between one user and one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_key: String,
    pub provider_handle: String,
    pub provider_name: String,
    pub service_type: String,
    pub issue: String,
    /// Kept as the user wrote it; no calendar parsing
    pub requested_time: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a conditional booking status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// The booking's current status does not allow the requested move
    Rejected { current: BookingStatus },
    NotFound,
}

impl StatusUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied { .. })
    }
}

/// A stored enum column held a value this build does not know
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
