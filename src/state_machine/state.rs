//! Conversation state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::Provider;

// ============================================================================
// Provider references carried through a booking flow
// ============================================================================

/// The slice of a provider record a booking flow needs to remember
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub handle: String,
    pub name: String,
    pub location: String,
}

impl From<&Provider> for ProviderSummary {
    fn from(p: &Provider) -> Self {
        Self {
            handle: p.handle.clone(),
            name: p.name.clone(),
            location: p.location.clone(),
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Sub-steps of provider self-registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RegistrationStep {
    Name,
    ServiceType { name: String },
    Area { name: String, service_type: String },
}

/// Conversation state. Each variant carries exactly the fields collected
/// so far in its flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// First contact, or a finished/abandoned flow
    #[default]
    New,

    OnboardingName,

    OnboardingPrivacy { name: String },

    /// Waiting for the user to say what service they need
    ServiceSearch,

    BookingLocation { service_type: String },

    ProviderSelection {
        service_type: String,
        location: String,
        candidates: Vec<ProviderSummary>,
    },

    BookingServiceDetails {
        service_type: String,
        location: String,
        provider: ProviderSummary,
    },

    BookingTime {
        service_type: String,
        location: String,
        provider: ProviderSummary,
        issue: String,
    },

    BookingConfirm {
        service_type: String,
        location: String,
        provider: ProviderSummary,
        issue: String,
        requested_time: String,
    },

    /// Booking created, waiting for the provider to accept or deny
    BookingPendingProvider {
        booking_id: String,
        provider: ProviderSummary,
        service_type: String,
    },

    ProviderRegister { step: RegistrationStep },
}

impl ConvState {
    /// Stable snake_case label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            ConvState::New => "new",
            ConvState::OnboardingName => "onboarding_name",
            ConvState::OnboardingPrivacy { .. } => "onboarding_privacy",
            ConvState::ServiceSearch => "service_search",
            ConvState::BookingLocation { .. } => "booking_location",
            ConvState::ProviderSelection { .. } => "provider_selection",
            ConvState::BookingServiceDetails { .. } => "booking_service_details",
            ConvState::BookingTime { .. } => "booking_time",
            ConvState::BookingConfirm { .. } => "booking_confirm",
            ConvState::BookingPendingProvider { .. } => "booking_pending_provider",
            ConvState::ProviderRegister { .. } => "provider_register",
        }
    }

    pub fn is_onboarding(&self) -> bool {
        matches!(
            self,
            ConvState::New | ConvState::OnboardingName | ConvState::OnboardingPrivacy { .. }
        )
    }

    /// Whether handling the next message may consult the provider directory
    pub fn needs_directory(&self) -> bool {
        matches!(self, ConvState::BookingLocation { .. })
    }
}

// ============================================================================
// Session
// ============================================================================

/// Durable per-user conversation record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_key: String,
    pub state: ConvState,
    /// Diagnostic fields that are optional in every state
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Number of successful writes; 0 means never persisted
    #[serde(default)]
    pub version: u64,
    pub last_activity: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_key: user_key.into(),
            state: ConvState::New,
            metadata: BTreeMap::new(),
            version: 0,
            last_activity: now,
            updated_at: now,
        }
    }

    /// Successor with a new state, stamped at `now`. The version is left
    /// alone; the runtime bumps it when it writes.
    pub fn advance(&self, state: ConvState, now: DateTime<Utc>) -> Self {
        Self {
            user_key: self.user_key.clone(),
            state,
            metadata: self.metadata.clone(),
            version: self.version,
            last_activity: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_type_tag() {
        let state = ConvState::BookingLocation {
            service_type: "plumber".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "booking_location");
        assert_eq!(json["service_type"], "plumber");

        let reg = ConvState::ProviderRegister {
            step: RegistrationStep::ServiceType {
                name: "Tendai".into(),
            },
        };
        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["step"]["step"], "service_type");
        let back: ConvState = serde_json::from_value(json).unwrap();
        assert_eq!(back, reg);
    }

    #[test]
    fn labels_match_serde_tags() {
        let states = [
            ConvState::New,
            ConvState::OnboardingName,
            ConvState::ServiceSearch,
            ConvState::OnboardingPrivacy { name: "A".into() },
            ConvState::ProviderRegister {
                step: RegistrationStep::Name,
            },
        ];
        for state in states {
            let json = serde_json::to_value(&state).unwrap();
            assert_eq!(json["type"], state.label());
        }
    }

    #[test]
    fn advance_keeps_identity_and_version() {
        let now = Utc::now();
        let mut session = Session::new("u1", now);
        session.version = 4;
        session.metadata.insert("last_message_id".into(), "m1".into());

        let later = now + chrono::Duration::seconds(5);
        let next = session.advance(ConvState::ServiceSearch, later);
        assert_eq!(next.user_key, "u1");
        assert_eq!(next.version, 4);
        assert_eq!(next.metadata.get("last_message_id").map(String::as_str), Some("m1"));
        assert_eq!(next.updated_at, later);
        assert_eq!(session.state, ConvState::New);
    }
}
