//! Outputs produced by state transitions

use crate::db::{Booking, BookingStatus, Provider};
use serde::Serialize;

/// A message to deliver through the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
        }
    }
}

/// Side effects the runtime executes against the profile store and ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Create or complete a user profile
    UpsertUser {
        user_key: String,
        name: Option<String>,
        location: Option<String>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    },

    /// Remember where the user last searched
    UpdateUserLocation { user_key: String, location: String },

    CreateBooking(Booking),

    /// Conditional status change. `on_applied` is only delivered when the
    /// ledger actually performed the transition, `on_rejected` only when it
    /// refused it (booking missing or no longer pending).
    ResolveBooking {
        booking_id: String,
        status: BookingStatus,
        on_applied: Vec<OutboundMessage>,
        on_rejected: Vec<OutboundMessage>,
    },

    RegisterProvider(Provider),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::UpsertUser { .. } => "upsert_user",
            Command::UpdateUserLocation { .. } => "update_user_location",
            Command::CreateBooking(_) => "create_booking",
            Command::ResolveBooking { .. } => "resolve_booking",
            Command::RegisterProvider(_) => "register_provider",
        }
    }

    /// Whether a failure must undo the turn that produced this command
    pub fn is_critical(&self) -> bool {
        !matches!(self, Command::UpdateUserLocation { .. })
    }
}
