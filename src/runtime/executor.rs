//! Conversation runtime executor

use super::locks::KeyedLocks;
use super::traits::{BookingLedger, ProfileStore};

use crate::collaborators::{bounded, Geocoder, IntentClassifier, TransportHandle};
use crate::db::{BookingStatus, StatusUpdate, UserProfile};
use crate::matching::keywords::{is_exactly, provider_reply, CANCEL, HELP, REGISTER, RESTART};
use crate::matching::provider::DEFAULT_CANDIDATE_LIMIT;
use crate::matching::{GeoBounds, ServiceCatalog};
use crate::state_machine::{
    step, turn_failed, Command, ConvState, InboundEvent, OutboundMessage, Session, StepContext,
    TransitionResult, LAST_MESSAGE_ID,
};
use crate::store::{SessionBackend, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("session {user_key} kept changing concurrently; gave up after {attempts} attempts")]
    ConflictRetriesExhausted { user_key: String, attempts: u32 },
}

impl From<StoreError> for RuntimeError {
    fn from(e: StoreError) -> Self {
        RuntimeError::Persistence(e.to_string())
    }
}

/// Tunables for [`ConversationRuntime`]
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Step attempts per event when the session write conflicts
    pub max_attempts: u32,
    pub max_candidates: usize,
    pub bounds: GeoBounds,
    pub geocoder_timeout: Duration,
    pub classifier_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_candidates: DEFAULT_CANDIDATE_LIMIT,
            bounds: GeoBounds::default(),
            geocoder_timeout: Duration::from_millis(4000),
            classifier_timeout: Duration::from_millis(3000),
        }
    }
}

/// What handling one event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// State label after the turn
    pub state: &'static str,
    pub version: u64,
    /// Messages the transport accepted
    pub delivered: usize,
    /// The event repeated the last processed message id
    pub duplicate: bool,
    /// A critical command failed and the session was restored
    pub rolled_back: bool,
}

impl TurnOutcome {
    fn for_session(session: &Session) -> Self {
        Self {
            state: session.state.label(),
            version: session.version,
            delivered: 0,
            duplicate: false,
            rolled_back: false,
        }
    }
}

/// Drives the state machine for every user.
///
/// Turns for one `user_key` are serialized in-process by [`KeyedLocks`];
/// across processes the versioned session write detects interleaving and
/// the turn is re-run on the fresh session.
pub struct ConversationRuntime {
    sessions: Arc<dyn SessionBackend>,
    profiles: Arc<dyn ProfileStore>,
    ledger: Arc<dyn BookingLedger>,
    transport: Arc<TransportHandle>,
    geocoder: Option<Arc<dyn Geocoder>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    catalog: Arc<ServiceCatalog>,
    settings: RuntimeSettings,
    locks: KeyedLocks,
}

impl ConversationRuntime {
    pub fn new(
        sessions: Arc<dyn SessionBackend>,
        profiles: Arc<dyn ProfileStore>,
        ledger: Arc<dyn BookingLedger>,
        transport: Arc<TransportHandle>,
        catalog: Arc<ServiceCatalog>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            sessions,
            profiles,
            ledger,
            transport,
            geocoder: None,
            classifier: None,
            catalog,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Handle one inbound event end to end.
    ///
    /// `Err` means nothing was committed: no session write, no command and
    /// no reply. The caller should let the transport redeliver.
    pub async fn handle(&self, event: InboundEvent) -> Result<TurnOutcome, RuntimeError> {
        let _turn = self.locks.lock(&event.user_key).await;
        let attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=attempts {
            let base = self
                .sessions
                .load(&event.user_key)
                .await?
                .unwrap_or_else(|| Session::new(&event.user_key, event.received_at));

            if is_duplicate(&base, &event) {
                tracing::info!(
                    user_key = %event.user_key,
                    message_id = ?event.message_id,
                    "Duplicate delivery ignored"
                );
                return Ok(TurnOutcome {
                    duplicate: true,
                    ..TurnOutcome::for_session(&base)
                });
            }

            let ctx = self.gather(&base, &event).await?;
            let mut result = step(&base, &event, &ctx);
            result.session.version = base.version + 1;

            match self.sessions.save(&result.session).await {
                Ok(()) => {
                    tracing::info!(
                        user_key = %event.user_key,
                        kind = event.kind(),
                        from = base.state.label(),
                        to = result.session.state.label(),
                        version = result.session.version,
                        commands = result.commands.len(),
                        "Turn committed"
                    );
                    return Ok(self.apply(&base, result).await);
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        user_key = %event.user_key,
                        attempt,
                        error = %e,
                        "Session write conflicted, re-running step"
                    );
                }
                Err(e) => {
                    tracing::error!(user_key = %event.user_key, error = %e, "Session write failed");
                    return Err(e.into());
                }
            }
        }

        Err(RuntimeError::ConflictRetriesExhausted {
            user_key: event.user_key,
            attempts,
        })
    }

    /// Read everything `step` may need for this event
    async fn gather(&self, session: &Session, event: &InboundEvent) -> Result<StepContext, RuntimeError> {
        let user_key = event.user_key.as_str();
        let text = event.text_body().unwrap_or_default();

        let mut ctx = StepContext::new(Utc::now(), Uuid::new_v4().to_string(), self.catalog.clone());
        ctx.bounds = self.settings.bounds;
        ctx.max_candidates = self.settings.max_candidates;

        if let Some(profile) = self.profiles.get_user(user_key).await.map_err(RuntimeError::Persistence)? {
            ctx = ctx.with_profile(profile);
        }

        if provider_reply(text).is_some() {
            let pending = self
                .ledger
                .find_pending_by_provider(user_key)
                .await
                .map_err(RuntimeError::Persistence)?;
            let booking = match pending {
                Some(booking) => Some(booking),
                None => self
                    .ledger
                    .latest_for_provider(user_key)
                    .await
                    .map_err(RuntimeError::Persistence)?,
            };
            if let Some(booking) = booking {
                ctx = ctx.with_provider_booking(booking);
            }
        }

        if let ConvState::BookingPendingProvider { booking_id, .. } = &session.state {
            if let Some(booking) = self.ledger.get(booking_id).await.map_err(RuntimeError::Persistence)? {
                ctx = ctx.with_tracked_booking(booking);
            }
        }

        if session.state.needs_directory() {
            let directory = self
                .profiles
                .active_providers()
                .await
                .map_err(RuntimeError::Persistence)?;
            ctx = ctx.with_directory(directory);

            if let Some(place) = self.geocode(event).await {
                ctx = ctx.with_geocoded(place);
            }
        }

        if self.may_classify(session, text, &ctx) {
            if let Some(service) = self.classify(user_key, text).await {
                ctx = ctx.with_classified_service(service);
            }
        }

        Ok(ctx)
    }

    async fn geocode(&self, event: &InboundEvent) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        let (latitude, longitude) = event.coordinates()?;
        if !self.settings.bounds.contains(latitude, longitude) {
            return None;
        }
        let call = geocoder.reverse_geocode(latitude, longitude);
        match bounded("geocoder", self.settings.geocoder_timeout, call).await {
            Ok(place) => Some(place),
            Err(e) => {
                tracing::warn!(user_key = %event.user_key, error = %e, "Reverse geocoding failed");
                None
            }
        }
    }

    /// The classifier is only worth asking when the message will be read
    /// as a service search and the keyword catalog found nothing
    fn may_classify(&self, session: &Session, text: &str, ctx: &StepContext) -> bool {
        if self.classifier.is_none() || text.is_empty() || ctx.provider_booking.is_some() {
            return false;
        }
        if !ctx.profile.as_ref().is_some_and(UserProfile::is_complete) {
            return false;
        }
        let searching = match &session.state {
            ConvState::New | ConvState::ServiceSearch => true,
            ConvState::BookingPendingProvider { .. } => !ctx
                .tracked_booking
                .as_ref()
                .is_some_and(|b| b.status == BookingStatus::Pending),
            _ => false,
        };
        let keyword = [HELP, REGISTER, RESTART, CANCEL]
            .iter()
            .any(|set| is_exactly(text, set));
        searching && !keyword && self.catalog.extract(text).is_none()
    }

    async fn classify(&self, user_key: &str, text: &str) -> Option<String> {
        let classifier = self.classifier.as_ref()?;
        match bounded("classifier", self.settings.classifier_timeout, classifier.classify(text)).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(user_key, error = %e, "Intent classification failed");
                None
            }
        }
    }

    /// Execute a committed turn's commands, then deliver its messages
    async fn apply(&self, base: &Session, result: TransitionResult) -> TurnOutcome {
        let TransitionResult {
            session,
            messages,
            commands,
        } = result;
        let mut outbox = messages;

        for command in &commands {
            match self.execute(command).await {
                Ok(extra) => outbox.extend(extra),
                Err(e) if command.is_critical() => {
                    tracing::error!(
                        user_key = %session.user_key,
                        command = command.name(),
                        error = %e,
                        "Command failed, rolling back turn"
                    );
                    let restored = self.roll_back(base, &session).await;
                    let notice = OutboundMessage::new(&session.user_key, turn_failed());
                    return TurnOutcome {
                        delivered: self.deliver(std::slice::from_ref(&notice)).await,
                        rolled_back: true,
                        ..TurnOutcome::for_session(&restored)
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        user_key = %session.user_key,
                        command = command.name(),
                        error = %e,
                        "Command failed"
                    );
                }
            }
        }

        TurnOutcome {
            delivered: self.deliver(&outbox).await,
            ..TurnOutcome::for_session(&session)
        }
    }

    /// Write the pre-step session back over the committed one
    async fn roll_back(&self, base: &Session, committed: &Session) -> Session {
        let mut restored = base.clone();
        restored.version = committed.version + 1;
        restored.updated_at = Utc::now();
        match self.sessions.save(&restored).await {
            Ok(()) => restored,
            Err(e) => {
                tracing::error!(
                    user_key = %base.user_key,
                    error = %e,
                    "Could not restore session after failed command"
                );
                committed.clone()
            }
        }
    }

    /// Returns messages to deliver on success
    async fn execute(&self, command: &Command) -> Result<Vec<OutboundMessage>, String> {
        match command {
            Command::UpsertUser {
                user_key,
                name,
                location,
                agreed_privacy_policy,
                onboarding_completed,
            } => {
                self.profiles
                    .upsert_user(
                        user_key,
                        name.as_deref(),
                        location.as_deref(),
                        *agreed_privacy_policy,
                        *onboarding_completed,
                    )
                    .await?;
            }
            Command::UpdateUserLocation { user_key, location } => {
                if !self.profiles.update_user_location(user_key, location).await? {
                    tracing::debug!(user_key = %user_key, "No profile to record location on");
                }
            }
            Command::CreateBooking(booking) => {
                self.ledger.create(booking).await?;
                tracing::info!(
                    booking_id = %booking.id,
                    user_key = %booking.user_key,
                    provider = %booking.provider_handle,
                    "Booking created"
                );
            }
            Command::ResolveBooking {
                booking_id,
                status,
                on_applied,
                on_rejected,
            } => {
                return match self.ledger.update_status(booking_id, *status).await? {
                    StatusUpdate::Applied { from, to } => {
                        tracing::info!(booking_id = %booking_id, %from, %to, "Booking resolved");
                        Ok(on_applied.clone())
                    }
                    StatusUpdate::Rejected { current } => {
                        tracing::warn!(
                            booking_id = %booking_id,
                            %current,
                            requested = %status,
                            "Booking transition rejected"
                        );
                        Ok(on_rejected.clone())
                    }
                    StatusUpdate::NotFound => {
                        tracing::warn!(booking_id = %booking_id, "Booking to resolve not found");
                        Ok(on_rejected.clone())
                    }
                };
            }
            Command::RegisterProvider(provider) => {
                self.profiles.upsert_provider(provider).await?;
                tracing::info!(
                    handle = %provider.handle,
                    service = %provider.service_type,
                    status = %provider.status.as_str(),
                    "Provider registered"
                );
            }
        }
        Ok(Vec::new())
    }

    /// Send in order; failures are logged and do not stop later messages
    async fn deliver(&self, messages: &[OutboundMessage]) -> usize {
        let mut delivered = 0;
        for message in messages {
            match self.transport.send(&message.to, &message.text).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(to = %message.to, error = %e, "Outbound message failed"),
            }
        }
        delivered
    }
}

fn is_duplicate(session: &Session, event: &InboundEvent) -> bool {
    event
        .message_id
        .as_deref()
        .is_some_and(|id| session.metadata.get(LAST_MESSAGE_ID).map(String::as_str) == Some(id))
}
