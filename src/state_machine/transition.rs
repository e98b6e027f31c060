//! Pure conversation step

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::confirmation;
use super::effect::{Command, OutboundMessage};
use super::event::InboundEvent;
use super::prompts;
use super::state::{ConvState, ProviderSummary, RegistrationStep, Session};
use crate::db::{
    Booking, BookingStatus, Provider, ProviderStatus, UserProfile, MAX_LOCATION_LEN, MAX_NAME_LEN,
    MAX_SERVICE_TYPE_LEN,
};
use crate::matching::keywords::{
    is_exactly, provider_reply, starts_with_any, AFFIRMATIVE, CANCEL, HELP, REGISTER, RESTART,
};
use crate::matching::normalize::{normalize, title_case};
use crate::matching::provider::DEFAULT_CANDIDATE_LIMIT;
use crate::matching::{match_providers, GeoBounds, LocationResolver, Resolution, ServiceCatalog};

/// Metadata key holding the transport id of the last handled message
pub const LAST_MESSAGE_ID: &str = "last_message_id";

const EXAMPLE_SERVICES: usize = 5;
const LISTED_LOCATIONS: usize = 8;

/// Everything a step may consult, gathered by the runtime beforehand
#[derive(Debug, Clone)]
pub struct StepContext {
    pub profile: Option<UserProfile>,
    /// Active providers; only loaded when the state needs it
    pub directory: Vec<Provider>,
    /// Most recent booking addressed to the sender as a provider
    pub provider_booking: Option<Booking>,
    /// The booking a `BookingPendingProvider` session is waiting on
    pub tracked_booking: Option<Booking>,
    /// Shaped reverse-geocoder answer for a shared pin
    pub geocoded: Option<String>,
    /// Canonical service suggested by the intent classifier
    pub classified_service: Option<String>,
    /// Id to use if this step creates a booking
    pub booking_id: String,
    pub now: DateTime<Utc>,
    pub catalog: Arc<ServiceCatalog>,
    pub bounds: GeoBounds,
    pub max_candidates: usize,
}

impl StepContext {
    pub fn new(now: DateTime<Utc>, booking_id: impl Into<String>, catalog: Arc<ServiceCatalog>) -> Self {
        Self {
            profile: None,
            directory: Vec::new(),
            provider_booking: None,
            tracked_booking: None,
            geocoded: None,
            classified_service: None,
            booking_id: booking_id.into(),
            now,
            catalog,
            bounds: GeoBounds::default(),
            max_candidates: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_directory(mut self, directory: Vec<Provider>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_provider_booking(mut self, booking: Booking) -> Self {
        self.provider_booking = Some(booking);
        self
    }

    pub fn with_tracked_booking(mut self, booking: Booking) -> Self {
        self.tracked_booking = Some(booking);
        self
    }

    pub fn with_geocoded(mut self, place: impl Into<String>) -> Self {
        self.geocoded = Some(place.into());
        self
    }

    pub fn with_classified_service(mut self, service: impl Into<String>) -> Self {
        self.classified_service = Some(service.into());
        self
    }

    fn profile_complete(&self) -> bool {
        self.profile.as_ref().is_some_and(UserProfile::is_complete)
    }

    fn profile_name(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.name.as_deref())
    }
}

/// Result of a step
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub session: Session,
    pub messages: Vec<OutboundMessage>,
    pub commands: Vec<Command>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            messages: vec![],
            commands: vec![],
        }
    }

    pub fn with_message(mut self, message: OutboundMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }
}

/// Move `state` to `to`, replying to the sender with `text`
fn reply(session: &Session, ctx: &StepContext, to: ConvState, text: String) -> TransitionResult {
    TransitionResult::new(session.advance(to, ctx.now))
        .with_message(OutboundMessage::new(&session.user_key, text))
}

/// Reply without changing state
fn stay(session: &Session, ctx: &StepContext, text: String) -> TransitionResult {
    reply(session, ctx, session.state.clone(), text)
}

/// Handle one inbound event.
///
/// Pure: the same session, event and context always produce the same
/// result, and nothing is read or written outside the arguments.
pub fn step(session: &Session, event: &InboundEvent, ctx: &StepContext) -> TransitionResult {
    let mut result = dispatch(session, event, ctx);
    if let Some(id) = &event.message_id {
        result
            .session
            .metadata
            .insert(LAST_MESSAGE_ID.to_string(), id.clone());
    }
    result
}

fn dispatch(session: &Session, event: &InboundEvent, ctx: &StepContext) -> TransitionResult {
    let text = event.text_body().unwrap_or_default();

    if let (Some(answer), Some(booking)) = (provider_reply(text), ctx.provider_booking.as_ref()) {
        return confirmation::handle_provider_reply(session, booking, answer, ctx);
    }

    if session.state != ConvState::New && is_exactly(text, RESTART) {
        return reply(session, ctx, ConvState::New, prompts::restarted());
    }

    if !ctx.profile_complete() && !session.state.is_onboarding() {
        return on_new(session, event, ctx);
    }

    match &session.state {
        ConvState::New => on_new(session, event, ctx),
        ConvState::OnboardingName => on_onboarding_name(session, text, ctx),
        ConvState::OnboardingPrivacy { name } => on_onboarding_privacy(session, text, name, ctx),
        ConvState::ServiceSearch => on_service_search(session, event, ctx),
        ConvState::BookingLocation { service_type } => {
            on_booking_location(session, event, service_type, ctx)
        }
        ConvState::ProviderSelection {
            service_type,
            location,
            candidates,
        } => on_provider_selection(session, text, service_type, location, candidates, ctx),
        ConvState::BookingServiceDetails {
            service_type,
            location,
            provider,
        } => {
            if text.is_empty() {
                return stay(session, ctx, prompts::ask_issue_again());
            }
            let next = ConvState::BookingTime {
                service_type: service_type.clone(),
                location: location.clone(),
                provider: provider.clone(),
                issue: text.to_string(),
            };
            reply(session, ctx, next, prompts::ask_time())
        }
        ConvState::BookingTime {
            service_type,
            location,
            provider,
            issue,
        } => {
            if text.is_empty() {
                return stay(session, ctx, prompts::ask_time_again());
            }
            let summary = prompts::confirm_summary(service_type, location, provider, issue, text);
            let next = ConvState::BookingConfirm {
                service_type: service_type.clone(),
                location: location.clone(),
                provider: provider.clone(),
                issue: issue.clone(),
                requested_time: text.to_string(),
            };
            reply(session, ctx, next, summary)
        }
        ConvState::BookingConfirm { .. } => confirmation::handle_confirm(session, text, ctx),
        ConvState::BookingPendingProvider {
            booking_id,
            provider,
            ..
        } => on_pending_provider(session, event, booking_id, provider, ctx),
        ConvState::ProviderRegister { step } => on_provider_register(session, text, step, ctx),
    }
}

// ============================================================================
// Onboarding
// ============================================================================

fn on_new(session: &Session, event: &InboundEvent, ctx: &StepContext) -> TransitionResult {
    if !ctx.profile_complete() {
        return reply(session, ctx, ConvState::OnboardingName, prompts::welcome());
    }
    search_for_service(session, event, ctx, true)
}

fn on_onboarding_name(session: &Session, text: &str, ctx: &StepContext) -> TransitionResult {
    let name = title_case(text);
    if name.is_empty() {
        return stay(session, ctx, prompts::ask_name_again());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return stay(session, ctx, prompts::name_too_long(MAX_NAME_LEN));
    }
    let privacy = prompts::privacy_policy(&name);
    reply(session, ctx, ConvState::OnboardingPrivacy { name }, privacy)
}

fn on_onboarding_privacy(
    session: &Session,
    text: &str,
    name: &str,
    ctx: &StepContext,
) -> TransitionResult {
    if !starts_with_any(text, AFFIRMATIVE) {
        return stay(session, ctx, prompts::privacy_required());
    }
    reply(session, ctx, ConvState::ServiceSearch, prompts::onboarded(name)).with_command(
        Command::UpsertUser {
            user_key: session.user_key.clone(),
            name: Some(name.to_string()),
            location: None,
            agreed_privacy_policy: true,
            onboarding_completed: true,
        },
    )
}

// ============================================================================
// Service search
// ============================================================================

fn on_service_search(session: &Session, event: &InboundEvent, ctx: &StepContext) -> TransitionResult {
    search_for_service(session, event, ctx, false)
}

/// Shared by `New` (profile complete) and `ServiceSearch`
fn search_for_service(
    session: &Session,
    event: &InboundEvent,
    ctx: &StepContext,
    fresh: bool,
) -> TransitionResult {
    let text = event.text_body().unwrap_or_default();

    if is_exactly(text, HELP) {
        return reply(session, ctx, ConvState::ServiceSearch, prompts::help());
    }
    if is_exactly(text, REGISTER) {
        let next = ConvState::ProviderRegister {
            step: RegistrationStep::Name,
        };
        return reply(session, ctx, next, prompts::register_start());
    }

    let service = ctx.catalog.extract(text).or_else(|| {
        ctx.classified_service
            .as_deref()
            .and_then(|answer| ctx.catalog.canonicalize(answer))
    });
    if let Some(service_type) = service {
        let next = ConvState::BookingLocation {
            service_type: service_type.to_string(),
        };
        return reply(session, ctx, next, prompts::ask_location(service_type));
    }

    let services = ctx.catalog.services();
    let examples: Vec<&str> = services.iter().copied().take(EXAMPLE_SERVICES).collect();
    let text = if fresh {
        prompts::welcome_back(ctx.profile_name(), &examples)
    } else {
        prompts::service_not_understood(&examples)
    };
    reply(session, ctx, ConvState::ServiceSearch, text)
}

// ============================================================================
// Booking flow
// ============================================================================

fn on_booking_location(
    session: &Session,
    event: &InboundEvent,
    service_type: &str,
    ctx: &StepContext,
) -> TransitionResult {
    let resolver = LocationResolver::from_providers(&ctx.directory);
    let resolution = match event.coordinates() {
        Some((lat, lng)) => {
            resolver.resolve_coordinates(&ctx.bounds, lat, lng, ctx.geocoded.as_deref())
        }
        None => resolver.resolve_text(event.text_body().unwrap_or_default()),
    };

    let location = match resolution {
        Resolution::Resolved(location) => location,
        Resolution::Ambiguous(options) => {
            return stay(session, ctx, prompts::location_ambiguous(&options));
        }
        Resolution::NotFound => {
            let known: Vec<String> = resolver
                .known()
                .iter()
                .take(LISTED_LOCATIONS)
                .map(|k| k.display.clone())
                .collect();
            return stay(session, ctx, prompts::location_not_found(&known));
        }
    };

    let candidates: Vec<ProviderSummary> =
        match_providers(&ctx.directory, service_type, &location, ctx.max_candidates)
            .into_iter()
            .map(ProviderSummary::from)
            .collect();

    if candidates.is_empty() {
        return reply(
            session,
            ctx,
            ConvState::ServiceSearch,
            prompts::no_providers(service_type, &location.display),
        );
    }

    let list = prompts::provider_list(service_type, &location.display, &candidates);
    let next = ConvState::ProviderSelection {
        service_type: service_type.to_string(),
        location: location.display.clone(),
        candidates,
    };
    reply(session, ctx, next, list).with_command(Command::UpdateUserLocation {
        user_key: session.user_key.clone(),
        location: location.display,
    })
}

fn on_provider_selection(
    session: &Session,
    text: &str,
    service_type: &str,
    location: &str,
    candidates: &[ProviderSummary],
    ctx: &StepContext,
) -> TransitionResult {
    let Some(provider) = pick_candidate(text, candidates) else {
        return stay(
            session,
            ctx,
            prompts::provider_list(service_type, location, candidates),
        );
    };
    let prompt = prompts::ask_issue(provider);
    let next = ConvState::BookingServiceDetails {
        service_type: service_type.to_string(),
        location: location.to_string(),
        provider: provider.clone(),
    };
    reply(session, ctx, next, prompt)
}

/// 1-based index, exact name, then name containment in either direction
fn pick_candidate<'a>(text: &str, candidates: &'a [ProviderSummary]) -> Option<&'a ProviderSummary> {
    let query = normalize(text);
    if query.is_empty() {
        return None;
    }
    if let Ok(index) = query.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| candidates.get(i));
    }
    let names: Vec<String> = candidates.iter().map(|c| normalize(&c.name)).collect();
    if let Some(i) = names.iter().position(|n| *n == query) {
        return candidates.get(i);
    }
    if query.chars().count() < 3 {
        return None;
    }
    names
        .iter()
        .position(|n| n.contains(&query) || query.contains(n.as_str()))
        .and_then(|i| candidates.get(i))
}

fn on_pending_provider(
    session: &Session,
    event: &InboundEvent,
    booking_id: &str,
    provider: &ProviderSummary,
    ctx: &StepContext,
) -> TransitionResult {
    let still_pending = ctx
        .tracked_booking
        .as_ref()
        .is_some_and(|b| b.id == booking_id && b.status == BookingStatus::Pending);
    if !still_pending {
        // Flow is over; the message starts a new search
        let searching = session.advance(ConvState::ServiceSearch, ctx.now);
        return on_service_search(&searching, event, ctx);
    }

    let text = event.text_body().unwrap_or_default();
    if !is_exactly(text, CANCEL) {
        return stay(session, ctx, prompts::still_waiting(provider));
    }

    TransitionResult::new(session.advance(ConvState::New, ctx.now)).with_command(
        Command::ResolveBooking {
            booking_id: booking_id.to_string(),
            status: BookingStatus::Declined,
            on_applied: vec![
                OutboundMessage::new(&session.user_key, prompts::cancelled_for_user()),
                OutboundMessage::new(&provider.handle, prompts::cancelled_for_provider(booking_id)),
            ],
            on_rejected: vec![OutboundMessage::new(
                &session.user_key,
                prompts::cancel_too_late(provider),
            )],
        },
    )
}

// ============================================================================
// Provider registration
// ============================================================================

/// Trimmed, non-empty and within `limit` characters
fn validate_field(value: &str, field: &str, limit: usize) -> Result<(), String> {
    if value.is_empty() {
        Err(prompts::field_required(field))
    } else if value.chars().count() > limit {
        Err(prompts::field_too_long(field, limit))
    } else {
        Ok(())
    }
}

fn on_provider_register(
    session: &Session,
    text: &str,
    step: &RegistrationStep,
    ctx: &StepContext,
) -> TransitionResult {
    match step {
        RegistrationStep::Name => {
            let name = title_case(text);
            if let Err(prompt) = validate_field(&name, "name", MAX_NAME_LEN) {
                return stay(session, ctx, prompt);
            }
            let prompt = prompts::register_ask_service(&name);
            let next = ConvState::ProviderRegister {
                step: RegistrationStep::ServiceType { name },
            };
            reply(session, ctx, next, prompt)
        }
        RegistrationStep::ServiceType { name } => {
            let service_type = ctx
                .catalog
                .canonicalize(text)
                .map_or_else(|| text.trim().to_lowercase(), str::to_string);
            if let Err(prompt) = validate_field(&service_type, "service", MAX_SERVICE_TYPE_LEN) {
                return stay(session, ctx, prompt);
            }
            let next = ConvState::ProviderRegister {
                step: RegistrationStep::Area {
                    name: name.clone(),
                    service_type,
                },
            };
            reply(session, ctx, next, prompts::register_ask_area())
        }
        RegistrationStep::Area { name, service_type } => {
            let area = text
                .split(',')
                .map(title_case)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            if let Err(prompt) = validate_field(&area, "area", MAX_LOCATION_LEN) {
                return stay(session, ctx, prompt);
            }
            let provider = Provider {
                handle: session.user_key.clone(),
                name: name.clone(),
                service_type: service_type.clone(),
                location: area.clone(),
                status: ProviderStatus::Pending,
                registered_at: ctx.now,
            };
            reply(
                session,
                ctx,
                ConvState::New,
                prompts::registration_submitted(name, service_type, &area),
            )
            .with_command(Command::RegisterProvider(provider))
        }
    }
}
