//! Property-based tests for the conversation step
//!
//! Properties run over arbitrary states and messages; the named scenarios
//! at the bottom walk the main booking path end to end.

use super::*;
use crate::db::{Booking, BookingStatus, Provider, ProviderStatus, UserProfile};
use crate::matching::normalize::normalize;
use crate::matching::{LocationResolver, Resolution, ServiceCatalog};
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::sync::Arc;

const USER: &str = "263771000001";
const PROVIDER: &str = "263772000002";

// ============================================================================
// Test Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    "2026-03-01T10:00:00Z".parse().unwrap()
}

fn complete_profile(user_key: &str) -> UserProfile {
    UserProfile {
        user_key: user_key.into(),
        name: Some("Rudo".into()),
        location: None,
        agreed_privacy_policy: true,
        onboarding_completed: true,
        created_at: now(),
        updated_at: now(),
    }
}

fn bare_context() -> StepContext {
    StepContext::new(now(), "bk-1", Arc::new(ServiceCatalog::builtin()))
}

fn context() -> StepContext {
    bare_context().with_profile(complete_profile(USER))
}

fn session_in(user_key: &str, state: ConvState) -> Session {
    let mut session = Session::new(user_key, now());
    session.state = state;
    session.version = 3;
    session
}

fn provider(handle: &str, name: &str, service: &str, location: &str) -> Provider {
    Provider {
        handle: handle.into(),
        name: name.into(),
        service_type: service.into(),
        location: location.into(),
        status: ProviderStatus::Active,
        registered_at: now(),
    }
}

fn directory() -> Vec<Provider> {
    vec![
        provider("p1", "Tendai Moyo", "plumber", "Harare"),
        provider("p2", "Farai Ncube", "plumber", "Avondale, Harare"),
        provider("p3", "Chipo Dube", "electrician", "Mbare, Harare"),
        provider("p4", "Nyasha Banda", "gardener", "Bulawayo"),
    ]
}

fn summary() -> ProviderSummary {
    ProviderSummary {
        handle: PROVIDER.into(),
        name: "Tendai Moyo".into(),
        location: "Harare".into(),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_summary() -> impl Strategy<Value = ProviderSummary> {
    ("[0-9]{6}", "[A-Z][a-z]{2,8}").prop_map(|(handle, name)| ProviderSummary {
        handle,
        name,
        location: "Harare".into(),
    })
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![arb_intake_state(), arb_booking_state()]
}

fn arb_intake_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::New),
        Just(ConvState::OnboardingName),
        "[A-Z][a-z]{1,10}".prop_map(|name| ConvState::OnboardingPrivacy { name }),
        Just(ConvState::ServiceSearch),
        Just(ConvState::BookingLocation {
            service_type: "plumber".into()
        }),
        Just(ConvState::ProviderRegister {
            step: RegistrationStep::Name
        }),
    ]
}

fn arb_booking_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        proptest::collection::vec(arb_summary(), 1..4).prop_map(|candidates| {
            ConvState::ProviderSelection {
                service_type: "plumber".into(),
                location: "Harare".into(),
                candidates,
            }
        }),
        arb_summary().prop_map(|provider| ConvState::BookingServiceDetails {
            service_type: "plumber".into(),
            location: "Harare".into(),
            provider,
        }),
        (arb_summary(), "[a-z ]{1,20}").prop_map(|(provider, issue)| ConvState::BookingTime {
            service_type: "plumber".into(),
            location: "Harare".into(),
            provider,
            issue,
        }),
        arb_summary().prop_map(|provider| ConvState::BookingConfirm {
            service_type: "plumber".into(),
            location: "Harare".into(),
            provider,
            issue: "leak".into(),
            requested_time: "noon".into(),
        }),
        arb_summary().prop_map(|provider| ConvState::BookingPendingProvider {
            booking_id: "bk-0".into(),
            provider,
            service_type: "plumber".into(),
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = InboundEvent> {
    prop_oneof![
        4 => "[a-zA-Z0-9 ,.!?]{0,40}".prop_map(|text| InboundEvent::text(USER, text)),
        1 => prop_oneof![
            Just("yes"), Just("no"), Just("help"), Just("register"), Just("restart"),
            Just("cancel"), Just("1"), Just("I need a plumber"), Just("Harare"),
        ]
        .prop_map(|text| InboundEvent::text(USER, text)),
        1 => (-30.0f64..10.0, 20.0f64..40.0)
            .prop_map(|(lat, lng)| InboundEvent::location(USER, lat, lng)),
    ]
}

fn command_user(command: &Command) -> Option<&str> {
    match command {
        Command::UpsertUser { user_key, .. } | Command::UpdateUserLocation { user_key, .. } => {
            Some(user_key)
        }
        Command::CreateBooking(booking) => Some(&booking.user_key),
        Command::RegisterProvider(provider) => Some(&provider.handle),
        Command::ResolveBooking { .. } => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // A first contact without a complete profile always starts onboarding
    #[test]
    fn prop_new_incomplete_profile_goes_to_onboarding(event in arb_event(), named in any::<bool>()) {
        let mut ctx = bare_context();
        if named {
            let mut profile = complete_profile(USER);
            profile.onboarding_completed = false;
            ctx = ctx.with_profile(profile);
        }
        let result = step(&Session::new(USER, now()), &event, &ctx);
        prop_assert_eq!(result.session.state, ConvState::OnboardingName);
        prop_assert!(result.commands.is_empty());
        prop_assert_eq!(result.messages.len(), 1);
    }

    // Same inputs, same outputs
    #[test]
    fn prop_step_is_deterministic(state in arb_state(), event in arb_event()) {
        let session = session_in(USER, state);
        let ctx = context().with_directory(directory()).with_geocoded("Avondale, Harare");
        prop_assert_eq!(step(&session, &event, &ctx), step(&session, &event, &ctx));
    }

    // Steps never touch identity or version, and every command for the
    // sender names the sender
    #[test]
    fn prop_step_preserves_identity(
        state in arb_state(),
        events in proptest::collection::vec(arb_event(), 1..12)
    ) {
        let ctx = context().with_directory(directory());
        let mut session = session_in(USER, state);
        for event in events {
            let result = step(&session, &event, &ctx);
            prop_assert_eq!(&result.session.user_key, USER);
            prop_assert_eq!(result.session.version, 3);
            for command in &result.commands {
                if let Some(user) = command_user(command) {
                    prop_assert_eq!(user, USER);
                }
            }
            for message in &result.messages {
                prop_assert!(!message.text.is_empty());
            }
            session = result.session;
        }
    }

    // Restart leaves every flow and emits no side effects
    #[test]
    fn prop_restart_returns_to_new(state in arb_state()) {
        prop_assume!(state != ConvState::New);
        let result = step(&session_in(USER, state), &InboundEvent::text(USER, "restart"), &context());
        prop_assert_eq!(result.session.state, ConvState::New);
        prop_assert!(result.commands.is_empty());
    }

    // A provider's accept/deny never moves their own conversation
    #[test]
    fn prop_provider_reply_keeps_state(state in arb_state(), accept in any::<bool>()) {
        let booking = Booking {
            id: "bk-7".into(),
            user_key: USER.into(),
            provider_handle: PROVIDER.into(),
            provider_name: "Tendai Moyo".into(),
            service_type: "plumber".into(),
            issue: "leak".into(),
            requested_time: "noon".into(),
            status: BookingStatus::Pending,
            created_at: now(),
            updated_at: now(),
        };
        let ctx = bare_context()
            .with_profile(complete_profile(PROVIDER))
            .with_provider_booking(booking);
        let text = if accept { "accept" } else { "deny" };
        let session = session_in(PROVIDER, state.clone());
        let result = step(&session, &InboundEvent::text(PROVIDER, text), &ctx);
        prop_assert_eq!(result.session.state, state);
        prop_assert_eq!(result.commands.len(), 1);
    }

    // A resolved location is always a component of some provider record
    #[test]
    fn prop_resolver_never_invents_locations(query in "[a-zA-Z ,]{0,30}") {
        let providers = directory();
        let resolver = LocationResolver::from_providers(&providers);
        if let Resolution::Resolved(location) = resolver.resolve_text(&query) {
            let named = providers.iter().any(|p| {
                p.location.split(',').any(|part| normalize(part) == location.key)
            });
            prop_assert!(named, "{:?} resolved to unknown {:?}", query, location);
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_service_request_asks_for_location() {
    let result = step(
        &session_in(USER, ConvState::New),
        &InboundEvent::text(USER, "I need a plumber"),
        &context(),
    );
    assert_eq!(
        result.session.state,
        ConvState::BookingLocation {
            service_type: "plumber".into()
        }
    );
    assert_eq!(result.messages.len(), 1);
    assert!(result.messages[0].text.contains("Where do you need a plumber"));
}

#[test]
fn scenario_location_lists_matching_providers() {
    let ctx = context().with_directory(directory());
    let result = step(
        &session_in(
            USER,
            ConvState::BookingLocation {
                service_type: "plumber".into(),
            },
        ),
        &InboundEvent::text(USER, "Harare"),
        &ctx,
    );
    let ConvState::ProviderSelection { candidates, location, .. } = &result.session.state else {
        panic!("expected ProviderSelection, got {:?}", result.session.state);
    };
    assert_eq!(location, "Harare");
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].handle, "p1");
    assert!(matches!(
        &result.commands[..],
        [Command::UpdateUserLocation { location, .. }] if location == "Harare"
    ));
}

#[test]
fn scenario_declining_summary_clears_issue_and_time() {
    let state = ConvState::BookingConfirm {
        service_type: "plumber".into(),
        location: "Harare".into(),
        provider: summary(),
        issue: "leak".into(),
        requested_time: "noon".into(),
    };
    let result = step(&session_in(USER, state), &InboundEvent::text(USER, "No"), &context());
    assert_eq!(
        result.session.state,
        ConvState::BookingServiceDetails {
            service_type: "plumber".into(),
            location: "Harare".into(),
            provider: summary(),
        }
    );
}

#[test]
fn scenario_provider_accepts_pending_booking() {
    let booking = Booking {
        id: "bk-1".into(),
        user_key: USER.into(),
        provider_handle: PROVIDER.into(),
        provider_name: "Tendai Moyo".into(),
        service_type: "plumber".into(),
        issue: "leak".into(),
        requested_time: "noon".into(),
        status: BookingStatus::Pending,
        created_at: now(),
        updated_at: now(),
    };
    let ctx = bare_context()
        .with_profile(complete_profile(PROVIDER))
        .with_provider_booking(booking);
    let before = session_in(PROVIDER, ConvState::ServiceSearch);
    let result = step(&before, &InboundEvent::text(PROVIDER, "accept"), &ctx);

    assert_eq!(result.session.state, before.state);
    let [Command::ResolveBooking {
        status, on_applied, ..
    }] = &result.commands[..]
    else {
        panic!("expected ResolveBooking, got {:?}", result.commands);
    };
    assert_eq!(*status, BookingStatus::Confirmed);
    let mut recipients: Vec<&str> = on_applied.iter().map(|m| m.to.as_str()).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![USER, PROVIDER]);
}

#[test]
fn full_booking_walkthrough() {
    let ctx = context().with_directory(directory());
    let inputs = [
        "hi",
        "I need a plumber",
        "avondale",
        "1",
        "Kitchen tap is leaking",
        "Friday 3pm",
        "yes",
    ];
    let mut session = session_in(USER, ConvState::New);
    let mut commands = Vec::new();
    for input in inputs {
        let result = step(&session, &InboundEvent::text(USER, input), &ctx);
        commands.extend(result.commands);
        session = result.session;
    }
    assert!(matches!(
        session.state,
        ConvState::BookingPendingProvider { ref provider, .. } if provider.handle == "p2"
    ));
    let created: Vec<&Booking> = commands
        .iter()
        .filter_map(|c| match c {
            Command::CreateBooking(b) => Some(b),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].issue, "Kitchen tap is leaking");
    assert_eq!(created[0].requested_time, "Friday 3pm");
}
