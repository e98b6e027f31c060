//! Booking confirmation protocol
//!
//! A booking is committed as `pending` when the user confirms the summary,
//! and then resolved by the provider's ACCEPT or DENY reply. Resolution is
//! issued as a conditional ledger update; notifications ride on the
//! command and are only delivered if the update applied, so replaying a
//! reply (or racing another instance) never notifies twice.

use super::effect::{Command, OutboundMessage};
use super::prompts;
use super::state::{ConvState, Session};
use super::transition::{StepContext, TransitionResult};
use crate::db::{Booking, BookingStatus};
use crate::matching::keywords::{is_exactly, starts_with_any, ProviderReply, AFFIRMATIVE, NEGATIVE};

/// `BookingConfirm`: commit, go back for new details, or ask again
pub(super) fn handle_confirm(session: &Session, text: &str, ctx: &StepContext) -> TransitionResult {
    let ConvState::BookingConfirm {
        service_type,
        location,
        provider,
        issue,
        requested_time,
    } = &session.state
    else {
        return TransitionResult::new(session.advance(session.state.clone(), ctx.now));
    };

    if starts_with_any(text, AFFIRMATIVE) {
        let booking = Booking {
            id: ctx.booking_id.clone(),
            user_key: session.user_key.clone(),
            provider_handle: provider.handle.clone(),
            provider_name: provider.name.clone(),
            service_type: service_type.clone(),
            issue: issue.clone(),
            requested_time: requested_time.clone(),
            status: BookingStatus::Pending,
            created_at: ctx.now,
            updated_at: ctx.now,
        };
        let customer = ctx.profile.as_ref().and_then(|p| p.name.as_deref());
        let to_provider = OutboundMessage::new(
            &provider.handle,
            prompts::provider_request(&booking, customer),
        );
        let next = ConvState::BookingPendingProvider {
            booking_id: booking.id.clone(),
            provider: provider.clone(),
            service_type: service_type.clone(),
        };
        return TransitionResult::new(session.advance(next, ctx.now))
            .with_message(OutboundMessage::new(
                &session.user_key,
                prompts::request_sent(provider),
            ))
            .with_message(to_provider)
            .with_command(Command::CreateBooking(booking));
    }

    let (state, text) = if is_exactly(text, NEGATIVE) {
        let back = ConvState::BookingServiceDetails {
            service_type: service_type.clone(),
            location: location.clone(),
            provider: provider.clone(),
        };
        (back, prompts::change_details())
    } else {
        (session.state.clone(), prompts::confirm_again())
    };
    TransitionResult::new(session.advance(state, ctx.now))
        .with_message(OutboundMessage::new(&session.user_key, text))
}

/// A provider answered the most recent booking addressed to them. The
/// provider's own conversation is left where it was.
pub(super) fn handle_provider_reply(
    session: &Session,
    booking: &Booking,
    answer: ProviderReply,
    ctx: &StepContext,
) -> TransitionResult {
    let unchanged = session.advance(session.state.clone(), ctx.now);
    let provider = &booking.provider_handle;

    if booking.status != BookingStatus::Pending {
        return TransitionResult::new(unchanged)
            .with_message(OutboundMessage::new(provider, prompts::already_resolved(booking)));
    }

    let (status, on_applied) = match answer {
        ProviderReply::Accept => (
            BookingStatus::Confirmed,
            vec![
                OutboundMessage::new(provider, prompts::accepted_for_provider(booking)),
                OutboundMessage::new(&booking.user_key, prompts::accepted_for_user(booking)),
            ],
        ),
        ProviderReply::Deny => (
            BookingStatus::Declined,
            vec![
                OutboundMessage::new(provider, prompts::declined_for_provider(booking)),
                OutboundMessage::new(&booking.user_key, prompts::declined_for_user(booking)),
            ],
        ),
    };

    TransitionResult::new(unchanged).with_command(Command::ResolveBooking {
        booking_id: booking.id.clone(),
        status,
        on_applied,
        on_rejected: Vec::new(),
    })
}
