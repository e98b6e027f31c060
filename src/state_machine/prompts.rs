//! User-facing message text

use super::state::ProviderSummary;
use crate::db::{Booking, BookingStatus};
use crate::matching::normalize::title_case;

pub fn welcome() -> String {
    "👋 Welcome to Hustlr! I'll help you find local service providers.\n\n\
     Let's get you set up. What's your name?"
        .to_string()
}

pub fn ask_name_again() -> String {
    "Please tell me your name so I know what to call you.".to_string()
}

pub fn name_too_long(limit: usize) -> String {
    format!("That name is a bit long. Please keep it under {limit} characters.")
}

pub fn privacy_policy(name: &str) -> String {
    format!(
        "Nice to meet you, {name}! 🔒\n\n\
         *Privacy Policy Summary:*\n\
         • We store your name, location and booking history\n\
         • We share your details with the service providers you choose\n\
         • We never sell your data to third parties\n\
         • You can request deletion of your data at any time\n\n\
         Do you agree to this privacy policy? (Yes/No)"
    )
}

pub fn privacy_required() -> String {
    "❌ You need to agree to the privacy policy to use Hustlr.\n\n\
     Type 'yes' to agree, or 'no' to decline."
        .to_string()
}

pub fn onboarded(name: &str) -> String {
    format!(
        "✅ Perfect! You're all set up, {name}!\n\n\
         What service are you looking for today?"
    )
}

pub fn welcome_back(name: Option<&str>, examples: &[&str]) -> String {
    let greeting = match name {
        Some(name) => format!("Welcome back, {name}!"),
        None => "Welcome back!".to_string(),
    };
    format!(
        "{greeting} What service are you looking for today?\n\n{}",
        example_line(examples)
    )
}

pub fn service_not_understood(examples: &[&str]) -> String {
    format!(
        "Sorry, I couldn't tell which service you need.\n\n{}\n\n\
         Type 'help' to see everything I can do.",
        example_line(examples)
    )
}

fn example_line(examples: &[&str]) -> String {
    format!("Try something like: {}", examples.join(", "))
}

pub fn help() -> String {
    "*Hustlr Help*\n\n\
     • Tell me the service you need, e.g. 'I need a plumber'\n\
     • Type 'register' to offer your services as a provider\n\
     • Type 'restart' at any time to start over\n\
     • Type 'cancel' while waiting on a provider to cancel your request"
        .to_string()
}

pub fn restarted() -> String {
    "🔄 Starting over. What service are you looking for?".to_string()
}

pub fn ask_location(service_type: &str) -> String {
    format!(
        "📍 Where do you need a {service_type}?\n\n\
         Type your area or suburb, or share your location pin."
    )
}

pub fn location_ambiguous(options: &[String]) -> String {
    format!(
        "I found a few areas that match. Which one did you mean?\n\n{}",
        bullet_list(options)
    )
}

pub fn location_not_found(known: &[String]) -> String {
    if known.is_empty() {
        return "Sorry, we don't have any providers listed yet. Type 'restart' to try again later."
            .to_string();
    }
    format!(
        "Sorry, I couldn't find that area. Areas we currently cover include:\n\n{}\n\n\
         Please type one of these, or share your location pin.",
        bullet_list(known)
    )
}

pub fn no_providers(service_type: &str, location: &str) -> String {
    format!(
        "Sorry, there are no {service_type} providers in {location} yet.\n\n\
         What other service can I help you find?"
    )
}

pub fn provider_list(service_type: &str, location: &str, candidates: &[ProviderSummary]) -> String {
    let lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {} ({})", i + 1, p.name, p.location))
        .collect();
    format!(
        "Here are {} providers in {location}:\n\n{}\n\n\
         Reply with the number or name of the provider you'd like.",
        title_case(service_type),
        lines.join("\n")
    )
}

pub fn ask_issue(provider: &ProviderSummary) -> String {
    format!(
        "✅ Selected: {}\n\n\
         Briefly describe the job or problem you need help with.",
        provider.name
    )
}

pub fn ask_issue_again() -> String {
    "Please describe the job in a few words so the provider knows what to expect.".to_string()
}

pub fn ask_time() -> String {
    "⏰ When would you like the provider to come? For example 'tomorrow at 2pm' \
     or 'Saturday morning'."
        .to_string()
}

pub fn ask_time_again() -> String {
    "Please tell me a day and time that works for you.".to_string()
}

pub fn confirm_summary(
    service_type: &str,
    location: &str,
    provider: &ProviderSummary,
    issue: &str,
    requested_time: &str,
) -> String {
    format!(
        "*Please confirm your booking:*\n\n\
         🛠️ Service: {}\n\
         👤 Provider: {}\n\
         📍 Area: {location}\n\
         📝 Details: {issue}\n\
         ⏰ Time: {requested_time}\n\n\
         Reply YES to send the request, or NO to change the details.",
        title_case(service_type),
        provider.name
    )
}

pub fn confirm_again() -> String {
    "Please reply YES to send the request, or NO to change the details.".to_string()
}

pub fn change_details() -> String {
    "No problem. Describe the job again and we'll go from there.".to_string()
}

pub fn request_sent(provider: &ProviderSummary) -> String {
    format!(
        "📨 Your request has been sent to {}. I'll let you know as soon as they respond.\n\n\
         Type 'cancel' to withdraw the request.",
        provider.name
    )
}

pub fn provider_request(booking: &Booking, customer_name: Option<&str>) -> String {
    let customer = customer_name.unwrap_or("A customer");
    format!(
        "🔔 *New booking request*\n\n\
         👤 Customer: {customer}\n\
         🛠️ Service: {}\n\
         📝 Details: {}\n\
         ⏰ Time: {}\n\
         🔖 Ref: {}\n\n\
         Reply ACCEPT to take the job or DENY to decline.",
        title_case(&booking.service_type),
        booking.issue,
        booking.requested_time,
        booking.id
    )
}

/// Sent when a turn could not be completed and was rolled back
pub fn turn_failed() -> String {
    "⚠️ Sorry, something went wrong on our side and your last message was not processed. Please send it again."
        .to_string()
}

pub fn still_waiting(provider: &ProviderSummary) -> String {
    format!(
        "⏳ Still waiting for {} to respond. Type 'cancel' to withdraw the request.",
        provider.name
    )
}

pub fn cancelled_for_user() -> String {
    "Your request has been cancelled. Type what service you need to start a new search."
        .to_string()
}

/// The provider answered before the cancel reached the ledger
pub fn cancel_too_late(provider: &ProviderSummary) -> String {
    format!(
        "⚠️ {} already answered your request, so it could not be cancelled. \
         If they accepted, please contact them on {} to call it off. \
         Type what service you need to start a new search.",
        provider.name, provider.handle
    )
}

pub fn cancelled_for_provider(booking_id: &str) -> String {
    format!("The customer cancelled booking {booking_id}. No action is needed.")
}

pub fn accepted_for_user(booking: &Booking) -> String {
    format!(
        "🎉 Good news! {} accepted your {} booking for {}. They will contact you shortly.",
        booking.provider_name,
        booking.service_type,
        booking.requested_time
    )
}

pub fn accepted_for_provider(booking: &Booking) -> String {
    format!(
        "✅ You accepted booking {}. Please contact the customer on {} to arrange the visit.",
        booking.id, booking.user_key
    )
}

pub fn declined_for_user(booking: &Booking) -> String {
    format!(
        "Sorry, {} can't take your {} booking. Tell me the service you need to search again.",
        booking.provider_name, booking.service_type
    )
}

pub fn declined_for_provider(booking: &Booking) -> String {
    format!("You declined booking {}. Thanks for letting us know.", booking.id)
}

pub fn already_resolved(booking: &Booking) -> String {
    let status = match booking.status {
        BookingStatus::Confirmed => "accepted",
        BookingStatus::Declined => "declined",
        BookingStatus::Completed => "completed",
        BookingStatus::Pending => "pending",
    };
    format!(
        "Got it. Booking {} is already {status}, so there is nothing more to do.",
        booking.id
    )
}

pub fn register_start() -> String {
    "👨‍🔧 *Provider Registration*\n\n\
     Let's get you registered as a service provider. What's your full name?"
        .to_string()
}

pub fn register_ask_service(name: &str) -> String {
    format!(
        "Great, {name}! 🛠️\n\n\
         What service do you provide? (e.g. plumber, electrician, carpenter)"
    )
}

pub fn register_ask_area() -> String {
    "📍 Which area or suburb do you serve? Separate several areas with commas.".to_string()
}

pub fn field_required(field: &str) -> String {
    format!("Please tell me your {field}.")
}

pub fn field_too_long(field: &str, limit: usize) -> String {
    format!("That {field} is too long. Please keep it under {limit} characters.")
}

pub fn registration_submitted(name: &str, service_type: &str, area: &str) -> String {
    format!(
        "✅ *Registration Submitted!*\n\n\
         👤 Name: {name}\n\
         🛠️ Service: {service_type}\n\
         📍 Area: {area}\n\n\
         Your registration is pending review. You can start receiving bookings once approved."
    )
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
