//! Conversation state machine
//!
//! Each inbound message is handled by a pure `step` over the stored session
//! and a context the runtime gathers up front. Side effects come back as
//! commands and outbound messages for the runtime to execute.

mod confirmation;
mod effect;
pub mod event;
mod prompts;
pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Command, OutboundMessage};
pub use event::{InboundBody, InboundEvent};
pub use prompts::turn_failed;
pub use state::{ConvState, ProviderSummary, RegistrationStep, Session};
pub use transition::{step, StepContext, TransitionResult, LAST_MESSAGE_ID};
