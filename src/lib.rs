//! Hustlr - WhatsApp conversational booking backend
//!
//! Customers describe a service in free text, pick a nearby provider and
//! book a visit; providers accept or decline from their own chat.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod matching;
pub mod runtime;
pub mod signals;
pub mod state_machine;
pub mod store;
