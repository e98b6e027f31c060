//! Free-text matching against real-world data: service keywords, known
//! provider locations and provider candidates.
//!
//! Everything here is pure and synchronous so the state machine can call it
//! from inside a transition.

pub mod keywords;
pub mod location;
pub mod normalize;
pub mod provider;

pub use keywords::{ServiceCatalog, ServiceKeyword};
pub use location::{GeoBounds, KnownLocation, LocationResolver, Resolution};
pub use provider::match_providers;
