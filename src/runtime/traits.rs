//! Trait abstractions for runtime I/O
//!
//! These traits let the runtime be exercised against in-memory mocks.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{Booking, BookingStatus, Database, Provider, StatusUpdate, UserProfile};
use crate::matching::location::location_components;
use crate::matching::normalize::normalize;

/// User profiles and the provider directory
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_user(&self, user_key: &str) -> Result<Option<UserProfile>, String>;

    /// `None` fields keep whatever is stored
    async fn upsert_user(
        &self,
        user_key: &str,
        name: Option<&str>,
        location: Option<&str>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    ) -> Result<(), String>;

    /// Returns false when there is no such user
    async fn update_user_location(&self, user_key: &str, location: &str) -> Result<bool, String>;

    async fn get_provider(&self, handle: &str) -> Result<Option<Provider>, String>;

    async fn upsert_provider(&self, provider: &Provider) -> Result<(), String>;

    async fn active_providers(&self) -> Result<Vec<Provider>, String>;

    /// Active providers of `service_type` listing `location` as one of
    /// their location components
    async fn providers_by_service_and_location(
        &self,
        service_type: &str,
        location: &str,
    ) -> Result<Vec<Provider>, String> {
        let service = normalize(service_type);
        let place = normalize(location);
        Ok(self
            .active_providers()
            .await?
            .into_iter()
            .filter(|p| normalize(&p.service_type) == service)
            .filter(|p| location_components(&p.location).any(|c| normalize(c) == place))
            .collect())
    }
}

/// Durable record of bookings
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn create(&self, booking: &Booking) -> Result<(), String>;

    async fn get(&self, id: &str) -> Result<Option<Booking>, String>;

    /// Conditional status change; see [`StatusUpdate`]
    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<StatusUpdate, String>;

    /// Most recent pending booking addressed to a provider
    async fn find_pending_by_provider(&self, handle: &str) -> Result<Option<Booking>, String>;

    /// Most recent booking of any status addressed to a provider
    async fn latest_for_provider(&self, handle: &str) -> Result<Option<Booking>, String>;
}

// ============================================================================
// SQLite implementations
// ============================================================================

#[async_trait]
impl ProfileStore for Database {
    async fn get_user(&self, user_key: &str) -> Result<Option<UserProfile>, String> {
        let user_key = user_key.to_string();
        self.blocking(move |db| db.get_user(&user_key))
            .await
            .map_err(|e| e.to_string())
    }

    async fn upsert_user(
        &self,
        user_key: &str,
        name: Option<&str>,
        location: Option<&str>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    ) -> Result<(), String> {
        let user_key = user_key.to_string();
        let name = name.map(str::to_string);
        let location = location.map(str::to_string);
        self.blocking(move |db| {
            db.upsert_user(
                &user_key,
                name.as_deref(),
                location.as_deref(),
                agreed_privacy_policy,
                onboarding_completed,
            )
        })
        .await
        .map_err(|e| e.to_string())
    }

    async fn update_user_location(&self, user_key: &str, location: &str) -> Result<bool, String> {
        let (user_key, location) = (user_key.to_string(), location.to_string());
        self.blocking(move |db| db.update_user_location(&user_key, &location))
            .await
            .map_err(|e| e.to_string())
    }

    async fn get_provider(&self, handle: &str) -> Result<Option<Provider>, String> {
        let handle = handle.to_string();
        self.blocking(move |db| db.get_provider(&handle))
            .await
            .map_err(|e| e.to_string())
    }

    async fn upsert_provider(&self, provider: &Provider) -> Result<(), String> {
        let provider = provider.clone();
        self.blocking(move |db| db.upsert_provider(&provider))
            .await
            .map_err(|e| e.to_string())
    }

    async fn active_providers(&self) -> Result<Vec<Provider>, String> {
        self.blocking(|db| db.active_providers())
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl BookingLedger for Database {
    async fn create(&self, booking: &Booking) -> Result<(), String> {
        let booking = booking.clone();
        self.blocking(move |db| db.create_booking(&booking))
            .await
            .map_err(|e| e.to_string())
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, String> {
        let id = id.to_string();
        self.blocking(move |db| db.get_booking(&id))
            .await
            .map_err(|e| e.to_string())
    }

    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<StatusUpdate, String> {
        let id = id.to_string();
        self.blocking(move |db| db.update_booking_status(&id, status))
            .await
            .map_err(|e| e.to_string())
    }

    async fn find_pending_by_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        let handle = handle.to_string();
        self.blocking(move |db| db.find_pending_by_provider(&handle))
            .await
            .map_err(|e| e.to_string())
    }

    async fn latest_for_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        let handle = handle.to_string();
        self.blocking(move |db| db.latest_for_provider(&handle))
            .await
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ProfileStore + ?Sized> ProfileStore for Arc<T> {
    async fn get_user(&self, user_key: &str) -> Result<Option<UserProfile>, String> {
        (**self).get_user(user_key).await
    }

    async fn upsert_user(
        &self,
        user_key: &str,
        name: Option<&str>,
        location: Option<&str>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    ) -> Result<(), String> {
        (**self)
            .upsert_user(user_key, name, location, agreed_privacy_policy, onboarding_completed)
            .await
    }

    async fn update_user_location(&self, user_key: &str, location: &str) -> Result<bool, String> {
        (**self).update_user_location(user_key, location).await
    }

    async fn get_provider(&self, handle: &str) -> Result<Option<Provider>, String> {
        (**self).get_provider(handle).await
    }

    async fn upsert_provider(&self, provider: &Provider) -> Result<(), String> {
        (**self).upsert_provider(provider).await
    }

    async fn active_providers(&self) -> Result<Vec<Provider>, String> {
        (**self).active_providers().await
    }
}

#[async_trait]
impl<T: BookingLedger + ?Sized> BookingLedger for Arc<T> {
    async fn create(&self, booking: &Booking) -> Result<(), String> {
        (**self).create(booking).await
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, String> {
        (**self).get(id).await
    }

    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<StatusUpdate, String> {
        (**self).update_status(id, status).await
    }

    async fn find_pending_by_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        (**self).find_pending_by_provider(handle).await
    }

    async fn latest_for_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        (**self).latest_for_provider(handle).await
    }
}
