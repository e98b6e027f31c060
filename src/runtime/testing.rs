//! Mock implementations for testing
//!
//! These mocks enable runtime and store tests without real I/O.

use super::traits::{BookingLedger, ProfileStore};
use crate::collaborators::{CollaboratorError, Geocoder, IntentClassifier, Transport};
use crate::db::{Booking, BookingStatus, Provider, StatusUpdate, UserProfile};
use crate::state_machine::{OutboundMessage, Session};
use crate::store::{SessionBackend, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Session backends
// ============================================================================

/// In-memory session backend with the same versioned write rule as the
/// real backends
pub struct MemorySessionBackend {
    name: String,
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_key: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(user_key).cloned()
    }

    /// Store unconditionally
    pub fn put(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.user_key.clone(), session);
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.get(user_key))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(stored) = sessions.get(&session.user_key) {
            if stored.version >= session.version {
                return Err(StoreError::Conflict {
                    user_key: session.user_key.clone(),
                    found: Some(stored.version),
                });
            }
        }
        sessions.insert(session.user_key.clone(), session.clone());
        Ok(())
    }
}

/// Backend that fails every call while `failing` is set
pub struct FlakySessionBackend {
    inner: MemorySessionBackend,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FlakySessionBackend {
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            inner: MemorySessionBackend::new(name),
            failing: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Loads and saves that reached this backend
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} is down", self.inner.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for FlakySessionBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        self.check()?;
        self.inner.load(user_key).await
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save(session).await
    }
}

/// Simulates another instance writing the same session just before each
/// of the first `interferences` saves
pub struct RacingSessionBackend {
    inner: Arc<MemorySessionBackend>,
    interferences: AtomicUsize,
}

impl RacingSessionBackend {
    pub fn new(inner: Arc<MemorySessionBackend>, interferences: usize) -> Self {
        Self {
            inner,
            interferences: AtomicUsize::new(interferences),
        }
    }
}

#[async_trait]
impl SessionBackend for RacingSessionBackend {
    fn name(&self) -> &str {
        "racing"
    }

    async fn load(&self, user_key: &str) -> Result<Option<Session>, StoreError> {
        self.inner.load(user_key).await
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let interfere = self
            .interferences
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            self.inner.put(session.clone());
        }
        self.inner.save(session).await
    }
}

// ============================================================================
// Profile store and ledger
// ============================================================================

#[derive(Default)]
pub struct MemoryProfileStore {
    users: Mutex<HashMap<String, UserProfile>>,
    providers: Mutex<HashMap<String, Provider>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, user_key: &str) -> Option<UserProfile> {
        self.users.lock().unwrap().get(user_key).cloned()
    }

    pub fn provider(&self, handle: &str) -> Option<Provider> {
        self.providers.lock().unwrap().get(handle).cloned()
    }

    pub fn insert_provider(&self, provider: Provider) {
        self.providers
            .lock()
            .unwrap()
            .insert(provider.handle.clone(), provider);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_user(&self, user_key: &str) -> Result<Option<UserProfile>, String> {
        Ok(self.user(user_key))
    }

    async fn upsert_user(
        &self,
        user_key: &str,
        name: Option<&str>,
        location: Option<&str>,
        agreed_privacy_policy: bool,
        onboarding_completed: bool,
    ) -> Result<(), String> {
        let now = Utc::now();
        let mut users = self.users.lock().unwrap();
        let user = users.entry(user_key.to_string()).or_insert_with(|| UserProfile {
            user_key: user_key.to_string(),
            name: None,
            location: None,
            agreed_privacy_policy: false,
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        });
        if let Some(name) = name {
            user.name = Some(name.to_string());
        }
        if let Some(location) = location {
            user.location = Some(location.to_string());
        }
        user.agreed_privacy_policy = agreed_privacy_policy;
        user.onboarding_completed = onboarding_completed;
        user.updated_at = now;
        Ok(())
    }

    async fn update_user_location(&self, user_key: &str, location: &str) -> Result<bool, String> {
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(user_key)
            .map(|user| {
                user.location = Some(location.to_string());
                user.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn get_provider(&self, handle: &str) -> Result<Option<Provider>, String> {
        Ok(self.provider(handle))
    }

    async fn upsert_provider(&self, provider: &Provider) -> Result<(), String> {
        self.insert_provider(provider.clone());
        Ok(())
    }

    async fn active_providers(&self) -> Result<Vec<Provider>, String> {
        let mut active: Vec<Provider> = self
            .providers
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(active)
    }
}

/// In-memory ledger with the same conditional status rule as SQLite
#[derive(Default)]
pub struct MemoryLedger {
    bookings: Mutex<Vec<Booking>>,
    fail_writes: AtomicBool,
    stale_pending: Mutex<Option<Booking>>,
    stale_get: Mutex<Option<Booking>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Booking> {
        self.bookings.lock().unwrap().clone()
    }

    pub fn status(&self, id: &str) -> Option<BookingStatus> {
        self.bookings
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .map(|b| b.status)
    }

    /// Make `create` and `update_status` fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a status, bypassing the transition rules
    pub fn force_status(&self, id: &str, status: BookingStatus) {
        if let Some(b) = self.bookings.lock().unwrap().iter_mut().find(|b| b.id == id) {
            b.status = status;
        }
    }

    /// The next `find_pending_by_provider` returns `booking` as read
    /// before a concurrent update
    pub fn serve_stale_pending(&self, booking: Booking) {
        *self.stale_pending.lock().unwrap() = Some(booking);
    }

    /// The next `get` for `booking.id` returns `booking` as read before a
    /// concurrent update
    pub fn serve_stale_get(&self, booking: Booking) {
        *self.stale_get.lock().unwrap() = Some(booking);
    }

    fn check_writable(&self) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("ledger unavailable".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl BookingLedger for MemoryLedger {
    async fn create(&self, booking: &Booking) -> Result<(), String> {
        self.check_writable()?;
        self.bookings.lock().unwrap().push(booking.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, String> {
        let mut stale = self.stale_get.lock().unwrap();
        if stale.as_ref().is_some_and(|b| b.id == id) {
            return Ok(stale.take());
        }
        drop(stale);
        Ok(self.bookings.lock().unwrap().iter().find(|b| b.id == id).cloned())
    }

    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<StatusUpdate, String> {
        self.check_writable()?;
        let mut bookings = self.bookings.lock().unwrap();
        let Some(booking) = bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(StatusUpdate::NotFound);
        };
        if !booking.status.can_transition_to(status) {
            return Ok(StatusUpdate::Rejected {
                current: booking.status,
            });
        }
        let from = booking.status;
        booking.status = status;
        booking.updated_at = Utc::now();
        Ok(StatusUpdate::Applied { from, to: status })
    }

    async fn find_pending_by_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        if let Some(stale) = self.stale_pending.lock().unwrap().take() {
            return Ok(Some(stale));
        }
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|b| b.provider_handle == handle && b.status == BookingStatus::Pending)
            .cloned())
    }

    async fn latest_for_provider(&self, handle: &str) -> Result<Option<Booking>, String> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|b| b.provider_handle == handle)
            .cloned())
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Records every message; clones share the record
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn sent_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == to)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, text: &str) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Http {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(OutboundMessage::new(to, text));
        Ok(())
    }
}

pub struct StaticGeocoder {
    place: String,
    calls: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new(place: impl Into<String>) -> Self {
        Self {
            place: place.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.place.clone())
    }
}

/// Never answers within any reasonable timeout
pub struct SlowGeocoder {
    delay: Duration,
}

impl SlowGeocoder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Geocoder for SlowGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<String, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        Ok("Mbare, Harare".to_string())
    }
}

pub struct StaticClassifier {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for StaticClassifier {
    async fn classify(&self, _text: &str) -> Result<Option<String>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
