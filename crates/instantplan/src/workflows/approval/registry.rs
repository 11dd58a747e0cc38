use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{RegistrationType, VerificationRecord};
use super::retry::Retryable;

/// Checks a professional registration against its registry.
///
/// Implementations must stamp `checked_at` on every call, even when the answer is cached.
#[async_trait]
pub trait RegistryVerifier: Send + Sync {
    async fn verify(
        &self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<VerificationRecord, RegistryError>;
}

/// Raw registry backend consulted by [`CachedRegistryVerifier`].
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    async fn is_registered(
        &self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<bool, RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{registry} registry unavailable: {reason}")]
    Unavailable {
        registry: RegistrationType,
        reason: String,
    },
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable { .. })
    }
}

/// Ids contain only alphanumerics, `-` and `/`, and at least one alphanumeric.
fn is_well_formed(registration_id: &str) -> bool {
    !registration_id.is_empty()
        && registration_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
        && registration_id.chars().any(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Default)]
struct VerifierState {
    answers: HashMap<(RegistrationType, String), (bool, Instant)>,
    last_checked: HashMap<RegistrationType, DateTime<Utc>>,
}

/// Memoizes registry answers for `ttl` and keeps `checked_at` non-decreasing per registry.
pub struct CachedRegistryVerifier<L> {
    lookup: L,
    ttl: Duration,
    state: Mutex<VerifierState>,
}

impl<L: RegistryLookup> CachedRegistryVerifier<L> {
    pub fn new(lookup: L, ttl: Duration) -> Self {
        Self {
            lookup,
            ttl,
            state: Mutex::new(VerifierState::default()),
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    fn cached(&self, key: &(RegistrationType, String)) -> Option<bool> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .answers
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(present, _)| *present)
    }

    fn remember(&self, key: (RegistrationType, String), present: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.answers.insert(key, (present, Instant::now()));
    }

    fn stamp(&self, registration_type: RegistrationType) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let stamp = match state.last_checked.get(&registration_type) {
            Some(previous) if *previous > now => *previous,
            _ => now,
        };
        state.last_checked.insert(registration_type, stamp);
        stamp
    }
}

#[async_trait]
impl<L: RegistryLookup> RegistryVerifier for CachedRegistryVerifier<L> {
    async fn verify(
        &self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<VerificationRecord, RegistryError> {
        let normalized = registration_id.trim().to_ascii_uppercase();

        let present = if !is_well_formed(&normalized) {
            false
        } else {
            let key = (registration_type, normalized.clone());
            match self.cached(&key) {
                Some(present) => present,
                None => {
                    let present = self
                        .lookup
                        .is_registered(registration_type, &normalized)
                        .await?;
                    self.remember(key, present);
                    present
                }
            }
        };

        debug!(%registration_type, registration_id = %normalized, present, "registration checked");

        Ok(VerificationRecord {
            registration_type,
            registration_id: registration_id.trim().to_string(),
            present,
            checked_at: self.stamp(registration_type),
        })
    }
}

/// Registry backed by a fixed set of known registrations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    entries: BTreeMap<RegistrationType, BTreeSet<String>>,
}

impl InMemoryRegistry {
    pub fn with_registration(
        mut self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Self {
        self.register(registration_type, registration_id);
        self
    }

    pub fn register(&mut self, registration_type: RegistrationType, registration_id: &str) {
        self.entries
            .entry(registration_type)
            .or_default()
            .insert(registration_id.trim().to_ascii_uppercase());
    }
}

#[async_trait]
impl RegistryLookup for InMemoryRegistry {
    async fn is_registered(
        &self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<bool, RegistryError> {
        Ok(self
            .entries
            .get(&registration_type)
            .map(|ids| ids.contains(&registration_id.to_ascii_uppercase()))
            .unwrap_or(false))
    }
}
