use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::common::*;
use crate::workflows::approval::{
    CachedRegistryVerifier, RegistrationType, RegistryError, RegistryLookup, RegistryVerifier,
};

#[derive(Default)]
struct CountingLookup {
    calls: AtomicU32,
}

#[async_trait]
impl RegistryLookup for CountingLookup {
    async fn is_registered(
        &self,
        _registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<bool, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(registration_id == "A-12345")
    }
}

struct DownLookup;

#[async_trait]
impl RegistryLookup for DownLookup {
    async fn is_registered(
        &self,
        registration_type: RegistrationType,
        _registration_id: &str,
    ) -> Result<bool, RegistryError> {
        Err(RegistryError::Unavailable {
            registry: registration_type,
            reason: "dns failure".to_string(),
        })
    }
}

#[tokio::test]
async fn empty_id_is_absent_without_lookup() {
    let verifier = CachedRegistryVerifier::new(CountingLookup::default(), Duration::from_secs(60));

    let record = verifier
        .verify(RegistrationType::Boraqs, "")
        .await
        .expect("verification succeeds");

    assert!(!record.present);
    assert_eq!(record.registration_id, "");
    assert_eq!(verifier_calls(&verifier), 0);
}

#[tokio::test]
async fn malformed_id_is_absent() {
    let verifier = CachedRegistryVerifier::new(CountingLookup::default(), Duration::from_secs(60));

    let record = verifier
        .verify(RegistrationType::Ebk, "E 678;90")
        .await
        .expect("verification succeeds");

    assert!(!record.present);
    assert_eq!(verifier_calls(&verifier), 0);
}

#[tokio::test]
async fn ids_are_normalized_before_lookup() {
    let verifier = CachedRegistryVerifier::new(seeded_registry(), Duration::from_secs(60));

    let record = verifier
        .verify(RegistrationType::Boraqs, "  a-12345 ")
        .await
        .expect("verification succeeds");

    assert!(record.present);
    assert_eq!(record.registration_id, "a-12345");
}

#[tokio::test]
async fn answers_are_cached_and_checked_at_advances() {
    let verifier = CachedRegistryVerifier::new(CountingLookup::default(), Duration::from_secs(60));

    let first = verifier
        .verify(RegistrationType::Boraqs, "A-12345")
        .await
        .expect("first lookup");
    let second = verifier
        .verify(RegistrationType::Boraqs, "a-12345")
        .await
        .expect("cached lookup");

    assert!(first.present && second.present);
    assert_eq!(verifier_calls(&verifier), 1);
    assert!(second.checked_at >= first.checked_at);
}

#[tokio::test]
async fn expired_answers_are_looked_up_again() {
    let verifier = CachedRegistryVerifier::new(CountingLookup::default(), Duration::ZERO);

    for _ in 0..2 {
        verifier
            .verify(RegistrationType::Boraqs, "A-12345")
            .await
            .expect("lookup");
    }

    assert_eq!(verifier_calls(&verifier), 2);
}

#[tokio::test]
async fn unavailable_registry_surfaces_retryable_error() {
    use crate::workflows::approval::Retryable;

    let verifier = CachedRegistryVerifier::new(DownLookup, Duration::from_secs(60));

    let err = verifier
        .verify(RegistrationType::Ebk, "E-67890")
        .await
        .expect_err("registry is down");

    assert!(err.is_retryable());
    assert!(err.to_string().contains("ebk"));
}

fn verifier_calls(verifier: &CachedRegistryVerifier<CountingLookup>) -> u32 {
    verifier.lookup().calls.load(Ordering::SeqCst)
}
