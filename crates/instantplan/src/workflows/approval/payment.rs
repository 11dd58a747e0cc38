use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::domain::{Fee, PaymentRecord, PaymentStatus, SubmissionId};
use super::retry::Retryable;

/// Charges the approval fee for a submission.
///
/// A confirmed charge is final: charging the same submission again must return the existing
/// record without moving money.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        submission_id: &SubmissionId,
        amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl Retryable for PaymentError {
    fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::GatewayUnavailable(_))
    }
}

/// In-process stand-in for a mobile-money collection API.
///
/// Every positive charge succeeds and is kept in a ledger keyed by submission.
#[derive(Debug, Default)]
pub struct SimulatedMobileMoneyGateway {
    ledger: Mutex<HashMap<SubmissionId, PaymentRecord>>,
    sequence: AtomicU64,
}

impl SimulatedMobileMoneyGateway {
    /// Number of distinct submissions charged.
    pub fn charged(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedMobileMoneyGateway {
    async fn charge(
        &self,
        submission_id: &SubmissionId,
        amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = ledger.get(submission_id) {
            return Ok(existing.clone());
        }

        if amount.amount_minor == 0 {
            return Err(PaymentError::Declined(
                "amount must be greater than zero".to_string(),
            ));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let record = PaymentRecord {
            submission_id: submission_id.clone(),
            status: PaymentStatus::Confirmed,
            amount: amount.clone(),
            attempts: 1,
            reference: Some(format!("MPESA-{sequence:08}")),
            confirmed_at: Some(Utc::now()),
            failure: None,
        };
        ledger.insert(submission_id.clone(), record.clone());
        info!(%submission_id, %amount, reference = ?record.reference, "simulated payment confirmed");

        Ok(record)
    }
}
