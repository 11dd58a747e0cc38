use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::decision::{ApprovalDecision, DecisionState};
use super::domain::{
    AnalysisReport, AnalysisResult, ApprovalId, Certificate, ExtractionResult, PaymentRecord,
    PaymentStatus, PlanSubmission, Stage, StageFailure, SubmissionId, VerificationRecord,
};

/// Everything the pipeline has produced for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub submission: PlanSubmission,
    pub extraction: Option<ExtractionResult>,
    pub analysis: Option<AnalysisResult>,
    pub verifications: Vec<VerificationRecord>,
    /// Every decision cycle, oldest first.
    pub decisions: Vec<ApprovalDecision>,
    pub payment: PaymentRecord,
    pub certificate: Option<Certificate>,
    pub failure: Option<StageFailure>,
}

impl SubmissionRecord {
    pub fn new(submission: PlanSubmission, payment: PaymentRecord) -> Self {
        Self {
            submission,
            extraction: None,
            analysis: None,
            verifications: Vec::new(),
            decisions: Vec::new(),
            payment,
            certificate: None,
            failure: None,
        }
    }

    pub fn id(&self) -> &SubmissionId {
        &self.submission.id
    }

    pub fn stage(&self) -> Stage {
        self.submission.stage
    }

    pub fn decision(&self) -> Option<&ApprovalDecision> {
        self.decisions.last()
    }

    /// Stores a verification, replacing any earlier record of the same registry.
    ///
    /// Records stay ordered by registry and `checked_at` never moves backwards.
    pub fn record_verification(&mut self, mut record: VerificationRecord) {
        match self
            .verifications
            .iter_mut()
            .find(|existing| existing.registration_type == record.registration_type)
        {
            Some(existing) => {
                if record.checked_at < existing.checked_at {
                    record.checked_at = existing.checked_at;
                }
                *existing = record;
            }
            None => self.verifications.push(record),
        }
        self.verifications
            .sort_by_key(|record| record.registration_type);
    }

    pub fn analysis_report(&self) -> Option<AnalysisReport> {
        match (&self.analysis, &self.extraction) {
            (Some(analysis), Some(extraction)) => Some(analysis.report(extraction)),
            _ => None,
        }
    }

    pub fn decision_rationale(&self) -> String {
        match self.decision() {
            Some(decision) => decision.summary(),
            None => "pending evaluation".to_string(),
        }
    }

    pub fn status_view(&self) -> SubmissionStatusView {
        SubmissionStatusView {
            submission_id: self.submission.id.clone(),
            stage: self.stage().label(),
            decision: self.decision().map(|decision| decision.state.label()),
            decision_rationale: self.decision_rationale(),
            reasons: self
                .decision()
                .map(ApprovalDecision::reason_tags)
                .unwrap_or_default(),
            advisories: self
                .decision()
                .map(ApprovalDecision::advisory_tags)
                .unwrap_or_default(),
            approval_score: self.analysis.as_ref().map(|analysis| analysis.approval_score),
            payment_status: self.payment.status,
            approval_id: self
                .certificate
                .as_ref()
                .map(|certificate| certificate.approval_id.clone()),
            revision_of: self.submission.revision_of.clone(),
            failure: self.failure.clone(),
        }
    }
}

/// Sanitized representation of a submission's progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatusView {
    pub submission_id: SubmissionId,
    pub stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<&'static str>,
    pub decision_rationale: String,
    pub reasons: Vec<String>,
    pub advisories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_score: Option<f64>,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_of: Option<SubmissionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

/// Answer to a public lookup of an approval id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVerification {
    pub approval_id: ApprovalId,
    pub valid: bool,
    pub submission_id: SubmissionId,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub verification_url: String,
}

impl PublicVerification {
    pub fn from_record(record: &SubmissionRecord) -> Option<Self> {
        let certificate = record.certificate.as_ref()?;
        let approved = record
            .decision()
            .map(|decision| decision.state == DecisionState::Approved)
            .unwrap_or(false);

        Some(Self {
            approval_id: certificate.approval_id.clone(),
            valid: approved && record.payment.is_confirmed(),
            submission_id: record.submission.id.clone(),
            issued_at: certificate.issued_at,
            verification_url: certificate.verification_url.clone(),
        })
    }
}

/// Storage abstraction so the approval service can be exercised in isolation.
pub trait SubmissionRepository: Send + Sync {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, RepositoryError>;
    fn update(&self, record: SubmissionRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, RepositoryError>;
    fn find_by_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<SubmissionRecord>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

/// Process-local store; submissions live as long as the process.
#[derive(Debug, Default)]
pub struct InMemorySubmissionRepository {
    records: Mutex<HashMap<SubmissionId, SubmissionRecord>>,
}

impl InMemorySubmissionRepository {
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionRepository for InMemorySubmissionRepository {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: SubmissionRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.get_mut(record.id()) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(id).cloned())
    }

    fn find_by_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Option<SubmissionRecord>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .values()
            .find(|record| {
                record
                    .certificate
                    .as_ref()
                    .is_some_and(|certificate| &certificate.approval_id == approval_id)
            })
            .cloned())
    }
}
