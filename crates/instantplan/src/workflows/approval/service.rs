use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::analysis::{Analyzer, RuleBasedAnalyzer};
use super::certificate::{CertificateIssuer, IssueRequest, PdfCertificateIssuer};
use super::config::{PipelineConfig, UnavailableVerification};
use super::decision::{decide, reconcile, ApprovalDecision, DecisionReason, DecisionState};
use super::domain::{
    AnalysisReport, ApprovalId, Certificate, MediaType, PaymentRecord, PaymentStatus,
    PipelineStep, PlanSubmission, RegistrationType, Stage, StageFailure, SubmissionId,
    VerificationRecord,
};
use super::extraction::{ExtractionError, Extractor, TextLayerExtractor};
use super::payment::{PaymentError, PaymentGateway, SimulatedMobileMoneyGateway};
use super::registry::{CachedRegistryVerifier, InMemoryRegistry, RegistryVerifier};
use super::repository::{
    PublicVerification, RepositoryError, SubmissionRecord, SubmissionRepository,
};
use super::retry::{call_with_retry, CallError};

/// External capabilities the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub analyzer: Arc<dyn Analyzer>,
    pub registry: Arc<dyn RegistryVerifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub issuer: Arc<dyn CertificateIssuer>,
}

const REGISTRY_CACHE_TTL: Duration = Duration::from_secs(300);

impl Collaborators {
    /// In-process collaborators: text-layer extraction, rule scoring, the given registry,
    /// simulated mobile money and PDF certificates.
    pub fn in_process(config: &PipelineConfig, registry: InMemoryRegistry) -> Self {
        Self {
            extractor: Arc::new(TextLayerExtractor::default()),
            analyzer: Arc::new(RuleBasedAnalyzer::new(config.analysis.clone())),
            registry: Arc::new(CachedRegistryVerifier::new(registry, REGISTRY_CACHE_TTL)),
            payments: Arc::new(SimulatedMobileMoneyGateway::default()),
            issuer: Arc::new(PdfCertificateIssuer::new(config.verification_host.clone())),
        }
    }
}

/// Per-submission writer gate plus the token that cancels its in-flight calls.
struct SubmissionSlot {
    gate: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
}

impl SubmissionSlot {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn rearm(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

/// Drives plan submissions through the approval state machine.
///
/// Transitions for one submission are serialized; distinct submissions proceed independently.
pub struct PlanApprovalService<R> {
    repository: Arc<R>,
    collaborators: Collaborators,
    config: PipelineConfig,
    slots: Mutex<HashMap<SubmissionId, Arc<SubmissionSlot>>>,
}

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id() -> SubmissionId {
    let id = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubmissionId(format!("plan-{id:06}"))
}

impl<R> PlanApprovalService<R>
where
    R: SubmissionRepository + 'static,
{
    pub fn new(repository: Arc<R>, collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            repository,
            collaborators,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Accept a plan document. The submission starts at [`Stage::Uploaded`].
    pub fn submit(
        &self,
        document: Vec<u8>,
        declared_media_type: &str,
    ) -> Result<SubmissionRecord, PipelineError> {
        self.intake(document, declared_media_type, None)
    }

    /// Start a new decision cycle for a rejected plan with a corrected document.
    pub fn revise(
        &self,
        id: &SubmissionId,
        document: Vec<u8>,
        declared_media_type: &str,
    ) -> Result<SubmissionRecord, PipelineError> {
        let record = self.load(id)?;
        if !self.config.allow_revisions || record.stage() != Stage::Rejected {
            return Err(PipelineError::InvalidAction {
                stage: record.stage(),
                action: "revise",
            });
        }

        self.intake(document, declared_media_type, Some(id.clone()))
    }

    /// Run every stage that can run without payment, stopping at the first blocking point.
    pub async fn advance(&self, id: &SubmissionId) -> Result<SubmissionRecord, PipelineError> {
        let slot = self.slot(id);
        let _gate = slot.gate.lock().await;
        let cancel = slot.token();
        let mut record = self.load(id)?;

        let outcome = self.drive(&mut record, &cancel).await;
        self.release_if_settled(&record);
        outcome.map(|()| record)
    }

    /// Charge the approval fee. Repeated calls after confirmation return the stored record.
    pub async fn confirm_payment(&self, id: &SubmissionId) -> Result<PaymentRecord, PipelineError> {
        let slot = self.slot(id);
        let _gate = slot.gate.lock().await;
        let mut record = self.load(id)?;

        let outcome = self.settle_payment(&mut record).await;
        self.release_if_settled(&record);
        outcome
    }

    async fn settle_payment(
        &self,
        record: &mut SubmissionRecord,
    ) -> Result<PaymentRecord, PipelineError> {
        if record.payment.is_confirmed() {
            return Ok(record.payment.clone());
        }
        match record.stage() {
            Stage::PaymentPending => {}
            stage => {
                return Err(PipelineError::InvalidAction {
                    stage,
                    action: "confirm payment for",
                })
            }
        }

        let pending = pending_verifications(record);
        if !pending.is_empty() {
            let registries = pending
                .iter()
                .map(|kind| kind.label())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PipelineError::VerificationPending { registries });
        }

        // Charges are never cancelled; abandon waits for them on the gate.
        let uncancelled = CancellationToken::new();
        let id = record.id().clone();
        let step = PipelineStep::Payment;
        let payments = &self.collaborators.payments;
        let fee = record.payment.amount.clone();
        let attempts = record.payment.attempts + 1;
        let outcome = call_with_retry(&self.config.retry, step, &id, &uncancelled, || {
            payments.charge(&id, &fee)
        })
        .await;

        let charged = match outcome {
            Ok(payment) if payment.is_confirmed() => Ok(payment),
            Ok(payment) => Err(payment
                .failure
                .unwrap_or_else(|| "gateway did not confirm the charge".to_string())),
            Err(CallError::Rejected(PaymentError::Declined(reason))) => Err(reason),
            Err(other) => return Err(self.escalate(record, step, other)),
        };

        match charged {
            Ok(mut payment) => {
                payment.attempts = attempts;
                record.payment = payment;
            }
            Err(reason) => {
                record.payment = PaymentRecord {
                    status: PaymentStatus::Failed,
                    attempts,
                    reference: None,
                    confirmed_at: None,
                    failure: Some(reason.clone()),
                    ..record.payment.clone()
                };
                let decision = self.evaluate(record)?;
                record_decision(record, decision);
                self.repository.update(record.clone())?;
                warn!(submission_id = %id, attempts, %reason, "payment declined");
                return Err(PipelineError::PaymentDeclined { reason });
            }
        }

        let decision = self.evaluate(record)?;
        let approved = decision.state == DecisionState::Approved;
        record_decision(record, decision);
        if !approved {
            self.repository.update(record.clone())?;
            return Ok(record.payment.clone());
        }

        self.transition(record, Stage::Paid)?;
        let payment = record.payment.clone();

        if let Err(err) = self.issue(record, &uncancelled).await {
            warn!(submission_id = %id, error = %err, "certificate issuance deferred");
        }

        Ok(payment)
    }

    /// The approval certificate, generated on first request and cached afterwards.
    pub async fn certificate(&self, id: &SubmissionId) -> Result<Certificate, PipelineError> {
        let record = self.load(id)?;
        if let Some(certificate) = record.certificate {
            return Ok(certificate);
        }
        if record.stage() != Stage::Paid {
            return Err(PipelineError::NotReady {
                stage: record.stage(),
            });
        }

        let slot = self.slot(id);
        let _gate = slot.gate.lock().await;
        let cancel = slot.token();
        let mut record = self.load(id)?;
        let outcome = self.issue(&mut record, &cancel).await;
        self.release_if_settled(&record);
        outcome
    }

    /// Printable certificate of a submission.
    pub fn certificate_document(
        &self,
        id: &SubmissionId,
    ) -> Result<(ApprovalId, Vec<u8>), PipelineError> {
        let record = self.load(id)?;
        let stage = record.stage();
        record
            .certificate
            .and_then(|certificate| {
                let approval_id = certificate.approval_id;
                certificate.document.map(|document| (approval_id, document))
            })
            .ok_or(PipelineError::NotReady { stage })
    }

    /// Printable certificate looked up by its approval id.
    pub fn document_by_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<Vec<u8>, PipelineError> {
        let record = self
            .repository
            .find_by_approval(approval_id)?
            .ok_or_else(|| PipelineError::UnknownApproval(approval_id.clone()))?;
        let stage = record.stage();
        record
            .certificate
            .and_then(|certificate| certificate.document)
            .ok_or(PipelineError::NotReady { stage })
    }

    /// Public answer for a verification URL.
    pub fn verify_approval(
        &self,
        approval_id: &ApprovalId,
    ) -> Result<PublicVerification, PipelineError> {
        self.repository
            .find_by_approval(approval_id)?
            .as_ref()
            .and_then(PublicVerification::from_record)
            .ok_or_else(|| PipelineError::UnknownApproval(approval_id.clone()))
    }

    pub fn get(&self, id: &SubmissionId) -> Result<SubmissionRecord, PipelineError> {
        self.load(id)
    }

    pub fn analysis_report(&self, id: &SubmissionId) -> Result<AnalysisReport, PipelineError> {
        let record = self.load(id)?;
        record.analysis_report().ok_or(PipelineError::NotReady {
            stage: record.stage(),
        })
    }

    pub fn verification_report(
        &self,
        id: &SubmissionId,
    ) -> Result<Vec<VerificationRecord>, PipelineError> {
        let record = self.load(id)?;
        match record.stage() {
            stage @ (Stage::Uploaded | Stage::Extracted | Stage::Analyzed) => {
                Err(PipelineError::NotReady { stage })
            }
            _ => Ok(record.verifications),
        }
    }

    /// Cancel in-flight work and retire a submission that has not been paid for.
    ///
    /// A charge already in progress is allowed to finish; if it confirms, abandon is refused.
    pub async fn abandon(&self, id: &SubmissionId) -> Result<SubmissionRecord, PipelineError> {
        let current = self.load(id)?;
        if holds_payment(&current) {
            return Err(PipelineError::InvalidAction {
                stage: current.stage(),
                action: "abandon",
            });
        }
        if current.stage().is_terminal() {
            return Ok(current);
        }

        let slot = self.slot(id);
        slot.cancel();
        let _gate = slot.gate.lock().await;
        let mut record = self.load(id)?;

        if holds_payment(&record) {
            slot.rearm();
            return Err(PipelineError::InvalidAction {
                stage: record.stage(),
                action: "abandon",
            });
        }
        if !record.stage().is_terminal() {
            self.transition(&mut record, Stage::Abandoned)?;
        }
        self.release_if_settled(&record);
        Ok(record)
    }

    #[cfg(test)]
    pub(crate) fn tracked_submissions(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<R> PlanApprovalService<R>
where
    R: SubmissionRepository + 'static,
{
    fn intake(
        &self,
        document: Vec<u8>,
        declared_media_type: &str,
        revision_of: Option<SubmissionId>,
    ) -> Result<SubmissionRecord, PipelineError> {
        let media_type = MediaType::parse(declared_media_type).ok_or_else(|| {
            PipelineError::UnsupportedFormat {
                media_type: declared_media_type.trim().to_string(),
            }
        })?;

        let id = next_submission_id();
        let submission = PlanSubmission {
            id: id.clone(),
            document,
            media_type,
            created_at: Utc::now(),
            stage: Stage::Uploaded,
            revision_of,
        };
        let payment = PaymentRecord::unpaid(id, self.config.fee.clone());

        let stored = self
            .repository
            .insert(SubmissionRecord::new(submission, payment))?;
        info!(
            submission_id = %stored.id(),
            %media_type,
            bytes = stored.submission.document.len(),
            revision_of = ?stored.submission.revision_of,
            "plan received"
        );
        Ok(stored)
    }

    async fn drive(
        &self,
        record: &mut SubmissionRecord,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        loop {
            match record.stage() {
                Stage::Uploaded => self.run_extraction(record, cancel).await?,
                Stage::Extracted => self.run_analysis(record)?,
                Stage::Analyzed => self.run_verification(record, cancel).await?,
                Stage::Verified => self.run_decision(record)?,
                Stage::PaymentPending => {
                    let pending = pending_verifications(record);
                    if !pending.is_empty() {
                        self.reverify(record, &pending, cancel).await?;
                    }
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    async fn run_extraction(
        &self,
        record: &mut SubmissionRecord,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let step = PipelineStep::Extraction;
        let extractor = &self.collaborators.extractor;
        let media_type = record.submission.media_type;
        let document = &record.submission.document;
        let outcome = call_with_retry(&self.config.retry, step, &record.submission.id, cancel, || {
            extractor.extract(document, media_type)
        })
        .await;

        match outcome {
            Ok(extraction) => {
                record.extraction = Some(extraction);
                self.transition(record, Stage::Extracted)
            }
            Err(CallError::Rejected(ExtractionError::UnsupportedFormat(media_type))) => {
                warn!(submission_id = %record.id(), %media_type, "extractor refused media type");
                Err(PipelineError::UnsupportedFormat { media_type })
            }
            Err(CallError::Rejected(err)) => {
                let reason = err.to_string();
                self.fail(record, step, reason.clone())?;
                Err(PipelineError::ExtractionFailed { reason })
            }
            Err(other) => Err(self.escalate(record, step, other)),
        }
    }

    fn run_analysis(&self, record: &mut SubmissionRecord) -> Result<(), PipelineError> {
        let extraction = record.extraction.as_ref().ok_or(PipelineError::MissingInput {
            step: PipelineStep::Analysis,
        })?;
        let analysis = self.collaborators.analyzer.analyze(extraction);
        info!(
            submission_id = %record.id(),
            approval_score = analysis.approval_score,
            issues = analysis.issues.len(),
            "plan analyzed"
        );
        record.analysis = Some(analysis);
        self.transition(record, Stage::Analyzed)
    }

    async fn run_verification(
        &self,
        record: &mut SubmissionRecord,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let required = self.config.decision.required_registrations.clone();
        self.verify_registrations(record, &required, cancel).await?;
        self.transition(record, Stage::Verified)
    }

    /// Re-checks registries an earlier outage left unverified and re-runs the decision.
    async fn reverify(
        &self,
        record: &mut SubmissionRecord,
        kinds: &[RegistrationType],
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.verify_registrations(record, kinds, cancel).await?;

        let decision = self.evaluate(record)?;
        let rejected = decision.state == DecisionState::Rejected;
        info!(
            submission_id = %record.id(),
            decision = decision.state.label(),
            reasons = ?decision.reason_tags(),
            "verification re-run"
        );
        record_decision(record, decision);
        if rejected {
            self.transition(record, Stage::Rejected)
        } else {
            self.repository.update(record.clone())?;
            Ok(())
        }
    }

    async fn verify_registrations(
        &self,
        record: &mut SubmissionRecord,
        kinds: &[RegistrationType],
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let step = PipelineStep::Verification;
        let extraction = record
            .extraction
            .clone()
            .ok_or(PipelineError::MissingInput { step })?;
        let registry = &self.collaborators.registry;

        for kind in kinds.iter().copied() {
            let registration_id = extraction.registration_id(kind).unwrap_or_default().to_string();
            let outcome = call_with_retry(&self.config.retry, step, &record.submission.id, cancel, || {
                registry.verify(kind, &registration_id)
            })
            .await;

            let cause = match outcome {
                Ok(verification) => {
                    record.record_verification(verification);
                    continue;
                }
                Err(CallError::Cancelled) => return Err(PipelineError::Cancelled { step }),
                Err(CallError::Rejected(err)) => err.to_string(),
                Err(CallError::Exhausted { cause, .. }) => cause,
            };

            warn!(submission_id = %record.id(), registry = %kind, %cause, "registry verification unavailable");
            if self.config.unavailable_verification == UnavailableVerification::TreatAsAbsent {
                record.record_verification(VerificationRecord {
                    registration_type: kind,
                    registration_id,
                    present: false,
                    checked_at: Utc::now(),
                });
            }
        }

        Ok(())
    }

    fn run_decision(&self, record: &mut SubmissionRecord) -> Result<(), PipelineError> {
        let decision = self.evaluate(record)?;
        let next = match decision.state {
            DecisionState::Rejected => Stage::Rejected,
            DecisionState::Pending => Stage::PaymentPending,
            DecisionState::Approved => Stage::Paid,
        };
        info!(
            submission_id = %record.id(),
            decision = decision.state.label(),
            reasons = ?decision.reason_tags(),
            advisories = ?decision.advisory_tags(),
            "decision recorded"
        );
        record_decision(record, decision);
        self.transition(record, next)
    }

    fn evaluate(&self, record: &SubmissionRecord) -> Result<ApprovalDecision, PipelineError> {
        let analysis = record.analysis.as_ref().ok_or(PipelineError::MissingInput {
            step: PipelineStep::Decision,
        })?;
        let next = decide(
            analysis,
            &record.verifications,
            &record.payment,
            &self.config.decision,
            Utc::now(),
        );
        Ok(reconcile(record.decision(), next))
    }

    async fn issue(
        &self,
        record: &mut SubmissionRecord,
        cancel: &CancellationToken,
    ) -> Result<Certificate, PipelineError> {
        if let Some(existing) = &record.certificate {
            return Ok(existing.clone());
        }
        if record.stage() != Stage::Paid {
            return Err(PipelineError::NotReady {
                stage: record.stage(),
            });
        }

        let step = PipelineStep::Issuance;
        let field = |name: &str| {
            record
                .extraction
                .as_ref()
                .and_then(|extraction| extraction.field(name))
                .map(str::to_string)
        };
        let request = IssueRequest {
            submission_id: record.id().clone(),
            approved_at: record
                .decision()
                .map(|decision| decision.decided_at)
                .unwrap_or_else(Utc::now),
            architect: field(RegistrationType::Boraqs.professional_field()),
            engineer: field(RegistrationType::Ebk.professional_field()),
        };

        let issuer = &self.collaborators.issuer;
        let outcome = call_with_retry(&self.config.retry, step, &request.submission_id, cancel, || {
            issuer.issue(&request)
        })
        .await;

        let cause = match outcome {
            Ok(certificate) => {
                record.certificate = Some(certificate.clone());
                record.failure = None;
                self.transition(record, Stage::CertificateIssued)?;
                return Ok(certificate);
            }
            Err(CallError::Cancelled) => return Err(PipelineError::Cancelled { step }),
            Err(CallError::Rejected(err)) => err.to_string(),
            Err(CallError::Exhausted { attempts, cause }) => {
                format!("{cause} (after {attempts} attempts)")
            }
        };

        // Payment is irreversible, so the submission stays Paid and issuance can be retried.
        record.failure = Some(StageFailure {
            step,
            cause: cause.clone(),
            failed_at: Utc::now(),
        });
        self.repository.update(record.clone())?;
        Err(PipelineError::PipelineFailed { step, cause })
    }

    fn escalate<E: fmt::Display>(
        &self,
        record: &mut SubmissionRecord,
        step: PipelineStep,
        error: CallError<E>,
    ) -> PipelineError {
        let cause = match error {
            CallError::Cancelled => return PipelineError::Cancelled { step },
            CallError::Rejected(err) => err.to_string(),
            CallError::Exhausted { attempts, cause } => {
                format!("{cause} (after {attempts} attempts)")
            }
        };

        match self.fail(record, step, cause.clone()) {
            Ok(()) => PipelineError::PipelineFailed { step, cause },
            Err(err) => err,
        }
    }

    fn fail(
        &self,
        record: &mut SubmissionRecord,
        step: PipelineStep,
        cause: String,
    ) -> Result<(), PipelineError> {
        warn!(submission_id = %record.id(), %step, %cause, "submission failed");
        record.failure = Some(StageFailure {
            step,
            cause,
            failed_at: Utc::now(),
        });
        self.transition(record, Stage::Failed)
    }

    /// Persist `next` as the record's stage; the in-memory record only changes once stored.
    fn transition(&self, record: &mut SubmissionRecord, next: Stage) -> Result<(), PipelineError> {
        let current = record.stage();
        if !current.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: current,
                to: next,
            });
        }

        let mut updated = record.clone();
        updated.submission.stage = next;
        self.repository.update(updated.clone())?;
        *record = updated;

        info!(submission_id = %record.id(), from = %current, to = %next, "stage advanced");
        Ok(())
    }

    fn load(&self, id: &SubmissionId) -> Result<SubmissionRecord, PipelineError> {
        let record = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    fn slot(&self, id: &SubmissionId) -> Arc<SubmissionSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(SubmissionSlot::new()))
            .clone()
    }

    /// Terminal submissions never change again, so their slot can go.
    fn release_if_settled(&self, record: &SubmissionRecord) {
        if record.stage().is_terminal() {
            self.slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(record.id());
        }
    }
}

/// Registries the current decision is still waiting on.
fn pending_verifications(record: &SubmissionRecord) -> Vec<RegistrationType> {
    record
        .decision()
        .map(|decision| {
            decision
                .reasons
                .iter()
                .filter_map(|reason| match reason {
                    DecisionReason::VerificationMissing(kind) => Some(*kind),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A confirmed charge pins the submission; it can no longer be abandoned.
fn holds_payment(record: &SubmissionRecord) -> bool {
    record.payment.is_confirmed()
        || matches!(record.stage(), Stage::Paid | Stage::CertificateIssued)
}

/// Appends a decision cycle when the outcome differs from the current one.
fn record_decision(record: &mut SubmissionRecord, decision: ApprovalDecision) {
    let changed = record
        .decision()
        .map_or(true, |current| !current.same_outcome(&decision));
    if changed {
        record.decisions.push(decision);
    }
}

/// Error raised by the approval service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unsupported media type `{media_type}`; expected pdf, png, jpg or jpeg")]
    UnsupportedFormat { media_type: String },
    #[error("extraction failed: {reason}")]
    ExtractionFailed { reason: String },
    #[error("payment declined: {reason}")]
    PaymentDeclined { reason: String },
    #[error("{step} failed: {cause}")]
    PipelineFailed { step: PipelineStep, cause: String },
    #[error("not ready: submission is {stage}")]
    NotReady { stage: Stage },
    #[error("payment blocked until {registries} verification completes")]
    VerificationPending { registries: String },
    #[error("cannot {action} a submission that is {stage}")]
    InvalidAction { stage: Stage, action: &'static str },
    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: Stage, to: Stage },
    #[error("{step} input missing")]
    MissingInput { step: PipelineStep },
    #[error("{step} cancelled")]
    Cancelled { step: PipelineStep },
    #[error("unknown approval id {0}")]
    UnknownApproval(ApprovalId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PipelineError {
    /// Stable identifier of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat { .. } => "unsupported_format",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::PaymentDeclined { .. } => "payment_declined",
            PipelineError::PipelineFailed { .. } => "pipeline_failed",
            PipelineError::NotReady { .. } => "not_ready",
            PipelineError::VerificationPending { .. } => "verification_pending",
            PipelineError::InvalidAction { .. } => "invalid_action",
            PipelineError::IllegalTransition { .. } => "illegal_transition",
            PipelineError::MissingInput { .. } => "missing_input",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::UnknownApproval(_) => "unknown_approval",
            PipelineError::Repository(RepositoryError::NotFound) => "not_found",
            PipelineError::Repository(RepositoryError::Conflict) => "conflict",
        }
    }

    /// Pipeline step the error is attributed to, when there is one.
    pub const fn step(&self) -> Option<PipelineStep> {
        match self {
            PipelineError::UnsupportedFormat { .. } => Some(PipelineStep::Intake),
            PipelineError::ExtractionFailed { .. } => Some(PipelineStep::Extraction),
            PipelineError::PaymentDeclined { .. } => Some(PipelineStep::Payment),
            PipelineError::PipelineFailed { step, .. }
            | PipelineError::MissingInput { step }
            | PipelineError::Cancelled { step } => Some(*step),
            PipelineError::NotReady { .. } => Some(PipelineStep::Issuance),
            PipelineError::VerificationPending { .. } => Some(PipelineStep::Verification),
            _ => None,
        }
    }
}
