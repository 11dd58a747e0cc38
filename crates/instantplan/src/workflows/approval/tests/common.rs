use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::approval::{
    render_text_pdf, AnalysisResult, CachedRegistryVerifier, Certificate, CertificateError,
    CertificateIssuer, Collaborators, ComplianceIssue, ExtractionError, ExtractionResult,
    Extractor, Fee, InMemoryRegistry, InMemorySubmissionRepository, IssueRequest, MediaType,
    PaymentError, PaymentGateway, PaymentRecord, PdfCertificateIssuer, PipelineConfig,
    PlanApprovalService, RegistrationType, RegistryError, RegistryVerifier, RetryPolicy,
    RuleBasedAnalyzer, SimulatedMobileMoneyGateway, SubmissionId, TextLayerExtractor,
    VerificationRecord,
};

pub(super) const APPROVABLE_PLAN: &str = "Architect: John Doe\n\
BORAQS Reg: A-12345\n\
Engineer: Jane Smith\n\
EBK Reg: E-67890\n\
Notes: Site plan included. Structural drawings attached.";

pub(super) const INCOMPLETE_PLAN: &str = "Architect: John Doe\n\
BORAQS Reg: A-12345\n\
Engineer: Jane Smith\n\
EBK Reg: E-67890\n\
Notes: Elevations only.";

pub(super) const UNREGISTERED_PLAN: &str = "Architect: John Doe\n\
Engineer: Jane Smith\n\
Notes: Site plan included. Structural drawings attached.";

pub(super) type TestService = PlanApprovalService<InMemorySubmissionRepository>;

pub(super) fn plan_pdf(text: &str) -> Vec<u8> {
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    render_text_pdf(&lines)
}

pub(super) fn decided_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

pub(super) fn analysis(score: f64, issues: &[ComplianceIssue]) -> AnalysisResult {
    AnalysisResult {
        approval_score: score,
        issues: issues.iter().copied().collect(),
    }
}

pub(super) fn extraction(text: &str) -> ExtractionResult {
    ExtractionResult {
        text: text.to_string(),
        fields: crate::workflows::approval::parse_labeled_fields(text),
    }
}

pub(super) fn verification(kind: RegistrationType, present: bool) -> VerificationRecord {
    VerificationRecord {
        registration_type: kind,
        registration_id: match kind {
            RegistrationType::Boraqs => "A-12345".to_string(),
            RegistrationType::Ebk => "E-67890".to_string(),
        },
        present,
        checked_at: decided_at(),
    }
}

pub(super) fn both_registered() -> Vec<VerificationRecord> {
    vec![
        verification(RegistrationType::Boraqs, true),
        verification(RegistrationType::Ebk, true),
    ]
}

pub(super) fn unpaid() -> PaymentRecord {
    PaymentRecord::unpaid(SubmissionId("plan-test".to_string()), fee())
}

pub(super) fn confirmed() -> PaymentRecord {
    PaymentRecord {
        status: crate::workflows::approval::PaymentStatus::Confirmed,
        attempts: 1,
        reference: Some("MPESA-00000001".to_string()),
        confirmed_at: Some(decided_at()),
        ..unpaid()
    }
}

pub(super) fn fee() -> Fee {
    Fee {
        amount_minor: 50_000,
        currency: "KES".to_string(),
    }
}

pub(super) fn seeded_registry() -> InMemoryRegistry {
    InMemoryRegistry::default()
        .with_registration(RegistrationType::Boraqs, "A-12345")
        .with_registration(RegistrationType::Ebk, "E-67890")
}

pub(super) fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_millis(250),
        },
        verification_host: "plans.example.com".to_string(),
        ..PipelineConfig::default()
    }
}

/// Service wired with observable fakes around the in-process collaborators.
pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<InMemorySubmissionRepository>,
    pub(super) extractor: Arc<FlakyExtractor>,
    pub(super) registry: Arc<FlakyRegistry>,
    pub(super) payments: Arc<CountingGateway>,
    pub(super) issuer: Arc<CountingIssuer>,
}

pub(super) fn build_service() -> Harness {
    build_service_with(fast_config())
}

pub(super) fn build_service_with(config: PipelineConfig) -> Harness {
    let extractor = Arc::new(FlakyExtractor::new(0));
    let registry = Arc::new(FlakyRegistry::new(0));
    let payments = Arc::new(CountingGateway::default());
    let issuer = Arc::new(CountingIssuer::new(Duration::ZERO));
    let collaborators = Collaborators {
        extractor: extractor.clone(),
        analyzer: Arc::new(RuleBasedAnalyzer::new(config.analysis.clone())),
        registry: registry.clone(),
        payments: payments.clone(),
        issuer: issuer.clone(),
    };
    let repository = Arc::new(InMemorySubmissionRepository::default());
    let service = Arc::new(PlanApprovalService::new(
        repository.clone(),
        collaborators,
        config,
    ));

    Harness {
        service,
        repository,
        extractor,
        registry,
        payments,
        issuer,
    }
}

/// Service whose collaborators are swapped in by the caller.
pub(super) fn service_with(collaborators: Collaborators, config: PipelineConfig) -> Arc<TestService> {
    Arc::new(PlanApprovalService::new(
        Arc::new(InMemorySubmissionRepository::default()),
        collaborators,
        config,
    ))
}

pub(super) fn in_process(config: &PipelineConfig) -> Collaborators {
    Collaborators::in_process(config, seeded_registry())
}

/// Fails with a retryable error for the first `failures` calls, then reads the text layer.
pub(super) struct FlakyExtractor {
    failures: AtomicU32,
    calls: AtomicU32,
    inner: TextLayerExtractor,
}

impl FlakyExtractor {
    pub(super) fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            inner: TextLayerExtractor::default(),
        }
    }

    pub(super) fn set_failures(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FlakyExtractor {
    async fn extract(
        &self,
        document: &[u8],
        media_type: MediaType,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExtractionError::Unavailable("ocr backend warming up".to_string()));
        }
        self.inner.extract(document, media_type).await
    }
}

/// Signals once it is called and then never answers.
#[derive(Default)]
pub(super) struct StallingExtractor {
    pub(super) started: Notify,
}

#[async_trait]
impl Extractor for StallingExtractor {
    async fn extract(
        &self,
        _document: &[u8],
        _media_type: MediaType,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(ExtractionError::Unavailable("stalled".to_string()))
    }
}

/// Registry that is unreachable for the first `failures` calls.
pub(super) struct FlakyRegistry {
    failures: AtomicU32,
    calls: AtomicU32,
    inner: CachedRegistryVerifier<InMemoryRegistry>,
}

impl FlakyRegistry {
    pub(super) fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            inner: CachedRegistryVerifier::new(seeded_registry(), Duration::from_secs(60)),
        }
    }

    pub(super) fn set_failures(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryVerifier for FlakyRegistry {
    async fn verify(
        &self,
        registration_type: RegistrationType,
        registration_id: &str,
    ) -> Result<VerificationRecord, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RegistryError::Unavailable {
                registry: registration_type,
                reason: "connection reset".to_string(),
            });
        }
        self.inner.verify(registration_type, registration_id).await
    }
}

/// Simulated gateway that counts every charge request it receives.
#[derive(Default)]
pub(super) struct CountingGateway {
    calls: AtomicU32,
    inner: SimulatedMobileMoneyGateway,
}

impl CountingGateway {
    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn charged(&self) -> usize {
        self.inner.charged()
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn charge(
        &self,
        submission_id: &SubmissionId,
        amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.charge(submission_id, amount).await
    }
}

/// Signals when a charge starts and confirms it only after `delay`.
pub(super) struct SlowGateway {
    pub(super) started: Notify,
    delay: Duration,
    inner: SimulatedMobileMoneyGateway,
}

impl SlowGateway {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            started: Notify::new(),
            delay,
            inner: SimulatedMobileMoneyGateway::default(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SlowGateway {
    async fn charge(
        &self,
        submission_id: &SubmissionId,
        amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.charge(submission_id, amount).await
    }
}

/// Declines the first `declines` charges, then confirms.
pub(super) struct DecliningGateway {
    declines: AtomicU32,
    inner: SimulatedMobileMoneyGateway,
}

impl DecliningGateway {
    pub(super) fn new(declines: u32) -> Self {
        Self {
            declines: AtomicU32::new(declines),
            inner: SimulatedMobileMoneyGateway::default(),
        }
    }
}

#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn charge(
        &self,
        submission_id: &SubmissionId,
        amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError> {
        let remaining = self.declines.load(Ordering::SeqCst);
        if remaining > 0 {
            self.declines.store(remaining - 1, Ordering::SeqCst);
            return Err(PaymentError::Declined("insufficient funds".to_string()));
        }
        self.inner.charge(submission_id, amount).await
    }
}

/// Gateway that never answers successfully.
pub(super) struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn charge(
        &self,
        _submission_id: &SubmissionId,
        _amount: &Fee,
    ) -> Result<PaymentRecord, PaymentError> {
        Err(PaymentError::GatewayUnavailable("mobile money api returned 503".to_string()))
    }
}

/// PDF issuer that counts calls and can be slowed down or made to fail.
pub(super) struct CountingIssuer {
    calls: AtomicU32,
    failures: AtomicU32,
    delay: Duration,
    inner: PdfCertificateIssuer,
}

impl CountingIssuer {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            delay,
            inner: PdfCertificateIssuer::new("plans.example.com"),
        }
    }

    pub(super) fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateIssuer for CountingIssuer {
    async fn issue(&self, request: &IssueRequest) -> Result<Certificate, CertificateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CertificateError::Render("font table missing".to_string()));
        }
        self.inner.issue(request).await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
