//! Building-plan approval pipeline.
//!
//! A submitted plan moves forward through extraction, compliance analysis, professional
//! registry verification, decision gating, payment confirmation and certificate issuance.
//! Each external capability sits behind a trait so the orchestrating service can be exercised
//! with in-memory backends.

pub mod analysis;
pub mod certificate;
pub mod config;
pub mod decision;
pub mod domain;
pub mod extraction;
pub mod payment;
pub mod registry;
pub mod repository;
pub(crate) mod retry;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use analysis::{AnalysisConfig, Analyzer, IssueRule, RuleBasedAnalyzer};
pub use certificate::{
    qr_reference, render_text_pdf, verification_url, ApprovalIdGenerator, CertificateError,
    CertificateIssuer, IssueRequest, PdfCertificateIssuer,
};
pub use config::{PipelineConfig, UnavailableVerification};
pub use decision::{decide, ApprovalDecision, DecisionPolicy, DecisionReason, DecisionState};
pub use domain::{
    AnalysisReport, AnalysisResult, ApprovalArtifact, ApprovalId, Certificate, ComplianceIssue,
    ExtractionResult, Fee, MediaType, PaymentRecord, PaymentStatus, PipelineStep,
    PlanSubmission, RegistrationType, Stage, StageFailure, SubmissionId, VerificationRecord,
};
pub use extraction::{parse_labeled_fields, ExtractionError, Extractor, TextLayerExtractor};
pub use payment::{PaymentError, PaymentGateway, SimulatedMobileMoneyGateway};
pub use registry::{
    CachedRegistryVerifier, InMemoryRegistry, RegistryError, RegistryLookup, RegistryVerifier,
};
pub use repository::{
    InMemorySubmissionRepository, PublicVerification, RepositoryError, SubmissionRecord,
    SubmissionRepository, SubmissionStatusView,
};
pub use retry::{RetryPolicy, Retryable};
pub use router::plan_router;
pub use service::{Collaborators, PipelineError, PlanApprovalService};
