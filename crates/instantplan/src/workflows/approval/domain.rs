use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for submitted plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Approval identifier of the form `APPR-YYYYMMDDHHMMSS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub const PREFIX: &'static str = "APPR-";

    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}",
            Self::PREFIX,
            timestamp.format("%Y%m%d%H%M%S")
        ))
    }

    /// True when the identifier is the prefix followed by exactly 14 digits.
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(Self::PREFIX)
            .map(|digits| digits.len() == 14 && digits.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document formats accepted at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Pdf, MediaType::Png, MediaType::Jpeg];

    /// Accepts either a file extension (`pdf`, `.jpg`) or a MIME type (`application/pdf`).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let essence = match trimmed.parse::<mime::Mime>() {
            Ok(parsed) => parsed.essence_str().to_ascii_lowercase(),
            Err(_) => trimmed.trim_start_matches('.').to_ascii_lowercase(),
        };

        match essence.as_str() {
            "pdf" | "application/pdf" => Some(MediaType::Pdf),
            "png" | "image/png" => Some(MediaType::Png),
            "jpg" | "jpeg" | "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            MediaType::Pdf => "pdf",
            MediaType::Png => "png",
            MediaType::Jpeg => "jpeg",
        }
    }

    pub fn mime(self) -> mime::Mime {
        match self {
            MediaType::Pdf => mime::APPLICATION_PDF,
            MediaType::Png => mime::IMAGE_PNG,
            MediaType::Jpeg => mime::IMAGE_JPEG,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position of a submission in the forward-only approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploaded,
    Extracted,
    Analyzed,
    Verified,
    Rejected,
    PaymentPending,
    Paid,
    CertificateIssued,
    Failed,
    Abandoned,
}

impl Stage {
    pub const fn label(self) -> &'static str {
        match self {
            Stage::Uploaded => "uploaded",
            Stage::Extracted => "extracted",
            Stage::Analyzed => "analyzed",
            Stage::Verified => "verified",
            Stage::Rejected => "rejected",
            Stage::PaymentPending => "payment_pending",
            Stage::Paid => "paid",
            Stage::CertificateIssued => "certificate_issued",
            Stage::Failed => "failed",
            Stage::Abandoned => "abandoned",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::Rejected | Stage::CertificateIssued | Stage::Failed | Stage::Abandoned
        )
    }

    /// Whether `next` is a legal forward transition from `self`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Uploaded, Extracted)
                | (Extracted, Analyzed)
                | (Analyzed, Verified)
                | (Verified, Rejected)
                | (Verified, PaymentPending)
                | (Verified, Paid)
                | (PaymentPending, Rejected)
                | (PaymentPending, Paid)
                | (Paid, CertificateIssued)
                | (Uploaded | Extracted | Analyzed | Verified | PaymentPending, Failed)
                | (Uploaded | Extracted | Analyzed | Verified | PaymentPending, Abandoned)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Collaborator boundary a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Intake,
    Extraction,
    Analysis,
    Verification,
    Decision,
    Payment,
    Issuance,
}

impl PipelineStep {
    pub const fn label(self) -> &'static str {
        match self {
            PipelineStep::Intake => "intake",
            PipelineStep::Extraction => "extraction",
            PipelineStep::Analysis => "analysis",
            PipelineStep::Verification => "verification",
            PipelineStep::Decision => "decision",
            PipelineStep::Payment => "payment",
            PipelineStep::Issuance => "issuance",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal failure recorded against a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub step: PipelineStep,
    pub cause: String,
    pub failed_at: DateTime<Utc>,
}

/// A plan as received at intake. Owned by the approval service for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSubmission {
    pub id: SubmissionId,
    pub document: Vec<u8>,
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
    pub stage: Stage,
    pub revision_of: Option<SubmissionId>,
}

/// Professional registries a plan's authors are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationType {
    /// Board of Registration of Architects and Quantity Surveyors.
    Boraqs,
    /// Engineers Board of Kenya.
    Ebk,
}

impl RegistrationType {
    pub const ALL: [RegistrationType; 2] = [RegistrationType::Boraqs, RegistrationType::Ebk];

    pub const fn label(self) -> &'static str {
        match self {
            RegistrationType::Boraqs => "boraqs",
            RegistrationType::Ebk => "ebk",
        }
    }

    /// Name of the extracted field carrying this registry's id.
    pub const fn field_name(self) -> &'static str {
        match self {
            RegistrationType::Boraqs => "boraqs_registration",
            RegistrationType::Ebk => "ebk_registration",
        }
    }

    /// Field naming the professional registered with this registry.
    pub const fn professional_field(self) -> &'static str {
        match self {
            RegistrationType::Boraqs => "architect",
            RegistrationType::Ebk => "engineer",
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Text and labeled fields recovered from a plan document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

impl ExtractionResult {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn registration_id(&self, kind: RegistrationType) -> Option<&str> {
        self.field(kind.field_name())
    }
}

/// Compliance gaps the analyzer can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceIssue {
    MissingSitePlan,
    MissingStructuralDrawings,
}

impl ComplianceIssue {
    pub const fn label(self) -> &'static str {
        match self {
            ComplianceIssue::MissingSitePlan => "missing_site_plan",
            ComplianceIssue::MissingStructuralDrawings => "missing_structural_drawings",
        }
    }
}

/// Bounded compliance score and the issues that reduced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub approval_score: f64,
    pub issues: BTreeSet<ComplianceIssue>,
}

impl AnalysisResult {
    pub fn report(&self, extraction: &ExtractionResult) -> AnalysisReport {
        AnalysisReport {
            approval_score: self.approval_score,
            issues: self
                .issues
                .iter()
                .map(|issue| issue.label().to_string())
                .collect(),
            extracted_text: extraction.text.clone(),
        }
    }
}

/// Consumer-facing analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub approval_score: f64,
    pub issues: Vec<String>,
    pub extracted_text: String,
}

/// Outcome of a single registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub registration_type: RegistrationType,
    pub registration_id: String,
    pub present: bool,
    pub checked_at: DateTime<Utc>,
}

/// Approval fee in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount_minor: u64,
    pub currency: String,
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{:02}",
            self.currency,
            self.amount_minor / 100,
            self.amount_minor % 100
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// The single live payment record of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub submission_id: SubmissionId,
    pub status: PaymentStatus,
    pub amount: Fee,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PaymentRecord {
    pub fn unpaid(submission_id: SubmissionId, amount: Fee) -> Self {
        Self {
            submission_id,
            status: PaymentStatus::Unpaid,
            amount,
            attempts: 0,
            reference: None,
            confirmed_at: None,
            failure: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == PaymentStatus::Confirmed
    }
}

/// Proof of approval bound to a unique approval id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub approval_id: ApprovalId,
    pub submission_id: SubmissionId,
    pub issued_at: DateTime<Utc>,
    pub verification_url: String,
    pub qr_reference: String,
    pub document: Option<Vec<u8>>,
}

impl Certificate {
    pub fn artifact(&self) -> ApprovalArtifact {
        ApprovalArtifact {
            approval_id: self.approval_id.clone(),
            verification_url: self.verification_url.clone(),
            qr_reference: self.qr_reference.clone(),
            issued_at: self.issued_at,
        }
    }
}

/// Public approval payload exposed once a plan is approved and paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalArtifact {
    pub approval_id: ApprovalId,
    pub verification_url: String,
    pub qr_reference: String,
    pub issued_at: DateTime<Utc>,
}
