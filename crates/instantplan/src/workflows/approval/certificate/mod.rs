mod render;

pub use render::render_text_pdf;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::info;

use super::domain::{ApprovalId, Certificate, SubmissionId};
use super::retry::Retryable;

const QR_CHART_ENDPOINT: &str = "https://chart.googleapis.com/chart?cht=qr&chs=300x300&chl=";

/// Details printed on an approval certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub submission_id: SubmissionId,
    pub approved_at: DateTime<Utc>,
    pub architect: Option<String>,
    pub engineer: Option<String>,
}

/// Produces the approval certificate for an approved and paid submission.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, request: &IssueRequest) -> Result<Certificate, CertificateError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate renderer unavailable: {0}")]
    Unavailable(String),
    #[error("certificate could not be rendered: {0}")]
    Render(String),
}

impl Retryable for CertificateError {
    fn is_retryable(&self) -> bool {
        matches!(self, CertificateError::Unavailable(_))
    }
}

/// `https://<host>/verify-plan/<approval_id>`.
pub fn verification_url(host: &str, approval_id: &ApprovalId) -> String {
    let host = host
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("https://{host}/verify-plan/{approval_id}")
}

/// Chart URL rendering `verification_url` as a QR code.
pub fn qr_reference(verification_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(verification_url.as_bytes()).collect();
    format!("{QR_CHART_ENDPOINT}{encoded}")
}

/// Hands out second-resolution approval ids that never repeat within the process.
///
/// When two approvals land in the same second the later one is pushed forward to the next
/// free second.
#[derive(Debug, Default)]
pub struct ApprovalIdGenerator {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ApprovalIdGenerator {
    pub fn next(&self, now: DateTime<Utc>) -> (ApprovalId, DateTime<Utc>) {
        let second = now
            .duration_trunc(TimeDelta::seconds(1))
            .unwrap_or(now);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            Some(previous) if previous >= second => previous + TimeDelta::seconds(1),
            _ => second,
        };
        *last = Some(stamp);
        (ApprovalId::from_timestamp(stamp), stamp)
    }
}

/// Issues certificates with a printable PDF and a QR chart reference.
#[derive(Debug)]
pub struct PdfCertificateIssuer {
    host: String,
    ids: ApprovalIdGenerator,
}

impl PdfCertificateIssuer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ids: ApprovalIdGenerator::default(),
        }
    }

    fn lines(request: &IssueRequest, approval_id: &ApprovalId, url: &str) -> Vec<String> {
        vec![
            "InstantPlan Approval Certificate".to_string(),
            format!("Approval ID: {approval_id}"),
            format!("Submission: {}", request.submission_id),
            format!(
                "Architect: {}",
                request.architect.as_deref().unwrap_or("not stated")
            ),
            format!(
                "Engineer: {}",
                request.engineer.as_deref().unwrap_or("not stated")
            ),
            format!("Date: {}", request.approved_at.format("%Y-%m-%dT%H:%M:%SZ")),
            "SDG: SDG 11 - Sustainable Cities and Communities".to_string(),
            String::new(),
            format!("Verification: {url}"),
        ]
    }
}

#[async_trait]
impl CertificateIssuer for PdfCertificateIssuer {
    async fn issue(&self, request: &IssueRequest) -> Result<Certificate, CertificateError> {
        let (approval_id, issued_at) = self.ids.next(Utc::now());
        let url = verification_url(&self.host, &approval_id);
        let document = render_text_pdf(&Self::lines(request, &approval_id, &url));

        info!(submission_id = %request.submission_id, %approval_id, "certificate issued");

        Ok(Certificate {
            qr_reference: qr_reference(&url),
            approval_id,
            submission_id: request.submission_id.clone(),
            issued_at,
            verification_url: url,
            document: Some(document),
        })
    }
}
