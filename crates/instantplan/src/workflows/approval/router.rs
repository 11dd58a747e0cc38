use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApprovalId, MediaType, SubmissionId};
use super::repository::{RepositoryError, SubmissionRepository};
use super::service::{PipelineError, PlanApprovalService};

type SharedService<R> = Arc<PlanApprovalService<R>>;

/// Router builder exposing the plan approval pipeline over HTTP.
pub fn plan_router<R>(service: SharedService<R>) -> Router
where
    R: SubmissionRepository + 'static,
{
    Router::new()
        .route("/api/v1/plans", post(submit_handler::<R>))
        .route(
            "/api/v1/plans/:submission_id",
            get(status_handler::<R>).delete(abandon_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/process",
            post(process_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/analysis",
            get(analysis_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/verifications",
            get(verifications_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/payment",
            post(payment_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/certificate",
            get(certificate_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/certificate/document",
            get(submission_document_handler::<R>),
        )
        .route(
            "/api/v1/plans/:submission_id/revisions",
            post(revision_handler::<R>),
        )
        .route(
            "/api/v1/certificates/:approval_id/document",
            get(approval_document_handler::<R>),
        )
        .route("/verify-plan/:approval_id", get(verify_handler::<R>))
        .with_state(service)
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PipelineError::Repository(RepositoryError::NotFound)
            | PipelineError::UnknownApproval(_) => StatusCode::NOT_FOUND,
            PipelineError::NotReady { .. }
            | PipelineError::VerificationPending { .. }
            | PipelineError::InvalidAction { .. }
            | PipelineError::IllegalTransition { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            PipelineError::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            PipelineError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::PipelineFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::MissingInput { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "step": self.step().map(|step| step.label()),
        });
        (self.status_code(), axum::Json(payload)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadParams {
    format: Option<String>,
}

/// `?format=` wins over the `Content-Type` header.
fn declared_media_type(params: &UploadParams, headers: &HeaderMap) -> String {
    params
        .format
        .clone()
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn pdf_response(approval_id: &ApprovalId, document: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{approval_id}.pdf\"");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MediaType::Pdf.mime().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    )
        .into_response()
}

pub(crate) async fn submit_handler<R>(
    State(service): State<SharedService<R>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let declared = declared_media_type(&params, &headers);
    match service.submit(body.to_vec(), &declared) {
        Ok(record) => (StatusCode::ACCEPTED, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn process_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.advance(&SubmissionId(submission_id)).await {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let id = SubmissionId(submission_id);
    match service.get(&id) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(PipelineError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "submissionId": id.0,
                "error": "submission not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn analysis_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.analysis_report(&SubmissionId(submission_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn verifications_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.verification_report(&SubmissionId(submission_id)) {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn payment_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.confirm_payment(&SubmissionId(submission_id)).await {
        Ok(payment) => (StatusCode::OK, axum::Json(payment)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn certificate_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.certificate(&SubmissionId(submission_id)).await {
        Ok(certificate) => (StatusCode::OK, axum::Json(certificate.artifact())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn submission_document_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.certificate_document(&SubmissionId(submission_id)) {
        Ok((approval_id, document)) => pdf_response(&approval_id, document),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn approval_document_handler<R>(
    State(service): State<SharedService<R>>,
    Path(approval_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let approval_id = ApprovalId(approval_id);
    match service.document_by_approval(&approval_id) {
        Ok(document) => pdf_response(&approval_id, document),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn revision_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let declared = declared_media_type(&params, &headers);
    match service.revise(&SubmissionId(submission_id), body.to_vec(), &declared) {
        Ok(record) => (StatusCode::ACCEPTED, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn abandon_handler<R>(
    State(service): State<SharedService<R>>,
    Path(submission_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.abandon(&SubmissionId(submission_id)).await {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn verify_handler<R>(
    State(service): State<SharedService<R>>,
    Path(approval_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let approval_id = ApprovalId(approval_id);
    match service.verify_approval(&approval_id) {
        Ok(verification) => (StatusCode::OK, axum::Json(verification)).into_response(),
        Err(PipelineError::UnknownApproval(_)) => {
            let payload = json!({
                "approvalId": approval_id.0,
                "valid": false,
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
