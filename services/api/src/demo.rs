use crate::infra::{build_plan_service, sample_plan_pdf};
use clap::Args;
use instantplan::config::AppConfig;
use instantplan::error::AppError;
use instantplan::workflows::approval::{MediaType, Stage, SubmissionRecord};
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Plan document to submit (pdf, png, jpg or jpeg). Defaults to a generated sample plan.
    #[arg(long)]
    pub(crate) document: Option<PathBuf>,
    /// Declared media type; guessed from the file extension when omitted.
    #[arg(long)]
    pub(crate) media_type: Option<String>,
    /// Confirm the approval fee and issue the certificate.
    #[arg(long)]
    pub(crate) pay: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = build_plan_service(&config.pipeline);

    let (document, media_type) = match &args.document {
        Some(path) => {
            let document = std::fs::read(path)?;
            let media_type = args
                .media_type
                .clone()
                .unwrap_or_else(|| guess_media_type(path));
            (document, media_type)
        }
        None => (
            sample_plan_pdf(),
            args.media_type
                .clone()
                .unwrap_or_else(|| "application/pdf".to_string()),
        ),
    };

    println!("InstantPlan approval demo");
    println!(
        "- Fee: {} | score threshold {:.2}",
        config.pipeline.fee, config.pipeline.decision.score_threshold
    );

    let record = match service.submit(document, &media_type) {
        Ok(record) => record,
        Err(err) => {
            println!("- Submission refused: {err}");
            return Ok(());
        }
    };
    println!(
        "- Received {} ({}, {} bytes)",
        record.id(),
        record.submission.media_type,
        record.submission.document.len()
    );

    if record.submission.media_type != MediaType::Pdf {
        println!("    No OCR backend configured; raster plans are scored without any text");
    }

    let id = record.id().clone();
    let record = match service.advance(&id).await {
        Ok(record) => record,
        Err(err) => {
            println!("- Pipeline stopped: {err}");
            if let Ok(record) = service.get(&id) {
                print_stage(&record);
            }
            return Ok(());
        }
    };

    print_analysis(&record);
    print_verifications(&record);
    print_stage(&record);

    if record.stage() != Stage::PaymentPending {
        return Ok(());
    }
    if !args.pay {
        println!(
            "- Awaiting {} payment; re-run with --pay to settle it",
            record.payment.amount
        );
        return Ok(());
    }

    match service.confirm_payment(&id).await {
        Ok(payment) => println!(
            "- Payment {} (reference {})",
            payment.status.label(),
            payment.reference.as_deref().unwrap_or("n/a")
        ),
        Err(err) => {
            println!("- Payment failed: {err}");
            return Ok(());
        }
    }

    match service.certificate(&id).await {
        Ok(certificate) => {
            let artifact = certificate.artifact();
            println!("- Certificate issued");
            println!("    Approval ID: {}", artifact.approval_id);
            println!("    Verify at: {}", artifact.verification_url);
            println!("    QR reference: {}", artifact.qr_reference);
            if let Ok(verification) = service.verify_approval(&artifact.approval_id) {
                match serde_json::to_string_pretty(&verification) {
                    Ok(json) => println!("    Public record: {json}"),
                    Err(err) => println!("    Public record unavailable: {err}"),
                }
            }
        }
        Err(err) => println!("- Certificate deferred: {err}"),
    }

    if let Ok(record) = service.get(&id) {
        print_stage(&record);
    }
    Ok(())
}

fn guess_media_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn print_analysis(record: &SubmissionRecord) {
    let Some(report) = record.analysis_report() else {
        return;
    };
    println!("- Approval score: {:.2}", report.approval_score);
    if report.issues.is_empty() {
        println!("    No compliance issues");
    }
    for issue in &report.issues {
        println!("    Issue: {issue}");
    }
}

fn print_verifications(record: &SubmissionRecord) {
    if record.verifications.is_empty() {
        return;
    }
    println!("- Registry checks:");
    for verification in &record.verifications {
        let id = if verification.registration_id.is_empty() {
            "(not declared)"
        } else {
            verification.registration_id.as_str()
        };
        let outcome = if verification.present {
            "registered"
        } else {
            "not found"
        };
        println!(
            "    {} {id}: {outcome}",
            verification.registration_type.label().to_ascii_uppercase()
        );
    }
}

fn print_stage(record: &SubmissionRecord) {
    let view = record.status_view();
    println!("- Stage: {} | {}", view.stage, view.decision_rationale);
    for advisory in &view.advisories {
        println!("    Advisory: {advisory}");
    }
    if let Some(failure) = &view.failure {
        println!("    Failure at {}: {}", failure.step, failure.cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_is_guessed_from_extension() {
        assert_eq!(guess_media_type(Path::new("plans/site.pdf")), "application/pdf");
        assert_eq!(guess_media_type(Path::new("scan.JPG")), "image/jpeg");
        assert_eq!(
            guess_media_type(Path::new("plan")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn demo_runs_sample_plan_to_certificate() {
        let args = DemoArgs {
            pay: true,
            ..DemoArgs::default()
        };

        run_demo(args).await.expect("demo completes");
    }
}
