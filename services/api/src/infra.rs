use instantplan::workflows::approval::{
    render_text_pdf, Collaborators, InMemoryRegistry, InMemorySubmissionRepository,
    PipelineConfig, PlanApprovalService, RegistrationType,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type PlanService = PlanApprovalService<InMemorySubmissionRepository>;

/// Text of the plan used when the demo is run without a document.
pub(crate) const SAMPLE_PLAN_TEXT: &str = "Architect: John Doe
BORAQS Reg: A-12345
Engineer: Jane Smith
EBK Reg: E-67890
Notes: Site plan, structural drawings included.";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Registrations known to the in-process registry.
pub(crate) fn demo_registry() -> InMemoryRegistry {
    InMemoryRegistry::default()
        .with_registration(RegistrationType::Boraqs, "A-12345")
        .with_registration(RegistrationType::Ebk, "E-67890")
}

pub(crate) fn build_plan_service(config: &PipelineConfig) -> Arc<PlanService> {
    let collaborators = Collaborators::in_process(config, demo_registry());
    Arc::new(PlanApprovalService::new(
        Arc::new(InMemorySubmissionRepository::default()),
        collaborators,
        config.clone(),
    ))
}

pub(crate) fn sample_plan_pdf() -> Vec<u8> {
    let lines: Vec<String> = SAMPLE_PLAN_TEXT.lines().map(str::to_string).collect();
    render_text_pdf(&lines)
}
