use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    config::JobSettings,
    error::DeployError,
    http::{ApiRequest, SubmitForm, Transport},
    job::{JobKind, JobPoller, MAX_REPORTED_PROBLEMS, NormalizedStatus, failure_details},
    runtime::Runtime,
};

use super::{ADMIN_SETTINGS_FIELD, CUSTOMIZATION_FIELD, Context, companion_part, package_part};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct InspectRequest {
    pub package: PathBuf,
    pub customization: Option<PathBuf>,
    pub admin_settings: Option<PathBuf>,
    pub settings: JobSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectOutcome {
    pub job_id: String,
    pub status: String,
    pub total_warnings: u64,
    pub total_errors: u64,
    pub raw_response: Value,
}

/// Ask the service to inspect a package without importing it.
#[tracing::instrument(skip(ctx, request), fields(package = %request.package.display()))]
pub async fn inspect<T: Transport + ?Sized, R: Runtime + ?Sized>(
    ctx: &Context<'_, T, R>,
    request: &InspectRequest,
) -> Result<InspectOutcome, DeployError> {
    let package = package_part(ctx.runtime, &request.package)?;
    let customization = companion_part(
        ctx.runtime,
        CUSTOMIZATION_FIELD,
        "Customization file",
        request.customization.as_deref(),
    )?;
    let admin_settings = companion_part(
        ctx.runtime,
        ADMIN_SETTINGS_FIELD,
        "Admin console settings",
        request.admin_settings.as_deref(),
    )?;

    let mut summary = format!(
        "/inspections: package={} size={}B",
        package.file_name,
        package.data.len()
    );
    if let Some(part) = &customization {
        summary.push_str(&format!(", icf={}", part.file_name));
    }
    if let Some(part) = &admin_settings {
        summary.push_str(&format!(", admin={}", part.file_name));
    }
    ctx.progress.line(&summary);

    let body = json!({ "packageFileName": package.file_name });
    let form = [Some(package), customization, admin_settings]
        .into_iter()
        .flatten()
        .fold(SubmitForm::new(body), SubmitForm::with_file);
    let submit = ApiRequest::post_form(ctx.service.submit_url(JobKind::Inspect), form)
        .with_timeout(SUBMIT_TIMEOUT);

    let poller = JobPoller::new(ctx.transport, ctx.progress, ctx.service, request.settings);
    let mut job = poller.submit(JobKind::Inspect, &submit).await?;
    let result = poller.wait_for_terminal(&mut job).await?;

    let problems = &result.summary;
    if problems.total_warnings > 0 {
        ctx.progress
            .line(&format!("Inspection reported {} warning(s)", problems.total_warnings));
    }

    if result.status == NormalizedStatus::Failed {
        let details = failure_details(&result);
        let listed = problems.errors.len().min(MAX_REPORTED_PROBLEMS);
        if problems.total_errors > 0 && listed == 0 {
            ctx.progress
                .line(&format!("Inspection found {} error(s)", problems.total_errors));
        } else if problems.total_errors > 0 {
            ctx.progress.line(&format!(
                "Inspection found {} error(s); first {}:",
                problems.total_errors, listed
            ));
            for problem in problems.errors.iter().take(listed) {
                ctx.progress.line(&format!("- {}", problem));
            }
        }
        return Err(DeployError::RemoteJobFailed {
            kind: JobKind::Inspect,
            job_id: job.id,
            status: result.raw_status.clone(),
            details,
        });
    }

    Ok(InspectOutcome {
        job_id: job.id,
        total_warnings: result.summary.total_warnings,
        total_errors: result.summary.total_errors,
        status: result.raw_status,
        raw_response: result.payload,
    })
}
