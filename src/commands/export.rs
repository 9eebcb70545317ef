use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    artifact::{
        ArtifactResolver, DatabaseScript, DatabaseScriptEntry, package_candidates,
        sanitize_filename,
    },
    config::JobSettings,
    error::DeployError,
    http::{ACCEPT_ANY, ApiRequest, SubmitForm, Transport},
    job::{JobKind, JobPoller, NormalizedStatus, failure_details},
    runtime::Runtime,
};

use super::Context;

const PLUGINS_PATH: &[&str] = &["plugins", "plugins.zip"];
const CUSTOMIZATION_PATH: &[&str] = &["customization", "customization.properties"];
const CUSTOMIZATION_TEMPLATE_PATH: &[&str] =
    &["customization", "customization-template.properties"];

/// What is being exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Application,
    Package,
}

impl ExportKind {
    /// Value of `exportType` in the submission.
    pub fn export_type(self) -> &'static str {
        match self {
            ExportKind::Application => "application",
            ExportKind::Package => "package",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_type())
    }
}

impl FromStr for ExportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "app" | "application" => Ok(ExportKind::Application),
            "package" => Ok(ExportKind::Package),
            _ => anyhow::bail!("Unknown export kind: {}. Expected app, application or package.", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub kind: ExportKind,
    pub resource_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub output_dir: PathBuf,
    pub settings: JobSettings,
}

impl ExportRequest {
    /// `{kind}-{id}-{name or id}.zip` inside the output directory.
    pub fn package_path(&self) -> PathBuf {
        let label = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.resource_id);
        let raw = format!("{}-{}-{}.zip", self.kind, self.resource_id, label);
        let fallback = format!("{}-export.zip", self.kind);
        self.output_dir.join(sanitize_filename(&raw, &fallback))
    }

    fn submission(&self) -> Value {
        let mut body = json!({
            "exportType": self.kind.export_type(),
            "uuids": [self.resource_id],
        });
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            body["name"] = json!(name);
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            body["description"] = json!(description);
        }
        body
    }
}

/// Result document of a successful export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub job_id: String,
    pub status: String,
    pub package: PathBuf,
    pub database_scripts: Vec<DatabaseScript>,
    pub plugins_zip: Option<PathBuf>,
    pub customization_file: Option<PathBuf>,
    pub customization_template: Option<PathBuf>,
    pub downloaded_files: Vec<PathBuf>,
    pub raw_response: Value,
}

/// Export an application or package and download everything the job produced.
#[tracing::instrument(skip(ctx, request), fields(kind = %request.kind, id = %request.resource_id))]
pub async fn export<T: Transport + ?Sized, R: Runtime + ?Sized>(
    ctx: &Context<'_, T, R>,
    request: &ExportRequest,
) -> Result<ExportOutcome, DeployError> {
    if request.resource_id.trim().is_empty() {
        return Err(DeployError::Validation("Resource id must not be empty".to_string()));
    }

    let poller = JobPoller::new(ctx.transport, ctx.progress, ctx.service, request.settings);
    let submit = ApiRequest::post_form(
        ctx.service.submit_url(JobKind::Export),
        SubmitForm::new(request.submission()),
    )
    .with_action_type("export");

    let mut job = poller.submit(JobKind::Export, &submit).await?;
    let result = poller.wait_for_terminal(&mut job).await?;

    if result.status == NormalizedStatus::Failed {
        let mut details = failure_details(&result);
        if details.is_empty() {
            details.push(format!("response: {}", result.payload));
        }
        return Err(DeployError::RemoteJobFailed {
            kind: JobKind::Export,
            job_id: job.id,
            status: result.raw_status,
            details,
        });
    }

    let payload = &result.payload;
    let resolver = ArtifactResolver::new(
        ctx.transport,
        ctx.runtime,
        ctx.service,
        request.settings.poll_retry,
    );

    let candidates = package_candidates(
        ctx.service,
        payload.get("packageZip").and_then(Value::as_str),
        &job.status_endpoint,
        &job.id,
    );
    let package = resolver
        .fetch_package(&candidates, &request.package_path())
        .await?;
    info!(
        "Package for export {} written to {} ({} bytes)",
        job.id,
        package.local_path.display(),
        package.size_bytes
    );

    let mut downloaded_files = vec![package.local_path.clone()];

    let entries = DatabaseScriptEntry::from_payload(payload);
    let database_scripts = resolver
        .fetch_database_scripts(&entries, &request.output_dir, ACCEPT_ANY)
        .await?;
    downloaded_files.extend(database_scripts.iter().map(|s| s.path.clone()));

    let plugins_zip = fetch_auxiliary(
        &resolver,
        payload,
        "pluginsZip",
        &request.output_dir,
        PLUGINS_PATH,
        &mut downloaded_files,
    )
    .await?;
    let customization_file = fetch_auxiliary(
        &resolver,
        payload,
        "customizationFile",
        &request.output_dir,
        CUSTOMIZATION_PATH,
        &mut downloaded_files,
    )
    .await?;
    let customization_template = fetch_auxiliary(
        &resolver,
        payload,
        "customizationFileTemplate",
        &request.output_dir,
        CUSTOMIZATION_TEMPLATE_PATH,
        &mut downloaded_files,
    )
    .await?;

    Ok(ExportOutcome {
        job_id: job.id,
        status: result.raw_status,
        package: package.local_path,
        database_scripts,
        plugins_zip,
        customization_file,
        customization_template,
        downloaded_files,
        raw_response: result.payload,
    })
}

/// Download the file named by `payload[key]`, if any, to `dir/parts...`.
async fn fetch_auxiliary<T: Transport + ?Sized, R: Runtime + ?Sized>(
    resolver: &ArtifactResolver<'_, T, R>,
    payload: &Value,
    key: &str,
    dir: &Path,
    parts: &[&str],
    downloaded: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>, DeployError> {
    let target = parts.iter().fold(dir.to_path_buf(), |dir, part| dir.join(part));
    let artifact = resolver
        .fetch_optional(payload.get(key).and_then(Value::as_str), &target, ACCEPT_ANY)
        .await?;
    Ok(artifact.map(|a| {
        downloaded.push(a.local_path.clone());
        a.local_path
    }))
}
