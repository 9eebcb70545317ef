use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    config::JobSettings,
    error::DeployError,
    http::{ACCEPT_TEXT, ApiRequest, DOWNLOAD_TIMEOUT, SubmitForm, Transport},
    job::{Job, JobKind, JobPoller, NormalizedStatus, ObjectCounts, failure_details},
    runtime::Runtime,
};

use super::{
    ADMIN_SETTINGS_FIELD, CUSTOMIZATION_FIELD, Context, PLUGINS_FIELD, companion_part,
    package_part,
};

/// Large packages take a while to upload.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Deployment log lines shown when an import fails.
const LOG_TAIL_LINES: usize = 200;

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub package: PathBuf,
    pub customization: Option<PathBuf>,
    pub admin_settings: Option<PathBuf>,
    pub plugins: Option<PathBuf>,
    /// Deployment name; `Import {package file name}` when absent.
    pub name: Option<String>,
    pub description: String,
    pub settings: JobSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub job_id: String,
    pub status: String,
    pub objects: ObjectCounts,
    pub raw_response: Value,
}

/// Import a package (with optional companions) and wait for the deployment.
#[tracing::instrument(skip(ctx, request), fields(package = %request.package.display()))]
pub async fn import<T: Transport + ?Sized, R: Runtime + ?Sized>(
    ctx: &Context<'_, T, R>,
    request: &ImportRequest,
) -> Result<ImportOutcome, DeployError> {
    let package = package_part(ctx.runtime, &request.package)?;
    let companions = [
        companion_part(
            ctx.runtime,
            CUSTOMIZATION_FIELD,
            "Customization file",
            request.customization.as_deref(),
        )?,
        companion_part(
            ctx.runtime,
            ADMIN_SETTINGS_FIELD,
            "Admin console settings",
            request.admin_settings.as_deref(),
        )?,
        companion_part(
            ctx.runtime,
            PLUGINS_FIELD,
            "Plugins archive",
            request.plugins.as_deref(),
        )?,
    ];

    let name = request
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Import {}", package.file_name));

    let mut body = json!({
        "name": name,
        "description": request.description,
        "packageFileName": package.file_name,
    });
    let mut form_parts = vec![package];
    for part in companions.into_iter().flatten() {
        body[part.field.as_str()] = json!(part.file_name);
        form_parts.push(part);
    }
    let form = form_parts
        .into_iter()
        .fold(SubmitForm::new(body), SubmitForm::with_file);

    let submit = ApiRequest::post_form(ctx.service.submit_url(JobKind::Import), form)
        .with_action_type("import")
        .with_timeout(SUBMIT_TIMEOUT);

    ctx.progress.line(&format!("Starting import of {}", name));
    let poller = JobPoller::new(ctx.transport, ctx.progress, ctx.service, request.settings);
    let mut job = poller.submit(JobKind::Import, &submit).await?;
    let result = poller.wait_for_terminal(&mut job).await?;

    match result.status {
        NormalizedStatus::Failed => {
            print_log_tail(ctx, &job).await;
            return Err(DeployError::RemoteJobFailed {
                kind: JobKind::Import,
                job_id: job.id,
                status: result.raw_status.clone(),
                details: failure_details(&result),
            });
        }
        NormalizedStatus::CompletedWithWarnings => {
            ctx.progress.line(&format!(
                "Import {} finished with status {}; review it on the target environment",
                job.id, result.raw_status
            ));
        }
        _ => {}
    }

    let objects = result.summary.objects.clone();
    ctx.progress.line(&format!(
        "Import OK: objects.imported={} failed={} skipped={}",
        show(objects.imported),
        show(objects.failed),
        show(objects.skipped)
    ));

    Ok(ImportOutcome {
        job_id: job.id,
        status: result.raw_status,
        objects,
        raw_response: result.payload,
    })
}

fn show(count: Option<u64>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}

/// Emit the tail of the deployment log. Failing to fetch it is not an error.
async fn print_log_tail<T: Transport + ?Sized, R: Runtime + ?Sized>(
    ctx: &Context<'_, T, R>,
    job: &Job,
) {
    let request = ApiRequest::get(ctx.service.deployment_log_url(&job.id), ACCEPT_TEXT)
        .with_timeout(DOWNLOAD_TIMEOUT);

    match ctx.transport.send(&request).await {
        Ok(response) => {
            let text = response.text();
            let lines: Vec<&str> = text.lines().collect();
            let start = lines.len().saturating_sub(LOG_TAIL_LINES);

            ctx.progress.line("--- Deployment log (tail) ---");
            for line in &lines[start..] {
                ctx.progress.line(line);
            }
            ctx.progress.line("--- End of deployment log ---");
        }
        Err(e) => {
            warn!("Could not fetch deployment log for {}: {}", job.id, e);
            ctx.progress
                .line(&format!("Could not fetch deployment log: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollConfig, RetryConfig, ServiceConfig};
    use crate::error::TransportError;
    use crate::http::{ApiResponse, MockTransport};
    use crate::progress::RecordingProgress;
    use crate::runtime::MockRuntime;
    use crate::test_utils::{configure_mock_runtime_inputs, json_response, package_bytes};
    use mockall::Sequence;

    const DEPLOYMENTS: &str = "https://svc/suite/deployment-management/v2/deployments";

    fn request() -> ImportRequest {
        ImportRequest {
            package: PathBuf::from("/in/app.zip"),
            customization: None,
            admin_settings: None,
            plugins: None,
            name: None,
            description: String::new(),
            settings: JobSettings::import(
                PollConfig {
                    interval: Duration::from_millis(1),
                    max_wait: Duration::from_secs(5),
                },
                RetryConfig {
                    max_retries: 3,
                    delay: Duration::from_millis(1),
                },
            ),
        }
    }

    fn package_runtime() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_inputs(&mut runtime, 2048);
        runtime
    }

    #[tokio::test]
    async fn test_import_server_error_retried_then_failed_fetches_log() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .withf(|req| req.url == DEPLOYMENTS && req.action_type == Some("import"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| json_response(json!({"uuid": "J2"})));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Err(TransportError::Http {
                    code: 500,
                    url: req.url.clone(),
                    body: "APNX-1-4552-005".to_string(),
                })
            });
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| json_response(json!({"status": "FAILED"})));
        transport
            .expect_send()
            .withf(|req| req.url == format!("{}/J2/log", DEPLOYMENTS) && req.accept == ACCEPT_TEXT)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                let log: String = (1..=250).map(|i| format!("line {}\n", i)).collect();
                Ok(ApiResponse {
                    status: 200,
                    content_type: Some("text/plain".to_string()),
                    body: log.into_bytes(),
                })
            });

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let err = import(&ctx, &request()).await.unwrap_err();

        match err {
            DeployError::RemoteJobFailed {
                kind,
                job_id,
                status,
                ..
            } => {
                assert_eq!(kind, JobKind::Import);
                assert_eq!(job_id, "J2");
                assert_eq!(status, "FAILED");
            }
            other => panic!("expected RemoteJobFailed, got {:?}", other),
        }

        let lines = progress.lines();
        assert!(progress.contains("retry 1/3"));
        assert!(progress.contains("--- Deployment log (tail) ---"));
        assert!(lines.iter().any(|l| l == "line 51"));
        assert!(!lines.iter().any(|l| l == "line 50"));
        assert_eq!(lines.last().map(String::as_str), Some("--- End of deployment log ---"));
    }

    #[tokio::test]
    async fn test_import_log_fetch_failure_keeps_job_error() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|req| {
            if req.url == DEPLOYMENTS {
                json_response(json!({"uuid": "J2"}))
            } else if req.url.ends_with("/log") {
                Err(TransportError::Http {
                    code: 404,
                    url: req.url.clone(),
                    body: String::new(),
                })
            } else {
                json_response(json!({"status": "REJECTED"}))
            }
        });

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let err = import(&ctx, &request()).await.unwrap_err();

        assert!(matches!(err, DeployError::RemoteJobFailed { .. }));
        assert!(progress.contains("Could not fetch deployment log"));
    }

    #[tokio::test]
    async fn test_import_submission_carries_companions() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|req| {
            if req.url == DEPLOYMENTS {
                let form = req.form.as_ref().expect("multipart form");
                assert_eq!(
                    form.json,
                    json!({
                        "name": "Release 1",
                        "description": "promote",
                        "packageFileName": "app.zip",
                        "customizationFileName": "icf.properties",
                        "pluginsFileName": "plugins.zip",
                    })
                );
                let fields: Vec<&str> = form.files.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(fields, vec!["packageFileName", "customizationFileName", "pluginsFileName"]);
                assert_eq!(req.timeout, SUBMIT_TIMEOUT);
                json_response(json!({"uuid": "J5"}))
            } else {
                json_response(json!({
                    "status": "COMPLETED",
                    "summary": {"objects": {"imported": 12, "failed": 0, "skipped": 1}}
                }))
            }
        });

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let mut req = request();
        req.customization = Some(PathBuf::from("/in/icf.properties"));
        req.plugins = Some(PathBuf::from("/in/plugins.zip"));
        req.name = Some("Release 1".to_string());
        req.description = "promote".to_string();

        let outcome = import(&ctx, &req).await.unwrap();

        assert_eq!(outcome.job_id, "J5");
        assert_eq!(outcome.objects.imported, Some(12));
        assert!(progress.contains("Import OK: objects.imported=12 failed=0 skipped=1"));
    }

    #[tokio::test]
    async fn test_import_default_name_and_pending_review() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|req| {
            if req.url == DEPLOYMENTS {
                let form = req.form.as_ref().expect("multipart form");
                assert_eq!(form.json["name"], "Import app.zip");
                json_response(json!({"uuid": "J6"}))
            } else {
                json_response(json!({"status": "PENDING_REVIEW"}))
            }
        });

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let outcome = import(&ctx, &request()).await.unwrap();

        assert_eq!(outcome.status, "PENDING_REVIEW");
        assert!(progress.contains("finished with status PENDING_REVIEW"));
        assert!(progress.contains("Import OK: objects.imported=- failed=- skipped=-"));
    }

    #[tokio::test]
    async fn test_import_validation_happens_before_any_request() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_file_size().returning(|_| Ok(100));
        runtime
            .expect_read()
            .returning(|_| Ok(b"PK\x03\x04".to_vec()));

        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let err = import(&ctx, &request()).await.unwrap_err();

        assert!(matches!(err, DeployError::Validation(_)));
    }

    #[tokio::test]
    async fn test_import_missing_companion_fails_validation() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .returning(|path| path.extension().is_some_and(|e| e == "zip"));
        runtime.expect_file_size().returning(|_| Ok(2048));
        runtime.expect_read().returning(|_| Ok(package_bytes(2048)));

        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let mut req = request();
        req.admin_settings = Some(PathBuf::from("/in/admin.properties"));

        let err = import(&ctx, &req).await.unwrap_err();

        assert!(
            matches!(err, DeployError::Validation(msg) if msg.contains("Admin console settings not found"))
        );
    }

    #[tokio::test]
    async fn test_import_submission_retries_server_errors() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .withf(|req| req.url == DEPLOYMENTS)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Err(TransportError::Http {
                    code: 500,
                    url: req.url.clone(),
                    body: "internal error".to_string(),
                })
            });
        transport
            .expect_send()
            .withf(|req| req.url == DEPLOYMENTS)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| json_response(json!({"uuid": "J9"})));
        transport
            .expect_send()
            .withf(|req| req.url == format!("{}/J9", DEPLOYMENTS))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| json_response(json!({"status": "COMPLETED"})));

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let outcome = import(&ctx, &request()).await.unwrap();

        assert_eq!(outcome.job_id, "J9");
        assert_eq!(outcome.status, "COMPLETED");
    }

    #[tokio::test]
    async fn test_import_poll_not_found_is_permanent() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| json_response(json!({"uuid": "J2"})));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Err(TransportError::Http {
                    code: 404,
                    url: req.url.clone(),
                    body: String::new(),
                })
            });

        let runtime = package_runtime();
        let progress = RecordingProgress::new();
        let service = ServiceConfig::new("https://svc");
        let ctx = Context::new(&transport, &runtime, &progress, &service);

        let err = import(&ctx, &request()).await.unwrap_err();

        match err {
            DeployError::PermanentRemote { source, .. } => {
                assert_eq!(source.status_code(), Some(404));
            }
            other => panic!("expected PermanentRemote, got {:?}", other),
        }
    }
}
