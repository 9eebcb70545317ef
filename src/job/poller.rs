//! Submit a job and poll it until the service reports a terminal state.

use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{JobSettings, ServiceConfig};
use crate::error::{DeployError, TransportError};
use crate::http::{ACCEPT_JSON, ApiRequest, Transport};
use crate::progress::Progress;

use super::{Job, JobKind, PollResult};

/// Shortest pause between two status requests, whatever the configuration says.
pub const MIN_PAUSE: Duration = Duration::from_millis(1);

/// Body of a successful submission.
#[derive(Debug, Deserialize)]
struct Submitted {
    uuid: Option<String>,
    url: Option<String>,
}

pub struct JobPoller<'a, T: Transport + ?Sized> {
    transport: &'a T,
    progress: &'a dyn Progress,
    service: &'a ServiceConfig,
    settings: JobSettings,
}

impl<'a, T: Transport + ?Sized> JobPoller<'a, T> {
    pub fn new(
        transport: &'a T,
        progress: &'a dyn Progress,
        service: &'a ServiceConfig,
        settings: JobSettings,
    ) -> Self {
        Self {
            transport,
            progress,
            service,
            settings,
        }
    }

    /// Send the submission request and turn the returned handle into a [`Job`].
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    pub async fn submit(&self, kind: JobKind, request: &ApiRequest) -> Result<Job, DeployError> {
        let operation = format!("submitting {} job", kind);
        let response = self
            .settings
            .submit_retry
            .send(self.transport, &operation, request)
            .await?;

        let submitted: Submitted = response.json(&operation)?;
        let id = submitted
            .uuid
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DeployError::InvalidResponse {
                context: operation.clone(),
                detail: format!("no job id in {}", response.text()),
            })?;

        let status_endpoint = match submitted.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => self.service.absolute_url(url),
            _ => self.service.status_url(kind, &id),
        };
        let status_endpoint = status_endpoint.trim_end_matches('/').to_string();

        info!("Submitted {} job {} (status at {})", kind, id, status_endpoint);
        Ok(Job::new(id, kind, status_endpoint))
    }

    /// Poll `job` until its status is terminal for its kind.
    ///
    /// Returns the terminal snapshot, whether it is a success or a failure;
    /// interpreting it is up to the caller. Fails with `Timeout` when the
    /// accumulated wait exceeds the budget and with `RetryExhausted` when too
    /// many consecutive polls fail transiently.
    #[tracing::instrument(skip(self, job), fields(kind = %job.kind, id = %job.id))]
    pub async fn wait_for_terminal(&self, job: &mut Job) -> Result<PollResult, DeployError> {
        let request = ApiRequest::get(job.status_endpoint.clone(), ACCEPT_JSON);
        let mut last_status = String::from("SUBMITTED");

        loop {
            job.polls += 1;
            match self.transport.send(&request).await {
                Ok(response) => {
                    job.consecutive_transient_errors = 0;
                    let payload: Value =
                        response.json(&format!("{} status endpoint", job.kind))?;
                    let result = PollResult::from_payload(job.kind, payload);

                    self.progress.line(&format!(
                        "{}.status={} id={}",
                        job.kind, result.raw_status, job.id
                    ));

                    if result.status.is_terminal() {
                        debug!(
                            "{} job {} terminal after {} poll(s): {:?}",
                            job.kind, job.id, job.polls, result.status
                        );
                        return Ok(result);
                    }

                    last_status = result.raw_status;
                    self.pause(job, self.settings.poll.interval, &last_status)
                        .await?;
                }
                Err(e) => {
                    job.consecutive_transient_errors += 1;
                    let retry = &self.settings.poll_retry;
                    let decision = retry.decide(&e, job.consecutive_transient_errors);
                    if !decision.should_retry {
                        let operation = format!("polling {} job {}", job.kind, job.id);
                        return Err(retry.escalate(&operation, e, job.consecutive_transient_errors));
                    }

                    self.progress.line(&format!(
                        "{}.status=PENDING id={} ({}; retry {}/{})",
                        job.kind,
                        job.id,
                        short_reason(&e),
                        job.consecutive_transient_errors,
                        retry.max_retries
                    ));
                    self.pause(job, decision.wait, &last_status).await?;
                }
            }
        }
    }

    async fn pause(&self, job: &mut Job, wait: Duration, last_status: &str) -> Result<(), DeployError> {
        let wait = wait.max(MIN_PAUSE);
        tokio::time::sleep(wait).await;
        job.elapsed_wait += wait;

        if job.elapsed_wait > self.settings.poll.max_wait {
            return Err(DeployError::Timeout {
                kind: job.kind,
                job_id: job.id.clone(),
                waited: job.elapsed_wait,
                last_status: last_status.to_string(),
            });
        }
        Ok(())
    }
}

fn short_reason(error: &TransportError) -> String {
    match error {
        TransportError::Http { code, body, .. } => {
            let first = body.lines().next().unwrap_or("").trim();
            let first: String = first.chars().take(120).collect();
            if first.is_empty() {
                format!("HTTP {}", code)
            } else {
                format!("HTTP {}: {}", code, first)
            }
        }
        TransportError::Network { cause, .. } => format!("network: {}", cause),
        TransportError::Encoding { cause, .. } => cause.clone(),
    }
}
