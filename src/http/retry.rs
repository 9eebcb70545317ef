//! Retry policy with pluggable transient-error classification.
//!
//! Network-level failures are always transient. Which HTTP failures are
//! transient depends on the endpoint, so call sites pass a named
//! [`TransientRule`] instead of the policy hard-coding vendor signatures.

use std::time::Duration;

use log::{debug, warn};

use crate::error::{DeployError, TransportError};

use super::client::{ApiRequest, ApiResponse, Transport};

/// Error code the inspection endpoint returns while results are not ready yet.
pub const INSPECTION_NOT_READY_SIGNATURE: &str = "APNX-1-4552-005";

/// Predicate deciding whether an HTTP failure is worth retrying.
pub type TransientRule = fn(&TransportError) -> bool;

/// Only network failures are transient.
pub fn network_only(_error: &TransportError) -> bool {
    false
}

/// Any HTTP 5xx is transient.
pub fn server_errors(error: &TransportError) -> bool {
    matches!(error.status_code(), Some(code) if (500..600).contains(&code))
}

/// Inspection results lag behind the job: a fresh inspection may 404, and a
/// finished one may 500 with [`INSPECTION_NOT_READY_SIGNATURE`].
pub fn inspection_not_ready(error: &TransportError) -> bool {
    match error.status_code() {
        Some(404) => true,
        Some(500) => {
            let body = error.body();
            body.contains(INSPECTION_NOT_READY_SIGNATURE) || body.contains("/inspections/")
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub wait: Duration,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            should_retry: false,
            wait: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    transient: TransientRule,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration, transient: TransientRule) -> Self {
        Self {
            max_retries,
            delay,
            transient,
        }
    }

    /// A policy that propagates every failure on the first attempt.
    pub fn never() -> Self {
        Self::new(0, Duration::ZERO, network_only)
    }

    pub fn is_transient(&self, error: &TransportError) -> bool {
        error.is_network() || (self.transient)(error)
    }

    /// Decide what to do after the `consecutive_failures`-th failure in a row.
    pub fn decide(&self, error: &TransportError, consecutive_failures: u32) -> RetryDecision {
        if !self.is_transient(error) || consecutive_failures > self.max_retries {
            return RetryDecision::stop();
        }
        RetryDecision {
            should_retry: true,
            wait: self.delay,
        }
    }

    /// Convert the failure that ended a call into the error surfaced upward.
    pub fn escalate(&self, operation: &str, error: TransportError, attempts: u32) -> DeployError {
        if self.is_transient(&error) {
            DeployError::RetryExhausted {
                operation: operation.to_string(),
                attempts,
                last_error: error,
            }
        } else {
            DeployError::PermanentRemote {
                operation: operation.to_string(),
                source: error,
            }
        }
    }

    /// Send `request`, retrying transient failures per this policy.
    pub async fn send<T: Transport + ?Sized>(
        &self,
        transport: &T,
        operation: &str,
        request: &ApiRequest,
    ) -> Result<ApiResponse, DeployError> {
        let mut failures = 0;

        loop {
            match transport.send(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    failures += 1;
                    let decision = self.decide(&e, failures);
                    if !decision.should_retry {
                        debug!("{}: not retrying after {} attempt(s): {}", operation, failures, e);
                        return Err(self.escalate(operation, e, failures));
                    }
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}s...",
                        operation,
                        failures,
                        self.max_retries + 1,
                        e,
                        decision.wait.as_secs()
                    );
                    tokio::time::sleep(decision.wait).await;
                }
            }
        }
    }
}
