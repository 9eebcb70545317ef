//! Ordered guesses for where a finished export's package can be downloaded.
//!
//! The service does not return one stable URL shape for the package, so every
//! known shape is listed here, most specific first. Adding a new fallback means
//! adding one line below.

use crate::config::ServiceConfig;

use super::ArtifactCandidate;

const PACKAGE_SUFFIX: &str = "/package-zip";

/// Suffixes tried on the status endpoint.
const STATUS_SUFFIXES: &[&str] = &["/package-zip", "/package", "/download", "?download=true"];

/// Suffixes tried on `{api}/deployments/{id}`.
const DEPLOYMENT_SUFFIXES: &[&str] = &["/package-zip", "/package", "/download"];

/// Build the candidate list for the package of export job `job_id`.
pub fn package_candidates(
    service: &ServiceConfig,
    package_zip: Option<&str>,
    status_endpoint: &str,
    job_id: &str,
) -> Vec<ArtifactCandidate> {
    let mut urls: Vec<String> = Vec::new();

    if let Some(explicit) = package_zip.map(str::trim).filter(|u| !u.is_empty()) {
        let explicit = service.absolute_url(explicit.trim_end_matches('/'));
        if !explicit.ends_with(PACKAGE_SUFFIX) {
            urls.push(explicit.clone());
            urls.push(format!("{}{}", explicit, PACKAGE_SUFFIX));
        } else {
            urls.push(explicit);
        }
    }

    let status = status_endpoint.trim().trim_end_matches('/');
    if !status.is_empty() {
        for suffix in STATUS_SUFFIXES {
            urls.push(format!("{}{}", status, suffix));
        }
    }

    let deployment = service.deployment_url(job_id);
    for suffix in DEPLOYMENT_SUFFIXES {
        urls.push(format!("{}{}", deployment, suffix));
    }

    let mut candidates: Vec<ArtifactCandidate> = Vec::with_capacity(urls.len());
    for url in urls {
        if candidates.iter().any(|c| c.url == url) {
            continue;
        }
        candidates.push(ArtifactCandidate { url });
    }
    candidates
}
