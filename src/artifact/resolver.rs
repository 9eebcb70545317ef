//! Downloads of job artifacts into the output directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::DeployError;
use crate::http::{ACCEPT_ZIP, ApiRequest, ApiResponse, DOWNLOAD_TIMEOUT, RetryPolicy, Transport};
use crate::runtime::Runtime;

use super::{
    ArtifactCandidate, ArtifactDescriptor, has_zip_magic, is_zip_content_type,
    sanitize_filename,
};

const DB_SCRIPTS_DIR: &str = "db-scripts";

/// One `databaseScripts` entry of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseScriptEntry {
    pub url: String,
    /// Name as reported by the service, before sanitizing.
    pub file_name: String,
    /// `orderId` when present, otherwise the 1-based position in the list.
    pub order: u64,
    /// Position in the list, used for the fallback file name.
    pub index: usize,
}

impl DatabaseScriptEntry {
    /// Read the script list from a status document, sorted by order.
    ///
    /// Entries that are not objects or carry no URL are skipped.
    pub fn from_payload(payload: &Value) -> Vec<Self> {
        let Some(entries) = payload.get("databaseScripts").and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut scripts: Vec<Self> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let index = i + 1;
                let obj = entry.as_object()?;
                let url = obj
                    .get("url")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|u| !u.is_empty())?;
                let file_name = obj
                    .get("filename")
                    .or_else(|| obj.get("fileName"))
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback_script_name(index));
                Some(Self {
                    url: url.to_string(),
                    file_name,
                    order: order_id(obj.get("orderId")).unwrap_or(index as u64),
                    index,
                })
            })
            .collect();

        scripts.sort_by_key(|s| s.order);
        scripts
    }
}

fn order_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn fallback_script_name(index: usize) -> String {
    format!("script_{}.sql", index)
}

/// A database script written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseScript {
    pub path: PathBuf,
    pub file_name: String,
    pub order: u64,
    pub url: String,
}

pub struct ArtifactResolver<'a, T: Transport + ?Sized, R: Runtime + ?Sized> {
    transport: &'a T,
    runtime: &'a R,
    service: &'a ServiceConfig,
    /// Applied to single-URL downloads; candidate probing never retries.
    direct_retry: RetryPolicy,
}

impl<'a, T: Transport + ?Sized, R: Runtime + ?Sized> ArtifactResolver<'a, T, R> {
    pub fn new(
        transport: &'a T,
        runtime: &'a R,
        service: &'a ServiceConfig,
        direct_retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            runtime,
            service,
            direct_retry,
        }
    }

    /// Try `candidates` in order and write the first acceptable body to `target`.
    ///
    /// A candidate that errors or returns something that is not an archive is
    /// skipped without touching the disk.
    #[tracing::instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn fetch_package(
        &self,
        candidates: &[ArtifactCandidate],
        target: &Path,
    ) -> Result<ArtifactDescriptor, DeployError> {
        let mut tried = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            tried.push(candidate.url.clone());
            let request =
                ApiRequest::get(candidate.url.clone(), ACCEPT_ZIP).with_timeout(DOWNLOAD_TIMEOUT);

            let response = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Package candidate {} failed: {}", candidate.url, e);
                    continue;
                }
            };

            if !looks_like_zip(&response) {
                debug!(
                    "Package candidate {} rejected (content-type: {}, {} bytes)",
                    candidate.url,
                    response.content_type.as_deref().unwrap_or("none"),
                    response.body.len()
                );
                continue;
            }

            info!("Downloaded package from {}", candidate.url);
            return self.store(&candidate.url, target, &response.body);
        }

        Err(DeployError::ArtifactNotFound {
            candidates_tried: tried,
        })
    }

    /// Download one URL to `target`. Errors propagate after the direct retry policy.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_file(
        &self,
        url: &str,
        target: &Path,
        accept: &'static str,
    ) -> Result<ArtifactDescriptor, DeployError> {
        let url = self.service.absolute_url(url);
        let request = ApiRequest::get(url.clone(), accept).with_timeout(DOWNLOAD_TIMEOUT);
        let operation = format!("downloading {}", url);
        let response = self
            .direct_retry
            .send(self.transport, &operation, &request)
            .await?;
        self.store(&url, target, &response.body)
    }

    /// Download an auxiliary file when the payload names one.
    pub async fn fetch_optional(
        &self,
        url: Option<&str>,
        target: &Path,
        accept: &'static str,
    ) -> Result<Option<ArtifactDescriptor>, DeployError> {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => self.fetch_file(url, target, accept).await.map(Some),
            None => Ok(None),
        }
    }

    /// Download every script into `dir/db-scripts/`, named `{order:03}-{name}`.
    ///
    /// Scripts that would land on the same name get a `-{n}` counter after the
    /// order prefix.
    pub async fn fetch_database_scripts(
        &self,
        entries: &[DatabaseScriptEntry],
        dir: &Path,
        accept: &'static str,
    ) -> Result<Vec<DatabaseScript>, DeployError> {
        let target_dir = dir.join(DB_SCRIPTS_DIR);
        let mut scripts = Vec::with_capacity(entries.len());
        let mut used = HashSet::new();

        for entry in entries {
            let safe_name = sanitize_filename(&entry.file_name, &fallback_script_name(entry.index));
            let mut local_name = format!("{:03}-{}", entry.order, safe_name);
            let mut n = 1;
            while !used.insert(local_name.clone()) {
                n += 1;
                local_name = format!("{:03}-{}-{}", entry.order, n, safe_name);
            }
            if n > 1 {
                warn!("Database script {} renamed to {} to avoid a clash", entry.url, local_name);
            }
            let target = target_dir.join(local_name);
            let artifact = self.fetch_file(&entry.url, &target, accept).await?;
            scripts.push(DatabaseScript {
                path: artifact.local_path,
                file_name: entry.file_name.clone(),
                order: entry.order,
                url: artifact.source_url,
            });
        }

        Ok(scripts)
    }

    fn store(&self, url: &str, target: &Path, body: &[u8]) -> Result<ArtifactDescriptor, DeployError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime.write(target, body)?;

        Ok(ArtifactDescriptor {
            local_path: self.runtime.absolute(target)?,
            source_url: url.to_string(),
            size_bytes: body.len() as u64,
        })
    }
}

fn looks_like_zip(response: &ApiResponse) -> bool {
    is_zip_content_type(response.content_type.as_deref()) || has_zip_magic(&response.body)
}
