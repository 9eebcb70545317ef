//! HTTP transport and retry policy.

mod client;
mod retry;

#[cfg(test)]
pub use client::MockTransport;
pub use client::{
    ACCEPT_ANY, ACCEPT_JSON, ACCEPT_TEXT, ACCEPT_ZIP, ACTION_TYPE_HEADER, ApiRequest, ApiResponse,
    DEFAULT_TIMEOUT, DOWNLOAD_TIMEOUT, FilePart, HttpTransport, SubmitForm, Transport,
};
pub use retry::{
    INSPECTION_NOT_READY_SIGNATURE, RetryDecision, RetryPolicy, TransientRule,
    inspection_not_ready, network_only, server_errors,
};
