//! Service factory for building operation dependencies.
//!
//! The HTTP transport is built once per process from the credential and then
//! shared by every call an operation makes.

use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};

use crate::{config::API_KEY_HEADER, http::HttpTransport};

const USER_AGENT: &str = concat!("deployctl/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP transport that sends `api_key` on every request.
pub fn build_http_transport(api_key: &str) -> Result<HttpTransport> {
    let mut headers = HeaderMap::new();

    let mut key_value = HeaderValue::from_str(api_key.trim())?;
    key_value.set_sensitive(true);
    headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);
    debug!("HTTP client configured with API key header");

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;

    Ok(HttpTransport::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_build_http_transport_sends_api_key() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/")
            .match_header("appian-api-key", Matcher::Exact("secret-key".to_string()))
            .match_header("user-agent", Matcher::Regex("^deployctl/".to_string()))
            .create_async()
            .await;

        let transport = build_http_transport(" secret-key\n").unwrap();
        let _ = transport.inner().get(server.url()).send().await;

        mock.assert_async().await;
    }

    #[test]
    fn test_build_http_transport_rejects_invalid_key() {
        assert!(build_http_transport("bad\u{7f}key").is_err());
    }
}
