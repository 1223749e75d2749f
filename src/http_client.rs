//! Blocking HTTP access shared by the catalog, geocoding and tile clients.
//!
//! Every request carries the configured client-identity `User-Agent`; public
//! geocoding and tile services silently block anonymous traffic.

use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// `ureq` agent plus the identity and timeout applied to every call.
#[derive(Clone)]
pub struct ServiceClient {
    agent: ureq::Agent,
    user_agent: String,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn classify_ureq_failure(error: ureq::Error) -> FetchError {
        match error {
            ureq::Error::Status(code, _) => FetchError::HttpStatus(code),
            ureq::Error::Transport(transport) => {
                FetchError::Network(format!("Request failed: {transport}"))
            }
        }
    }

    fn call(&self, url: &str, accept: &str) -> Result<ureq::Response, FetchError> {
        self.agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", accept)
            .timeout(self.timeout)
            .call()
            .map_err(Self::classify_ureq_failure)
    }

    /// GETs `url` and decodes the body as JSON into `T`.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.get_bytes_with(url, "application/json")?;
        serde_json::from_slice(&body)
            .map_err(|error| FetchError::Decode(format!("Invalid JSON response: {error}")))
    }

    /// GETs `url` and returns the raw body.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get_bytes_with(url, "*/*")
    }

    fn get_bytes_with(&self, url: &str, accept: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.call(url, accept)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|error| FetchError::Network(format!("Failed to read response: {error}")))?;
        Ok(bytes)
    }
}

/// Joins a configured base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
