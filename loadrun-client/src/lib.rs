//! Loadrun Jenkins Client
//!
//! A thin, type-safe HTTP client for the Jenkins remote API, covering the
//! four calls the measurement driver needs: resolve a job, check whether it
//! is running, start a run, and stop a run.
//!
//! No retry policy lives here. Transient failures surface as [`ClientError`]
//! and the orchestrator decides how to recover, so backoff behavior is
//! defined and tested in one place.
//!
//! # Example
//!
//! ```no_run
//! use loadrun_client::{CiServer, JenkinsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), loadrun_client::ClientError> {
//!     let client = JenkinsClient::new("https://ci.example.com", "bob", "api-token");
//!
//!     let job = client.get_job("load-test").await?;
//!     if !client.is_running(&job).await? {
//!         let run = client.invoke(&job).await?;
//!         println!("started run: {}", run.queue_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use loadrun_core::job::{JobHandle, RunRef};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Capability surface of the CI server, as the orchestrator sees it.
///
/// Kept deliberately thin so the orchestration state machine can be tested
/// against a scripted fake.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// Resolve the named job into a handle reused for the rest of the cycle.
    async fn get_job(&self, name: &str) -> Result<JobHandle>;

    /// Whether the job currently has a run in progress.
    async fn is_running(&self, job: &JobHandle) -> Result<bool>;

    /// Ask the server to start a new run of the job.
    ///
    /// The start counts as confirmed only when the server acknowledges it;
    /// an unconfirmed start surfaces as an error even if the run may in fact
    /// have been accepted.
    async fn invoke(&self, job: &JobHandle) -> Result<RunRef>;

    /// Best-effort stop of a run this process started.
    ///
    /// Failures are logged and swallowed; stopping happens during shutdown
    /// and must not itself fail the shutdown.
    async fn stop(&self, run: &RunRef);
}

/// HTTP client for the Jenkins remote API
///
/// Authenticates every request with HTTP basic auth using the configured
/// user and API token.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    /// Base URL of the Jenkins server (e.g., "https://ci.example.com")
    base_url: String,
    /// User the API token belongs to
    user: String,
    /// Jenkins API token
    token: String,
    /// HTTP client instance
    client: Client,
}

impl JenkinsClient {
    /// Create a new Jenkins client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Jenkins server
    /// * `user` - User name for basic auth
    /// * `token` - Jenkins API token for basic auth
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::with_client(base_url, user, token, Client::new())
    }

    /// Create a new Jenkins client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.into(),
            token: token.into(),
            client,
        }
    }

    /// Get the base URL of the Jenkins server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Request Plumbing
    // =============================================================================

    pub(crate) fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).basic_auth(&self.user, Some(&self.token))
    }

    pub(crate) fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .basic_auth(&self.user, Some(&self.token))
    }

    /// Handle an API response and deserialize JSON
    ///
    /// Checks the status code and returns an appropriate error if the
    /// request failed, or deserializes the response body if successful.
    pub(crate) async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no useful body
    pub(crate) async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = JenkinsClient::new("https://ci.example.com", "bob", "token");
        assert_eq!(client.base_url(), "https://ci.example.com");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = JenkinsClient::new("https://ci.example.com/", "bob", "token");
        assert_eq!(client.base_url(), "https://ci.example.com");
    }
}
