//! Jenkins job endpoints
//!
//! Implements the [`CiServer`] capability on top of the Jenkins remote API:
//!
//! - job lookup:    `GET  {base}/job/{name}/api/json`
//! - status check:  `GET  {job}/lastBuild/api/json`
//! - start run:     `POST {job}/build` (queue item URL in the Location header)
//! - stop run:      `POST {build}/stop`, or a queue cancel while still queued

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::{CiServer, JenkinsClient};
use loadrun_core::job::{JobHandle, RunRef};

/// Job description returned by the job endpoint
#[derive(Debug, Deserialize)]
struct JobInfo {
    name: String,
    url: String,
}

/// Subset of the build description we care about
#[derive(Debug, Deserialize)]
struct BuildInfo {
    building: bool,
}

/// Queue item for a requested run
///
/// `executable` appears once the run has left the queue and started on an
/// executor.
#[derive(Debug, Deserialize)]
struct QueueItem {
    id: u64,
    #[serde(default)]
    executable: Option<Executable>,
}

#[derive(Debug, Deserialize)]
struct Executable {
    url: String,
}

#[async_trait]
impl CiServer for JenkinsClient {
    async fn get_job(&self, name: &str) -> Result<JobHandle> {
        let url = format!("{}/job/{}/api/json", self.base_url(), name);
        let response = self.get(&url).send().await?;

        let info: JobInfo = self.handle_response(response).await?;
        Ok(JobHandle {
            name: info.name,
            url: info.url.trim_end_matches('/').to_string(),
        })
    }

    async fn is_running(&self, job: &JobHandle) -> Result<bool> {
        let url = format!("{}/lastBuild/api/json", job.url);
        let response = self.get(&url).send().await?;

        // A job that has never been built has no lastBuild.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let build: BuildInfo = self.handle_response(response).await?;
        Ok(build.building)
    }

    async fn invoke(&self, job: &JobHandle) -> Result<RunRef> {
        let url = format!("{}/build", job.url);
        let response = self.post(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        // Jenkins acknowledges a build request by pointing at the queue item.
        let queue_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                ClientError::ParseError("build request returned no queue location".to_string())
            })?;

        debug!(queue_url = %queue_url, "run queued");
        Ok(RunRef { queue_url })
    }

    async fn stop(&self, run: &RunRef) {
        if let Err(e) = self.stop_run(run).await {
            warn!("failed to stop run at {}: {}", run.queue_url, e);
        }
    }
}

impl JenkinsClient {
    /// Stop the run behind a queue item.
    ///
    /// The queue item is resolved first: a run that already started is
    /// stopped through its build URL, one still waiting in the queue is
    /// cancelled there.
    async fn stop_run(&self, run: &RunRef) -> Result<()> {
        let url = format!("{}/api/json", run.queue_url);
        let response = self.get(&url).send().await?;
        let item: QueueItem = self.handle_response(response).await?;

        match item.executable {
            Some(build) => {
                let url = format!("{}/stop", build.url.trim_end_matches('/'));
                debug!(url = %url, "stopping running build");
                let response = self.post(&url).send().await?;
                self.handle_empty_response(response).await
            }
            None => {
                let url = format!("{}/queue/cancelItem?id={}", self.base_url(), item.id);
                debug!(url = %url, "cancelling queued run");
                let response = self.post(&url).send().await?;
                self.handle_empty_response(response).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_at(server: &mockito::Server) -> JobHandle {
        JobHandle {
            name: "load-test".to_string(),
            url: format!("{}/job/load-test", server.url()),
        }
    }

    #[tokio::test]
    async fn test_get_job_resolves_handle() {
        let mut server = mockito::Server::new_async().await;
        let job_url = format!("{}/job/load-test/", server.url());
        let body = serde_json::json!({"name": "load-test", "url": job_url});
        let mock = server
            .mock("GET", "/job/load-test/api/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let job = client.get_job("load-test").await.unwrap();

        mock.assert_async().await;
        assert_eq!(job.name, "load-test");
        assert_eq!(job.url, job_url.trim_end_matches('/'));
    }

    #[tokio::test]
    async fn test_get_job_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/missing/api/json")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let err = client.get_job("missing").await.unwrap_err();

        assert!(matches!(err, ClientError::ApiError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_is_running_reads_building_flag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/load-test/lastBuild/api/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"number": 7, "building": true}"#)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let running = client.is_running(&job_at(&server)).await.unwrap();

        assert!(running);
    }

    #[tokio::test]
    async fn test_is_running_without_builds() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/load-test/lastBuild/api/json")
            .with_status(404)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let running = client.is_running(&job_at(&server)).await.unwrap();

        assert!(!running);
    }

    #[tokio::test]
    async fn test_invoke_returns_queue_ref() {
        let mut server = mockito::Server::new_async().await;
        let queue_url = format!("{}/queue/item/42/", server.url());
        let mock = server
            .mock("POST", "/job/load-test/build")
            .with_status(201)
            .with_header("location", &queue_url)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let run = client.invoke(&job_at(&server)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(run.queue_url, queue_url.trim_end_matches('/'));
    }

    #[tokio::test]
    async fn test_invoke_without_location_is_unconfirmed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/job/load-test/build")
            .with_status(201)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let err = client.invoke(&job_at(&server)).await.unwrap_err();

        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_stop_running_build() {
        let mut server = mockito::Server::new_async().await;
        let build_url = format!("{}/job/load-test/7/", server.url());
        server
            .mock("GET", "/queue/item/42/api/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"id": 42, "executable": {{"number": 7, "url": "{}"}}}}"#,
                build_url
            ))
            .create_async()
            .await;
        let stop = server
            .mock("POST", "/job/load-test/7/stop")
            .with_status(200)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let run = RunRef {
            queue_url: format!("{}/queue/item/42", server.url()),
        };
        client.stop(&run).await;

        stop.assert_async().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_queued_run() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/queue/item/42/api/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 42}"#)
            .create_async()
            .await;
        let cancel = server
            .mock("POST", "/queue/cancelItem?id=42")
            .with_status(204)
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let run = RunRef {
            queue_url: format!("{}/queue/item/42", server.url()),
        };
        client.stop(&run).await;

        cancel.assert_async().await;
    }

    #[tokio::test]
    async fn test_stop_swallows_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/queue/item/42/api/json")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = JenkinsClient::new(server.url(), "bob", "token");
        let run = RunRef {
            queue_url: format!("{}/queue/item/42", server.url()),
        };

        // Must not panic or propagate anything.
        client.stop(&run).await;
    }
}
