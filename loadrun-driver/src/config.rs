//! Driver configuration
//!
//! Settings come from an optional YAML file with environment variables
//! taking precedence. The API token is usually mounted as a secret file
//! rather than written into the configuration directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Secret file the API token is read from when not configured directly.
pub const DEFAULT_SECRET_PATH: &str = "/etc/loadrun/jenkins/token";

const DEFAULT_RETRY_TIMEOUT: u64 = 15;
const DEFAULT_POLL_INTERVAL: u64 = 15;

/// Shape of the configuration file
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    jenkins: JenkinsSection,
}

#[derive(Debug, Default, Deserialize)]
struct JenkinsSection {
    url: Option<String>,
    user: Option<String>,
    token: Option<String>,
    job: Option<String>,
    secret_path: Option<PathBuf>,
    retry_timeout: Option<u64>,
    poll_interval: Option<u64>,
}

/// Resolved driver configuration
///
/// Immutable input to one measurement cycle; constructed once per
/// invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Jenkins base URL
    pub url: String,
    /// User the API token belongs to
    pub user: String,
    /// Jenkins API token
    pub token: String,
    /// Name of the job to drive
    pub job: String,
    /// Delay between retries of failed API calls
    pub retry_timeout: Duration,
    /// Delay between run status checks
    pub poll_interval: Duration,
}

impl Config {
    /// Load configuration from the given file and the environment.
    ///
    /// A missing file is fine; everything can come from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let file: FileConfig = match fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid configuration file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no configuration file at {}", path.display());
                FileConfig::default()
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read configuration file {}", path.display())
                });
            }
        };

        let config = Self::from_sources(file.jenkins, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the file section against an environment lookup.
    fn from_sources(section: JenkinsSection, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = env("JENKINS_URL")
            .or(section.url)
            .context("Jenkins URL was not configured")?;
        let user = env("JENKINS_USER")
            .or(section.user)
            .context("Jenkins user was not configured")?;
        let job = env("JENKINS_JOB")
            .or(section.job)
            .context("Jenkins job was not configured")?;

        let token = match env("JENKINS_TOKEN").or(section.token) {
            Some(token) => token,
            None => {
                let secret_path = env("JENKINS_SECRET_PATH")
                    .map(PathBuf::from)
                    .or(section.secret_path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRET_PATH));
                fs::read_to_string(&secret_path)
                    .with_context(|| {
                        format!("failed to read Jenkins token from {}", secret_path.display())
                    })?
                    .trim()
                    .to_string()
            }
        };

        Ok(Self {
            url,
            user,
            token,
            job,
            retry_timeout: Duration::from_secs(
                section.retry_timeout.unwrap_or(DEFAULT_RETRY_TIMEOUT),
            ),
            poll_interval: Duration::from_secs(
                section.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            ),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            anyhow::bail!("Jenkins URL must start with http:// or https://");
        }

        if self.retry_timeout.is_zero() {
            anyhow::bail!("retry_timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }
}
