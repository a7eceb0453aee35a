//! Command-line arguments and the validated forwarder configuration.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ForwarderError, Result};

pub const DEFAULT_COLLECTION: &str = "requests";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Raw command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "firestore-forwarder",
    version,
    about = "Forward webhook requests stored in Firestore to an HTTP endpoint"
)]
pub struct ForwarderArgs {
    /// Url to forward requests to
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Webhook name whose requests are forwarded
    #[arg(short = 'w', long = "webhookName")]
    pub webhook_name: Option<String>,

    /// Firestore collection the requests are stored in
    #[arg(short = 'c', long = "fireStoreCollection", default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Path to the service account secrets file, relative to the executable
    #[arg(short = 's', long = "secretsFile")]
    pub secrets_file: Option<PathBuf>,

    /// Replay a single request by document id
    #[arg(short = 'r', long = "requestId")]
    pub request_id: Option<String>,

    /// How often the live query is refreshed, in milliseconds
    #[arg(long = "pollInterval", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Firestore REST endpoint
    #[arg(long = "firestoreEndpoint", default_value = DEFAULT_FIRESTORE_ENDPOINT)]
    pub firestore_endpoint: String,

    /// Firestore database id
    #[arg(long = "database", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Project id, defaults to the one in the secrets file
    #[arg(long = "projectId")]
    pub project_id: Option<String>
}

/// Validated configuration for a forwarder run.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Every forward is sent here, whatever the document says.
    pub url: String,
    pub webhook_name: Option<String>,
    pub collection: String,
    /// Resolved location of the service account file.
    pub secrets_path: PathBuf,
    /// Replay this document instead of listening.
    pub request_id: Option<String>,
    pub poll_interval: Duration,
    pub firestore_endpoint: String,
    pub database: String,
    pub project_id: Option<String>
}

impl ForwarderConfig {
    /// Resolves arguments against the directory of the running executable.
    pub fn from_args(args: ForwarderArgs) -> Result<Self> {
        // URL is checked before anything touches the filesystem.
        if args.url.as_deref().is_none_or(str::is_empty) {
            return Err(no_url());
        }
        let base_dir = program_dir()?;
        Self::resolve(args, &base_dir)
    }

    /// Validates arguments, resolving a relative secrets path against `base_dir`.
    pub fn resolve(args: ForwarderArgs, base_dir: &Path) -> Result<Self> {
        let url = args
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(no_url)?;

        let Some(secrets_file) = args.secrets_file else {
            return Err(ForwarderError::Configuration(
                "No secrets file provided".to_string()
            ));
        };
        let secrets_path = base_dir.join(secrets_file);
        if !secrets_path.is_file() {
            return Err(ForwarderError::Configuration(format!(
                "No secrets file provided or it doesn't exist {}",
                secrets_path.display()
            )));
        }

        Self::builder()
            .url(url)
            .secrets_path(secrets_path)
            .collection(args.collection)
            .poll_interval(Duration::from_millis(args.poll_interval_ms))
            .firestore_endpoint(args.firestore_endpoint)
            .database(args.database)
            .maybe_webhook_name(args.webhook_name)
            .maybe_request_id(args.request_id)
            .maybe_project_id(args.project_id)
            .build()
    }

    /// Creates a builder for configuration.
    #[must_use]
    pub fn builder() -> ForwarderConfigBuilder {
        ForwarderConfigBuilder::default()
    }
}

fn no_url() -> ForwarderError {
    ForwarderError::Configuration("No Forwarder URL provided".to_string())
}

fn program_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ForwarderError::Configuration(format!(
            "Cannot determine program directory from {}",
            exe.display()
        ))
    })
}

/// Builder for `ForwarderConfig`.
///
/// Unlike [`ForwarderConfig::resolve`] it does not check that the secrets file exists.
#[derive(Default)]
pub struct ForwarderConfigBuilder {
    url: Option<String>,
    webhook_name: Option<String>,
    collection: Option<String>,
    secrets_path: Option<PathBuf>,
    request_id: Option<String>,
    poll_interval: Option<Duration>,
    firestore_endpoint: Option<String>,
    database: Option<String>,
    project_id: Option<String>
}

impl ForwarderConfigBuilder {
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn webhook_name(self, name: impl Into<String>) -> Self {
        self.maybe_webhook_name(Some(name.into()))
    }

    #[must_use]
    pub fn maybe_webhook_name(mut self, name: Option<String>) -> Self {
        self.webhook_name = name;
        self
    }

    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    #[must_use]
    pub fn secrets_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn request_id(self, id: impl Into<String>) -> Self {
        self.maybe_request_id(Some(id.into()))
    }

    #[must_use]
    pub fn maybe_request_id(mut self, id: Option<String>) -> Self {
        self.request_id = id;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn firestore_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.firestore_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn project_id(self, project_id: impl Into<String>) -> Self {
        self.maybe_project_id(Some(project_id.into()))
    }

    #[must_use]
    pub fn maybe_project_id(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<ForwarderConfig> {
        let url = self.url.filter(|url| !url.is_empty()).ok_or_else(no_url)?;
        let secrets_path = self.secrets_path.ok_or_else(|| {
            ForwarderError::Configuration("No secrets file provided".to_string())
        })?;

        let poll_interval = self
            .poll_interval
            .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        if poll_interval.is_zero() {
            return Err(ForwarderError::Configuration(
                "pollInterval must be greater than zero".to_string()
            ));
        }

        Ok(ForwarderConfig {
            url,
            webhook_name: self.webhook_name,
            collection: self
                .collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            secrets_path,
            request_id: self.request_id,
            poll_interval,
            firestore_endpoint: self
                .firestore_endpoint
                .unwrap_or_else(|| DEFAULT_FIRESTORE_ENDPOINT.to_string()),
            database: self
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            project_id: self.project_id
        })
    }
}
