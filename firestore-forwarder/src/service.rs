//! Forwarder lifecycle: authenticate, then replay one request or listen.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::{ForwarderArgs, ForwarderConfig};
use crate::credentials::ServiceAccountAuth;
use crate::error::{ForwardError, ForwarderError, Result};
use crate::firestore::{DocumentStore, FirestoreClient, SubscriptionQuery};
use crate::forward::{ForwardOutcome, Forwarder};
use crate::listener::SnapshotListener;
use crate::model::{Document, DocumentChange, ForwardableRequest};

const BATCH_BUFFER: usize = 16;

type ForwardResult = (String, std::result::Result<ForwardOutcome, ForwardError>);

/// The request forwarder.
pub struct ForwarderService {
    config: Arc<ForwarderConfig>,
    store: Arc<dyn DocumentStore>,
    forwarder: Arc<Forwarder>,
    started_at: DateTime<Utc>
}

impl ForwarderService {
    /// Authenticates with the service account file named by the configuration.
    pub async fn connect(config: ForwarderConfig) -> Result<Self> {
        let auth = ServiceAccountAuth::from_file(&config.secrets_path)?;
        let project_id = match config.project_id.clone() {
            Some(project_id) => project_id,
            None => auth.project_id().await?
        };

        let client = FirestoreClient::new(
            &config.firestore_endpoint,
            project_id,
            config.database.clone(),
            Arc::new(auth)
        )?;
        tracing::info!(project_id = %client.project_id(), collection = %config.collection, "Connected to Firestore");

        Ok(Self::with_store(config, Arc::new(client)))
    }

    /// Creates a service over an existing document store.
    pub fn with_store(config: ForwarderConfig, store: Arc<dyn DocumentStore>) -> Self {
        let forwarder = Arc::new(Forwarder::new(config.url.clone()));
        Self {
            config: Arc::new(config),
            store,
            forwarder,
            started_at: Utc::now()
        }
    }

    /// Overrides the start of the subscription window.
    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = at;
        self
    }

    /// Replays the configured request, or listens forever.
    pub async fn run(&self) -> Result<()> {
        match &self.config.request_id {
            Some(request_id) => self.replay(request_id).await,
            None => self.listen().await
        }
    }

    /// Forwards a single stored request and waits for the response.
    pub async fn replay(&self, request_id: &str) -> Result<()> {
        let Some(document) = self
            .store
            .get_document(&self.config.collection, request_id)
            .await?
        else {
            tracing::info!("No request found with ID: {request_id}");
            return Ok(());
        };

        let request = ForwardableRequest::from(&document);
        let result = self.forwarder.forward(&document.id, &request).await;
        settle((document.id, result))
    }

    /// Forwards every change to the subscription query until an error occurs.
    ///
    /// Queries are polled on their own task and forwards run concurrently, so
    /// neither waits on the other.
    pub async fn listen(&self) -> Result<()> {
        let Some(webhook_name) = self.config.webhook_name.clone() else {
            return Err(ForwarderError::Configuration(
                "No webhook name provided for the subscription".to_string()
            ));
        };
        let query = SubscriptionQuery::new(self.config.collection.clone(), self.started_at, webhook_name);

        let (batch_tx, mut batches) = mpsc::channel(BATCH_BUFFER);
        let listener = SnapshotListener::new(self.store.clone(), query, self.config.poll_interval);
        // Dropping the set aborts the poller when listening stops.
        let mut poller = JoinSet::new();
        poller.spawn(poll_batches(listener, batch_tx));

        let mut in_flight: JoinSet<ForwardResult> = JoinSet::new();

        tracing::info!(
            collection = %self.config.collection,
            since = %self.started_at,
            "Listening for changes on Firestore"
        );

        loop {
            tokio::select! {
                batch = batches.recv() => {
                    let Some(batch) = batch else {
                        return Err(ForwarderError::Internal("Snapshot listener stopped".to_string()));
                    };
                    for change in batch? {
                        tracing::debug!(doc_id = %change.document.id, kind = %change.kind, "Document changed");
                        self.spawn_forward(&mut in_flight, change.document);
                    }
                }
                Some(joined) = in_flight.join_next() => {
                    settle(joined.map_err(task_failed)?)?;
                }
            }
        }
    }

    fn spawn_forward(&self, in_flight: &mut JoinSet<ForwardResult>, document: Document) {
        let forwarder = self.forwarder.clone();
        in_flight.spawn(async move {
            let request = ForwardableRequest::from(&document);
            let result = forwarder.forward(&document.id, &request).await;
            (document.id, result)
        });
    }
}

// Response failures are already logged by the forwarder; only failures
// without a response stop the process.
fn settle((doc_id, result): ForwardResult) -> Result<()> {
    match result {
        Err(source) if source.is_fatal() => Err(ForwarderError::Forward { doc_id, source }),
        _ => Ok(())
    }
}

async fn poll_batches(mut listener: SnapshotListener, batch_tx: mpsc::Sender<Result<Vec<DocumentChange>>>) {
    loop {
        let batch = listener.next_batch().await;
        let failed = batch.is_err();
        if batch_tx.send(batch).await.is_err() || failed {
            return;
        }
    }
}

fn task_failed(e: JoinError) -> ForwarderError {
    ForwarderError::Internal(format!("Forward task failed: {e}"))
}

/// Signal handler for shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, stopping");
        },
    }
}

/// Connects and runs until the work is done or the process is interrupted.
///
/// Interrupting drops any forwards still in flight.
pub async fn run_forwarder(config: ForwarderConfig) -> Result<()> {
    let service = ForwarderService::connect(config).await?;

    tokio::select! {
        result = service.run() => result,
        () = shutdown_signal() => Ok(())
    }
}

/// `RUST_LOG`-style directives with INFO as the fallback level.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}

/// Entry point for the binary.
pub async fn run_from_args() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt().with_env_filter(log_filter(&directives)).init();

    let config = ForwarderConfig::from_args(ForwarderArgs::parse())?;
    run_forwarder(config).await
}
