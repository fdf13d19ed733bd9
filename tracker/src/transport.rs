//! Fire-and-forget delivery of event records.
//!
//! The [`Transport`] trait is the HTTP boundary of the tracker. The tracker
//! hands it a fully enriched record and never looks back: implementations
//! must not block, must not panic, and must not report failures to the
//! caller.
//!
//! [`HttpTransport`] posts each record as JSON on a spawned `tokio` task:
//! on the pinned runtime if one was given, else on the caller's runtime,
//! else on a small background runtime created on first use. Any failure is
//! logged together with the record and dropped. There is no retry, no
//! buffering and no timeout, and the response status is ignored.

use std::sync::OnceLock;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

use crate::record::EventRecord;

/// Content type of every tracking request.
const JSON_CONTENT_TYPE: &str = "application/json";

/// Worker threads of the background runtime.
const BACKGROUND_WORKERS: usize = 1;

/// Runtime for records pushed from threads outside any runtime.
static BACKGROUND: OnceLock<Option<Runtime>> = OnceLock::new();

/// Returns the background runtime's handle, creating it on first use.
fn background_handle() -> Option<Handle> {
    BACKGROUND
        .get_or_init(|| {
            match Builder::new_multi_thread()
                .worker_threads(BACKGROUND_WORKERS)
                .thread_name("simple-tracker-transport")
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    debug!("Background transport runtime started");
                    Some(runtime)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to start background transport runtime");
                    None
                }
            }
        })
        .as_ref()
        .map(|runtime| runtime.handle().clone())
}

/// Errors that can occur while setting up a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Delivers enriched records to the collector.
pub trait Transport: Send + Sync {
    /// Sends `record` to `endpoint` without waiting for the outcome.
    fn post(&self, endpoint: &str, record: &EventRecord);
}

/// HTTP transport posting JSON on a background task.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    runtime: Option<Handle>,
}

impl HttpTransport {
    /// Creates a transport that spawns onto the runtime of the calling
    /// context at send time, or onto a shared background runtime when the
    /// caller has none.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().pool_max_idle_per_host(10).build()?;

        Ok(Self {
            client,
            runtime: None,
        })
    }

    /// Pins the transport to `handle` instead of the caller's runtime.
    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

impl Transport for HttpTransport {
    fn post(&self, endpoint: &str, record: &EventRecord) {
        let body = match serde_json::to_string(record) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize tracking record");
                return;
            }
        };

        let handle = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .or_else(background_handle);
        let Some(handle) = handle else {
            warn!(
                endpoint = %endpoint,
                record = %body,
                "Failed to send tracking request: no async runtime available"
            );
            return;
        };

        let request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body.clone());
        let endpoint = endpoint.to_string();

        handle.spawn(async move {
            match request.send().await {
                Ok(response) => {
                    debug!(
                        endpoint = %endpoint,
                        status = response.status().as_u16(),
                        "Tracking request completed"
                    );
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        endpoint = %endpoint,
                        record = %body,
                        "Failed to send tracking request"
                    );
                }
            }
        });
    }
}
