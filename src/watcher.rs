//! Callback-driven status watcher.
//!
//! The [`StatusWatcher`] is the main entry point for consumers that prefer
//! callbacks over polling a [`crate::StatusStream`]. Each call to
//! [`StatusWatcher::watch`] spawns one task that owns the subscription,
//! delivers events to a [`StatusHandler`], and applies the configured
//! [`RetryPolicy`].

use futures::StreamExt;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    client::StatusClient,
    retry::RetryPolicy,
    traits::{Callbacks, StatusHandler},
    types::{StatusUpdate, WatchError},
};

/// How a subscription terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The server ended the stream cleanly.
    Ended,
    /// The subscription failed and was not (or no longer) retried.
    Failed(WatchError),
    /// The caller cancelled the subscription.
    Cancelled,
}

impl WatchOutcome {
    /// Returns the error if the subscription failed.
    pub const fn error(&self) -> Option<&WatchError> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Ended | Self::Cancelled => None,
        }
    }
}

/// Watches system status on a single endpoint.
///
/// # Example
///
/// ```ignore
/// use statuswatch::{LoggingHandler, StatusWatcher};
///
/// let watcher = StatusWatcher::connect("localhost:9999")?;
/// let handle = watcher.watch(LoggingHandler::new());
///
/// // Later
/// let outcome = handle.cancel().await;
/// ```
#[derive(Debug, Clone)]
pub struct StatusWatcher {
    /// The underlying client.
    client: StatusClient,
    /// Reconnection policy.
    retry: RetryPolicy,
}

impl StatusWatcher {
    /// Creates a watcher for `endpoint` with default configuration.
    ///
    /// Performs no network I/O.
    pub fn connect(endpoint: &str) -> Result<Self, WatchError> {
        StatusClient::connect(endpoint).map(Self::new)
    }

    /// Creates a watcher over an existing client, using its retry policy.
    pub fn new(client: StatusClient) -> Self {
        let retry = client.config().retry;
        Self { client, retry }
    }

    /// Overrides the retry policy.
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying client.
    pub const fn client(&self) -> &StatusClient {
        &self.client
    }

    /// Returns the retry policy.
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Starts a subscription delivering events to `handler`.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle cancels the subscription.
    pub fn watch<H: StatusHandler>(&self, handler: H) -> WatchHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let client = self.client.clone();
        let retry = self.retry;

        debug!(endpoint = client.endpoint(), ?retry, "starting status watch");
        let task = tokio::spawn(run(client, retry, handler, cancel_rx));
        WatchHandle { cancel: Some(cancel_tx), task }
    }

    /// Starts a subscription from three closures.
    pub fn watch_status<U, N, R>(&self, on_update: U, on_end: N, on_error: R) -> WatchHandle
    where
        U: FnMut(StatusUpdate) + Send + 'static,
        N: FnMut() + Send + 'static,
        R: FnMut(WatchError) + Send + 'static,
    {
        self.watch(Callbacks::new(on_update, on_end, on_error))
    }
}

/// Caller-owned handle for a running subscription.
#[derive(Debug)]
pub struct WatchHandle {
    /// Cancellation signal. Dropping it also cancels.
    cancel: Option<oneshot::Sender<()>>,
    /// The subscription task.
    task: JoinHandle<WatchOutcome>,
}

impl WatchHandle {
    /// Cancels the subscription and waits for its task to finish.
    ///
    /// No handler method is invoked after this returns. If the subscription
    /// had already terminated, its outcome is returned instead.
    pub async fn cancel(mut self) -> WatchOutcome {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    /// Waits for the subscription to terminate on its own.
    pub async fn join(self) -> WatchOutcome {
        // Keep the cancel sender alive while waiting.
        let Self { cancel, task } = self;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => WatchOutcome::Cancelled,
        };
        drop(cancel);
        outcome
    }

    /// Returns true if the subscription has terminated.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Subscription task body.
async fn run<H: StatusHandler>(
    client: StatusClient,
    retry: RetryPolicy,
    mut handler: H,
    mut cancel: oneshot::Receiver<()>,
) -> WatchOutcome {
    tokio::select! {
        biased;
        _ = &mut cancel => {
            info!(endpoint = client.endpoint(), "status watch cancelled");
            WatchOutcome::Cancelled
        }
        outcome = drive(&client, retry, &mut handler) => outcome,
    }
}

/// Runs attempts until a clean end, a terminal failure, or retry exhaustion.
async fn drive<H: StatusHandler>(
    client: &StatusClient,
    retry: RetryPolicy,
    handler: &mut H,
) -> WatchOutcome {
    let mut attempt: u32 = 0;
    loop {
        let (delivered, result) = stream_once(client, handler).await;
        if delivered > 0 {
            attempt = 0;
        }

        let error = match result {
            Ok(()) => {
                handler.on_end();
                return WatchOutcome::Ended;
            }
            Err(e) => e,
        };

        if error.is_retryable() {
            attempt = attempt.saturating_add(1);
            if let Some(delay) = retry.delay(attempt) {
                warn!(
                    endpoint = client.endpoint(),
                    %error,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "status stream failed, reconnecting"
                );
                handler.on_reconnect(attempt, &error);
                tokio::time::sleep(delay).await;
                continue;
            }
        }

        warn!(endpoint = client.endpoint(), %error, kind = %error.kind(), "status stream failed");
        handler.on_error(error.clone());
        return WatchOutcome::Failed(error);
    }
}

/// Runs one stream to completion, returning the number of updates delivered.
async fn stream_once<H: StatusHandler>(
    client: &StatusClient,
    handler: &mut H,
) -> (u64, Result<(), WatchError>) {
    let mut stream = match client.watch_status().await {
        Ok(stream) => stream,
        Err(e) => return (0, Err(e)),
    };

    let mut delivered = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(update) => {
                delivered += 1;
                debug!(seq = delivered, components = update.components.len(), "delivering update");
                handler.on_update(update);
            }
            Err(e) => return (delivered, Err(e)),
        }
    }
    (delivered, Ok(()))
}
