//! Callback seam for status subscriptions.
//!
//! This module defines [`StatusHandler`], the trait a caller implements to
//! receive events from a [`crate::StatusWatcher`] subscription, along with a
//! few ready-made handlers:
//!
//! - [`Callbacks`]: adapts three closures
//! - [`LoggingHandler`]: logs every update through `tracing`
//! - `mpsc::UnboundedSender<WatchEvent>`: forwards events to a channel
//! - `(A, B)`: fans events out to two handlers

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::{StatusUpdate, WatchError};

/// Receives the events of one status subscription.
///
/// All methods are invoked sequentially from the subscription's task and
/// never concurrently with each other. Exactly one of [`on_end`] or
/// [`on_error`] is invoked when the subscription terminates on its own;
/// neither is invoked after cancellation.
///
/// [`on_end`]: StatusHandler::on_end
/// [`on_error`]: StatusHandler::on_error
///
/// # Example
///
/// ```ignore
/// use statuswatch::{StatusHandler, StatusUpdate, WatchError};
///
/// struct Printer;
///
/// impl StatusHandler for Printer {
///     fn on_update(&mut self, update: StatusUpdate) {
///         println!("{} components", update.components.len());
///     }
///
///     fn on_error(&mut self, error: WatchError) {
///         eprintln!("watch failed: {error}");
///     }
/// }
/// ```
pub trait StatusHandler: Send + 'static {
    /// Called for each update, in arrival order.
    fn on_update(&mut self, update: StatusUpdate);

    /// Called once when the server ends the stream cleanly.
    fn on_end(&mut self) {}

    /// Called once when the subscription fails for good.
    fn on_error(&mut self, error: WatchError);

    /// Called before each reconnection allowed by the retry policy.
    ///
    /// `error` is the failure that ended the previous attempt.
    fn on_reconnect(&mut self, attempt: u32, error: &WatchError) {
        let _ = (attempt, error);
    }
}

/// A subscription event, as forwarded to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An update arrived.
    Update(StatusUpdate),
    /// The subscription is reconnecting after a failure.
    Reconnect {
        /// Reconnection attempt number, starting at 1.
        attempt: u32,
        /// The failure that ended the previous attempt.
        error: WatchError,
    },
    /// The stream ended cleanly.
    End,
    /// The subscription failed.
    Error(WatchError),
}

impl StatusHandler for mpsc::UnboundedSender<WatchEvent> {
    fn on_update(&mut self, update: StatusUpdate) {
        let _ = self.send(WatchEvent::Update(update));
    }

    fn on_end(&mut self) {
        let _ = self.send(WatchEvent::End);
    }

    fn on_error(&mut self, error: WatchError) {
        let _ = self.send(WatchEvent::Error(error));
    }

    fn on_reconnect(&mut self, attempt: u32, error: &WatchError) {
        let _ = self.send(WatchEvent::Reconnect { attempt, error: error.clone() });
    }
}

/// Fans every event out to two handlers, first `A` then `B`.
impl<A: StatusHandler, B: StatusHandler> StatusHandler for (A, B) {
    fn on_update(&mut self, update: StatusUpdate) {
        self.0.on_update(update.clone());
        self.1.on_update(update);
    }

    fn on_end(&mut self) {
        self.0.on_end();
        self.1.on_end();
    }

    fn on_error(&mut self, error: WatchError) {
        self.0.on_error(error.clone());
        self.1.on_error(error);
    }

    fn on_reconnect(&mut self, attempt: u32, error: &WatchError) {
        self.0.on_reconnect(attempt, error);
        self.1.on_reconnect(attempt, error);
    }
}

/// Handler built from three closures.
pub struct Callbacks<U, N, R> {
    on_update: U,
    on_end: N,
    on_error: R,
}

impl<U, N, R> std::fmt::Debug for Callbacks<U, N, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

impl<U, N, R> Callbacks<U, N, R>
where
    U: FnMut(StatusUpdate) + Send + 'static,
    N: FnMut() + Send + 'static,
    R: FnMut(WatchError) + Send + 'static,
{
    /// Creates a handler from update, end, and error closures.
    pub const fn new(on_update: U, on_end: N, on_error: R) -> Self {
        Self { on_update, on_end, on_error }
    }
}

impl<U, N, R> StatusHandler for Callbacks<U, N, R>
where
    U: FnMut(StatusUpdate) + Send + 'static,
    N: FnMut() + Send + 'static,
    R: FnMut(WatchError) + Send + 'static,
{
    fn on_update(&mut self, update: StatusUpdate) {
        (self.on_update)(update);
    }

    fn on_end(&mut self) {
        (self.on_end)();
    }

    fn on_error(&mut self, error: WatchError) {
        (self.on_error)(error);
    }
}

/// Handler that logs every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler {
    /// Number of updates seen so far.
    updates: u64,
}

impl LoggingHandler {
    /// Creates a new logging handler.
    pub const fn new() -> Self {
        Self { updates: 0 }
    }

    /// Returns the number of updates logged.
    pub const fn updates(&self) -> u64 {
        self.updates
    }
}

impl StatusHandler for LoggingHandler {
    fn on_update(&mut self, update: StatusUpdate) {
        self.updates += 1;
        for component in &update.components {
            info!(component = %component.id, alive = component.alive, "component status");
        }
        info!(
            seq = self.updates,
            components = update.components.len(),
            all_alive = update.all_alive(),
            message = update.message.as_deref().unwrap_or_default(),
            "status update"
        );
    }

    fn on_end(&mut self) {
        info!(updates = self.updates, "status stream ended");
    }

    fn on_error(&mut self, error: WatchError) {
        warn!(%error, kind = %error.kind(), "status stream failed");
    }

    fn on_reconnect(&mut self, attempt: u32, error: &WatchError) {
        warn!(attempt, %error, "reconnecting status stream");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::types::ComponentStatus;

    #[test]
    fn test_channel_handler_forwards() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<WatchEvent>();
        let update = StatusUpdate::new(vec![ComponentStatus::new("db", true)], None);

        tx.on_update(update.clone());
        tx.on_reconnect(1, &WatchError::HttpStatus(502));
        tx.on_end();

        assert_eq!(rx.try_recv().unwrap(), WatchEvent::Update(update));
        assert_eq!(
            rx.try_recv().unwrap(),
            WatchEvent::Reconnect { attempt: 1, error: WatchError::HttpStatus(502) }
        );
        assert_eq!(rx.try_recv().unwrap(), WatchEvent::End);
    }

    #[test]
    fn test_channel_handler_closed_receiver() {
        let (mut tx, rx) = mpsc::unbounded_channel::<WatchEvent>();
        drop(rx);
        tx.on_error(WatchError::Stream("gone".to_string()));
    }

    #[test]
    fn test_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let mut handler = Callbacks::new(
            move |u: StatusUpdate| a.lock().unwrap().push(format!("update {:?}", u.message)),
            move || b.lock().unwrap().push("end".to_string()),
            move |e: WatchError| c.lock().unwrap().push(format!("error {e}")),
        );

        handler.on_update(StatusUpdate::new(vec![], Some("ok".to_string())));
        handler.on_reconnect(1, &WatchError::HttpStatus(503));
        handler.on_end();
        handler.on_error(WatchError::HttpStatus(500));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["update Some(\"ok\")", "end", "error unexpected HTTP status 500"]
        );
    }

    #[test]
    fn test_pair_fans_out_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<WatchEvent>();
        let mut pair = (LoggingHandler::new(), tx);

        pair.on_update(StatusUpdate::default());
        pair.on_error(WatchError::Timeout(std::time::Duration::from_secs(3)));

        assert_eq!(pair.0.updates(), 1);
        assert_eq!(rx.try_recv().unwrap(), WatchEvent::Update(StatusUpdate::default()));
        assert!(matches!(rx.try_recv().unwrap(), WatchEvent::Error(WatchError::Timeout(_))));
    }

    #[test]
    fn test_logging_handler_counts() {
        let mut handler = LoggingHandler::new();
        handler.on_update(StatusUpdate::default());
        handler.on_update(StatusUpdate::default());
        handler.on_end();
        assert_eq!(handler.updates(), 2);
    }
}
