//! Displayable status state for UI consumers.
//!
//! [`StatusBoard`] is a [`StatusHandler`] that folds subscription events into
//! a [`WatchState`] and publishes it on a `tokio::sync::watch` channel. After
//! the stream ends or fails, the last update is kept so a view can keep
//! showing it as stale data.

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    traits::StatusHandler,
    types::{StatusUpdate, WatchError},
};

/// What a status view should display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WatchState {
    /// No update has been received yet.
    #[default]
    Connecting,
    /// The stream is open and this is the latest update.
    Live(StatusUpdate),
    /// The stream failed and is being re-established.
    Reconnecting {
        /// The last update received, now stale.
        last: Option<StatusUpdate>,
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// The server ended the stream cleanly.
    Ended {
        /// The last update received, now stale.
        last: Option<StatusUpdate>,
    },
    /// The subscription failed for good.
    Failed {
        /// The last update received, now stale.
        last: Option<StatusUpdate>,
        /// Why the subscription failed.
        error: WatchError,
    },
}

impl WatchState {
    /// Returns the most recent update, live or stale.
    pub const fn last_update(&self) -> Option<&StatusUpdate> {
        match self {
            Self::Connecting => None,
            Self::Live(update) => Some(update),
            Self::Reconnecting { last, .. } | Self::Ended { last } | Self::Failed { last, .. } => {
                last.as_ref()
            }
        }
    }

    /// Returns true if the displayed update is current.
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Returns true if an update is shown but no longer current.
    pub const fn is_stale(&self) -> bool {
        !self.is_live() && self.last_update().is_some()
    }

    /// Returns true once the subscription will produce no further updates.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended { .. } | Self::Failed { .. })
    }

    /// Short name of the state.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Live(_) => "live",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Ended { .. } => "ended",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns a serializable summary of the state.
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            state: self.name(),
            stale: self.is_stale(),
            error: match self {
                Self::Failed { error, .. } => Some(error.to_string()),
                _ => None,
            },
            last: self.last_update().cloned(),
        }
    }
}

/// Serializable summary of a [`WatchState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    /// State name.
    pub state: &'static str,
    /// Whether `last` is stale.
    pub stale: bool,
    /// Failure description, if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The most recent update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<StatusUpdate>,
}

/// Publishes the display state of one subscription.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<WatchState>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Creates a board in the [`WatchState::Connecting`] state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(WatchState::Connecting);
        Self { tx }
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.tx.subscribe()
    }

    /// Returns the current state.
    pub fn snapshot(&self) -> WatchState {
        self.tx.borrow().clone()
    }

    fn last(&self) -> Option<StatusUpdate> {
        self.tx.borrow().last_update().cloned()
    }
}

impl StatusHandler for StatusBoard {
    fn on_update(&mut self, update: StatusUpdate) {
        self.tx.send_replace(WatchState::Live(update));
    }

    fn on_end(&mut self) {
        let last = self.last();
        self.tx.send_replace(WatchState::Ended { last });
    }

    fn on_error(&mut self, error: WatchError) {
        let last = self.last();
        self.tx.send_replace(WatchState::Failed { last, error });
    }

    fn on_reconnect(&mut self, attempt: u32, _error: &WatchError) {
        let last = self.last();
        self.tx.send_replace(WatchState::Reconnecting { last, attempt });
    }
}
