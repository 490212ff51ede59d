//! Core types for the status watcher.
//!
//! This module contains the status records carried on the stream, the final
//! stream status, and the error taxonomy shared throughout the crate.

use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Liveness report for one named subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Component identifier.
    #[serde(alias = "component")]
    pub id: String,
    /// Whether the component is alive.
    pub alive: bool,
}

impl ComponentStatus {
    /// Creates a new component status.
    pub fn new(id: impl Into<String>, alive: bool) -> Self {
        Self { id: id.into(), alive }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, if self.alive { "alive" } else { "down" })
    }
}

/// One message emitted by the remote status stream.
///
/// Components are kept in the order the server sent them. No uniqueness
/// or sorting is imposed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Component statuses, as emitted by the server.
    #[serde(default)]
    pub components: Vec<ComponentStatus>,
    /// Optional free-text note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusUpdate {
    /// Creates an update from components and an optional message.
    pub const fn new(components: Vec<ComponentStatus>, message: Option<String>) -> Self {
        Self { components, message }
    }

    /// Returns true if every reported component is alive.
    ///
    /// An update with no components is considered healthy.
    pub fn all_alive(&self) -> bool {
        self.components.iter().all(|c| c.alive)
    }

    /// Returns the identifiers of components reported as down.
    pub fn down(&self) -> impl Iterator<Item = &str> {
        self.components.iter().filter(|c| !c.alive).map(|c| c.id.as_str())
    }

    /// Checks the invariants a decoded update must hold.
    pub fn validate(&self) -> Result<(), WatchError> {
        if let Some(index) = self.components.iter().position(|c| c.id.trim().is_empty()) {
            return Err(WatchError::InvalidUpdate(format!("component {index} has an empty id")));
        }
        Ok(())
    }
}

/// Final status reported by the server on a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    /// Status code. Zero means OK.
    pub code: i32,
    /// Human-readable details.
    #[serde(default)]
    pub details: String,
    /// Trailing metadata sent with the status.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl StreamStatus {
    /// The OK status.
    pub const OK: i32 = 0;

    /// Returns true if the stream finished without a fault.
    pub const fn is_ok(&self) -> bool {
        self.code == Self::OK
    }

    /// Converts a non-OK status into the matching error.
    pub fn into_result(self) -> Result<(), WatchError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(WatchError::Remote { code: self.code, details: self.details })
        }
    }
}

/// Broad classification of a [`WatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The endpoint or other configuration is malformed.
    Configuration,
    /// Connection or stream failure.
    Transport,
    /// Malformed response.
    Protocol,
    /// The server reported a fault on the stream.
    Remote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while watching status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The endpoint address could not be used.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to establish the connection or send the request.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body failed mid-stream.
    #[error("stream failed: {0}")]
    Stream(String),

    /// The server answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// No data arrived within the idle timeout.
    #[error("no data received for {0:?}")]
    Timeout(Duration),

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A decoded update violated an invariant.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// The server ended the stream with a fault status.
    #[error("server reported status {code}: {details}")]
    Remote {
        /// The status code.
        code: i32,
        /// The status details.
        details: String,
    },
}

impl WatchError {
    /// Returns the broad classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEndpoint { .. } => ErrorKind::Configuration,
            Self::Connect(_) | Self::Stream(_) | Self::HttpStatus(_) | Self::Timeout(_) => {
                ErrorKind::Transport
            }
            Self::Decode(_) | Self::InvalidUpdate(_) => ErrorKind::Protocol,
            Self::Remote { .. } => ErrorKind::Remote,
        }
    }

    /// Returns true if reconnecting might succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Remote)
    }

    /// Maps a request-phase reqwest error.
    pub(crate) fn from_request(err: &reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::HttpStatus(status.as_u16()),
            None => Self::Connect(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_component_alias() {
        let status: ComponentStatus =
            serde_json::from_str(r#"{"component":"agent","alive":false}"#).unwrap();
        assert_eq!(status, ComponentStatus::new("agent", false));
    }

    #[test]
    fn test_update_defaults() {
        let update: StatusUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.components.is_empty());
        assert!(update.message.is_none());
        assert!(update.all_alive());

        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_update_down() {
        let update = StatusUpdate::new(
            vec![
                ComponentStatus::new("db", true),
                ComponentStatus::new("agent", false),
                ComponentStatus::new("cache", false),
            ],
            None,
        );
        assert!(!update.all_alive());
        assert_eq!(update.down().collect::<Vec<_>>(), vec!["agent", "cache"]);
    }

    #[test]
    fn test_update_validate_empty_id() {
        let update = StatusUpdate::new(
            vec![ComponentStatus::new("db", true), ComponentStatus::new(" ", true)],
            None,
        );
        let err = update.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("component 1"));
    }

    #[test]
    fn test_stream_status_result() {
        assert!(StreamStatus::default().into_result().is_ok());

        let err = StreamStatus { code: 13, details: "internal".to_string(), ..Default::default() }
            .into_result()
            .unwrap_err();
        assert_eq!(err, WatchError::Remote { code: 13, details: "internal".to_string() });
    }

    #[test]
    fn test_stream_status_metadata() {
        let status: StreamStatus = serde_json::from_str(
            r#"{"code":14,"details":"draining","metadata":{"server":"scheduler-1"}}"#,
        )
        .unwrap();
        assert_eq!(status.metadata.get("server").map(String::as_str), Some("scheduler-1"));

        let plain = serde_json::to_string(&StreamStatus::default()).unwrap();
        assert_eq!(plain, r#"{"code":0,"details":""}"#);
    }

    #[rstest]
    #[case::endpoint(
        WatchError::InvalidEndpoint { endpoint: "x".into(), reason: "bad".into() },
        ErrorKind::Configuration,
        false
    )]
    #[case::connect(WatchError::Connect("refused".into()), ErrorKind::Transport, true)]
    #[case::stream(WatchError::Stream("reset".into()), ErrorKind::Transport, true)]
    #[case::http(WatchError::HttpStatus(503), ErrorKind::Transport, true)]
    #[case::timeout(WatchError::Timeout(Duration::from_secs(1)), ErrorKind::Transport, true)]
    #[case::decode(WatchError::Decode("eof".into()), ErrorKind::Protocol, false)]
    #[case::invalid(WatchError::InvalidUpdate("id".into()), ErrorKind::Protocol, false)]
    #[case::remote(
        WatchError::Remote { code: 14, details: "unavailable".into() },
        ErrorKind::Remote,
        true
    )]
    fn test_error_kind(
        #[case] error: WatchError,
        #[case] kind: ErrorKind,
        #[case] retryable: bool,
    ) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn test_error_display() {
        let err = WatchError::HttpStatus(503);
        assert_eq!(format!("{err}"), "unexpected HTTP status 503");

        let err = WatchError::Remote { code: 2, details: "boom".into() };
        assert_eq!(format!("{err}"), "server reported status 2: boom");
    }
}
