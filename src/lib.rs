#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod board;
pub use board::{StateSummary, StatusBoard, WatchState};

mod client;
pub use client::{ClientConfig, NDJSON, SYSTEM_STATUS, StatusClient, WATCH_SYSTEM_STATUS};

mod codec;
pub use codec::{DEFAULT_MAX_FRAME_LEN, Frame, FrameDecoder};

mod retry;
pub use retry::RetryPolicy;

mod stream;
pub use stream::StatusStream;

mod traits;
pub use traits::{Callbacks, LoggingHandler, StatusHandler, WatchEvent};

mod types;
pub use types::{ComponentStatus, ErrorKind, StatusUpdate, StreamStatus, WatchError};

mod watcher;
pub use watcher::{StatusWatcher, WatchHandle, WatchOutcome};
