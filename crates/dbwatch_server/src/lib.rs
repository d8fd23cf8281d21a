//! # dbwatch Server
//!
//! In-memory reference API server for the `databases` resource.
//!
//! This crate provides:
//! - The REST surface (list, get, create, replace, delete, watch)
//! - Server-assigned resource versions, uids and creation timestamps
//! - A bounded event history with compaction (`410 Expired` for old watches)
//! - Watch fan-out with label-selector filtering
//! - Fault injection for exercising client recovery paths
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbwatch_client::{ClientConfig, DatabaseClient, LoopbackTransport};
//! use dbwatch_server::{ApiServer, ServerConfig};
//! use std::sync::Arc;
//!
//! let server = Arc::new(ApiServer::new(ServerConfig::default()));
//! let client = DatabaseClient::new(
//!     ClientConfig::default(),
//!     LoopbackTransport::new(Arc::clone(&server)),
//! );
//! ```
//!
//! # Protocol
//!
//! Resource versions are decimal revision numbers. Every mutation bumps the
//! revision, records an event in the history and delivers it to open
//! watches. A watch started from version `N` first replays retained events
//! after `N`, then follows live events. Version `0` replays the current
//! objects as `ADDED`. No version means "from now on".

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod event_log;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use event_log::{EventLog, StoredEvent};
pub use handler::{route, Route};
pub use server::ApiServer;
