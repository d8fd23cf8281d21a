//! # dbwatch Cache
//!
//! A list-watch synchronizer (informer) that keeps a local, in-memory copy
//! of the `databases` collection.
//!
//! This crate provides:
//! - [`Store`] and [`StoreReader`]: the local copy, safe for concurrent readers
//! - [`Informer`]: the list / reconcile / watch state machine
//! - [`InformerHandle`]: readiness, stats and shutdown for a spawned informer
//! - [`EventHandler`]: callbacks for adds, updates and deletes
//!
//! ## Consistency
//!
//! The store is eventually consistent with the server. Every relist replaces
//! its contents, so events the watch dropped are healed by the next resync.
//! A write made through the client (for example a delete) is authoritative on
//! the server immediately, but shows up in the store only once the matching
//! watch event or the next relist has been applied.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbwatch_cache::{Informer, InformerConfig};
//! use dbwatch_client::{ClientConfig, DatabaseClient, HttpTransport};
//!
//! let config = ClientConfig::infer(&path, false)?;
//! let client = DatabaseClient::new(config.clone(), HttpTransport::new(&config)?);
//!
//! let informer = Informer::new(client, InformerConfig::default()).spawn();
//! informer.wait_until_ready().await?;
//!
//! for db in informer.store().list() {
//!     println!("{} {}", db.name(), db.spec.available);
//! }
//! informer.shutdown().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod informer;
mod store;

pub use config::{BackoffConfig, InformerConfig};
pub use error::{CacheError, CacheResult};
pub use handler::EventHandler;
pub use informer::{Informer, InformerHandle, InformerState, InformerStats, ListWatch};
pub use store::{Reconciled, Store, StoreReader};
