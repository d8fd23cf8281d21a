//! # dbwatch Client
//!
//! Typed client for the `databases.resource.donald.com` resource.
//!
//! This crate provides:
//! - A `Transport` abstraction (unary calls + byte streams)
//! - An HTTP transport built on reqwest
//! - A loopback transport that routes to an in-process server
//! - `ClientConfig`, loadable from a kubeconfig file or the in-cluster environment
//! - `DatabaseClient` with list/get/create/replace/delete/watch
//!
//! ## Error mapping
//!
//! Every call surfaces its failure directly; nothing is retried here.
//! HTTP statuses map onto `ClientError` as follows:
//!
//! | Status | Error |
//! |--------|-------|
//! | 404 | `NotFound` |
//! | 409 (`AlreadyExists`) | `AlreadyExists` |
//! | 409 (other) | `Conflict` |
//! | 400, 422 | `Validation` |
//! | 410 | `Expired` |
//! | anything else | `Transport` (retryable for 429 and 5xx) |
//!
//! Payloads that cannot be decoded as the expected kind are `Decode`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod error;
mod http;
mod transport;
mod watch;

pub use client::DatabaseClient;
pub use config::{ClientConfig, TlsConfig, IN_CLUSTER_CA_FILE, IN_CLUSTER_TOKEN_PATH};
pub use error::{ClientError, ClientResult};
pub use http::{HttpTransport, LoopbackServer, LoopbackTransport};
pub use transport::{ByteStream, Method, RestRequest, RestResponse, Transport};
pub use watch::{decode_frames, decode_frames_with_limit, WatchStream, MAX_FRAME_LEN};
