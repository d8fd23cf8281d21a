//! # dbwatch API
//!
//! Resource types and wire codec for the `databases.resource.donald.com`
//! custom resource.
//!
//! This crate provides:
//! - `Database` / `DatabaseList` and their metadata
//! - List, get and delete options with query encoding
//! - Equality-based label selectors
//! - Watch event frames (`ADDED`, `MODIFIED`, `DELETED`, `BOOKMARK`, `ERROR`)
//! - The `Status` error payload returned by the API server
//! - JSON encoding/decoding bound to the single supported kind
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod database;
mod error;
mod meta;
mod options;
mod selector;
mod status;
mod watch;

pub use codec::{
    decode_event, decode_list, decode_object, decode_status, encode_event, encode_list,
    encode_object, encode_status,
};
pub use database::{
    api_version, Database, DatabaseList, DatabaseSpec, API_PATH, GROUP, KIND, LIST_KIND, PLURAL,
    VERSION,
};
pub use error::{CodecError, CodecResult};
pub use meta::{ListMeta, ObjectKey, ObjectMeta, ResourceVersion, TypeMeta};
pub use options::{DeleteOptions, GetOptions, ListOptions, PropagationPolicy};
pub use selector::{LabelSelector, Requirement};
pub use status::{Status, StatusReason};
pub use watch::{EventType, WatchEvent, WatchFrame};
