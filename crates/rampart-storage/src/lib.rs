//! Rampart Storage - durable state for the undo ledger and learning store.
//!
//! Everything here is plain files under a state directory:
//!
//! - [`write_atomic`] / [`write_json`]: temp file in the same directory, then rename
//! - [`JsonlLog`]: append-only JSON-lines log, compacted by atomic rewrite
//! - [`BlobStore`]: content-addressed backup blobs keyed by BLAKE3 hash
//! - [`StoreLock`]: exclusive advisory lock so two processes never share a store
//!
//! A crash mid-write never corrupts the most recent committed state: whole
//! files are replaced by rename, and a torn trailing log record is skipped on
//! load.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod atomic;
pub mod blob;
pub mod error;
pub mod lock;
pub mod log;

pub use atomic::{read_json, write_atomic, write_json};
pub use blob::BlobStore;
pub use error::{StorageError, StorageResult};
pub use lock::StoreLock;
pub use log::JsonlLog;
