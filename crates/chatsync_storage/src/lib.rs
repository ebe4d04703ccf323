//! # ChatSync Storage
//!
//! Local key/value backends for the ChatSync local tier.
//!
//! Backends are **opaque string stores**. They map record keys to serialized
//! JSON text and never interpret what they hold. The engine owns the record
//! layout (conversation map, order list, active id, version stamp).
//!
//! ## Design Principles
//!
//! - Backends are simple key/value stores (get, put, remove, keys)
//! - Each key is an independent record: corrupting one leaves the others intact
//! - Must be `Send + Sync`; mutation goes through `&self` with interior locking
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral sessions
//! - [`FileBackend`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use chatsync_storage::{InMemoryBackend, KeyValueBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.put("greeting", "\"hello\"").unwrap();
//! assert_eq!(backend.get("greeting").unwrap().as_deref(), Some("\"hello\""));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
