//! # ChatSync Testkit
//!
//! Test utilities for ChatSync.
//!
//! This crate provides:
//! - Conversation fixtures and temporary file backends
//! - A backend wrapper with injectable failures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatsync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_flaky_disk() {
//!     let backend = FlakyBackend::new(InMemoryBackend::new());
//!     backend.fail_writes(true);
//!     // ... exercise the local tier
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod flaky;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
    pub use chatsync_storage::{InMemoryBackend, KeyValueBackend};
}

pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
