//! # walkv testkit
//!
//! Test utilities for walkv.
//!
//! This crate provides:
//! - A crash harness that drops the manager and every unpersisted storage
//!   write, then recovers over the surviving log
//! - A log device wrapper that fails appends at a chosen point
//! - Property-based test generators using proptest
//! - Fixtures for temporary file logs and prepared in-memory logs
//!
//! ## Usage
//!
//! ```rust
//! use walkv_testkit::prelude::*;
//! use walkv_core::Key;
//!
//! let mut harness = CrashHarness::new();
//! harness.commit(&[(Key::new(7), b"x".to_vec())]).unwrap();
//! harness.crash_and_recover().unwrap();
//! assert_eq!(harness.read(Key::new(7)), Some(b"x".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
