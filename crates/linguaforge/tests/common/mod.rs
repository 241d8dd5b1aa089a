//! Shared test utilities for linguaforge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp app folder and store
//! - `RequestBuilder` for provisioning requests
//! - Fake converter scripts (Unix only)

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
