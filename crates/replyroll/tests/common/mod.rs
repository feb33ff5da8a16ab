//! Shared test utilities for replyroll integration tests.
//!
//! This module provides:
//! - `TestHarness`: an engine over an in-memory database with fake transports
//! - builders for raw reply messages and spreadsheet attachments

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
