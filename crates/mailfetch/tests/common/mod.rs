//! Shared test utilities for mailfetch integration tests.
//!
//! This module provides:
//! - `FakeMailServer`, an in-memory mailbox implementing `MailConnector`
//! - `CountingRenderer`, a PDF renderer that records how often it runs
//! - Builders for raw RFC 5322 messages and small PDFs
//! - `TestHarness` wiring all of the above into a `MailEngine`

pub mod builders;
pub mod fake_server;
pub mod harness;

pub use builders::*;
pub use fake_server::{FakeMailServer, ServerEvent};
pub use harness::{CountingRenderer, TestHarness};
