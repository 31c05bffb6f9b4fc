//! Shared utilities for quizforge integration tests.
//!
//! - `TestHarness`: an isolated temp directory with storage, work area and
//!   database, wired into a real `JobTrigger`
//! - `ConfigBuilder`: configs whose extractors are inline shell scripts

pub mod builders;
pub mod harness;

pub use builders::*;
#[allow(unused_imports)]
pub use harness::{TestHarness, PDF_BYTES};
