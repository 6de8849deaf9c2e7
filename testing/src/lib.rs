//! Shared test support for the olive workspace.
//!
//! - A Redis testcontainer, lazily started once per test process and
//!   skipped when Docker is unavailable
//! - Instrumented port doubles (`CountingStore`, `RecordingCache`,
//!   `FailingCache`) for engine tests

mod doubles;
mod fixtures;

pub use doubles::*;
pub use fixtures::*;
