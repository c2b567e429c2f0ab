//! End-to-end test support for the engram memory engine
//!
//! Provides isolated stores on temporary databases and deterministic
//! provider mocks so full capture/retrieval/consolidation journeys run
//! without network access.

pub mod harness;
pub mod mocks;

pub use harness::TestStore;
pub use mocks::{MockEmbeddings, MockLlm};
