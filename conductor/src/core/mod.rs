//! Deterministic, pure logic shared by the workflow core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod classifier;
pub mod constraints;
pub mod failure;
pub mod invariants;
pub mod lifecycle;
pub mod registry;
pub mod types;
