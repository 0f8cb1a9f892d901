//! Single-role workflow orchestration for behavior-driven development.
//!
//! One mode (role) is active at a time, and each mode may only touch its own
//! artifact classes. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (lifecycle, role/artifact matrix,
//!   classification, registry). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (state store, process execution,
//!   collaborator adapters). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`dispatch`], [`modes`], [`retry`]) coordinate core
//! logic with I/O to implement the CLI.

pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod modes;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
