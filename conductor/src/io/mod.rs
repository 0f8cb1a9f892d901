//! Side-effecting adapters: filesystem, child processes, and the external
//! collaborators the mode controllers call.

pub mod artifacts;
pub mod autofix;
pub mod config;
pub mod generator;
pub mod paths;
pub mod process;
pub mod report;
pub mod specs;
pub mod state_store;
pub mod validation;
