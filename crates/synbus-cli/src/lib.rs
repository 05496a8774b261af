//! synbus CLI crate
//!
//! The binary (src/main.rs) wires up logging and argument parsing and calls
//! [`SynbusCli::execute`]. The command modules are exposed as a library so
//! tests can drive them without spawning a process.
//!
//! Commands (see [commands]):
//! - run: build `input channel -> projection -> population` for one synapse
//!   model, drive it with seeded random input and report a JSON summary.
//! - models: list the neuron, synapse and spike handler models.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::SynbusCli;
