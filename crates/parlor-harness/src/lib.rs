//! Deterministic simulation harness for the Parlor room engine.
//!
//! Simulated implementations of the `Environment`, `Transport`,
//! `Persistence` and `Crypto` seams for deterministic, reproducible testing
//! under transport faults, clock skew and restarts.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and a real `Room`, and
//! their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod model;
pub mod persistence;
pub mod sim_env;
pub mod sim_transport;
pub mod test_crypto;

pub use model::{ModelRoom, ObservableState, Operation, SmallSlot};
pub use persistence::MemoryPersistence;
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use sim_transport::{Call, Delivered, Fault, ScriptedTransport};
pub use test_crypto::TestCrypto;
