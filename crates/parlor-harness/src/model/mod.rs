//! Reference model for model-based testing.
//!
//! The model is a simplified implementation that captures what the room
//! engine must do without how it does it. It serves as the oracle against
//! which the real `Room` is verified.
//!
//! # Design Principles
//!
//! - Simplicity: the model should be obviously correct
//! - Deterministic: same inputs produce same outputs

pub mod operation;
mod room;

pub use operation::{Operation, SmallSlot};
pub use room::{ModelRoom, ObservableState, Slot};
