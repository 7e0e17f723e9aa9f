//! Interaction modes and the engine that drives them
//!
//! The engine owns the only [`ModeWriter`]; the IPC server and anything
//! else that needs the current mode holds a [`ModeReader`].

pub mod intent;
mod machine;
mod mode;

pub use machine::InteractionEngine;
pub use mode::{mode_channel, ModeKind, ModeReader};
#[cfg(test)]
pub use mode::{Mode, ModeWriter};
