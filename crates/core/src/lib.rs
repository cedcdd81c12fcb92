//! Pure domain layer for the F1 sculpture service.
//!
//! Nothing in this crate performs I/O. It defines the cache key model,
//! the task state machine and its checkpoint table, the artifact
//! builder, and the warming selection policy shared by every other
//! crate in the workspace.

pub mod artifact;
pub mod clock;
pub mod error;
pub mod key;
pub mod session;
pub mod task;
pub mod types;
pub mod warming;
