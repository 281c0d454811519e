//! # System Interaction Layer
//!
//! This module is the boundary between the command builder and the operating system.
//!
//! ## Modules
//!
//! - **`context`**: Cancellation tokens and deadlines that a running process honors.
//! - **`executor`**: Spawns processes through `std::process`, pumps their stdio, and
//!   supervises them with a cancellable wait loop. Owns the crate's error type.
//! - **`stdio`**: The stdin/stdout/stderr bindings a command can be configured with.

pub mod context;
pub mod executor;
pub mod stdio;
