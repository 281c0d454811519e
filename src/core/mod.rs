// src/core/mod.rs

/// Color names and painting.
pub mod color;
/// Builder configuration and accessors.
pub mod command;
/// Execution modes and runnable closures.
pub mod execution;
/// The action logger capability and its implementations.
pub mod logger;
/// Ambient settings and the process-wide defaults.
pub mod settings;
