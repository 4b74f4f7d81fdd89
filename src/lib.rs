// ABOUTME: Library root for tidewatch - exposes the checker and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod runner;
pub mod runtime;
pub mod types;
