// ABOUTME: Library root for reimage - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod guest;
pub mod output;
pub mod runtime;
pub mod types;
pub mod upgrade;
