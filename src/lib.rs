// ABOUTME: Library root for haul - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod output;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod ssh;
pub mod transfer;
pub mod tunnel;
pub mod types;
