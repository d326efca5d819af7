//! autodev command-line library; `main.rs` only parses and dispatches.

pub mod commands;
pub mod error;
