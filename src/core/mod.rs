//! Core building blocks shared by every flotilla operation
//!
//! - **config**: flotilla.toml parsing and defaults
//! - **context**: unified run context bundling config and gateways
//! - **error**: crate-wide error taxonomy with exit-code policy

pub mod config;
pub mod context;
pub mod error;
