//! # Common Components
//!
//! Shared data structures used by the core client and the command-line front end.
//!
//! ## Modules
//!
//! - [`messages`]: Inputs, validated requests and outcomes
//! - [`error`]: Validation, transport and delivery error types
//! - [`config`]: Configuration structures and TOML loading

pub mod messages;
pub mod error;
pub mod config;
