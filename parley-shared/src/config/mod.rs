//! # Configuration
//!
//! Layered server configuration: profile defaults, an optional config file,
//! `PARLEY_*` environment variables, then command-line overrides.

pub mod server;
