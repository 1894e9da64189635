//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`packages`] - Package status, update checks, updates and loading
//! - [`output`] - Console output shared by the handlers

pub mod config;
pub mod output;
pub mod packages;
