//! Bootstrap helpers for the bilistream CLI
//!
//! This module handles:
//! - Configuration loading
//! - Building the Bilibili backend and session context from configuration

pub mod backend;
pub mod config;

pub use backend::{build_backend, open_session};
pub use config::load_config;
