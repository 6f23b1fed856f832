//! # trackvec Common Library
//!
//! Shared code for the trackvec services:
//! - Error and result types
//! - TOML configuration loading and root folder resolution
//! - SQLite pool initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
