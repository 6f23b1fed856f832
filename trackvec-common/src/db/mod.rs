//! Database bootstrap

pub mod init;

pub use init::*;
