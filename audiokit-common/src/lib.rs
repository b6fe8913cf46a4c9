//! # audiokit common library
//!
//! Shared code for the audiokit service:
//! - Common error type
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Time and UUID helpers

pub mod config;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
