//! # Oracle Common Library
//!
//! Shared code for Oracle services including:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Event types (OracleEvent enum) and the broadcast EventBus
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
