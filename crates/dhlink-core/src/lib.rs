//! dhlink Core Library
//!
//! Shared functionality for dhlink components:
//! - Configuration resolution and hierarchy
//! - Prime list loading
//! - Tracing setup
//! - Common error types

pub mod config;
pub mod error;
pub mod primes;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
