//! dhlink CLI Library
//!
//! Subcommand implementations behind the `dhlink` binary: a one-client
//! server, an interactive client and an in-process demo.

pub mod client;
pub mod demo;
pub mod server;
pub mod settings;
