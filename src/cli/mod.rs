//! Command line interface module
//!
//! Argument parsing, runtime configuration and the [`Runner`] that performs one
//! `pull` invocation.

pub mod args;
pub mod config;
pub mod runner;

pub use args::{Args, Command};
pub use config::AppConfig;
pub use runner::Runner;
