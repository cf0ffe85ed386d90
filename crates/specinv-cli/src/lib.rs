//! Command-line front-end for the specinv spectrum inversion engine.

pub mod cli;

pub use cli::{run, run_from_env, CliError};
