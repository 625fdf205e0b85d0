//! Command-line interface for the `realsym` binary

pub mod args;

pub use args::{Args, Command};
