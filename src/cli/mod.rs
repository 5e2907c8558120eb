//! CLI module for the Stratus provisioning tool.
//!
//! This module provides the command-line interface for planning and
//! applying resource stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
