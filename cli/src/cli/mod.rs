//! CLI module for keyward.

pub mod args;
pub mod commands;

pub use args::{AuthCommands, Cli, Commands, ProviderArg, ShellType};
