//! Command implementations.

pub mod auth;

pub use auth::{handle_login, handle_logout, handle_migrate, handle_status, handle_token};

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::args::ShellType;
use crate::error::Result;

/// Handles the `keyward completions <shell>` command.
pub fn handle_completions(shell: ShellType) -> Result<()> {
    let mut cmd = crate::cli::Cli::command();
    let shell = match shell {
        ShellType::Bash => Shell::Bash,
        ShellType::Zsh => Shell::Zsh,
        ShellType::Fish => Shell::Fish,
    };

    generate(shell, &mut cmd, "keyward", &mut std::io::stdout());

    Ok(())
}
