//! Command-line argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

/// Secure credential store and OAuth login for AI providers.
///
/// Keeps provider tokens in the OS keychain or an encrypted file and
/// refreshes OAuth tokens before they expire.
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage stored credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: ShellType,
    },
}

/// Supported shells for completions.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Log in to a provider.
    ///
    /// Qwen uses the OAuth device flow. Anthropic and OpenAI read a pasted
    /// token from stdin.
    Login {
        /// Provider to log in to.
        #[arg(short, long, value_enum)]
        provider: ProviderArg,

        /// Paste an Anthropic `setup-token` instead of an API key.
        #[arg(long)]
        setup_token: bool,

        /// Skip opening the browser automatically.
        #[arg(long)]
        no_browser: bool,
    },

    /// Remove stored credentials.
    ///
    /// Without --provider, removes every credential and the local encryption key.
    Logout {
        /// Provider to log out of.
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show stored credentials and the storage backend.
    Status,

    /// Print a live access token, refreshing it if needed.
    Token {
        /// Provider whose token to print.
        #[arg(short, long)]
        provider: String,
    },

    /// Move credentials from the plaintext file into secure storage.
    Migrate,
}

/// Provider argument for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Qwen,
    Anthropic,
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderArg {
    /// Storage key for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qwen => "qwen",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}
