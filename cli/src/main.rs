//! keyward - credential security for assistant CLIs and daemons.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keyward::cli::{self, AuthCommands, Cli, Commands};
use keyward::config::{load_config, settings::env, StorePaths};
use keyward::error::Result;
use keyward::store::{init_secure_store, MasterKey};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(env::LOG_LEVEL).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Completions { shell } => return cli::commands::handle_completions(shell),
        Commands::Auth { command } => command,
    };

    let config = load_config()?;
    let store = init_secure_store(
        config.security.clone(),
        StorePaths::from_env()?,
        MasterKey::from_env(),
    )?;

    match command {
        AuthCommands::Login {
            provider,
            setup_token,
            no_browser,
        } => cli::commands::handle_login(&store, &config, provider, setup_token, no_browser).await,
        AuthCommands::Logout { provider } => cli::commands::handle_logout(&store, provider),
        AuthCommands::Status => cli::commands::handle_status(&store),
        AuthCommands::Token { provider } => {
            cli::commands::handle_token(store, &config, provider).await
        },
        AuthCommands::Migrate => cli::commands::handle_migrate(&store),
    }
}
