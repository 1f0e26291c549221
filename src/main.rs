use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use sidekick::cli::{Cli, Commands};
use sidekick::command;
use sidekick::config::{self, Config};
use sidekick::domain::PushOptions;
use sidekick::session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_dir = config::config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Some(Commands::Login { token, no_browser }) => {
            let store = SessionStore::new(&config_dir)?;
            command::run_login(&store, token, no_browser).await?;
        }
        Some(Commands::Logout) => {
            let store = SessionStore::new(&config_dir)?;
            command::run_logout(&store).await?;
        }
        Some(Commands::Status) => {
            let store = SessionStore::new(&config_dir)?;
            command::run_status(&store).await?;
        }
        Some(Commands::Push {
            remote,
            branch,
            force,
            repo,
        }) => {
            let config = Config::load(&config_dir)?;
            let store = SessionStore::new(&config_dir)?;
            let options = PushOptions {
                remote: remote.unwrap_or_else(|| config.default_remote.clone()),
                branch,
                force,
            };
            command::run_push(&config, &store, options, repo).await?;
        }
        Some(Commands::Apply {
            response,
            workspace_root,
            dry_run,
        }) => {
            let config = Config::load(&config_dir)?;
            command::run_apply(response, workspace_root, config.matcher, dry_run).await?;
        }
        Some(Commands::Validate { response }) => {
            command::run_validate(response).await?;
        }
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!("Use 'sidekick login' to store a GitHub token, then 'sidekick push'.");
        }
    }

    Ok(())
}
