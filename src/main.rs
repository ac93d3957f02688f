//! ragchat - chat with your documents
//!
#![doc = "ragchat - chat with your documents"]
#![doc = "Main entry point for the ragchat CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragchat::cli::{Cli, Commands, DocumentCommand};
use ragchat::commands::{self, AppContext};
use ragchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Starting sign-in");
            commands::auth::login(&ctx, &email, password).await
        }
        Commands::Signup {
            email,
            name,
            password,
        } => {
            tracing::info!("Starting sign-up");
            commands::auth::signup(&ctx, &email, &name, password).await
        }
        Commands::GoogleLogin { code } => commands::auth::google_login(&ctx, code).await,
        Commands::Logout => commands::auth::logout(&ctx),
        Commands::Whoami => commands::auth::whoami(&ctx),
        Commands::Documents { command } => match command {
            DocumentCommand::List { json } => {
                commands::documents::list_documents(&ctx, json).await
            }
            DocumentCommand::Delete { id, yes } => {
                commands::documents::delete_document(&ctx, id, yes).await
            }
        },
        Commands::Upload { path } => commands::upload::run_upload(&ctx, &path).await,
        Commands::Ask {
            document_id,
            question,
        } => commands::chat::ask(&ctx, document_id, &question).await,
        Commands::Chat { document } => commands::chat::run_chat(&ctx, document).await,
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "ragchat=debug" } else { "ragchat=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
