use brightpath_client::ClientConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod util;

use util::exit_error;

#[derive(Parser)]
#[command(name = "brightpath", version, about = "Brightpath CLI: resilient calls against the dashboard API")]
struct Cli {
    /// API base URL (overrides BRIGHTPATH_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health {
        /// Health endpoint
        #[arg(long, default_value = "/health")]
        path: String,
    },
    /// Send an API request; hinted writes are reconciled when their outcome is unclear
    Api(commands::api::ApiArgs),
    /// Upload files as multipart form data
    Upload(commands::upload::UploadArgs),
    /// Sign in and store the session
    Login(commands::auth::LoginArgs),
    /// Remove the stored session
    Logout,
    /// Show where the current session comes from
    Status,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "brightpath=info".into());
    let registry = tracing_subscriber::registry().with(filter);
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

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => exit_error(&e.to_string(), Some("Check the BRIGHTPATH_* environment variables")),
    };
    if let Some(api_url) = &cli.api_url {
        config = match config.with_api_url(api_url) {
            Ok(config) => config,
            Err(e) => exit_error(&e.to_string(), Some("Pass an absolute URL, e.g. https://api.brightpath.edu.vn")),
        };
    }

    tracing::debug!(api_url = %config.api_url, "Using API");

    let code = match cli.command {
        Commands::Health { path } => commands::health::run(&config, &path).await,
        Commands::Api(args) => commands::api::run(&config, args).await,
        Commands::Upload(args) => commands::upload::run(&config, args).await,
        Commands::Login(args) => commands::auth::login(&config, args).await,
        Commands::Logout => commands::auth::logout(),
        Commands::Status => commands::auth::status(),
    };

    std::process::exit(code);
}
