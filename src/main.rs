//! CLI for authrelay
//!
//! Subcommands:
//! - `serve`: run the broker, worker, reply router and HTTP ingress
//! - `mock-idp`: run a stub identity provider for the remote validator

use authrelay::auth::idp_stub::{self, StubIdentityProvider};
use authrelay::config::load_config_from;
use authrelay::relay::Relay;
use authrelay::utils::error::RelayError;
use authrelay::utils::logging;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "authrelay", version, about)]
enum Command {
    /// Run the relay: broker, worker and HTTP ingress in one process
    Serve {
        /// Configuration file (defaults to config/default.* when present)
        #[arg(long)]
        config: Option<String>,
    },
    /// Run a stub identity provider
    MockIdp {
        #[arg(long, default_value = "127.0.0.1:8081")]
        addr: String,
        #[arg(long, default_value = "your_account")]
        account: String,
        #[arg(long, default_value = "your_password")]
        password: String,
        #[arg(long, default_value = "generate_a_token_for_user")]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let result = match Command::parse() {
        Command::Serve { config } => run_server(config.as_deref()).await,
        Command::MockIdp {
            addr,
            account,
            password,
            token,
        } => {
            logging::init("info");
            let stub = StubIdentityProvider {
                account,
                password,
                token,
            };
            run_mock_idp(&addr, stub).await
        }
    };

    if let Err(e) = result {
        logging::init("info");
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run_server(config_path: Option<&str>) -> Result<(), RelayError> {
    let settings = load_config_from(config_path)?;
    logging::init(&settings.logging.level);

    let relay = Relay::start(&settings).await?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Starting HTTP server on {addr}");

    axum::serve(listener, relay.ingress())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received. Exiting gracefully.");
        })
        .await?;

    relay.shutdown().await;
    Ok(())
}

async fn run_mock_idp(addr: &str, stub: StubIdentityProvider) -> Result<(), RelayError> {
    let listener = TcpListener::bind(addr).await?;
    tokio::select! {
        res = idp_stub::serve(listener, stub) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received. Exiting gracefully."),
    }
    Ok(())
}
