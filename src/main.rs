use clap::{Parser, Subcommand};
use mfg_relay::{ApiResult, Config, LogNavigator, RequestOptions, Session, ThrottledApi};
use mimalloc::MiMalloc;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "mfg-relay", version, about = "Throttled, caching client for the manufacturing backend")]
struct Cli {
    /// Configuration file (defaults to ./relay.toml when present).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Get {
        url: String,
        /// Skip the response cache.
        #[arg(long)]
        force: bool,
    },
    Post {
        url: String,
        /// JSON request body.
        #[arg(long, default_value = "{}")]
        body: String,
    },
    Patch {
        url: String,
        #[arg(long, default_value = "{}")]
        body: String,
    },
    Delete {
        url: String,
    },
    /// Exchange credentials for a token pair.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Keep the tokens in the token file instead of this process only.
        #[arg(long)]
        remember: bool,
    },
    /// Forget stored tokens.
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let figment = match &cli.config {
        Some(path) => Config::figment_from(path.clone()),
        None => Config::figment(),
    };
    let cfg: Config = figment.extract()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    info!(
        base_url = %cfg.client.base_url,
        proxy = %cfg.client.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        token_file = %cfg.client.token_file.display(),
        loglevel = %cfg.basic.loglevel,
    );

    let api = ThrottledApi::from_config(&cfg)?;
    let session = Session::new(api, Arc::new(LogNavigator));

    let result = tokio::select! {
        result = run(&session, cli.command) => result?,
        () = shutdown_signal() => {
            warn!("Interrupted; abandoning request.");
            return Ok(());
        }
    };

    if let Some(result) = result {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<Option<ApiResult>, Box<dyn std::error::Error>> {
    let options = RequestOptions::default();
    let outcome = match command {
        Command::Get { url, force } => session.get(&url, options, force).await,
        Command::Post { url, body } => session.post(&url, parse_body(&body)?, options, false).await,
        Command::Patch { url, body } => session.patch(&url, parse_body(&body)?, options, false).await,
        Command::Delete { url } => session.delete(&url, options, false).await,
        Command::Login {
            username,
            password,
            remember,
        } => {
            let credentials = json!({ "username": username, "password": password });
            return Ok(Some(session.login(&credentials, remember).await?));
        }
        Command::Logout => {
            session.logout();
            return Ok(None);
        }
    };
    Ok(Some(outcome?))
}

fn parse_body(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
