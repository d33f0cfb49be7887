//! StandardsDaemon CLI entry point
//!
//! Exit codes: 0 clean shutdown, 2 configuration error, 3 graph-store
//! initialization error, 4 fatal initialization error.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use standardsd::cli::{Cli, Command};
use standardsd::config::Config;
use standardsd::daemon::{BuildError, Daemon};
use standardsd::middleware::Authenticator;

const EXIT_CONFIG: u8 = 2;
const EXIT_GRAPH_STORE: u8 = 3;
const EXIT_INIT: u8 = 4;

/// Diagnostics go to stderr by construction; stdout carries command output
/// only, so wrapping transports stay protocol-pure.
fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match dispatch(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn dispatch(command: Command, config: Config) -> Result<(), u8> {
    match command {
        Command::Run => {
            if let Err(e) = config.validate() {
                eprintln!("configuration error: {e:#}");
                return Err(EXIT_CONFIG);
            }
            let daemon = build_daemon(config).await?;
            info!("Daemon starting");
            daemon.run().await.map_err(|e| {
                eprintln!("daemon error: {e:#}");
                EXIT_INIT
            })
        }

        Command::Sync { force } => {
            let daemon = build_daemon(config).await?;
            match daemon.api().trigger_sync(force).await {
                Ok(stats) => {
                    println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("sync failed: {}", e.detail);
                    Err(EXIT_INIT)
                }
            }
        }

        Command::Status => {
            let daemon = build_daemon(config).await?;
            let status = daemon.api().sync_status().await;
            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
            Ok(())
        }

        Command::Research {
            topic,
            category,
            language,
            approve,
        } => {
            if let Err(e) = config.validate() {
                eprintln!("configuration error: {e:#}");
                return Err(EXIT_CONFIG);
            }
            let daemon = build_daemon(config).await?;

            let category = match category.as_deref().map(str::parse).transpose() {
                Ok(category) => category,
                Err(e) => {
                    eprintln!("invalid category: {e}");
                    return Err(EXIT_CONFIG);
                }
            };

            let request = standardsd::api::CreateStandardRequest {
                topic,
                category,
                language,
                auto_approve: approve,
            };
            match daemon.api().create_standard(request).await {
                Ok(standard) => {
                    println!("{}", standardsd::parser::render_markdown(&standard));
                    Ok(())
                }
                Err(e) => {
                    eprintln!("research failed: {}", e.detail);
                    Err(EXIT_INIT)
                }
            }
        }

        Command::Token { user_id, expires_hours } => {
            let authenticator = Authenticator::from_config(&config.auth);
            match authenticator.issue_token(&user_id, None, expires_hours) {
                Ok(token) => {
                    println!("{token}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("token issuance failed: {e}");
                    Err(EXIT_CONFIG)
                }
            }
        }
    }
}

async fn build_daemon(config: Config) -> Result<Daemon, u8> {
    Daemon::build(config).await.map_err(|e| {
        eprintln!("initialization error: {e}");
        match e {
            BuildError::GraphStore(_) => EXIT_GRAPH_STORE,
            BuildError::Llm(_) => EXIT_INIT,
        }
    })
}
