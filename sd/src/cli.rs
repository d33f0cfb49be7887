//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Coding-standards knowledge daemon
#[derive(Debug, Parser)]
#[command(name = "sd", version, about = "Standards daemon: sync, research, and audit pipelines")]
pub struct Cli {
    /// Path to a configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon: scheduled sync plus the service surface
    Run,

    /// Synchronize the standards tree with the graph projection once
    Sync {
        /// Reimport every file regardless of change detection
        #[arg(long)]
        force: bool,
    },

    /// Show synchronization status
    Status,

    /// Research a new standard for a topic
    Research {
        /// Topic to research
        topic: String,

        /// Category token (security, performance, error-handling, ...)
        #[arg(long)]
        category: Option<String>,

        /// Language token; defaults to general
        #[arg(long)]
        language: Option<String>,

        /// Store the result in the graph projection
        #[arg(long)]
        approve: bool,
    },

    /// Issue a JWT for a user id
    Token {
        /// Subject user id
        user_id: String,

        /// Expiry in hours; defaults from configuration
        #[arg(long)]
        expires_hours: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_force() {
        let cli = Cli::try_parse_from(["sd", "sync", "--force"]).unwrap();
        assert!(matches!(cli.command, Command::Sync { force: true }));
    }

    #[test]
    fn test_parse_research_with_flags() {
        let cli = Cli::try_parse_from([
            "sd",
            "research",
            "error handling",
            "--category",
            "error-handling",
            "--language",
            "rust",
        ])
        .unwrap();
        match cli.command {
            Command::Research {
                topic,
                category,
                language,
                approve,
            } => {
                assert_eq!(topic, "error handling");
                assert_eq!(category.as_deref(), Some("error-handling"));
                assert_eq!(language.as_deref(), Some("rust"));
                assert!(!approve);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["sd", "--config", "/tmp/sd.yml", "status"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/sd.yml")));
    }
}
