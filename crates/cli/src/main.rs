//! Host health CLI
//!
//! A command-line tool for sampling the local host, pushing a sample to
//! the analyzer and browsing stored analysis records.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{records, sample};

/// Host health CLI
#[derive(Parser)]
#[command(name = "hh")]
#[command(author, version, about = "CLI for the host health analyzer", long_about = None)]
pub struct Cli {
    /// Analyzer base URL (can also be set via HH_ANALYZER_URL env var)
    #[arg(long, env = "HH_ANALYZER_URL")]
    pub analyzer_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the local host once and print it
    Collect {
        /// Filesystem to report disk capacity for
        #[arg(long)]
        mount: Option<String>,
    },

    /// Sample once and send it to the analyzer
    Push {
        /// Filesystem to report disk capacity for
        #[arg(long)]
        mount: Option<String>,

        /// Retries after the first failed attempt
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// List stored analysis records, newest first
    Records {
        /// Filter by predicted class (0-3)
        #[arg(long)]
        class: Option<u32>,

        /// Only records with an id below this one
        #[arg(long)]
        before_id: Option<i64>,

        /// Maximum number of records
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show one stored record
    Record {
        /// Record ID
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;
    let analyzer_url = config.analyzer_url(cli.analyzer_url);

    match cli.command {
        Commands::Collect { mount } => {
            sample::collect(&config.mount_point(mount), cli.format).await?;
        }
        Commands::Push { mount, max_retries } => {
            sample::push(
                &analyzer_url,
                &config.mount_point(mount),
                max_retries.or(config.max_retries),
                cli.format,
            )
            .await?;
        }
        Commands::Records {
            class,
            before_id,
            limit,
        } => {
            let client = client::ApiClient::new(&analyzer_url)?;
            let query = client::RecordQuery {
                predicted_class: class,
                before_id,
                limit,
            };
            records::list(&client, query, cli.format).await?;
        }
        Commands::Record { id } => {
            let client = client::ApiClient::new(&analyzer_url)?;
            records::show(&client, id, cli.format).await?;
        }
    }

    Ok(())
}
