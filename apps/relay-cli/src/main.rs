//! relayfile - parallel ranged downloads and the rename workflow from a terminal.

mod app;
mod config;
mod local;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relayfile_session::MediaKind;
use tracing_subscriber::EnvFilter;

use crate::app::{FetchArgs, RenameArgs};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "relayfile", version, about = "Parallel ranged file relay")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL with parallel range requests
    Fetch {
        /// Source URL
        url: String,
        /// Output path (defaults to the last URL segment)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum ranges in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Range size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
    },
    /// Rename a local file through the full workflow and publish it to a directory
    Rename {
        /// File to rename
        input: PathBuf,
        /// New file name
        #[arg(short, long)]
        name: String,
        /// Output kind: document, video or audio
        #[arg(short, long, default_value = "document")]
        kind: MediaKind,
        /// Directory the renamed file is published to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Caption template ({filename}, {filesize}, {duration})
        #[arg(long)]
        caption: Option<String>,
        /// Image used as the thumbnail
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting relayfile");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Commands::Fetch {
                url,
                output,
                concurrency,
                chunk_size,
            } => {
                app::run_fetch(
                    FetchArgs {
                        url,
                        output,
                        concurrency,
                        chunk_size,
                    },
                    &config.workflow,
                )
                .await
            }
            Commands::Rename {
                input,
                name,
                kind,
                out_dir,
                caption,
                thumbnail,
            } => {
                app::run_rename(
                    RenameArgs {
                        input,
                        name,
                        kind,
                        out_dir,
                        caption,
                        thumbnail,
                    },
                    config.workflow,
                )
                .await
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rename() {
        let cli = Cli::parse_from([
            "relayfile", "rename", "in.mp4", "--name", "out", "--kind", "video",
        ]);
        match cli.command {
            Commands::Rename { kind, out_dir, .. } => {
                assert_eq!(kind, MediaKind::Video);
                assert_eq!(out_dir, PathBuf::from("."));
            }
            _ => panic!("expected rename"),
        }
    }

    #[test]
    fn parses_fetch_with_global_config() {
        let cli = Cli::parse_from([
            "relayfile", "fetch", "https://example.com/a.bin", "--concurrency", "4", "-c", "x.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Fetch { concurrency: Some(4), .. }));
    }
}
