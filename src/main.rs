//! feed-dl - read a feed, download every item, print the continuation cursor

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use feed_dl::{Config, Cursor, Event, FeedKind, PipelineRunner};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feed-dl")]
#[command(author, version, about = "Get items from a feed and download their content")]
struct Cli {
    /// Your API key
    #[arg(long, env = "FEED_DL_APIKEY", hide_env_values = true)]
    apikey: Option<String>,

    /// Cursor indicating where to start
    #[arg(long)]
    cursor: Option<Cursor>,

    /// Path to output dir
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of workers
    #[arg(long, alias = "num_workers")]
    num_workers: Option<usize>,

    /// Queue capacity (defaults to the number of workers)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Feed API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Feed to read (files, urls, domains, ip_addresses, file-behaviours)
    #[arg(long)]
    kind: Option<FeedKind>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop at the newest page instead of polling for new items
    #[arg(long)]
    no_follow: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(apikey) = self.apikey {
            config.api_key = apikey;
        }
        if let Some(cursor) = self.cursor {
            config.feed.cursor = Some(cursor);
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(num_workers) = self.num_workers {
            config.num_workers = num_workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = Some(capacity);
        }
        if let Some(base_url) = self.base_url {
            config.feed.base_url = base_url;
        }
        if let Some(kind) = self.kind {
            config.feed.kind = kind;
        }
        if self.no_follow {
            config.feed.follow = false;
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for item identifiers and the final cursor
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.into_config()?;
    let runner = PipelineRunner::with_http(config).context("invalid configuration")?;

    let mut events = runner.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::ItemCompleted { id, .. }) => println!("{id}"),
                Ok(Event::ItemFailed { id, error }) => eprintln!("{id}: {error}"),
                Ok(Event::Stopped { .. }) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer fell behind");
                }
            }
        }
    });

    let summary = runner.run_with_signals().await?;
    let _ = printer.await;

    if let Some(error) = &summary.feed_error {
        tracing::error!(error = %error, "feed stopped early");
    }

    match summary.cursor {
        Some(cursor) => println!("\ncontinuation cursor: {cursor}"),
        None => println!("\ncontinuation cursor: none"),
    }
    Ok(())
}
