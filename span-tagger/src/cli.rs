//! Command line plumbing shared by the binaries
//!
//! Flags override the TOML configuration, which overrides compiled
//! defaults.

use clap::Args;
use span_common::config::{CacheDirResolver, TomlConfig};
use span_common::{OutputFormat, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::holdings::{HoldingsCache, HttpFetcher, RefreshPolicy};
use crate::labeler::Labeler;
use crate::pipeline::{default_workers, open_inputs, Pipeline, PipelineConfig, PipelineStats};
use crate::utils::RetryPolicy;

/// Flags every binary accepts
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Newline-delimited JSON inputs, read in order (standard input if none)
    pub inputs: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Records per batch
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Output format: json or tsv
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, env = "SPAN_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<TomlConfig> {
        TomlConfig::load(self.config.as_deref())
    }

    pub fn log_level(&self, toml: &TomlConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| toml.logging.level.clone())
    }

    pub fn pipeline_config(&self, toml: &TomlConfig, default_format: OutputFormat) -> PipelineConfig {
        PipelineConfig {
            workers: self
                .workers
                .or(toml.pipeline.workers)
                .unwrap_or_else(default_workers),
            batch_size: self.batch_size.unwrap_or(toml.pipeline.batch_size),
            format: self.format.unwrap_or(default_format),
        }
    }
}

/// Flags of binaries that evaluate holdings files
#[derive(Args, Debug, Clone)]
pub struct HoldingsArgs {
    /// Holdings cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Re-download every holdings file on first use
    #[arg(short = 'f', long)]
    pub force: bool,
}

impl HoldingsArgs {
    pub fn build_cache(&self, toml: &TomlConfig) -> Result<Arc<HoldingsCache>> {
        let root = CacheDirResolver::new(self.cache_dir.as_deref(), toml).resolve();
        let fetcher = HttpFetcher::new(
            Duration::from_secs(toml.holdings.timeout_secs),
            RetryPolicy::from_config(&toml.holdings),
        )?;
        tracing::info!(cache_dir = %root.display(), force = self.force, "Holdings cache");

        let cache = HoldingsCache::new(root, Arc::new(fetcher)).with_refresh(
            RefreshPolicy::from_days(self.force, toml.holdings.max_age_days),
        );
        Ok(Arc::new(cache))
    }
}

/// Initialize logging to stderr; stdout carries records.
pub fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run the pipeline over the inputs named in `common`, writing to stdout.
pub async fn run_to_stdout(
    labeler: Arc<dyn Labeler>,
    common: &CommonArgs,
    config: PipelineConfig,
) -> Result<PipelineStats> {
    let inputs = open_inputs(&common.inputs).await?;
    Pipeline::new(labeler, config)
        .run(inputs, tokio::io::stdout())
        .await
}
