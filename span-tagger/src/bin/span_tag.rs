//! span-tag - filter based label attachment
//!
//! Applies a filter configuration (institution to predicates) to every
//! record. With `--server`, labels already served by a preferred copy in the
//! search index are dropped.
//!
//! ```text
//! span-tag -c '{"DE-15": [{"any": {}}]}' < input.ldj > output.ldj
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use span_common::time::today;
use span_common::OutputFormat;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use span_tagger::cli::{init_tracing, run_to_stdout, CommonArgs, HoldingsArgs};
use span_tagger::filter::{Deduplicator, FilterConfig, SolrIndex, SourcePreferences, Tagger};
use span_tagger::FilterLabeler;

/// Command-line arguments for span-tag
#[derive(Parser, Debug)]
#[command(name = "span-tag")]
#[command(about = "Attach institution labels from a filter configuration")]
#[command(version)]
struct Args {
    /// Filter configuration, inline JSON or path to a JSON file
    #[arg(short = 'c', long = "filters")]
    filters: Option<String>,

    /// Print the filter configuration as understood, then exit
    #[arg(long)]
    dump_config: bool,

    /// Search index to deduplicate against, e.g. localhost:8983/solr/biblio
    #[arg(long)]
    server: Option<String>,

    /// Source IDs for deduplication, most preferred first
    #[arg(long)]
    prefs: Option<String>,

    /// Ignore index documents with the record's own ID when deduplicating
    #[arg(long = "isi")]
    ignore_same_identifier: bool,

    #[command(flatten)]
    holdings: HoldingsArgs,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = args.common.load_config()?;
    init_tracing(&args.common.log_level(&toml));

    let Some(filters) = args.filters.as_deref() else {
        bail!("a filter configuration is required (-c)");
    };
    let filter_config = FilterConfig::load(filters)?;

    if args.dump_config {
        println!("{}", filter_config.to_json_pretty()?);
        return Ok(());
    }

    info!("Starting span-tag {}", env!("CARGO_PKG_VERSION"));

    let holdings = args.holdings.build_cache(&toml)?;
    let tagger = Tagger::compile(filter_config, &holdings).await?;

    let dedup = match args.server.as_deref().or(toml.dedup.server.as_deref()) {
        Some(server) => {
            let index = SolrIndex::new(server, Duration::from_secs(toml.holdings.timeout_secs))?;
            info!(server = index.server(), "Deduplicating against index");
            let prefs = args.prefs.as_deref().unwrap_or(&toml.dedup.preferences);
            Some(Deduplicator::new(
                Arc::new(index),
                SourcePreferences::parse(prefs),
                args.ignore_same_identifier || toml.dedup.ignore_same_identifier,
            ))
        }
        None => None,
    };

    let config = args.common.pipeline_config(&toml, OutputFormat::Json);
    let labeler = FilterLabeler::new(tagger, dedup, today());

    let stats = run_to_stdout(Arc::new(labeler), &args.common, config).await?;
    info!(
        records = stats.records,
        labelled = stats.labelled,
        "Tagged {} records in {:.1}s",
        stats.records,
        stats.elapsed.as_secs_f64()
    );
    Ok(())
}
