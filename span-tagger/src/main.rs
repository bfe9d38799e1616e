//! span-tagger - rule based label attachment
//!
//! Reads intermediate schema records, looks up the attachment rules for each
//! record's source and collections in a read-only SQLite rule database, and
//! evaluates holdings files where a rule asks for it. Emits
//! `id<TAB>labels` by default, or full records with `--format json`.
//!
//! ```text
//! span-tagger --db amsl.db < input.ldj > labels.tsv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use span_common::time::today;
use span_common::OutputFormat;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use span_tagger::cli::{init_tracing, run_to_stdout, CommonArgs, HoldingsArgs};
use span_tagger::rules::{RuleMatcher, SqliteRuleStore};
use span_tagger::RuleLabeler;

/// Command-line arguments for span-tagger
#[derive(Parser, Debug)]
#[command(name = "span-tagger")]
#[command(about = "Attach institution labels from an attachment rule database")]
#[command(version)]
struct Args {
    /// SQLite rule database (table amsl)
    #[arg(long)]
    db: PathBuf,

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

    info!("Starting span-tagger {}", env!("CARGO_PKG_VERSION"));

    let config = args.common.pipeline_config(&toml, OutputFormat::Tsv);
    let holdings = args.holdings.build_cache(&toml)?;

    // One read-only handle per worker
    let store = SqliteRuleStore::open(&args.db, config.workers as u32)
        .await
        .with_context(|| format!("Failed to open rule database {}", args.db.display()))?;
    let matcher = RuleMatcher::new(Arc::new(store));
    let labeler = RuleLabeler::new(matcher, holdings, today());

    let stats = run_to_stdout(Arc::new(labeler), &args.common, config).await?;
    info!(
        records = stats.records,
        labelled = stats.labelled,
        "Labelled {} records in {:.1}s",
        stats.records,
        stats.elapsed.as_secs_f64()
    );
    Ok(())
}
