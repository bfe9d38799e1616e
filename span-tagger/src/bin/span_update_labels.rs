//! span-update-labels - apply a detached label file
//!
//! Replaces `x.labels` of every record listed in a label file
//! (`id<TAB>label,label,...`, as written by span-tagger). Records not in the
//! file pass through unchanged.
//!
//! ```text
//! span-update-labels -f labels.tsv < input.ldj > output.ldj
//! ```

use anyhow::Result;
use clap::Parser;
use span_common::OutputFormat;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use span_tagger::cli::{init_tracing, run_to_stdout, CommonArgs};
use span_tagger::LabelFileLabeler;

/// Command-line arguments for span-update-labels
#[derive(Parser, Debug)]
#[command(name = "span-update-labels")]
#[command(about = "Replace record labels from an id/labels file")]
#[command(version)]
struct Args {
    /// Label file, one `id<TAB>label,label,...` per line
    #[arg(short = 'f', long = "labels")]
    labels: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = args.common.load_config()?;
    init_tracing(&args.common.log_level(&toml));

    let labeler = LabelFileLabeler::from_path(&args.labels).await?;
    info!(records = labeler.len(), "Loaded label file {}", args.labels.display());

    let config = args.common.pipeline_config(&toml, OutputFormat::Json);
    let stats = run_to_stdout(Arc::new(labeler), &args.common, config).await?;
    info!(records = stats.records, "Updated labels");
    Ok(())
}
