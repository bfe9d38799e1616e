//! Batch labelling pipeline
//!
//! ```text
//! reader ──batches──▶ workers (N) ──encoded chunks──▶ writer
//! ```
//!
//! The reader splits the inputs into batches of raw lines. Each worker pulls
//! a batch, decodes and labels every record and encodes the result. The
//! writer, running on the calling task, drains encoded chunks into the sink.
//! Both queues are bounded, so a slow sink throttles the workers and the
//! workers throttle the reader. Output order is not input order.
//!
//! The first fatal error stops the run: remaining workers are aborted and
//! the error is returned. A failing sink takes precedence over worker
//! errors it may have caused.

use span_common::{Error, OutputFormat, Record, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::labeler::Labeler;

/// Log progress every this many records
const PROGRESS_INTERVAL: u64 = 100_000;

/// A line-oriented record source
pub type Input = Box<dyn AsyncBufRead + Send + Unpin>;

/// Batch of `(line number, raw line)` pairs
type Batch = Vec<(u64, String)>;

/// Encoded output of one batch
struct Chunk {
    bytes: Vec<u8>,
    records: u64,
    labelled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub format: OutputFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: 20_000,
            format: OutputFormat::Json,
        }
    }
}

/// Available parallelism, falling back to 4
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Totals of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub records: u64,
    /// Records with at least one label
    pub labelled: u64,
    pub elapsed: Duration,
}

/// Open input files in order; no paths (or `-`) means standard input.
pub async fn open_inputs(paths: &[PathBuf]) -> Result<Vec<Input>> {
    if paths.is_empty() {
        return Ok(vec![Box::new(BufReader::new(tokio::io::stdin()))]);
    }

    let mut inputs: Vec<Input> = Vec::with_capacity(paths.len());
    for path in paths {
        if path.as_os_str() == "-" {
            inputs.push(Box::new(BufReader::new(tokio::io::stdin())));
            continue;
        }
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::Config(format!("open {}: {}", path.display(), e)))?;
        inputs.push(Box::new(BufReader::new(file)));
    }
    Ok(inputs)
}

pub struct Pipeline {
    labeler: Arc<dyn Labeler>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(labeler: Arc<dyn Labeler>, config: PipelineConfig) -> Self {
        Self { labeler, config }
    }

    /// Label every record of `inputs` (read one after the other) into `sink`.
    pub async fn run<W>(&self, inputs: Vec<Input>, sink: W) -> Result<PipelineStats>
    where
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let workers = self.config.workers.max(1);
        let batch_size = self.config.batch_size.max(1);

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(workers * 2);
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Chunk>(workers * 2);
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let reader = tokio::spawn(read_batches(inputs, batch_size, batch_tx));

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            tasks.spawn(work(
                id,
                self.labeler.clone(),
                self.config.format,
                batch_rx.clone(),
                chunk_tx.clone(),
            ));
        }
        drop(chunk_tx);
        drop(batch_rx);

        debug!(workers, batch_size, format = %self.config.format, "Pipeline started");

        let mut out = BufWriter::new(sink);
        let mut stats = PipelineStats::default();
        let mut next_report = PROGRESS_INTERVAL;

        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    if let Err(e) = out.write_all(&chunk.bytes).await {
                        tasks.abort_all();
                        reader.abort();
                        return Err(e.into());
                    }
                    stats.records += chunk.records;
                    stats.labelled += chunk.labelled;

                    if stats.records >= next_report {
                        let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
                        let rate = (stats.records as f64 / secs).round() as u64;
                        info!(records = stats.records, rate, "Progress (records/s)");
                        next_report = (stats.records / PROGRESS_INTERVAL + 1) * PROGRESS_INTERVAL;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = worker_outcome(joined) {
                        tasks.abort_all();
                        reader.abort();
                        let _ = out.flush().await;
                        return Err(e);
                    }
                }
            }
        }

        // All chunk senders are gone, so every worker has finished
        while let Some(joined) = tasks.join_next().await {
            worker_outcome(joined)?;
        }

        reader
            .await
            .map_err(|e| Error::Internal(format!("reader task failed: {}", e)))??;

        out.flush().await?;

        stats.elapsed = started.elapsed();
        info!(
            records = stats.records,
            labelled = stats.labelled,
            elapsed_ms = stats.elapsed.as_millis(),
            "Pipeline finished"
        );
        Ok(stats)
    }
}

fn worker_outcome(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(Error::Internal(format!("worker task failed: {}", e))),
    }
}

async fn read_batches(inputs: Vec<Input>, batch_size: usize, tx: mpsc::Sender<Batch>) -> Result<()> {
    let mut line_number = 0u64;
    let mut batch = Vec::with_capacity(batch_size);

    for input in inputs {
        // Each input is read line by line, so a missing final newline never
        // joins records of adjacent files
        let mut lines = input.lines();
        loop {
            let next = lines.next_line().await.map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => Error::Input {
                    line: line_number + 1,
                    message: e.to_string(),
                },
                _ => Error::Io(e),
            })?;
            let Some(line) = next else {
                break;
            };
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            batch.push((line_number, line));
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if tx.send(full).await.is_err() {
                    // Workers are gone; the run is already failing
                    return Ok(());
                }
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(batch).await;
    }
    Ok(())
}

async fn work(
    id: usize,
    labeler: Arc<dyn Labeler>,
    format: OutputFormat,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
    chunks: mpsc::Sender<Chunk>,
) -> Result<()> {
    loop {
        let batch = { batches.lock().await.recv().await };
        let Some(batch) = batch else {
            debug!(worker = id, "Input exhausted");
            return Ok(());
        };

        let mut chunk = Chunk {
            bytes: Vec::with_capacity(batch.len() * 256),
            records: 0,
            labelled: 0,
        };

        for (line, raw) in batch {
            let mut record: Record = serde_json::from_str(&raw).map_err(|e| Error::Input {
                line,
                message: e.to_string(),
            })?;

            labeler
                .label(&mut record)
                .await
                .map_err(|e| e.for_record(record.display_id()))?;

            chunk.records += 1;
            if !record.labels.is_empty() {
                chunk.labelled += 1;
            }
            format.encode(&record, &mut chunk.bytes)?;
        }

        if chunks.send(chunk).await.is_err() {
            // Writer is gone
            return Ok(());
        }
    }
}
