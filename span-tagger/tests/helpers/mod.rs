//! Shared fixtures for span-tagger integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use span_common::{Error, Result};
use span_tagger::holdings::Fetch;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// One row of the `amsl` rule table
pub struct Rule<'a> {
    pub isil: &'a str,
    pub sid: &'a str,
    pub tcid: &'a str,
    pub mc: &'a str,
    pub hflink: &'a str,
    pub hfeval: &'a str,
    pub cflink: &'a str,
}

impl Default for Rule<'_> {
    fn default() -> Self {
        Self {
            isil: "DE-15",
            sid: "49",
            tcid: "",
            mc: "ColA",
            hflink: "",
            hfeval: "",
            cflink: "",
        }
    }
}

fn nullable(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Write a rule database into `dir` and return its path
pub async fn create_rule_db(dir: &Path, rules: &[Rule<'_>]) -> PathBuf {
    let db_path = dir.join("amsl.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await.unwrap();

    sqlx::query(
        "CREATE TABLE amsl (isil TEXT, sid TEXT, tcid TEXT, mc TEXT,
                            hflink TEXT, hfeval TEXT, cflink TEXT, cfelink TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();

    for rule in rules {
        sqlx::query(
            "INSERT INTO amsl (isil, sid, tcid, mc, hflink, hfeval, cflink) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.isil)
        .bind(rule.sid)
        .bind(nullable(rule.tcid))
        .bind(nullable(rule.mc))
        .bind(nullable(rule.hflink))
        .bind(nullable(rule.hfeval))
        .bind(nullable(rule.cflink))
        .execute(&pool)
        .await
        .unwrap();
    }

    pool.close().await;
    db_path
}

/// Write a headerless KBART file with one row per `(issn, first year, last year)`
pub fn write_kbart(dir: &Path, name: &str, rows: &[(&str, &str, &str)]) -> String {
    let path = dir.join(name);
    let body: String = rows
        .iter()
        .map(|(issn, from, to)| format!("Journal\t{}\t\t{}\t\t\t{}\n", issn, from, to))
        .collect();
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

/// Serves a fixed body and counts calls
pub struct CountingFetcher {
    body: Vec<u8>,
    calls: AtomicU32,
}

impl CountingFetcher {
    pub fn new(body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_vec(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for CountingFetcher {
    async fn fetch(&self, _link: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

/// Fails every download as if the host stayed unreachable
pub struct UnreachableFetcher;

#[async_trait]
impl Fetch for UnreachableFetcher {
    async fn fetch(&self, link: &str) -> Result<Vec<u8>> {
        Err(Error::FetchExhausted {
            link: link.to_string(),
            attempts: 5,
            last: "connection refused".to_string(),
        })
    }
}

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Output lines, sorted (pipeline output order is unspecified)
pub fn sorted_lines(out: &[u8]) -> Vec<String> {
    let mut lines: Vec<String> = String::from_utf8_lossy(out)
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}
