//! Command line to configuration wiring
//!
//! Note: Uses serial_test because SPAN_CACHE_DIR is process-global.

use clap::Parser;
use serial_test::serial;
use span_common::config::{TomlConfig, CACHE_DIR_ENV_VAR};
use span_tagger::cli::{CommonArgs, HoldingsArgs};
use std::env;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    holdings: HoldingsArgs,
}

#[test]
#[serial]
fn test_cache_dir_flag_wins_over_env() {
    env::set_var(CACHE_DIR_ENV_VAR, "/tmp/span-env-cache");
    let args = Args::parse_from(["span-tagger", "--cache-dir", "/tmp/span-flag-cache"]);

    let cache = args.holdings.build_cache(&TomlConfig::default()).unwrap();
    assert_eq!(cache.root(), PathBuf::from("/tmp/span-flag-cache"));

    env::remove_var(CACHE_DIR_ENV_VAR);
}

#[test]
#[serial]
fn test_cache_dir_from_env() {
    env::set_var(CACHE_DIR_ENV_VAR, "/tmp/span-env-cache");
    let args = Args::parse_from(["span-tagger"]);

    let cache = args.holdings.build_cache(&TomlConfig::default()).unwrap();
    assert_eq!(cache.root(), PathBuf::from("/tmp/span-env-cache"));

    env::remove_var(CACHE_DIR_ENV_VAR);
}

#[test]
fn test_explicit_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("span.toml");
    std::fs::write(&path, "[pipeline]\nbatch_size = 7\n[logging]\nlevel = \"debug\"\n").unwrap();

    let args = Args::parse_from(["span-tagger", "--config", path.to_str().unwrap()]);
    let toml = args.common.load_config().unwrap();

    assert_eq!(toml.pipeline.batch_size, 7);
    assert_eq!(args.common.log_level(&toml), "debug");
}
