//! span-tagger library
//!
//! Attaches institution labels (ISIL) to bibliographic records, either from
//! an attachment rule database with holdings evaluation or from a
//! declarative filter configuration.
//!
//! # Modules
//! - `rules`: rule store access and the rule match cache
//! - `holdings`: KBART parsing, coverage evaluation, holdings cache
//! - `filter`: filter configuration, compiled predicates, index deduplication
//! - `labeler`: per-record label computation
//! - `pipeline`: concurrent batch processing

pub mod cli;
pub mod filter;
pub mod holdings;
pub mod labeler;
pub mod pipeline;
pub mod rules;
pub mod utils;

pub use labeler::{FilterLabeler, LabelFileLabeler, Labeler, RuleLabeler};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
