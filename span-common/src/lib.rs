//! # span common library
//!
//! Shared code for the span labelling tools:
//! - Error taxonomy
//! - Bootstrap configuration loading
//! - Intermediate schema record subset and output encodings
//! - Partial dates and moving-wall offsets

pub mod config;
pub mod error;
pub mod record;
pub mod time;

pub use error::{Error, Result};
pub use record::{OutputFormat, Record};
