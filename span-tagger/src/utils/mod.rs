//! Utility modules for span-tagger

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
