//! rowbook - export SQL query results to styled .xlsx workbooks.
//!
//! The pipeline is: normalize the query text, guarantee a deterministic
//! ordering when fetching in pages, count the result up front, then pull
//! bounded batches (streaming cursor or LIMIT/OFFSET pages) and append them
//! to a styled worksheet. Memory stays proportional to one batch, never to
//! the full result set.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod query;
