//! Query preparation for exports.
//!
//! Before a query is counted or fetched it passes through normalization
//! (terminator and limit-clause stripping) and, in paged mode, the ordering
//! guard that makes repeated offset windows return a stable partition.

mod count;
mod normalize;
mod ordering;

pub use count::count_rows;
pub use normalize::normalize;
pub use ordering::{ensure_ordered, OrderedQuery};
