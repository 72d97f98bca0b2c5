//! Cursor Pagination Domain
//!
//! Pure types for cursor-based pagination: the opaque cursor, the limit
//! policy, decoded pages, and the multi-key accumulator that folds pages
//! into one result.

mod cursor;
mod limits;
mod merge;

pub use cursor::Cursor;
pub use limits::{
    LimitConfig, LimitError, Limits, NEWS_MAX_LIMIT, V2_MAX_LIMIT, effective_page_size,
};
pub use merge::{Accumulated, Accumulator, Page};
