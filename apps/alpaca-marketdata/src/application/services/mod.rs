//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Paginator`: Drives a collection endpoint page by page to completion

mod paginator;

pub use paginator::{
    NEXT_PAGE_TOKEN_FIELD, PageRequest, PaginationError, Paginator, decode_page,
};
