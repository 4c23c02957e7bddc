//! Page tree integration tests.
//!
//! These tests build indexes in memory, write them to page files and query
//! them back through the public API.

mod build_and_search_test;
mod corruption_test;
mod writable_index_test;
