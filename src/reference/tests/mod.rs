//! Tests for reference data location, loading and caching

pub mod loader_tests;
