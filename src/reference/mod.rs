//! Reference data for NUTS resolution
//!
//! Locates, loads and caches the three kinds of reference data the
//! resolution strategies rely on:
//!
//! - per-country postcode → NUTS-3 tables (semicolon-separated CSV)
//! - the LAU workbook mapping municipality names and codes to NUTS-3, one
//!   sheet per country
//! - NUTS-3 boundary polygons from a nested zip holding a shapefile
//!
//! File locations come from a [`ReferenceLocator`]; the download cache
//! itself is managed elsewhere.

pub mod boundaries;
pub mod locator;
pub mod store;
pub mod tables;

pub use boundaries::{extract_shapefile, load_boundaries, read_boundaries};
pub use locator::{CacheLayout, InMemoryOnly, ReferenceLocator};
pub use store::ReferenceStore;
pub use tables::{load_municipality_table, load_postcode_table};

#[cfg(test)]
mod tests;
