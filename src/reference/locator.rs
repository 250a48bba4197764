//! Reference file locations
//!
//! The download/cache collaborator decides where files live; the loaders
//! only ask a [`ReferenceLocator`] for paths. [`CacheLayout`] implements the
//! directory convention of the download cache.

use crate::config::ReferenceLayout;
use crate::constants::postcode_pattern_for;
use crate::error::{NutsError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supplies the paths of reference files
pub trait ReferenceLocator: Send + Sync + fmt::Debug {
    /// Postcode → NUTS-3 table for a country
    fn postcode_table(&self, country: &str) -> Result<PathBuf>;

    /// LAU → NUTS-3 workbook covering all countries
    fn municipality_workbook(&self) -> Result<PathBuf>;

    /// Zipped NUTS-3 boundary archive
    fn boundary_archive(&self) -> Result<PathBuf>;
}

/// Locator backed by the download cache directory
#[derive(Debug, Clone)]
pub struct CacheLayout {
    layout: ReferenceLayout,
}

impl CacheLayout {
    pub fn new(layout: ReferenceLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ReferenceLayout {
        &self.layout
    }
}

impl ReferenceLocator for CacheLayout {
    fn postcode_table(&self, country: &str) -> Result<PathBuf> {
        let dir = self.layout.postcode_dir_path();
        let file_pattern = postcode_pattern_for(&self.layout.postcode_pattern, country);
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            file_pattern
        );

        let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| {
                NutsError::configuration(format!("Invalid postcode file pattern '{}': {}", pattern, e))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();

        // Several releases may sit side by side; the last in name order is the newest
        candidates.sort();
        debug!(
            "Found {} postcode table candidates for {} in {}",
            candidates.len(),
            country,
            dir.display()
        );

        candidates.pop().ok_or_else(|| {
            NutsError::configuration(format!(
                "No postcode table for country {} matching '{}' in {}",
                country,
                file_pattern,
                dir.display()
            ))
        })
    }

    fn municipality_workbook(&self) -> Result<PathBuf> {
        existing_file(self.layout.lau_workbook_path(), "LAU workbook")
    }

    fn boundary_archive(&self) -> Result<PathBuf> {
        existing_file(self.layout.boundary_archive_path(), "NUTS boundary archive")
    }
}

/// Locator for stores that are seeded entirely in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryOnly;

impl ReferenceLocator for InMemoryOnly {
    fn postcode_table(&self, country: &str) -> Result<PathBuf> {
        Err(NutsError::configuration(format!(
            "No postcode table loaded for country {}",
            country
        )))
    }

    fn municipality_workbook(&self) -> Result<PathBuf> {
        Err(NutsError::configuration("No LAU workbook configured"))
    }

    fn boundary_archive(&self) -> Result<PathBuf> {
        Err(NutsError::configuration("No NUTS boundary archive configured"))
    }
}

fn existing_file(path: PathBuf, what: &str) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(missing(&path, what))
    }
}

fn missing(path: &Path, what: &str) -> NutsError {
    NutsError::configuration(format!("{} not found at {}", what, path.display()))
}
