//! Error handling for NUTS resolution.
//!
//! Configuration problems and missing boundary data are fatal for a
//! resolution call. Records that no strategy can place are not errors; they
//! simply keep a null region code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NutsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No NUTS boundary data loaded for country: {country}")]
    NoRegionData { country: String },

    #[error("Invalid reference data in {path}: {reason}")]
    ReferenceData { path: PathBuf, reason: String },

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

impl NutsError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing-boundary error for a country
    pub fn no_region_data(country: impl Into<String>) -> Self {
        Self::NoRegionData {
            country: country.into(),
        }
    }

    /// Create a reference data error tied to a file
    pub fn reference_data(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ReferenceData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is a configuration problem the caller must fix
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, NutsError>;
