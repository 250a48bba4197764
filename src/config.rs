//! Configuration management and validation.
//!
//! Provides the resolution settings (strategy order, closest-region
//! fallback, LAU naming variant, input column names) and the reference data
//! cache layout. Both can be loaded from a TOML file and adjusted with
//! builder methods.

use crate::constants::{self, boundaries};
use crate::error::{NutsError, Result};
use crate::models::{LauNameVariant, Strategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Names of the record columns read by the strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub postcode: String,
    pub municipality: String,
    pub municipality_code: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            postcode: constants::DEFAULT_POSTCODE_COLUMN.to_string(),
            municipality: constants::DEFAULT_MUNICIPALITY_COLUMN.to_string(),
            municipality_code: constants::DEFAULT_MUNICIPALITY_CODE_COLUMN.to_string(),
            latitude: constants::DEFAULT_LATITUDE_COLUMN.to_string(),
            longitude: constants::DEFAULT_LONGITUDE_COLUMN.to_string(),
        }
    }
}

impl ColumnMapping {
    /// Record columns a strategy needs
    pub fn required_for(&self, strategy: Strategy) -> Vec<&str> {
        match strategy {
            Strategy::LatLon => vec![self.latitude.as_str(), self.longitude.as_str()],
            Strategy::Postcode => vec![self.postcode.as_str()],
            Strategy::MunicipalityCode => vec![self.municipality_code.as_str()],
            Strategy::Municipality => vec![self.municipality.as_str()],
        }
    }
}

/// Settings for a resolution call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Strategy names in the order they are tried
    pub strategies: Vec<String>,

    /// Fall back to the nearest region when a point lies in no polygon
    pub closest_approximation: bool,

    /// Which LAU name column municipality names are matched against
    pub lau_name_variant: LauNameVariant,

    /// Input column names
    pub columns: ColumnMapping,

    /// Log per-stage unresolved counts at info level
    pub verbose: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategies: constants::DEFAULT_STRATEGIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            closest_approximation: false,
            lau_name_variant: LauNameVariant::default(),
            columns: ColumnMapping::default(),
            verbose: false,
        }
    }
}

impl ResolverConfig {
    /// Set the strategy order
    pub fn with_strategies<S: AsRef<str>>(mut self, strategies: &[S]) -> Self {
        self.strategies = strategies.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Enable the closest-region fallback for coordinates
    pub fn with_closest_approximation(mut self, enabled: bool) -> Self {
        self.closest_approximation = enabled;
        self
    }

    /// Set the LAU naming variant
    pub fn with_lau_name_variant(mut self, variant: LauNameVariant) -> Self {
        self.lau_name_variant = variant;
        self
    }

    /// Set the input column names
    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    /// Enable per-stage reporting at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Parse the configured strategy names
    pub fn parsed_strategies(&self) -> Result<Vec<Strategy>> {
        Strategy::parse_list(&self.strategies)
    }

    /// Check the configuration without touching any data
    pub fn validate(&self) -> Result<()> {
        let strategies = self.parsed_strategies()?;
        if strategies.is_empty() {
            return Err(NutsError::configuration(
                "At least one resolution strategy is required",
            ));
        }
        Ok(())
    }
}

/// Where the reference files live inside the cache directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLayout {
    /// Root of the download cache
    pub cache_dir: PathBuf,

    /// Directory holding the per-country postcode tables, relative to the cache
    pub postcode_dir: PathBuf,

    /// Glob for a country's postcode table; `{country}` is the lower-case code
    pub postcode_pattern: String,

    /// LAU-to-NUTS workbook, relative to the cache
    pub lau_workbook: PathBuf,

    /// Zipped NUTS boundary archive, relative to the cache
    pub boundary_archive: PathBuf,

    /// Member of the boundary archive holding the zipped shapefile
    pub inner_archive: String,

    /// Shapefile name inside the inner archive
    pub shapefile: String,

    /// Shapefile attribute with the NUTS-3 code
    pub region_id_field: String,

    /// Shapefile attribute with the country code
    pub country_field: String,
}

impl Default for ReferenceLayout {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            postcode_dir: PathBuf::from(constants::POSTCODE_DIR),
            postcode_pattern: constants::POSTCODE_PATTERN.to_string(),
            lau_workbook: PathBuf::from(constants::LAU_WORKBOOK),
            boundary_archive: PathBuf::from(constants::BOUNDARY_ARCHIVE),
            inner_archive: boundaries::INNER_ARCHIVE.to_string(),
            shapefile: boundaries::SHAPEFILE.to_string(),
            region_id_field: boundaries::REGION_ID_FIELD.to_string(),
            country_field: boundaries::COUNTRY_FIELD.to_string(),
        }
    }
}

impl ReferenceLayout {
    /// Layout rooted at a specific cache directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn postcode_dir_path(&self) -> PathBuf {
        self.cache_dir.join(&self.postcode_dir)
    }

    pub fn lau_workbook_path(&self) -> PathBuf {
        self.cache_dir.join(&self.lau_workbook)
    }

    pub fn boundary_archive_path(&self) -> PathBuf {
        self.cache_dir.join(&self.boundary_archive)
    }
}

/// Default cache root under the user data directory
pub fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::CACHE_APP_DIR)
        .join("cache")
}

/// Both configuration sections as they appear in a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub resolver: ResolverConfig,
    pub reference: ReferenceLayout,
}

impl FileConfig {
    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        config.resolver.validate()?;
        Ok(config)
    }
}
