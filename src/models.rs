//! Core data structures and types for NUTS resolution.
//!
//! Defines the resolution strategies, LAU naming variants, NUTS code helpers
//! and the per-stage report returned by the resolution engine.

use crate::constants::NUTS3_PATTERN;
use crate::error::{NutsError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static NUTS3_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NUTS3_PATTERN).expect("NUTS3 pattern is a valid regex"));

/// Lookup strategies, each backed by a different reference dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Point-in-polygon against NUTS-3 boundaries
    #[serde(rename = "latlon")]
    LatLon,
    /// Join on the postcode table
    Postcode,
    /// Join on the LAU table by municipality code
    MunicipalityCode,
    /// Join on the LAU table by municipality name
    Municipality,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::LatLon => "latlon",
            Strategy::Postcode => "postcode",
            Strategy::MunicipalityCode => "municipality_code",
            Strategy::Municipality => "municipality",
        }
    }

    /// Parse and validate a whole strategy list before anything runs
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Strategy>> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl FromStr for Strategy {
    type Err = NutsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "latlon" => Ok(Strategy::LatLon),
            "postcode" => Ok(Strategy::Postcode),
            "municipality_code" => Ok(Strategy::MunicipalityCode),
            "municipality" => Ok(Strategy::Municipality),
            other => Err(NutsError::configuration(format!(
                "Unknown resolution strategy '{}' (expected one of: latlon, postcode, municipality_code, municipality)",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which LAU name column of the workbook is used for municipality names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LauNameVariant {
    #[default]
    Latin,
    National,
}

impl LauNameVariant {
    /// Suffix of the `LAU NAME ...` header in the workbook
    pub fn header_suffix(&self) -> &'static str {
        match self {
            LauNameVariant::Latin => "LATIN",
            LauNameVariant::National => "NATIONAL",
        }
    }
}

impl FromStr for LauNameVariant {
    type Err = NutsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LATIN" => Ok(LauNameVariant::Latin),
            "NATIONAL" => Ok(LauNameVariant::National),
            _ => Err(NutsError::configuration(format!(
                "LAU name variant can only be \"LATIN\" or \"NATIONAL\", but is set to: {}",
                s
            ))),
        }
    }
}

/// Check that a string is a well-formed NUTS-3 code
pub fn is_valid_nuts3(code: &str) -> bool {
    NUTS3_REGEX.is_match(code)
}

/// Derive a coarser NUTS code by dropping `levels` trailing characters
///
/// `DE123` gives `DE12` for one level and `DE1` for two.
pub fn parent_code(nuts3: &str, levels: usize) -> Option<&str> {
    let keep = nuts3.len().checked_sub(levels)?;
    if keep == 0 || !nuts3.is_char_boundary(keep) {
        return None;
    }
    Some(&nuts3[..keep])
}

/// Outcome of one strategy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub strategy: Strategy,
    pub newly_resolved: usize,
    pub unresolved_after: usize,
}

/// Summary of a resolution call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    pub country: String,
    pub total_records: usize,
    pub stages: Vec<StageOutcome>,
    pub unresolved: usize,
}

impl ResolutionReport {
    pub fn new(country: impl Into<String>, total_records: usize, unresolved: usize) -> Self {
        Self {
            country: country.into(),
            total_records,
            stages: Vec::new(),
            unresolved,
        }
    }

    pub fn resolved(&self) -> usize {
        self.total_records - self.unresolved
    }

    /// Share of records with a region, 1.0 for an empty table
    pub fn resolution_rate(&self) -> f64 {
        if self.total_records == 0 {
            1.0
        } else {
            self.resolved() as f64 / self.total_records as f64
        }
    }

    pub fn resolved_by(&self, strategy: Strategy) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.strategy == strategy)
            .map(|stage| stage.newly_resolved)
            .sum()
    }
}
