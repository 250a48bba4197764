//! Resolution-chain engine.
//!
//! Applies an ordered list of lookup strategies to a record table. Each
//! strategy only touches records that are still unresolved, so a code found
//! by an earlier strategy is never overwritten. The chain stops as soon as
//! every record has a code.

use crate::config::{ReferenceLayout, ResolverConfig};
use crate::constants::{
    NUTS1_OUTPUT_COLUMN, NUTS2_OUTPUT_COLUMN, NUTS3_OUTPUT_COLUMN, NUTS3_WORKING_COLUMN,
    lau_table, postcode_table,
};
use crate::error::{NutsError, Result};
use crate::merge::{join_and_merge, normalized_keys};
use crate::models::{ResolutionReport, StageOutcome, Strategy, is_valid_nuts3, parent_code};
use crate::reference::ReferenceStore;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Resolved records together with the per-stage report
#[derive(Debug, Clone)]
pub struct Resolution {
    pub frame: DataFrame,
    pub report: ResolutionReport,
}

/// Assigns NUTS regions to power-plant records
///
/// A resolver owns its reference cache and can be shared across threads to
/// resolve several countries concurrently.
#[derive(Debug)]
pub struct NutsResolver {
    config: ResolverConfig,
    store: Arc<ReferenceStore>,
}

impl NutsResolver {
    pub fn new(config: ResolverConfig, store: Arc<ReferenceStore>) -> Self {
        Self { config, store }
    }

    /// Resolver reading reference data from the download cache
    pub fn from_layout(config: ResolverConfig, layout: ReferenceLayout) -> Self {
        Self::new(config, Arc::new(ReferenceStore::from_layout(layout)))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Resolve records of one country with the configured strategies
    pub fn resolve(&self, records: &DataFrame, country: &str) -> Result<Resolution> {
        self.resolve_with(records, country, &self.config.strategies)
    }

    /// Resolve records of one country with an explicit strategy order
    ///
    /// The strategy names and the required record columns are checked
    /// before any reference data is loaded. `records` is never modified.
    pub fn resolve_with<S: AsRef<str>>(
        &self,
        records: &DataFrame,
        country: &str,
        strategies: &[S],
    ) -> Result<Resolution> {
        let strategies = Strategy::parse_list(strategies)?;
        if strategies.is_empty() {
            return Err(NutsError::configuration(
                "At least one resolution strategy is required",
            ));
        }
        self.check_columns(records, &strategies)?;

        let start_time = Instant::now();
        let mut frame = seed_working_column(records)?;
        let mut unresolved = unresolved_rows(&frame)?;
        let mut report = ResolutionReport::new(country, frame.height(), count(&unresolved));

        debug!(
            "Resolving {} records for {} ({} already resolved)",
            report.total_records,
            country,
            report.total_records - report.unresolved
        );

        for strategy in strategies {
            let before = count(&unresolved);
            if before == 0 {
                debug!("All records resolved, skipping {} and later strategies", strategy);
                break;
            }

            frame = match strategy {
                Strategy::LatLon => self.apply_latlon(&frame, country, &unresolved)?,
                tabular => self.apply_table(&frame, country, tabular, &unresolved)?,
            };
            frame = discard_malformed_codes(frame, strategy)?;

            unresolved = unresolved_rows(&frame)?;
            let after = count(&unresolved);
            report.stages.push(StageOutcome {
                strategy,
                newly_resolved: before - after,
                unresolved_after: after,
            });

            if self.config.verbose {
                info!(
                    "After using {} data, NUTS codes are unknown for {} power plants",
                    strategy, after
                );
            } else {
                debug!(
                    "After using {} data, NUTS codes are unknown for {} power plants",
                    strategy, after
                );
            }
        }

        report.unresolved = count(&unresolved);
        let frame = publish_regions(frame)?;

        debug!(
            "Resolved {}/{} records for {} in {:?}",
            report.resolved(),
            report.total_records,
            country,
            start_time.elapsed()
        );

        Ok(Resolution { frame, report })
    }

    fn check_columns(&self, records: &DataFrame, strategies: &[Strategy]) -> Result<()> {
        for strategy in strategies {
            for column in self.config.columns.required_for(*strategy) {
                if records.get_column_index(column).is_none() {
                    return Err(NutsError::configuration(format!(
                        "Strategy '{}' needs column '{}', which the records do not have",
                        strategy, column
                    )));
                }
            }
        }
        Ok(())
    }

    /// Point-in-polygon lookup for unresolved rows with usable coordinates
    fn apply_latlon(&self, frame: &DataFrame, country: &str, active: &[bool]) -> Result<DataFrame> {
        let columns = &self.config.columns;
        let latitudes = frame.column(&columns.latitude)?.cast(&DataType::Float64)?;
        let longitudes = frame.column(&columns.longitude)?.cast(&DataType::Float64)?;
        let latitudes: Vec<Option<f64>> = latitudes.f64()?.into_iter().collect();
        let longitudes: Vec<Option<f64>> = longitudes.f64()?.into_iter().collect();

        let usable = active
            .iter()
            .zip(latitudes.iter().zip(&longitudes))
            .filter(|(is_active, (lat, lon))| {
                **is_active
                    && lat.is_some_and(f64::is_finite)
                    && lon.is_some_and(f64::is_finite)
            })
            .count();
        if usable == 0 {
            debug!("No unresolved records with coordinates for {}", country);
            return Ok(frame.clone());
        }

        let boundaries = self.store.boundaries()?;
        boundaries.regions(country)?;

        let current = frame.column(NUTS3_WORKING_COLUMN)?.str()?;
        let mut codes: Vec<Option<String>> = Vec::with_capacity(frame.height());
        for (row, is_active) in active.iter().enumerate() {
            let code = if *is_active {
                boundaries
                    .locate(
                        country,
                        latitudes[row],
                        longitudes[row],
                        self.config.closest_approximation,
                    )?
                    .map(str::to_string)
            } else {
                current.get(row).map(str::to_string)
            };
            codes.push(code);
        }

        let mut located = frame.clone();
        located.with_column(Column::new(NUTS3_WORKING_COLUMN.into(), codes))?;
        Ok(located)
    }

    /// Join a lookup table for unresolved rows
    fn apply_table(
        &self,
        frame: &DataFrame,
        country: &str,
        strategy: Strategy,
        active: &[bool],
    ) -> Result<DataFrame> {
        let columns = &self.config.columns;
        let variant = self.config.lau_name_variant;
        let (table, left_on, right_on) = match strategy {
            Strategy::Postcode => (
                self.store.postcode_table(country)?,
                columns.postcode.as_str(),
                postcode_table::CODE,
            ),
            Strategy::MunicipalityCode => (
                self.store.municipality_table(country, variant)?,
                columns.municipality_code.as_str(),
                lau_table::MUNICIPALITY_CODE,
            ),
            Strategy::Municipality => (
                self.store.municipality_table(country, variant)?,
                columns.municipality.as_str(),
                lau_table::MUNICIPALITY,
            ),
            Strategy::LatLon => {
                return Err(NutsError::configuration(
                    "latlon is not a table lookup strategy",
                ));
            }
        };

        join_and_merge(frame, left_on, &table, right_on, active, NUTS3_WORKING_COLUMN)
    }
}

/// Copy the records and add the working column, seeded from any existing
/// well-formed code
fn seed_working_column(records: &DataFrame) -> Result<DataFrame> {
    let height = records.height();
    let mut seeds: Vec<Option<String>> = vec![None; height];
    let mut malformed = 0usize;

    for source in [NUTS3_WORKING_COLUMN, NUTS3_OUTPUT_COLUMN] {
        let Some(index) = records.get_column_index(source) else {
            continue;
        };
        let values = normalized_keys(&records.get_columns()[index])?;
        for (seed, value) in seeds.iter_mut().zip(values) {
            if seed.is_some() {
                continue;
            }
            match value {
                Some(code) if is_valid_nuts3(&code) => *seed = Some(code),
                Some(_) => malformed += 1,
                None => {}
            }
        }
    }

    if malformed > 0 {
        warn!(
            "Ignoring {} malformed NUTS-3 codes already present in the records",
            malformed
        );
    }

    let mut frame = records.clone();
    frame.with_column(Column::new(NUTS3_WORKING_COLUMN.into(), seeds))?;
    Ok(frame)
}

/// Null out working codes that are not well-formed NUTS-3 codes
///
/// Seeded lookup tables and boundary sets are not validated on insertion,
/// so every stage's output goes through here before it counts as resolved.
fn discard_malformed_codes(mut frame: DataFrame, strategy: Strategy) -> Result<DataFrame> {
    let codes = frame.column(NUTS3_WORKING_COLUMN)?.str()?;
    let malformed = codes
        .into_iter()
        .filter(|code| code.is_some_and(|c| !is_valid_nuts3(c)))
        .count();
    if malformed == 0 {
        return Ok(frame);
    }

    let cleaned: Vec<Option<String>> = codes
        .into_iter()
        .map(|code| code.filter(|c| is_valid_nuts3(c)).map(str::to_string))
        .collect();
    warn!(
        "Discarding {} malformed NUTS-3 codes found by {}",
        malformed, strategy
    );
    frame.with_column(Column::new(NUTS3_WORKING_COLUMN.into(), cleaned))?;
    Ok(frame)
}

fn unresolved_rows(frame: &DataFrame) -> Result<Vec<bool>> {
    Ok(frame
        .column(NUTS3_WORKING_COLUMN)?
        .str()?
        .into_iter()
        .map(|code| code.is_none())
        .collect())
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|flag| **flag).count()
}

/// Replace the working column with the three published NUTS levels
fn publish_regions(mut frame: DataFrame) -> Result<DataFrame> {
    let codes: Vec<Option<String>> = frame
        .column(NUTS3_WORKING_COLUMN)?
        .str()?
        .into_iter()
        .map(|code| code.map(str::to_string))
        .collect();

    let level = |levels: usize| -> Vec<Option<String>> {
        codes
            .iter()
            .map(|code| {
                code.as_deref()
                    .and_then(|c| parent_code(c, levels))
                    .map(str::to_string)
            })
            .collect()
    };
    let nuts2 = level(1);
    let nuts1 = level(2);

    frame.with_column(Column::new(NUTS3_OUTPUT_COLUMN.into(), codes))?;
    frame.with_column(Column::new(NUTS2_OUTPUT_COLUMN.into(), nuts2))?;
    frame.with_column(Column::new(NUTS1_OUTPUT_COLUMN.into(), nuts1))?;
    Ok(frame.drop(NUTS3_WORKING_COLUMN)?)
}
