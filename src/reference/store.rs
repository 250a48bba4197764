//! Per-country reference data cache
//!
//! Tables are cached per country (and per LAU naming variant for
//! municipality tables) so processing several countries in a row, or in
//! parallel, never mixes their reference data. Each table and the boundary
//! set, which covers all countries, is loaded at most once, even when several
//! threads ask for it at the same time.

use super::boundaries::load_boundaries;
use super::locator::{CacheLayout, InMemoryOnly, ReferenceLocator};
use super::tables::{load_municipality_table, load_postcode_table};
use crate::config::ReferenceLayout;
use crate::error::Result;
use crate::merge::LookupTable;
use crate::models::LauNameVariant;
use crate::spatial::BoundarySet;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

type MunicipalityKey = (String, LauNameVariant);
type TableSlot = Arc<Mutex<Option<Arc<LookupTable>>>>;

/// Lookup tables keyed by country, each loaded at most once
///
/// Every key owns a slot whose lock is held while its table loads, so
/// concurrent callers for the same key wait for a single load while other
/// keys stay available.
#[derive(Debug)]
struct TableCache<K> {
    slots: RwLock<HashMap<K, TableSlot>>,
}

impl<K: Eq + Hash + Clone> TableCache<K> {
    fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> TableSlot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Cached table for `key`, running `load` on first use
    ///
    /// A failed load leaves the slot empty so the next call retries.
    fn get_or_load(
        &self,
        key: &K,
        load: impl FnOnce() -> Result<LookupTable>,
    ) -> Result<(Arc<LookupTable>, bool)> {
        let slot = self.slot(key);
        let mut table = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = table.as_ref() {
            return Ok((Arc::clone(table), true));
        }

        let loaded = Arc::new(load()?);
        *table = Some(Arc::clone(&loaded));
        Ok((loaded, false))
    }

    fn insert(&self, key: K, table: LookupTable) {
        *self
            .slot(&key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
    }

    fn loaded_keys(&self) -> Vec<K> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, slot)| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Lazily loaded, shared reference data
#[derive(Debug)]
pub struct ReferenceStore {
    locator: Arc<dyn ReferenceLocator>,
    layout: ReferenceLayout,
    postcodes: TableCache<String>,
    municipalities: TableCache<MunicipalityKey>,
    boundaries: Mutex<Option<Arc<BoundarySet>>>,
}

impl ReferenceStore {
    /// Store reading files from `locator`; `layout` supplies the shapefile
    /// member and attribute names
    pub fn new(locator: Arc<dyn ReferenceLocator>, layout: ReferenceLayout) -> Self {
        Self {
            locator,
            layout,
            postcodes: TableCache::new(),
            municipalities: TableCache::new(),
            boundaries: Mutex::new(None),
        }
    }

    /// Store reading from the download cache described by `layout`
    pub fn from_layout(layout: ReferenceLayout) -> Self {
        Self::new(Arc::new(CacheLayout::new(layout.clone())), layout)
    }

    /// Store that only serves data inserted in memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryOnly), ReferenceLayout::default())
    }

    /// Seed the boundary set instead of loading it from the archive
    pub fn with_boundaries(self, boundaries: BoundarySet) -> Self {
        *self
            .boundaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(boundaries));
        self
    }

    /// Seed a country's postcode table
    pub fn insert_postcode_table(&self, country: &str, table: LookupTable) {
        self.postcodes.insert(country.to_string(), table);
    }

    /// Seed a country's municipality table for a naming variant
    pub fn insert_municipality_table(
        &self,
        country: &str,
        variant: LauNameVariant,
        table: LookupTable,
    ) {
        self.municipalities
            .insert((country.to_string(), variant), table);
    }

    /// Postcode table for a country, loaded on first use
    pub fn postcode_table(&self, country: &str) -> Result<Arc<LookupTable>> {
        let (table, cached) = self.postcodes.get_or_load(&country.to_string(), || {
            let path = self.locator.postcode_table(country)?;
            load_postcode_table(&path, country)
        })?;
        if cached {
            debug!("Using cached postcode table for {}", country);
        }
        Ok(table)
    }

    /// Municipality table for a country and naming variant, loaded on first use
    pub fn municipality_table(
        &self,
        country: &str,
        variant: LauNameVariant,
    ) -> Result<Arc<LookupTable>> {
        let key = (country.to_string(), variant);
        let (table, cached) = self.municipalities.get_or_load(&key, || {
            let path = self.locator.municipality_workbook()?;
            load_municipality_table(&path, country, variant)
        })?;
        if cached {
            debug!("Using cached municipality table for {}", country);
        }
        Ok(table)
    }

    /// Boundary set for all countries, loaded on first use
    ///
    /// The lock is held while loading so concurrent callers wait for a
    /// single load.
    pub fn boundaries(&self) -> Result<Arc<BoundarySet>> {
        let mut slot = self.boundaries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(boundaries) = slot.as_ref() {
            return Ok(Arc::clone(boundaries));
        }

        let archive = self.locator.boundary_archive()?;
        info!("Loading NUTS boundaries from {}", archive.display());
        let boundaries = Arc::new(load_boundaries(&archive, &self.layout)?);
        *slot = Some(Arc::clone(&boundaries));
        Ok(boundaries)
    }

    /// Countries with a cached postcode table
    pub fn cached_postcode_countries(&self) -> Vec<String> {
        let mut countries = self.postcodes.loaded_keys();
        countries.sort();
        countries
    }

    pub fn boundaries_loaded(&self) -> bool {
        self.boundaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
