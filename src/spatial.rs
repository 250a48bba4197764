//! NUTS-3 boundary index for coordinate lookups.
//!
//! Regions are kept per country in the order they were loaded and scanned
//! linearly; a country holds at most a few hundred NUTS-3 regions. Each
//! region caches its bounding rectangle so the containment scan can skip
//! polygons that cannot hold the point.
//!
//! A point lying exactly on a border shared by two regions is not strictly
//! inside either polygon. Such points fall through to the closest-region
//! search, where both regions are at distance zero and the one loaded first
//! wins. The result therefore depends on the load order of the boundary
//! data.

use crate::error::{NutsError, Result};
use geo::{BoundingRect, Contains, EuclideanDistance, MultiPolygon, Point, Rect};
use std::collections::HashMap;
use tracing::debug;

/// A NUTS-3 region with its boundary geometry
#[derive(Debug, Clone)]
pub struct Region {
    code: String,
    geometry: MultiPolygon<f64>,
    bounds: Option<Rect<f64>>,
}

impl Region {
    pub fn new(code: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        let bounds = geometry.bounding_rect();
        Self {
            code: code.into(),
            geometry,
            bounds,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    fn within_bounds(&self, point: &Point<f64>) -> bool {
        match &self.bounds {
            Some(rect) => {
                point.x() >= rect.min().x
                    && point.x() <= rect.max().x
                    && point.y() >= rect.min().y
                    && point.y() <= rect.max().y
            }
            None => false,
        }
    }

    /// Whether the point lies strictly inside the region
    pub fn contains(&self, point: &Point<f64>) -> bool {
        self.within_bounds(point) && self.geometry.contains(point)
    }

    /// Distance in degrees from the point to the region, zero when inside
    pub fn distance_to(&self, point: &Point<f64>) -> f64 {
        point.euclidean_distance(&self.geometry)
    }
}

/// NUTS-3 regions grouped by country, read-only once built
#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    countries: HashMap<String, Vec<Region>>,
}

impl BoundarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region to a country, keeping insertion order
    pub fn insert(&mut self, country: impl Into<String>, region: Region) {
        self.countries.entry(country.into()).or_default().push(region);
    }

    /// Builder-style variant of [`BoundarySet::insert`]
    pub fn with_region(
        mut self,
        country: impl Into<String>,
        code: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        self.insert(country, Region::new(code, geometry));
        self
    }

    /// Regions of a country, in load order
    pub fn regions(&self, country: &str) -> Result<&[Region]> {
        self.countries
            .get(country)
            .filter(|regions| !regions.is_empty())
            .map(|regions| regions.as_slice())
            .ok_or_else(|| NutsError::no_region_data(country))
    }

    pub fn has_country(&self, country: &str) -> bool {
        self.countries
            .get(country)
            .is_some_and(|regions| !regions.is_empty())
    }

    pub fn countries(&self) -> Vec<&str> {
        let mut countries: Vec<&str> = self.countries.keys().map(|c| c.as_str()).collect();
        countries.sort_unstable();
        countries
    }

    pub fn region_count(&self) -> usize {
        self.countries.values().map(|regions| regions.len()).sum()
    }

    /// Whether a code belongs to the country's region set
    pub fn contains_code(&self, country: &str, code: &str) -> bool {
        self.countries
            .get(country)
            .is_some_and(|regions| regions.iter().any(|r| r.code == code))
    }

    /// First region of the country whose polygon contains the point
    ///
    /// Missing or non-finite coordinates give `Ok(None)` without touching the
    /// geometry.
    pub fn region_containing(
        &self,
        country: &str,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Option<&str>> {
        let Some(point) = to_point(lat, lon) else {
            return Ok(None);
        };

        let regions = self.regions(country)?;
        Ok(regions
            .iter()
            .find(|region| region.contains(&point))
            .map(|region| region.code()))
    }

    /// Region of the country nearest to the point
    ///
    /// Ties go to the region loaded first. Returns a code whenever the
    /// coordinates are usable and the country has boundary data.
    pub fn closest_region(
        &self,
        country: &str,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Option<&str>> {
        let Some(point) = to_point(lat, lon) else {
            return Ok(None);
        };

        let regions = self.regions(country)?;
        let mut closest: Option<(&Region, f64)> = None;
        for region in regions {
            let distance = region.distance_to(&point);
            match closest {
                Some((_, best)) if distance >= best => {}
                _ => closest = Some((region, distance)),
            }
        }

        if let Some((region, distance)) = closest {
            debug!(
                "Closest region to ({}, {}) in {}: {} at {:.5} degrees",
                point.y(),
                point.x(),
                country,
                region.code(),
                distance
            );
        }

        Ok(closest.map(|(region, _)| region.code()))
    }

    /// Containing region, falling back to the closest one when requested
    pub fn locate(
        &self,
        country: &str,
        lat: Option<f64>,
        lon: Option<f64>,
        closest_approximation: bool,
    ) -> Result<Option<&str>> {
        match self.region_containing(country, lat, lon)? {
            Some(code) => Ok(Some(code)),
            None if closest_approximation => self.closest_region(country, lat, lon),
            None => Ok(None),
        }
    }
}

/// Shapefile coordinates are (longitude, latitude)
fn to_point(lat: Option<f64>, lon: Option<f64>) -> Option<Point<f64>> {
    match (lat, lon) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Point::new(lon, lat)),
        _ => None,
    }
}
