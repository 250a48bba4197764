//! NUTS-3 boundary loading
//!
//! The boundary archive is a zip whose member is itself a zipped shapefile.
//! The inner archive is unpacked once next to the outer one; later loads
//! reuse the extracted files.

use crate::config::ReferenceLayout;
use crate::constants::boundaries::EXTRACT_DIR;
use crate::error::{NutsError, Result};
use crate::models::is_valid_nuts3;
use crate::spatial::{BoundarySet, Region};
use geo::MultiPolygon;
use shapefile::Shape;
use shapefile::dbase::{FieldValue, Record};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

const SHAPEFILE_PARTS: [&str; 3] = ["shp", "shx", "dbf"];

/// Unpack the shapefile from the nested boundary archive
///
/// Returns the path of the `.shp` file. Nothing is extracted when the
/// `.shp`, `.shx` and `.dbf` parts are all present; a partial extraction is
/// redone.
pub fn extract_shapefile(archive: &Path, layout: &ReferenceLayout) -> Result<PathBuf> {
    let target_dir = archive
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(EXTRACT_DIR);
    let shapefile_path = target_dir.join(&layout.shapefile);

    if extraction_complete(&shapefile_path) {
        debug!("Using extracted shapefile {}", shapefile_path.display());
        return Ok(shapefile_path);
    }

    fs::create_dir_all(&target_dir)?;

    let mut outer = ZipArchive::new(File::open(archive)?)?;
    let inner_path = target_dir.join(&layout.inner_archive);
    {
        let mut member = outer.by_name(&layout.inner_archive).map_err(|e| {
            NutsError::reference_data(
                archive,
                format!("missing member {}: {}", layout.inner_archive, e),
            )
        })?;
        let mut output = File::create(&inner_path)?;
        io::copy(&mut member, &mut output)?;
    }

    // Leftovers of an interrupted extraction
    for extension in SHAPEFILE_PARTS {
        let part = shapefile_path.with_extension(extension);
        if part.is_file() {
            fs::remove_file(&part)?;
        }
    }

    let mut inner = ZipArchive::new(File::open(&inner_path)?)?;
    inner.extract(&target_dir)?;

    if !extraction_complete(&shapefile_path) {
        return Err(NutsError::reference_data(
            &inner_path,
            format!("archive does not contain all parts of {}", layout.shapefile),
        ));
    }

    info!(
        "Extracted NUTS boundaries from {} into {}",
        archive.display(),
        target_dir.display()
    );
    Ok(shapefile_path)
}

/// Read NUTS-3 regions from a shapefile, grouped by country
///
/// Records without a country, without a well-formed region code, or with a
/// non-polygon shape are skipped.
pub fn read_boundaries(shapefile_path: &Path, layout: &ReferenceLayout) -> Result<BoundarySet> {
    let mut reader = shapefile::Reader::from_path(shapefile_path)?;
    let mut set = BoundarySet::new();
    let mut skipped = 0usize;

    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item?;

        let country = character_field(&record, &layout.country_field);
        let code = character_field(&record, &layout.region_id_field)
            .filter(|code| is_valid_nuts3(code));
        let (Some(country), Some(code)) = (country, code) else {
            skipped += 1;
            continue;
        };

        let geometry = match shape {
            Shape::Polygon(polygon) => MultiPolygon::<f64>::from(polygon),
            other => {
                warn!(
                    "Skipping region {} with unsupported shape type {:?}",
                    code,
                    other.shapetype()
                );
                skipped += 1;
                continue;
            }
        };

        set.insert(country, Region::new(code, geometry));
    }

    if skipped > 0 {
        warn!(
            "Skipped {} shapefile records without usable country, code or polygon",
            skipped
        );
    }

    info!(
        "Loaded {} NUTS-3 regions for {} countries from {}",
        set.region_count(),
        set.countries().len(),
        shapefile_path.display()
    );
    Ok(set)
}

/// Extract and read the boundary archive
pub fn load_boundaries(archive: &Path, layout: &ReferenceLayout) -> Result<BoundarySet> {
    let shapefile_path = extract_shapefile(archive, layout)?;
    read_boundaries(&shapefile_path, layout)
}

/// Shapefile readers need the index and attribute files next to the `.shp`
fn extraction_complete(shapefile_path: &Path) -> bool {
    SHAPEFILE_PARTS
        .iter()
        .all(|extension| shapefile_path.with_extension(extension).is_file())
}

fn character_field(record: &Record, name: &str) -> Option<String> {
    match record.get(name) {
        Some(FieldValue::Character(Some(value))) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        _ => None,
    }
}
