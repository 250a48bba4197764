//! Postcode and LAU lookup table loaders
//!
//! Both loaders keep only rows with a well-formed NUTS-3 code and produce
//! string-typed [`LookupTable`]s indexed on their join keys.

use crate::constants::{lau_table, postcode_table};
use crate::error::{NutsError, Result};
use crate::merge::LookupTable;
use crate::models::{LauNameVariant, is_valid_nuts3};
use calamine::{Data, Reader, Sheets, open_workbook_auto};
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Load a country's postcode → NUTS-3 table
///
/// The file is `;`-separated with `'` as quote character and must have
/// `CODE` and `NUTS3` columns. Every column is read as a string so that
/// leading zeros survive.
pub fn load_postcode_table(path: &Path, country: &str) -> Result<LookupTable> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| {
            options
                .with_separator(postcode_table::SEPARATOR)
                .with_quote_char(Some(postcode_table::QUOTE_CHAR))
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    for required in [postcode_table::CODE, postcode_table::NUTS3] {
        if frame.get_column_index(required).is_none() {
            return Err(NutsError::configuration(format!(
                "Postcode table {} has no '{}' column",
                path.display(),
                required
            )));
        }
    }

    let codes = frame.column(postcode_table::CODE)?.str()?;
    let regions = frame.column(postcode_table::NUTS3)?.str()?;

    let mut kept_codes = Vec::with_capacity(frame.height());
    let mut kept_regions = Vec::with_capacity(frame.height());
    let mut discarded = 0usize;
    for (code, region) in codes.into_iter().zip(regions) {
        let code = code.map(str::trim).filter(|c| !c.is_empty());
        let region = region.map(str::trim).filter(|r| is_valid_nuts3(r));
        match (code, region) {
            (Some(code), Some(region)) => {
                kept_codes.push(code.to_string());
                kept_regions.push(region.to_string());
            }
            _ => discarded += 1,
        }
    }

    if discarded > 0 {
        warn!(
            "Discarded {} postcode rows without a postcode or a valid NUTS-3 code in {}",
            discarded,
            path.display()
        );
    }

    let table = df!(
        postcode_table::CODE => kept_codes,
        postcode_table::NUTS3 => kept_regions,
    )?;

    info!(
        "Loaded {} postcodes for {} from {}",
        table.height(),
        country,
        path.display()
    );

    LookupTable::new(format!("postcodes:{}", country), table, &[postcode_table::CODE])
}

/// Load a country's sheet of the LAU → NUTS-3 workbook
///
/// The sheet must be named after the country code. Municipality names come
/// from the `LAU NAME LATIN` or `LAU NAME NATIONAL` column depending on
/// `variant`; the loaded table has columns `municipality`,
/// `municipality_code` and `NUTS3`.
pub fn load_municipality_table(
    path: &Path,
    country: &str,
    variant: LauNameVariant,
) -> Result<LookupTable> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)?;

    if !workbook.sheet_names().iter().any(|name| name == country) {
        return Err(NutsError::configuration(format!(
            "LAU workbook {} has no sheet for country {}",
            path.display(),
            country
        )));
    }

    let range = workbook.worksheet_range(country)?;
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| NutsError::reference_data(path, format!("sheet {} is empty", country)))?;

    let name_header = format!("{}{}", lau_table::NAME_PREFIX, variant.header_suffix());
    let name_idx = header_index(header, &name_header, path)?;
    let code_idx = header_index(header, lau_table::CODE_HEADER, path)?;
    let nuts_idx = header_index(header, lau_table::NUTS3_HEADER, path)?;

    let mut names: Vec<Option<String>> = Vec::new();
    let mut codes: Vec<Option<String>> = Vec::new();
    let mut regions: Vec<String> = Vec::new();
    let mut discarded = 0usize;

    for row in rows {
        let region = row
            .get(nuts_idx)
            .and_then(cell_text)
            .filter(|code| is_valid_nuts3(code));
        let Some(region) = region else {
            discarded += 1;
            continue;
        };

        names.push(row.get(name_idx).and_then(cell_text));
        codes.push(row.get(code_idx).and_then(cell_text));
        regions.push(region);
    }

    if discarded > 0 {
        warn!(
            "Discarded {} LAU rows without a valid NUTS-3 code in sheet {}",
            discarded, country
        );
    }

    let table = df!(
        lau_table::MUNICIPALITY => names,
        lau_table::MUNICIPALITY_CODE => codes,
        lau_table::NUTS3 => regions,
    )?;

    info!(
        "Loaded {} municipalities for {} ({} names) from {}",
        table.height(),
        country,
        variant.header_suffix(),
        path.display()
    );

    LookupTable::new(
        format!("lau:{}", country),
        table,
        &[lau_table::MUNICIPALITY, lau_table::MUNICIPALITY_CODE],
    )
}

fn header_index(header: &[Data], name: &str, path: &Path) -> Result<usize> {
    header
        .iter()
        .position(|cell| cell_text(cell).as_deref() == Some(name))
        .ok_or_else(|| {
            NutsError::configuration(format!(
                "LAU workbook {} has no '{}' column",
                path.display(),
                name
            ))
        })
}

/// Text content of a workbook cell; numeric codes are written without a
/// fractional part
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(value) => value.trim().to_string(),
        Data::Float(value) if value.fract() == 0.0 => format!("{}", *value as i64),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        other => other.to_string(),
    };

    (!text.is_empty()).then_some(text)
}
