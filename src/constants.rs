//! Application constants for NUTS resolution
//!
//! Column names, default file layout and naming conventions shared by the
//! reference loaders, the join policy and the resolution engine.

// =============================================================================
// Record Columns
// =============================================================================

/// Working column holding the NUTS-3 code while strategies run
pub const NUTS3_WORKING_COLUMN: &str = "NUTS3";

/// Published output columns, finest level first
pub const NUTS3_OUTPUT_COLUMN: &str = "nuts_3_region";
pub const NUTS2_OUTPUT_COLUMN: &str = "nuts_2_region";
pub const NUTS1_OUTPUT_COLUMN: &str = "nuts_1_region";

/// Default input column names for location fields
pub const DEFAULT_POSTCODE_COLUMN: &str = "postcode";
pub const DEFAULT_MUNICIPALITY_COLUMN: &str = "municipality";
pub const DEFAULT_MUNICIPALITY_CODE_COLUMN: &str = "municipality_code";
pub const DEFAULT_LATITUDE_COLUMN: &str = "lat";
pub const DEFAULT_LONGITUDE_COLUMN: &str = "lon";

/// Suffix given to lookup columns whose name collides with a record column
pub const JOIN_SUFFIX: &str = "_y";

/// Strategy order used when none is configured
pub const DEFAULT_STRATEGIES: &[&str] = &["latlon", "postcode", "municipality_code", "municipality"];

// =============================================================================
// Reference Tables
// =============================================================================

/// Postcode table columns
pub mod postcode_table {
    pub const CODE: &str = "CODE";
    pub const NUTS3: &str = "NUTS3";
    pub const SEPARATOR: u8 = b';';
    pub const QUOTE_CHAR: u8 = b'\'';
}

/// LAU workbook headers and the normalized names they are loaded under
pub mod lau_table {
    pub const NAME_PREFIX: &str = "LAU NAME ";
    pub const CODE_HEADER: &str = "LAU CODE";
    pub const NUTS3_HEADER: &str = "NUTS 3 CODE";

    pub const MUNICIPALITY: &str = "municipality";
    pub const MUNICIPALITY_CODE: &str = "municipality_code";
    pub const NUTS3: &str = "NUTS3";
}

/// Shapefile attributes and archive members for NUTS boundaries
pub mod boundaries {
    pub const INNER_ARCHIVE: &str = "NUTS_RG_01M_2016_4326_LEVL_3.shp.zip";
    pub const SHAPEFILE: &str = "NUTS_RG_01M_2016_4326_LEVL_3.shp";
    pub const EXTRACT_DIR: &str = "NUTS";
    pub const REGION_ID_FIELD: &str = "FID";
    pub const COUNTRY_FIELD: &str = "CNTR_CODE";
}

// =============================================================================
// Cache Layout
// =============================================================================

/// Application directory under the user data dir
pub const CACHE_APP_DIR: &str = "opsd-renewables";

/// Relative locations inside the cache directory
pub const POSTCODE_DIR: &str = "EU/postcodes";
pub const POSTCODE_PATTERN: &str = "pc*_{country}_NUTS*.csv";
pub const LAU_WORKBOOK: &str = "EU/Eurostat/EU-28-LAU-2019-NUTS-2016.xlsx";
pub const BOUNDARY_ARCHIVE: &str = "EU/Eurostat_shapefile/ref-nuts-2016-01m.shp.zip";

// =============================================================================
// NUTS Codes
// =============================================================================

/// Well-formed NUTS-3 code: two-letter country prefix plus three characters
pub const NUTS3_PATTERN: &str = r"^[A-Z]{2}[A-Z0-9]{3}$";

/// Expand the `{country}` placeholder of a postcode file pattern
pub fn postcode_pattern_for(pattern: &str, country: &str) -> String {
    pattern.replace("{country}", &country.to_lowercase())
}
