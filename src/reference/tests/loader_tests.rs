//! Tests for the postcode, LAU and boundary loaders

use super::fixtures::{write_boundary_archive, write_lau_workbook, write_postcode_csv};
use crate::config::ReferenceLayout;
use crate::constants::{self, lau_table, postcode_table};
use crate::error::NutsError;
use crate::models::LauNameVariant;
use crate::reference::{
    CacheLayout, ReferenceLocator, extract_shapefile, load_municipality_table,
    load_postcode_table,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_postcode_table() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_postcode_csv(temp_dir.path(), "pc2016_de_NUTS-2016_v3.0.csv");

    let table = load_postcode_table(&path, "DE").unwrap();

    // Malformed NUTS code dropped, duplicate postcode kept in the frame
    assert_eq!(table.height(), 4);
    assert_eq!(table.distinct_keys(postcode_table::CODE), 3);

    let row = table.find(postcode_table::CODE, "10115").unwrap();
    assert_eq!(table.value(postcode_table::NUTS3, row), Some("DE300"));

    // Leading zeros survive
    let row = table.find(postcode_table::CODE, "01067").unwrap();
    assert_eq!(table.value(postcode_table::NUTS3, row), Some("DED21"));
    assert!(table.find(postcode_table::CODE, "99999").is_none());
}

#[test]
fn test_postcode_table_requires_columns() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.csv");
    fs::write(&path, "POSTCODE;REGION\n'10115';'DE300'\n").unwrap();

    let err = load_postcode_table(&path, "DE").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("CODE"));
}

#[test]
fn test_load_municipality_table_latin() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lau.xlsx");
    write_lau_workbook(&path);

    let table = load_municipality_table(&path, "DE", LauNameVariant::Latin).unwrap();
    assert_eq!(table.height(), 2);

    let row = table.find(lau_table::MUNICIPALITY_CODE, "11000000").unwrap();
    assert_eq!(table.value(lau_table::NUTS3, row), Some("DE300"));

    let row = table.find(lau_table::MUNICIPALITY, "Muenchen").unwrap();
    assert_eq!(table.value(lau_table::NUTS3, row), Some("DE212"));
    assert_eq!(table.value(lau_table::MUNICIPALITY_CODE, row), Some("09162000"));
}

#[test]
fn test_load_municipality_table_national() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lau.xlsx");
    write_lau_workbook(&path);

    let table = load_municipality_table(&path, "DE", LauNameVariant::National).unwrap();
    assert!(table.find(lau_table::MUNICIPALITY, "Berlin, Stadt").is_some());
    assert!(table.find(lau_table::MUNICIPALITY, "Berlin").is_none());
}

#[test]
fn test_municipality_table_missing_sheet_or_column() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lau.xlsx");
    write_lau_workbook(&path);

    let err = load_municipality_table(&path, "FR", LauNameVariant::Latin).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("FR"));

    // AT sheet only carries national names
    let err = load_municipality_table(&path, "AT", LauNameVariant::Latin).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("LAU NAME LATIN"));

    let table = load_municipality_table(&path, "AT", LauNameVariant::National).unwrap();
    assert_eq!(table.height(), 1);
}

#[test]
fn test_cache_layout_finds_postcode_table() {
    let temp_dir = TempDir::new().unwrap();
    let layout = ReferenceLayout::default().with_cache_dir(temp_dir.path());
    let postcode_dir = layout.postcode_dir_path();
    write_postcode_csv(&postcode_dir, "pc2016_de_NUTS-2016_v2.0.csv");
    let newest = write_postcode_csv(&postcode_dir, "pc2016_de_NUTS-2016_v3.0.csv");
    write_postcode_csv(&postcode_dir, "pc2016_fr_NUTS-2016_v3.0.csv");

    let locator = CacheLayout::new(layout);
    assert_eq!(locator.postcode_table("DE").unwrap(), newest);

    let err = locator.postcode_table("IT").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_cache_layout_reports_missing_files() {
    let temp_dir = TempDir::new().unwrap();
    let locator = CacheLayout::new(ReferenceLayout::default().with_cache_dir(temp_dir.path()));

    assert!(locator.municipality_workbook().unwrap_err().is_configuration());
    assert!(locator.boundary_archive().unwrap_err().is_configuration());

    let workbook = temp_dir.path().join(constants::LAU_WORKBOOK);
    write_lau_workbook(&workbook);
    assert_eq!(locator.municipality_workbook().unwrap(), workbook);
}

#[test]
fn test_extract_nested_archive_once() {
    let temp_dir = TempDir::new().unwrap();
    let layout = ReferenceLayout::default();
    let archive = temp_dir.path().join("ref-nuts.shp.zip");
    write_boundary_archive(
        &archive,
        &layout.inner_archive,
        &[
            (layout.shapefile.as_str(), b"shp".as_slice()),
            ("NUTS_RG_01M_2016_4326_LEVL_3.shx", b"shx".as_slice()),
            ("NUTS_RG_01M_2016_4326_LEVL_3.dbf", b"dbf".as_slice()),
        ],
    );

    let shapefile_path = extract_shapefile(&archive, &layout).unwrap();
    assert_eq!(
        shapefile_path,
        temp_dir.path().join("NUTS").join(&layout.shapefile)
    );
    assert_eq!(fs::read(&shapefile_path).unwrap(), b"shp");
    assert!(temp_dir.path().join("NUTS").join(&layout.inner_archive).exists());

    // A second call reuses the extracted file even without the archive
    fs::remove_file(&archive).unwrap();
    assert_eq!(extract_shapefile(&archive, &layout).unwrap(), shapefile_path);
}

#[test]
fn test_extract_reports_missing_inner_archive() {
    let temp_dir = TempDir::new().unwrap();
    let layout = ReferenceLayout::default();
    let archive = temp_dir.path().join("ref-nuts.shp.zip");
    write_boundary_archive(&archive, "something_else.zip", &[("a.txt", b"a".as_slice())]);

    let err = extract_shapefile(&archive, &layout).unwrap_err();
    assert!(matches!(err, NutsError::ReferenceData { .. }));
}

#[test]
fn test_partial_extraction_is_redone() {
    let temp_dir = TempDir::new().unwrap();
    let layout = ReferenceLayout::default();
    let archive = temp_dir.path().join("ref-nuts.shp.zip");
    write_boundary_archive(
        &archive,
        &layout.inner_archive,
        &[
            (layout.shapefile.as_str(), b"shp".as_slice()),
            ("NUTS_RG_01M_2016_4326_LEVL_3.shx", b"shx".as_slice()),
            ("NUTS_RG_01M_2016_4326_LEVL_3.dbf", b"dbf".as_slice()),
        ],
    );

    // An interrupted run left only the .shp behind
    let extract_dir = temp_dir.path().join("NUTS");
    fs::create_dir_all(&extract_dir).unwrap();
    fs::write(extract_dir.join(&layout.shapefile), b"stale").unwrap();

    let shapefile_path = extract_shapefile(&archive, &layout).unwrap();
    assert_eq!(fs::read(&shapefile_path).unwrap(), b"shp");
    assert_eq!(
        fs::read(shapefile_path.with_extension("dbf")).unwrap(),
        b"dbf"
    );
    assert!(shapefile_path.with_extension("shx").is_file());
}

#[test]
fn test_archive_missing_shapefile_parts() {
    let temp_dir = TempDir::new().unwrap();
    let layout = ReferenceLayout::default();
    let archive = temp_dir.path().join("ref-nuts.shp.zip");
    write_boundary_archive(
        &archive,
        &layout.inner_archive,
        &[(layout.shapefile.as_str(), b"shp".as_slice())],
    );

    let err = extract_shapefile(&archive, &layout).unwrap_err();
    assert!(matches!(err, NutsError::ReferenceData { .. }));
}
