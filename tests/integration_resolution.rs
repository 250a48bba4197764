//! End-to-end resolution against reference files laid out like the
//! download cache

use nuts_resolver::cli::{self, FileJob, OutputFormat};
use nuts_resolver::constants::{NUTS1_OUTPUT_COLUMN, NUTS2_OUTPUT_COLUMN, NUTS3_OUTPUT_COLUMN};
use nuts_resolver::{NutsError, NutsResolver, ReferenceLayout, ResolverConfig, Strategy};
use polars::prelude::*;
use rust_xlsxwriter::Workbook;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use ::zip::ZipWriter;
use ::zip::write::SimpleFileOptions;

const REGIONS: &[(&str, &str, [f64; 4])] = &[
    ("FR", "FR101", [2.0, 48.0, 3.0, 49.0]),
    ("FR", "FR102", [3.0, 48.0, 4.0, 49.0]),
    ("DE", "DE300", [13.0, 52.3, 13.8, 52.7]),
];

fn write_postcodes(layout: &ReferenceLayout) {
    let dir = layout.postcode_dir_path();
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("pc2016_de_NUTS-2016_v3.0.csv"),
        "CODE;NUTS3\n'10115';'DE300'\n'01067';'DED21'\n",
    )
    .unwrap();
}

fn write_lau_workbook(layout: &ReferenceLayout) {
    let path = layout.lau_workbook_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("DE").unwrap();
    for (col, header) in ["NUTS 3 CODE", "LAU CODE", "LAU NAME NATIONAL", "LAU NAME LATIN"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_string(1, 0, "DE300").unwrap();
    sheet.write_string(1, 1, "11000000").unwrap();
    sheet.write_string(1, 2, "Berlin, Stadt").unwrap();
    sheet.write_string(1, 3, "Berlin").unwrap();
    workbook.save(&path).unwrap();
}

/// Write a real shapefile of square regions and pack it like the Eurostat
/// download: a zip holding a zipped shapefile
fn write_boundaries(layout: &ReferenceLayout, scratch: &Path) {
    let shp_path = scratch.join(&layout.shapefile);
    let table = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("FID").unwrap(), 5)
        .add_character_field(FieldName::try_from("CNTR_CODE").unwrap(), 2);
    let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();

    for (country, code, [min_lon, min_lat, max_lon, max_lat]) in REGIONS {
        let polygon = Polygon::new(PolygonRing::Outer(vec![
            Point::new(*min_lon, *min_lat),
            Point::new(*min_lon, *max_lat),
            Point::new(*max_lon, *max_lat),
            Point::new(*max_lon, *min_lat),
            Point::new(*min_lon, *min_lat),
        ]));
        let mut record = Record::default();
        record.insert("FID".to_string(), FieldValue::Character(Some(code.to_string())));
        record.insert(
            "CNTR_CODE".to_string(),
            FieldValue::Character(Some(country.to_string())),
        );
        writer.write_shape_and_record(&polygon, &record).unwrap();
    }
    drop(writer);

    let mut inner = ZipWriter::new(Cursor::new(Vec::new()));
    for extension in ["shp", "shx", "dbf"] {
        let part = shp_path.with_extension(extension);
        let name = part.file_name().unwrap().to_str().unwrap().to_string();
        inner.start_file(name, SimpleFileOptions::default()).unwrap();
        inner.write_all(&fs::read(&part).unwrap()).unwrap();
    }
    let inner_bytes = inner.finish().unwrap().into_inner();

    let archive = layout.boundary_archive_path();
    fs::create_dir_all(archive.parent().unwrap()).unwrap();
    let mut outer = ZipWriter::new(File::create(&archive).unwrap());
    outer
        .start_file(layout.inner_archive.as_str(), SimpleFileOptions::default())
        .unwrap();
    outer.write_all(&inner_bytes).unwrap();
    outer.finish().unwrap();
}

/// Cache directory holding all three reference datasets
fn reference_cache(temp_dir: &TempDir) -> ReferenceLayout {
    let layout = ReferenceLayout::default().with_cache_dir(temp_dir.path().join("cache"));
    let scratch = temp_dir.path().join("scratch");
    fs::create_dir_all(&scratch).unwrap();

    write_postcodes(&layout);
    write_lau_workbook(&layout);
    write_boundaries(&layout, &scratch);
    layout
}

fn german_records() -> DataFrame {
    df!(
        "name" => ["by postcode", "by municipality code", "unknown"],
        "postcode" => [Some("10115"), None, None],
        "municipality" => [None::<&str>, None, None],
        "municipality_code" => [None, Some("11000000"), None],
        "lat" => [None::<f64>, None, None],
        "lon" => [None::<f64>, None, None],
    )
    .unwrap()
}

fn french_records() -> DataFrame {
    df!(
        "name" => ["inside FR101", "inside FR102"],
        "postcode" => [None::<&str>, None],
        "municipality" => [None::<&str>, None],
        "municipality_code" => [None::<&str>, None],
        "lat" => [48.5, 48.2],
        "lon" => [2.5, 3.7],
    )
    .unwrap()
}

fn strings(frame: &DataFrame, column: &str) -> Vec<Option<String>> {
    frame
        .column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect()
}

#[test]
fn test_end_to_end_resolution() {
    let temp_dir = TempDir::new().unwrap();
    let layout = reference_cache(&temp_dir);
    let resolver = NutsResolver::from_layout(ResolverConfig::default(), layout);

    let german = resolver.resolve(&german_records(), "DE").unwrap();
    assert_eq!(german.frame.height(), 3);
    assert_eq!(
        strings(&german.frame, NUTS3_OUTPUT_COLUMN),
        vec![Some("DE300".to_string()), Some("DE300".to_string()), None]
    );
    assert_eq!(
        strings(&german.frame, NUTS2_OUTPUT_COLUMN),
        vec![Some("DE30".to_string()), Some("DE30".to_string()), None]
    );
    assert_eq!(
        strings(&german.frame, NUTS1_OUTPUT_COLUMN),
        vec![Some("DE3".to_string()), Some("DE3".to_string()), None]
    );
    assert_eq!(german.report.resolved_by(Strategy::Postcode), 1);
    assert_eq!(german.report.resolved_by(Strategy::MunicipalityCode), 1);
    assert_eq!(german.report.unresolved, 1);

    // No German row has coordinates, so boundaries are only read for France
    assert!(!resolver.store().boundaries_loaded());

    let french = resolver.resolve(&french_records(), "FR").unwrap();
    assert_eq!(
        strings(&french.frame, NUTS3_OUTPUT_COLUMN),
        vec![Some("FR101".to_string()), Some("FR102".to_string())]
    );
    assert_eq!(french.report.stages.len(), 1);
    assert!(resolver.store().boundaries_loaded());

    let boundaries = resolver.store().boundaries().unwrap();
    assert_eq!(boundaries.countries(), vec!["DE", "FR"]);
    assert_eq!(boundaries.region_count(), 3);
}

#[test]
fn test_countries_resolved_concurrently() {
    let temp_dir = TempDir::new().unwrap();
    let layout = reference_cache(&temp_dir);
    let resolver = Arc::new(NutsResolver::from_layout(ResolverConfig::default(), layout));

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                scope.spawn(move || {
                    if i % 2 == 0 {
                        let resolution = resolver.resolve(&german_records(), "DE").unwrap();
                        strings(&resolution.frame, NUTS3_OUTPUT_COLUMN)[0].clone()
                    } else {
                        let resolution = resolver.resolve(&french_records(), "FR").unwrap();
                        strings(&resolution.frame, NUTS3_OUTPUT_COLUMN)[0].clone()
                    }
                })
            })
            .collect();

        let codes: Vec<Option<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            codes,
            vec![
                Some("DE300".to_string()),
                Some("FR101".to_string()),
                Some("DE300".to_string()),
                Some("FR101".to_string())
            ]
        );
    });

    assert_eq!(resolver.store().cached_postcode_countries(), vec!["DE"]);
}

#[test]
fn test_missing_reference_data() {
    let temp_dir = TempDir::new().unwrap();
    let layout = reference_cache(&temp_dir);
    let resolver = NutsResolver::from_layout(ResolverConfig::default(), layout);

    // Coordinates in a country absent from the boundary set
    let italian = df!("lat" => [45.46], "lon" => [9.19]).unwrap();
    let err = resolver.resolve_with(&italian, "IT", &["latlon"]).unwrap_err();
    assert!(matches!(err, NutsError::NoRegionData { .. }));

    // No postcode table for Italy in the cache
    let italian = df!("postcode" => ["20121"]).unwrap();
    let err = resolver.resolve_with(&italian, "IT", &["postcode"]).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_resolve_file_writes_output() {
    let temp_dir = TempDir::new().unwrap();
    let layout = reference_cache(&temp_dir);
    let config = ResolverConfig::default().with_strategies(&["postcode", "municipality_code"]);
    let resolver = NutsResolver::from_layout(config, layout);

    let input = temp_dir.path().join("de_plants.csv");
    fs::write(
        &input,
        "name,postcode,municipality_code,capacity\na,10115,,1.5\nb,,11000000,2.0\nc,99999,,3.0\n",
    )
    .unwrap();

    let job = FileJob {
        input: input.clone(),
        output: temp_dir.path().join("out").join("de_plants_nuts.csv"),
        country: "DE".to_string(),
    };
    let summary = cli::resolve_file(&resolver, &job, OutputFormat::Csv).unwrap();
    assert_eq!(summary.report.total_records, 3);
    assert_eq!(summary.report.unresolved, 1);

    let written = cli::read_records(&job.output).unwrap();
    assert_eq!(written.height(), 3);
    assert_eq!(
        strings(&written, NUTS3_OUTPUT_COLUMN),
        vec![Some("DE300".to_string()), Some("DE300".to_string()), None]
    );
    assert_eq!(
        written
            .get_column_names()
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>(),
        vec![
            "name",
            "postcode",
            "municipality_code",
            "capacity",
            NUTS3_OUTPUT_COLUMN,
            NUTS2_OUTPUT_COLUMN,
            NUTS1_OUTPUT_COLUMN
        ]
    );
}
