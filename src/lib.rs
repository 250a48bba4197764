//! NUTS Resolver Library
//!
//! Assigns European NUTS administrative regions to renewable power-plant
//! records. Each record is placed in a NUTS-3 region using whichever
//! location data it carries, tried in a configurable order:
//!
//! - coordinates, by point-in-polygon against the NUTS-3 boundaries
//! - postcodes, through the Eurostat postcode-to-NUTS tables
//! - municipality codes and names, through the LAU-to-NUTS workbook
//!
//! The NUTS-2 and NUTS-1 regions are derived from the NUTS-3 code.
//!
//! ```no_run
//! use nuts_resolver::{NutsResolver, ReferenceLayout, ResolverConfig};
//! use polars::prelude::*;
//!
//! # fn main() -> nuts_resolver::Result<()> {
//! let resolver = NutsResolver::from_layout(ResolverConfig::default(), ReferenceLayout::default());
//! let records = df!(
//!     "postcode" => ["10115"],
//!     "municipality" => [None::<&str>],
//!     "municipality_code" => [None::<&str>],
//!     "lat" => [None::<f64>],
//!     "lon" => [None::<f64>],
//! )?;
//! let resolution = resolver.resolve(&records, "DE")?;
//! println!("{}", resolution.frame);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod merge;
pub mod models;
pub mod reference;
pub mod resolver;
pub mod spatial;

pub use config::{ColumnMapping, FileConfig, ReferenceLayout, ResolverConfig};
pub use error::{NutsError, Result};
pub use merge::LookupTable;
pub use models::{LauNameVariant, ResolutionReport, StageOutcome, Strategy};
pub use reference::{CacheLayout, ReferenceLocator, ReferenceStore};
pub use resolver::{NutsResolver, Resolution};
pub use spatial::{BoundarySet, Region};
