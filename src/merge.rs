//! Lookup tables and the join/merge policy.
//!
//! Record tables are joined against lookup tables one-to-one: every lookup
//! key is indexed once (first occurrence wins) and each record row picks at
//! most one lookup row, so joins never reorder or duplicate records.
//!
//! Lookup columns whose name already exists in the record table arrive with
//! the [`JOIN_SUFFIX`] and are folded back with a single rule: the record
//! value wins when it is non-null, otherwise the lookup value is taken. The
//! suffixed helpers are then dropped so the schema only grows by the
//! resolved field.

use crate::constants::JOIN_SUFFIX;
use crate::error::{NutsError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// String-typed reference table indexed on one or more key columns
#[derive(Debug, Clone)]
pub struct LookupTable {
    name: String,
    frame: DataFrame,
    indexes: HashMap<String, HashMap<String, usize>>,
}

impl LookupTable {
    /// Build a lookup table, casting every column to strings and indexing
    /// the key columns
    pub fn new(name: impl Into<String>, frame: DataFrame, key_columns: &[&str]) -> Result<Self> {
        let name = name.into();
        let mut frame = frame;

        let non_string: Vec<String> = frame
            .get_columns()
            .iter()
            .filter(|column| column.dtype() != &DataType::String)
            .map(|column| column.name().to_string())
            .collect();
        for column_name in non_string {
            let keys = normalized_keys(frame.column(&column_name)?)?;
            frame.with_column(Column::new(column_name.as_str().into(), keys))?;
        }

        let mut indexes = HashMap::new();
        for key in key_columns {
            let column = frame.column(key).map_err(|_| {
                NutsError::configuration(format!(
                    "Lookup table '{}' has no key column '{}'",
                    name, key
                ))
            })?;

            let mut index = HashMap::new();
            let mut duplicates = 0usize;
            for (row, value) in normalized_keys(column)?.into_iter().enumerate() {
                let Some(value) = value else { continue };
                match index.entry(value) {
                    std::collections::hash_map::Entry::Occupied(_) => duplicates += 1,
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(row);
                    }
                }
            }

            if duplicates > 0 {
                warn!(
                    "Lookup table '{}' has {} duplicate keys in column '{}'; keeping first occurrence",
                    name, duplicates, key
                );
            }
            indexes.insert(key.to_string(), index);
        }

        debug!(
            "Built lookup table '{}' with {} rows and {} indexed keys",
            name,
            frame.height(),
            indexes.len()
        );

        Ok(Self {
            name,
            frame,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Number of distinct keys indexed for a column
    pub fn distinct_keys(&self, key_column: &str) -> usize {
        self.indexes.get(key_column).map_or(0, |index| index.len())
    }

    /// Row holding a key, if any
    pub fn find(&self, key_column: &str, key: &str) -> Option<usize> {
        self.indexes.get(key_column)?.get(key).copied()
    }

    /// String value of a column at a lookup row
    pub fn value(&self, column: &str, row: usize) -> Option<&str> {
        self.frame.column(column).ok()?.str().ok()?.get(row)
    }
}

/// Turn a key column of any dtype into trimmed, non-empty strings
///
/// Integral floats lose their fractional part so that a postcode read as
/// `10115.0` still matches `"10115"`.
pub fn normalized_keys(column: &Column) -> Result<Vec<Option<String>>> {
    let keys = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|value| normalize_key(value))
            .collect(),
        DataType::Float32 | DataType::Float64 => {
            let floats = column.cast(&DataType::Float64)?;
            floats
                .f64()?
                .into_iter()
                .map(|value| value.filter(|v| v.is_finite()).map(float_key))
                .collect()
        }
        _ => {
            let strings = column.cast(&DataType::String)?;
            strings
                .str()?
                .into_iter()
                .map(|value| normalize_key(value))
                .collect()
        }
    };
    Ok(keys)
}

fn normalize_key(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn float_key(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Left join of `left` against a lookup table on `left_on` = `right_on`
///
/// Only rows flagged in `active` are matched; other rows receive nulls in
/// every joined column. Each non-key lookup column is appended, suffixed
/// with [`JOIN_SUFFIX`] when the name already exists in `left`. The output
/// has exactly `left.height()` rows in the original order.
pub fn left_join_unique(
    left: &DataFrame,
    left_on: &str,
    table: &LookupTable,
    right_on: &str,
    active: &[bool],
) -> Result<DataFrame> {
    if active.len() != left.height() {
        return Err(NutsError::configuration(format!(
            "Active row mask has {} entries for {} records",
            active.len(),
            left.height()
        )));
    }

    let index = table.indexes.get(right_on).ok_or_else(|| {
        NutsError::configuration(format!(
            "Lookup table '{}' is not indexed on '{}'",
            table.name, right_on
        ))
    })?;

    let keys = normalized_keys(left.column(left_on)?)?;
    let matches: Vec<Option<usize>> = keys
        .iter()
        .zip(active)
        .map(|(key, &is_active)| {
            if is_active {
                key.as_deref().and_then(|k| index.get(k).copied())
            } else {
                None
            }
        })
        .collect();

    let mut joined = left.clone();
    for column in table.frame.get_columns() {
        let name = column.name().as_str();
        if name == right_on {
            continue;
        }

        let values = column.str()?;
        let gathered: Vec<Option<&str>> = matches
            .iter()
            .map(|row| row.and_then(|r| values.get(r)))
            .collect();

        let output_name = if left.get_column_index(name).is_some() {
            format!("{}{}", name, JOIN_SUFFIX)
        } else {
            name.to_string()
        };
        joined.with_column(Column::new(output_name.as_str().into(), gathered))?;
    }

    let matched = matches.iter().filter(|m| m.is_some()).count();
    debug!(
        "Joined {} on {} = {}.{}: {} of {} active rows matched",
        table.name,
        left_on,
        table.name,
        right_on,
        matched,
        active.iter().filter(|a| **a).count()
    );

    Ok(joined)
}

/// Fold suffixed collision columns back into their base column
///
/// For every column `X{suffix}` that is not one of `original_columns` and
/// whose base `X` exists, `X` keeps its value when non-null and takes the
/// suffixed value otherwise. The suffixed column is dropped.
pub fn coalesce_suffixed(
    frame: DataFrame,
    suffix: &str,
    original_columns: &[String],
) -> Result<DataFrame> {
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut exprs = Vec::new();
    let mut helpers = Vec::new();
    for name in &names {
        if original_columns.contains(name) {
            continue;
        }
        let Some(base) = name.strip_suffix(suffix) else {
            continue;
        };
        if !names.iter().any(|n| n == base) {
            continue;
        }

        // Lookup values take the record column's dtype
        let dtype = frame.column(base)?.dtype().clone();
        exprs.push(
            when(col(base).is_not_null())
                .then(col(base))
                .otherwise(col(name.as_str()).cast(dtype))
                .alias(base),
        );
        helpers.push(name.clone());
    }

    let mut merged = if exprs.is_empty() {
        frame
    } else {
        frame.lazy().with_columns(exprs).collect()?
    };

    for helper in &helpers {
        merged = merged.drop(helper)?;
    }

    Ok(merged)
}

/// Join a lookup table and reconcile the result to the record schema plus
/// `target`
pub fn join_and_merge(
    left: &DataFrame,
    left_on: &str,
    table: &LookupTable,
    right_on: &str,
    active: &[bool],
    target: &str,
) -> Result<DataFrame> {
    let original_columns: Vec<String> = left
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let joined = left_join_unique(left, left_on, table, right_on, active)?;
    let merged = coalesce_suffixed(joined, JOIN_SUFFIX, &original_columns)?;

    let mut keep = original_columns;
    if !keep.iter().any(|name| name == target) && merged.get_column_index(target).is_some() {
        keep.push(target.to_string());
    }

    Ok(merged.select(keep)?)
}
