use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;

use crate::domain::FacetFilters;
use crate::error::ScoutError;
use crate::table::{FacetValue, ResultRow, ResultTable};

/// One per-file catalogue entry, column name -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub values: BTreeMap<String, String>,
}

impl FileRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// An externally maintained index of climate files on the filesystem.
///
/// The catalogue supplies its own grouping metadata: the column list whose
/// values make up the dataset identifier, and the column holding each file's
/// path.
pub trait LocalCatalogue {
    fn group_keys(&self) -> &[String];
    fn path_column(&self) -> &str;
    fn search(&self, filters: &FacetFilters) -> Result<Vec<FileRecord>, ScoutError>;
}

/// Datastore descriptor sitting next to the catalogue CSV, in the intake-esm
/// layout.
#[derive(Debug, Deserialize)]
struct Descriptor {
    catalog_file: String,
    assets: DescriptorAssets,
    aggregation_control: DescriptorAggregation,
}

#[derive(Debug, Deserialize)]
struct DescriptorAssets {
    column_name: String,
}

#[derive(Debug, Deserialize)]
struct DescriptorAggregation {
    groupby_attrs: Vec<String>,
}

/// File-level catalogue backed by a CSV table plus a JSON descriptor.
#[derive(Debug)]
pub struct CsvCatalogue {
    group_keys: Vec<String>,
    path_column: String,
    records: Vec<FileRecord>,
}

impl CsvCatalogue {
    /// Load a catalogue from its descriptor. The catalogue CSV path in the
    /// descriptor is resolved relative to the descriptor's directory.
    pub fn open(descriptor_path: &Path) -> Result<Self, ScoutError> {
        let text = fs::read_to_string(descriptor_path)
            .map_err(|_| ScoutError::CatalogueRead(descriptor_path.to_path_buf()))?;
        let descriptor: Descriptor = serde_json::from_str(&text)
            .map_err(|err| ScoutError::CatalogueParse(err.to_string()))?;

        let csv_path = descriptor_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&descriptor.catalog_file);
        let mut reader = csv::Reader::from_path(&csv_path)
            .map_err(|err| ScoutError::CatalogueCsv(csv_path.clone(), err.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| ScoutError::CatalogueCsv(csv_path.clone(), err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if !headers.iter().any(|h| h == &descriptor.assets.column_name) {
            return Err(ScoutError::MissingColumn(descriptor.assets.column_name));
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|err| ScoutError::CatalogueCsv(csv_path.clone(), err.to_string()))?;
            let values = headers
                .iter()
                .cloned()
                .zip(row.iter().map(str::to_string))
                .collect();
            records.push(FileRecord { values });
        }

        Ok(Self {
            group_keys: descriptor.aggregation_control.groupby_attrs,
            path_column: descriptor.assets.column_name,
            records,
        })
    }
}

impl LocalCatalogue for CsvCatalogue {
    fn group_keys(&self) -> &[String] {
        &self.group_keys
    }

    fn path_column(&self) -> &str {
        &self.path_column
    }

    fn search(&self, filters: &FacetFilters) -> Result<Vec<FileRecord>, ScoutError> {
        let mut matchers = Vec::new();
        for (facet, values) in filters.iter() {
            let matcher = ValueMatcher::new(values).map_err(ScoutError::CatalogueParse)?;
            matchers.push((facet, matcher));
        }

        let mut out = Vec::new();
        'records: for record in &self.records {
            for (facet, matcher) in &matchers {
                let Some(value) = record.get(facet) else {
                    return Err(ScoutError::MissingColumn(facet.to_string()));
                };
                if !matcher.matches(value) {
                    continue 'records;
                }
            }
            out.push(record.clone());
        }
        Ok(out)
    }
}

/// Matches a column value against requested values, with `*` and `?`
/// wildcard support.
struct ValueMatcher {
    exact: Vec<String>,
    patterns: Vec<Regex>,
}

impl ValueMatcher {
    fn new(values: &[String]) -> Result<Self, String> {
        let mut exact = Vec::new();
        let mut patterns = Vec::new();
        for value in values {
            if value.contains(['*', '?']) {
                let pattern = format!(
                    "^{}$",
                    regex::escape(value).replace("\\*", ".*").replace("\\?", ".")
                );
                patterns.push(Regex::new(&pattern).map_err(|err| err.to_string())?);
            } else {
                exact.push(value.clone());
            }
        }
        Ok(Self { exact, patterns })
    }

    fn matches(&self, value: &str) -> bool {
        self.exact.iter().any(|v| v == value)
            || self.patterns.iter().any(|p| p.is_match(value))
    }
}

/// Collapse per-file records to one row per dataset.
///
/// Records are grouped by the full identifier-key column list, keeping the
/// first record per group; file-level replicates within a dataset collapse
/// to one row. The row's path is the containing directory of the
/// representative file.
pub fn group_datasets(
    records: &[FileRecord],
    group_keys: &[String],
    path_column: &str,
) -> Result<ResultTable, ScoutError> {
    let mut columns: Vec<String> = group_keys.to_vec();
    columns.push("path".to_string());
    let mut table = ResultTable::new(columns);

    for record in records {
        let mut key_parts = Vec::with_capacity(group_keys.len());
        for key in group_keys {
            let Some(value) = record.get(key) else {
                return Err(ScoutError::MissingColumn(key.clone()));
            };
            key_parts.push(value);
        }
        let id = key_parts.join(".");
        if table.contains(&id) {
            continue;
        }

        let Some(file_path) = record.get(path_column) else {
            return Err(ScoutError::MissingColumn(path_column.to_string()));
        };
        let dir = Utf8Path::new(file_path)
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from(""));

        let mut row = ResultRow::new(id);
        for (column, value) in &record.values {
            if column == path_column {
                continue;
            }
            row.values
                .insert(column.clone(), FacetValue::One(value.clone()));
        }
        row.path = Some(dir);
        table.insert(row);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record(pairs: &[(&str, &str)]) -> FileRecord {
        FileRecord {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grouping_collapses_file_replicates() {
        let records = vec![
            record(&[
                ("model", "ACCESS-CM2"),
                ("variable", "tas"),
                ("path", "/data/tas/v1/tas_1850.nc"),
            ]),
            record(&[
                ("model", "ACCESS-CM2"),
                ("variable", "tas"),
                ("path", "/data/tas/v1/tas_1900.nc"),
            ]),
            record(&[
                ("model", "ACCESS-CM2"),
                ("variable", "pr"),
                ("path", "/data/pr/v1/pr_1850.nc"),
            ]),
        ];

        let table = group_datasets(&records, &keys(&["model", "variable"]), "path").unwrap();
        assert_eq!(table.len(), 2);

        let tas = table.get("ACCESS-CM2.tas").unwrap();
        assert_eq!(tas.path.as_deref(), Some(Utf8Path::new("/data/tas/v1")));
        assert_eq!(
            tas.value("variable"),
            Some(&FacetValue::One("tas".to_string()))
        );
    }

    #[test]
    fn grouping_requires_key_columns() {
        let records = vec![record(&[("model", "ACCESS-CM2"), ("path", "/data/x.nc")])];
        let err = group_datasets(&records, &keys(&["model", "variable"]), "path").unwrap_err();
        assert_matches!(err, ScoutError::MissingColumn(col) if col == "variable");
    }

    #[test]
    fn wildcard_matching() {
        let matcher = ValueMatcher::new(&["ACCESS*".to_string()]).unwrap();
        assert!(matcher.matches("ACCESS-CM2"));
        assert!(!matcher.matches("EC-Earth3"));

        let exact = ValueMatcher::new(&["tas".to_string(), "pr".to_string()]).unwrap();
        assert!(exact.matches("pr"));
        assert!(!exact.matches("tasmax"));
    }
}
