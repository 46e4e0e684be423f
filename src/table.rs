use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use camino::Utf8PathBuf;
use serde::Serialize;

/// A facet value as reported by a source. Remote fields arrive as arrays and
/// are unwrapped to scalars when they hold a single element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FacetValue {
    One(String),
    Many(Vec<String>),
}

impl FacetValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FacetValue::One(v) => Some(v),
            FacetValue::Many(_) => None,
        }
    }

    /// The value(s) as a slice-like iterator regardless of arity.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        match self {
            FacetValue::One(v) => std::slice::from_ref(v).iter(),
            FacetValue::Many(vs) => vs.iter(),
        }
        .map(String::as_str)
    }
}

impl fmt::Display for FacetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetValue::One(v) => write!(f, "{v}"),
            FacetValue::Many(vs) => write!(f, "{}", vs.join(";")),
        }
    }
}

impl From<&str> for FacetValue {
    fn from(value: &str) -> Self {
        FacetValue::One(value.to_string())
    }
}

/// One dataset-level search result, identified by its dot-joined dataset
/// identifier. `path` is set only when the dataset is held locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub id: String,
    pub values: BTreeMap<String, FacetValue>,
    pub path: Option<Utf8PathBuf>,
}

impl ResultRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
            path: None,
        }
    }

    pub fn value(&self, facet: &str) -> Option<&FacetValue> {
        self.values.get(facet)
    }
}

/// Search results keyed by dataset identifier.
///
/// Column order is carried alongside the rows so the presenter and CSV
/// writer can lay out facets in schema order. Row iteration order is the
/// identifier order of the backing map; callers wanting a specific order
/// sort explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: BTreeMap<String, ResultRow>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row; an existing row with the same identifier is replaced.
    pub fn insert(&mut self, row: ResultRow) {
        self.rows.insert(row.id.clone(), row);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ResultRow> {
        self.rows.get(id)
    }

    pub fn ids(&self) -> BTreeSet<&str> {
        self.rows.keys().map(String::as_str).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.values()
    }

    pub fn into_rows(self) -> impl Iterator<Item = ResultRow> {
        self.rows.into_values()
    }

    /// Rows of `self` whose identifier does not appear in `other`.
    pub fn difference(&self, other: &ResultTable) -> ResultTable {
        let mut out = ResultTable::new(self.columns.clone());
        for row in self.rows() {
            if !other.contains(&row.id) {
                out.insert(row.clone());
            }
        }
        out
    }

    /// Union with `self` taking precedence on identifier collisions.
    pub fn union(&self, other: &ResultTable) -> ResultTable {
        let mut columns = self.columns.clone();
        for col in &other.columns {
            if !columns.contains(col) {
                columns.push(col.clone());
            }
        }
        let mut out = ResultTable::new(columns);
        for row in other.rows() {
            out.insert(row.clone());
        }
        for row in self.rows() {
            out.insert(row.clone());
        }
        out
    }
}
