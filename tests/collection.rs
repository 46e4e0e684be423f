use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8Path;
use serde_json::json;

use esgf_scout::collection::Collection;
use esgf_scout::domain::{CMIP5, CMIP6, FacetFilters, FilterMode};
use esgf_scout::error::ScoutError;
use esgf_scout::esgf::{EsgfApi, Page, Query};
use esgf_scout::local::{FileRecord, LocalCatalogue};
use esgf_scout::vocab::Vocabulary;

/// Remote index fixture: every dataset fits one page.
struct MockRemote {
    docs: Vec<serde_json::Value>,
    calls: Arc<Mutex<usize>>,
}

impl MockRemote {
    fn new(docs: Vec<serde_json::Value>) -> (Self, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        (
            Self {
                docs,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl EsgfApi for MockRemote {
    fn query(&self, _query: &Query) -> Result<Page, ScoutError> {
        *self.calls.lock().unwrap() += 1;
        Ok(Page {
            num_found: self.docs.len() as u64,
            docs: self
                .docs
                .iter()
                .map(|doc| doc.as_object().unwrap().clone())
                .collect(),
            facet_fields: BTreeMap::new(),
        })
    }
}

/// Remote that must never be reached.
struct UnreachableRemote;

impl EsgfApi for UnreachableRemote {
    fn query(&self, _query: &Query) -> Result<Page, ScoutError> {
        panic!("remote index queried in a local-only search");
    }
}

/// Local catalogue fixture keyed by a single `id` column.
struct MockLocal {
    records: Vec<FileRecord>,
    group_keys: Vec<String>,
    calls: Arc<Mutex<usize>>,
}

impl MockLocal {
    fn new(entries: &[(&str, &str)]) -> (Self, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        let records = entries
            .iter()
            .map(|(id, file)| FileRecord {
                values: BTreeMap::from([
                    ("id".to_string(), id.to_string()),
                    ("file".to_string(), file.to_string()),
                ]),
            })
            .collect();
        (
            Self {
                records,
                group_keys: vec!["id".to_string()],
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl LocalCatalogue for MockLocal {
    fn group_keys(&self) -> &[String] {
        &self.group_keys
    }

    fn path_column(&self) -> &str {
        "file"
    }

    fn search(&self, _filters: &FacetFilters) -> Result<Vec<FileRecord>, ScoutError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.records.clone())
    }
}

fn reconciliation_fixture() -> (
    Collection<MockLocal, MockRemote>,
    Arc<Mutex<usize>>,
    Arc<Mutex<usize>>,
) {
    let (local, local_calls) = MockLocal::new(&[("1", "a/part1.nc"), ("2", "b/part1.nc")]);
    let (remote, remote_calls) = MockRemote::new(vec![
        json!({"instance_id": "2"}),
        json!({"instance_id": "3"}),
    ]);
    let collection = Collection::new(CMIP6, remote, Some(local), Arc::new(Vocabulary::new()));
    (collection, local_calls, remote_calls)
}

fn ids(table: &esgf_scout::table::ResultTable) -> Vec<&str> {
    table.ids().into_iter().collect()
}

#[test]
fn filter_local_returns_local_rows_only() {
    let (collection, _local_calls, remote_calls) = reconciliation_fixture();
    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::Local)
        .unwrap();

    assert_eq!(ids(&table), vec!["1", "2"]);
    assert_eq!(*remote_calls.lock().unwrap(), 0);
}

#[test]
fn filter_local_never_queries_remote() {
    let (local, _) = MockLocal::new(&[("1", "a/part1.nc")]);
    let collection = Collection::new(
        CMIP6,
        UnreachableRemote,
        Some(local),
        Arc::new(Vocabulary::new()),
    );
    collection
        .catalogue(&FacetFilters::new(), FilterMode::Local)
        .unwrap();
}

#[test]
fn filter_remote_returns_remote_rows_only() {
    let (collection, local_calls, remote_calls) = reconciliation_fixture();
    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::Remote)
        .unwrap();

    assert_eq!(ids(&table), vec!["2", "3"]);
    assert_eq!(*local_calls.lock().unwrap(), 0);
    assert_eq!(*remote_calls.lock().unwrap(), 1);
    assert!(table.rows().all(|row| row.path.is_none()));
}

#[test]
fn filter_missing_is_remote_minus_local() {
    let (collection, local_calls, remote_calls) = reconciliation_fixture();
    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::Missing)
        .unwrap();

    assert_eq!(ids(&table), vec!["3"]);
    assert_eq!(*local_calls.lock().unwrap(), 1);
    assert_eq!(*remote_calls.lock().unwrap(), 1);
}

#[test]
fn filter_all_unions_with_local_precedence() {
    let (collection, _, _) = reconciliation_fixture();
    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::All)
        .unwrap();

    assert_eq!(ids(&table), vec!["1", "2", "3"]);
    // The dataset known to both sources keeps its local row and path.
    assert_eq!(
        table.get("2").unwrap().path.as_deref(),
        Some(Utf8Path::new("b"))
    );
    assert!(table.get("3").unwrap().path.is_none());
}

#[test]
fn missing_catalogue_is_a_configuration_error() {
    let (remote, _) = MockRemote::new(vec![]);
    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP6, remote, None, Arc::new(Vocabulary::new()));

    let err = collection
        .catalogue(&FacetFilters::new(), FilterMode::All)
        .unwrap_err();
    assert_matches!(err, ScoutError::MissingCatalogue(project) if project == "cmip6");
}

#[test]
fn unknown_facet_name_aborts_before_any_query() {
    let (collection, local_calls, remote_calls) = reconciliation_fixture();
    let filters = FacetFilters::new().with("variable", &["tas"]);

    let err = collection.catalogue(&filters, FilterMode::All).unwrap_err();
    assert_matches!(err, ScoutError::UnknownFacets { .. });
    assert_eq!(*local_calls.lock().unwrap(), 0);
    assert_eq!(*remote_calls.lock().unwrap(), 0);
}

#[test]
fn empty_remote_result_is_a_well_formed_table() {
    let (remote, _) = MockRemote::new(vec![]);
    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP6, remote, None, Arc::new(Vocabulary::new()));

    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::Remote)
        .unwrap();
    assert!(table.is_empty());
    assert!(table.columns().contains(&"variable_id".to_string()));
    assert!(table.columns().contains(&"path".to_string()));
}

#[test]
fn remote_cmip6_builds_dataset_identifier() {
    let (remote, _) = MockRemote::new(vec![json!({
        "instance_id": ["CMIP6.CMIP.CSIRO-ARCCSS.ACCESS-CM2.historical.r1i1p1f1.Amon.tas.gn.v20191108"],
        "activity_id": ["CMIP"],
        "institution_id": ["CSIRO-ARCCSS"],
        "source_id": ["ACCESS-CM2"],
        "experiment_id": ["historical"],
        "member_id": ["r1i1p1f1"],
        "table_id": ["Amon"],
        "frequency": ["mon"],
        "realm": ["atmos"],
        "variable_id": ["tas"],
        "score": 3.2,
    })]);
    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP6, remote, None, Arc::new(Vocabulary::bundled().unwrap()));

    let filters = FacetFilters::new()
        .with("activity_id", &["CMIP"])
        .with("experiment_id", &["historical"])
        .with("source_id", &["ACCESS-CM2"])
        .with("frequency", &["mon"])
        .with("variable_id", &["tas"])
        .with("member_id", &["r1i1p1f1"]);
    let table = collection.catalogue(&filters, FilterMode::Remote).unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(
        ids(&table),
        vec!["CMIP6.CMIP.CSIRO-ARCCSS.ACCESS-CM2.historical.r1i1p1f1.Amon.tas.gn.v20191108"]
    );
    let row = table.rows().next().unwrap();
    assert!(row.value("score").is_none());
    assert!(row.path.is_none());
}

#[test]
fn cmip5_explodes_variables_into_rows() {
    let (remote, _) = MockRemote::new(vec![json!({
        "instance_id": ["x"],
        "variable": ["a", "b"],
    })]);
    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP5, remote, None, Arc::new(Vocabulary::new()));

    let table = collection
        .catalogue(&FacetFilters::new(), FilterMode::Remote)
        .unwrap();
    assert_eq!(ids(&table), vec!["x.a", "x.b"]);
}

#[test]
fn cmip5_variable_filter_drops_exploded_rows() {
    let (remote, _) = MockRemote::new(vec![json!({
        "instance_id": ["x"],
        "variable": ["a", "b"],
    })]);
    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP5, remote, None, Arc::new(Vocabulary::new()));

    let filters = FacetFilters::new().with("variable", &["b"]);
    let table = collection.catalogue(&filters, FilterMode::Remote).unwrap();
    assert_eq!(ids(&table), vec!["x.b"]);
}

#[test]
fn remote_failure_propagates() {
    struct FailingRemote;
    impl EsgfApi for FailingRemote {
        fn query(&self, _query: &Query) -> Result<Page, ScoutError> {
            Err(ScoutError::EsgfStatus {
                status: 503,
                message: "service unavailable".to_string(),
            })
        }
    }

    let collection: Collection<MockLocal, _> =
        Collection::new(CMIP6, FailingRemote, None, Arc::new(Vocabulary::new()));
    let err = collection
        .catalogue(&FacetFilters::new(), FilterMode::Remote)
        .unwrap_err();
    assert_matches!(err, ScoutError::EsgfStatus { status: 503, .. });
}
