use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{FacetFilters, FilterMode, PostProcess, ProjectConfig};
use crate::error::ScoutError;
use crate::esgf::{EsgfApi, ResultStream};
use crate::local::{LocalCatalogue, group_datasets};
use crate::table::{FacetValue, ResultRow, ResultTable};
use crate::vocab::{Vocabulary, check_facets};

/// Reconciles one project's local holdings against the ESGF index.
///
/// One engine for every project; project differences live in the
/// `ProjectConfig` record, including the CMIP5 variable-explode step.
pub struct Collection<L: LocalCatalogue, A: EsgfApi> {
    project: ProjectConfig,
    remote: A,
    local: Option<L>,
    vocab: Arc<Vocabulary>,
}

impl<L: LocalCatalogue, A: EsgfApi> Collection<L, A> {
    pub fn new(
        project: ProjectConfig,
        remote: A,
        local: Option<L>,
        vocab: Arc<Vocabulary>,
    ) -> Self {
        Self {
            project,
            remote,
            local,
            vocab,
        }
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// Filtered search results across both sources.
    ///
    /// - `local`: local catalogue only; the remote index is never queried.
    /// - `remote`: remote index only; the local catalogue is never queried.
    /// - `missing`: remote datasets whose identifier has no local row.
    /// - `all`: local rows plus the missing set. A dataset known to both
    ///   sources keeps its local row with its real path.
    pub fn catalogue(
        &self,
        filters: &FacetFilters,
        mode: FilterMode,
    ) -> Result<ResultTable, ScoutError> {
        match mode {
            FilterMode::Local => self.local_catalogue(filters),
            FilterMode::Remote => self.remote_catalogue(filters),
            FilterMode::Missing => {
                let local = self.local_catalogue(filters)?;
                let remote = self.remote_catalogue(filters)?;
                Ok(remote.difference(&local))
            }
            FilterMode::All => {
                let local = self.local_catalogue(filters)?;
                let remote = self.remote_catalogue(filters)?;
                let missing = remote.difference(&local);
                Ok(local.union(&missing))
            }
        }
    }

    /// Dataset-level rows from the local file catalogue.
    pub fn local_catalogue(&self, filters: &FacetFilters) -> Result<ResultTable, ScoutError> {
        info!("searching local catalogue");
        check_facets(&self.project, &self.vocab, filters)?;

        let catalogue = self
            .local
            .as_ref()
            .ok_or_else(|| ScoutError::MissingCatalogue(self.project.name.to_string()))?;
        let records = catalogue.search(filters)?;
        group_datasets(&records, catalogue.group_keys(), catalogue.path_column())
    }

    /// Dataset rows published on the ESGF index. Rows carry no path.
    pub fn remote_catalogue(&self, filters: &FacetFilters) -> Result<ResultTable, ScoutError> {
        info!("searching ESGF catalogue");
        check_facets(&self.project, &self.vocab, filters)?;

        let mut fields: Vec<String> = vec!["instance_id".to_string()];
        fields.extend(self.project.facet_names().map(str::to_string));

        let mut columns: Vec<String> =
            self.project.facet_names().map(str::to_string).collect();
        columns.push("path".to_string());
        let mut table = ResultTable::new(columns);

        let stream = ResultStream::new(
            &self.remote,
            self.project.esgf_project,
            fields,
            filters.clone(),
        );
        for record in stream {
            let mut record = record?;
            let id = match record.remove("instance_id") {
                Some(FacetValue::One(id)) => id,
                _ => {
                    return Err(ScoutError::EsgfParse(
                        "search record is missing instance_id".to_string(),
                    ));
                }
            };
            let mut row = ResultRow::new(id);
            row.values = record;
            table.insert(row);
        }

        if table.is_empty() {
            warn!("no matches on ESGF");
        }

        match self.project.post_process {
            PostProcess::None => Ok(table),
            PostProcess::ExplodeVariable { facet } => {
                Ok(explode_variable(table, facet, filters.get(facet)))
            }
        }
    }
}

/// One row per variable for projects whose upstream identifier omits the
/// variable. The variable name joins the identifier; when the caller
/// filtered on the facet, exploded rows outside the requested set are
/// dropped so an "all variables" record cannot leak into a scoped query.
fn explode_variable(
    table: ResultTable,
    facet: &str,
    requested: Option<&[String]>,
) -> ResultTable {
    let mut out = ResultTable::new(table.columns().to_vec());
    for row in table.into_rows() {
        let Some(value) = row.values.get(facet).cloned() else {
            out.insert(row);
            continue;
        };
        for variable in value.values() {
            if let Some(requested) = requested {
                if !requested.iter().any(|v| v == variable) {
                    continue;
                }
            }
            let mut exploded = row.clone();
            exploded.id = format!("{}.{variable}", row.id);
            exploded
                .values
                .insert(facet.to_string(), FacetValue::One(variable.to_string()));
            out.insert(exploded);
        }
    }
    out
}
