use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

/// Which side of the local/remote reconciliation to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Local,
    Remote,
    Missing,
    All,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Local => write!(f, "local"),
            FilterMode::Remote => write!(f, "remote"),
            FilterMode::Missing => write!(f, "missing"),
            FilterMode::All => write!(f, "all"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = ScoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(FilterMode::Local),
            "remote" => Ok(FilterMode::Remote),
            "missing" => Ok(FilterMode::Missing),
            "all" => Ok(FilterMode::All),
            other => Err(ScoutError::InvalidFilter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    List,
    Facets,
    Stats,
}

/// One searchable metadata dimension of a project.
#[derive(Debug, Clone, Copy)]
pub struct FacetDef {
    pub name: &'static str,
    /// Legacy CLI flag names kept from earlier releases.
    pub aliases: &'static [&'static str],
}

impl FacetDef {
    const fn plain(name: &'static str) -> Self {
        Self { name, aliases: &[] }
    }

    const fn aliased(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }
}

/// Post-processing applied to remote results after the paged fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcess {
    None,
    /// The upstream identifier omits the variable and one record may list
    /// several variables. Explode to one row per variable, suffix the
    /// identifier with the variable name, and re-apply any variable filter.
    ExplodeVariable { facet: &'static str },
}

/// Immutable per-project search configuration.
///
/// Replaces the project subclasses of earlier revisions: one engine,
/// parameterized by this record.
#[derive(Debug, Clone, Copy)]
pub struct ProjectConfig {
    /// CLI subcommand and config key.
    pub name: &'static str,
    /// Project name understood by the ESGF search API.
    pub esgf_project: &'static str,
    pub facets: &'static [FacetDef],
    pub post_process: PostProcess,
}

impl ProjectConfig {
    pub fn facet_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.facets.iter().map(|f| f.name)
    }

    pub fn has_facet(&self, name: &str) -> bool {
        self.facets.iter().any(|f| f.name == name)
    }
}

pub const CMIP6: ProjectConfig = ProjectConfig {
    name: "cmip6",
    esgf_project: "CMIP6",
    facets: &[
        FacetDef::plain("activity_id"),
        FacetDef::plain("institution_id"),
        FacetDef::aliased("source_id", &["model"]),
        FacetDef::plain("experiment_id"),
        FacetDef::plain("member_id"),
        FacetDef::plain("table_id"),
        FacetDef::plain("frequency"),
        FacetDef::plain("realm"),
        FacetDef::plain("variable_id"),
    ],
    post_process: PostProcess::None,
};

pub const CMIP5: ProjectConfig = ProjectConfig {
    name: "cmip5",
    esgf_project: "CMIP5",
    facets: &[
        FacetDef::plain("institute"),
        FacetDef::plain("model"),
        FacetDef::plain("experiment"),
        FacetDef::plain("ensemble"),
        FacetDef::aliased("cmor_table", &["table"]),
        FacetDef::aliased("time_frequency", &["frequency"]),
        FacetDef::plain("realm"),
        FacetDef::plain("variable"),
    ],
    post_process: PostProcess::ExplodeVariable { facet: "variable" },
};

pub const CORDEX: ProjectConfig = ProjectConfig {
    name: "cordex",
    esgf_project: "CORDEX",
    facets: &[
        FacetDef::plain("institute"),
        FacetDef::plain("experiment"),
        FacetDef::plain("ensemble"),
        FacetDef::plain("domain"),
        FacetDef::plain("rcm_name"),
        FacetDef::plain("rcm_version"),
        FacetDef::plain("driving_model"),
        FacetDef::aliased("time_frequency", &["frequency"]),
        FacetDef::plain("variable"),
    ],
    post_process: PostProcess::None,
};

pub const ALL_PROJECTS: &[ProjectConfig] = &[CMIP6, CMIP5, CORDEX];

pub fn project_by_name(name: &str) -> Option<ProjectConfig> {
    ALL_PROJECTS.iter().copied().find(|p| p.name == name)
}

/// Requested facet values, facet name -> one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetFilters(BTreeMap<String, Vec<String>>);

impl FacetFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.0.insert(name.into(), values);
    }

    pub fn with(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.insert(name, values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(|v| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
