use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScoutError {
    #[error("bad filter name '{0}'")]
    InvalidFilter(String),

    #[error("invalid facet names for {project}: {names:?}")]
    UnknownFacets { project: String, names: Vec<String> },

    #[error("no local catalogue configured for project {0}")]
    MissingCatalogue(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read catalogue descriptor at {0}")]
    CatalogueRead(PathBuf),

    #[error("failed to parse catalogue descriptor: {0}")]
    CatalogueParse(String),

    #[error("failed to read catalogue file at {0}: {1}")]
    CatalogueCsv(PathBuf, String),

    #[error("catalogue is missing column '{0}'")]
    MissingColumn(String),

    #[error("ESGF request failed: {0}")]
    EsgfHttp(String),

    #[error("ESGF returned status {status}: {message}")]
    EsgfStatus { status: u16, message: String },

    #[error("failed to parse ESGF response: {0}")]
    EsgfParse(String),

    #[error("failed to load facet vocabulary: {0}")]
    VocabularyLoad(String),

    #[error("failed to write CSV output: {0}")]
    CsvWrite(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
