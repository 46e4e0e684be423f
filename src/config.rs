use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ScoutError;
use crate::esgf;

/// On-disk tool configuration, `esgf-scout.json`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub search_endpoint: Option<String>,
    /// Project name -> local catalogue descriptor path.
    #[serde(default)]
    pub catalogues: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub search_endpoint: String,
    pub catalogues: BTreeMap<String, PathBuf>,
}

impl ResolvedConfig {
    pub fn catalogue_for(&self, project: &str) -> Option<&Path> {
        self.catalogues.get(project).map(PathBuf::as_path)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an explicit path or `esgf-scout.json` in the
    /// working directory. An absent default file means defaults; an absent
    /// explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ScoutError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("esgf-scout.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ScoutError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ScoutError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ScoutError> {
        Ok(ResolvedConfig {
            search_endpoint: config
                .search_endpoint
                .unwrap_or_else(|| esgf::DEFAULT_ENDPOINT.to_string()),
            catalogues: config
                .catalogues
                .into_iter()
                .map(|(project, path)| (project, PathBuf::from(path)))
                .collect(),
        })
    }
}
