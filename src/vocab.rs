use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{FacetFilters, ProjectConfig};
use crate::error::ScoutError;

/// Similarity cutoff below which a vocabulary value is not suggested.
const CLOSE_MATCH_CUTOFF: f64 = 0.6;
/// At most this many suggestions per mismatched value.
const CLOSE_MATCH_LIMIT: usize = 3;

/// Known facet values per project, `project -> facet -> values`.
///
/// The snapshot is generated offline (`esgf-scout generate-metadata`) from
/// ESGF facet counts and shipped as a gzipped JSON artifact. It is loaded
/// once per process and treated as immutable thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary(BTreeMap<String, BTreeMap<String, Vec<String>>>);

static CACHE: Mutex<Option<Arc<Vocabulary>>> = Mutex::new(None);

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_facet(
        &mut self,
        project: impl Into<String>,
        facet: impl Into<String>,
        values: Vec<String>,
    ) {
        self.0
            .entry(project.into())
            .or_default()
            .insert(facet.into(), values);
    }

    pub fn facet_values(&self, project: &str, facet: &str) -> Option<&[String]> {
        self.0
            .get(project)
            .and_then(|facets| facets.get(facet))
            .map(|v| v.as_slice())
    }

    pub fn from_gzipped_json(bytes: &[u8]) -> Result<Self, ScoutError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut json = String::new();
        decoder
            .read_to_string(&mut json)
            .map_err(|err| ScoutError::VocabularyLoad(err.to_string()))?;
        serde_json::from_str(&json).map_err(|err| ScoutError::VocabularyLoad(err.to_string()))
    }

    pub fn to_gzipped_json(&self) -> Result<Vec<u8>, ScoutError> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let json = serde_json::to_vec(self)
            .map_err(|err| ScoutError::VocabularyLoad(err.to_string()))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|err| ScoutError::VocabularyLoad(err.to_string()))?;
        encoder
            .finish()
            .map_err(|err| ScoutError::VocabularyLoad(err.to_string()))
    }

    pub fn load_file(path: &Path) -> Result<Self, ScoutError> {
        let bytes =
            std::fs::read(path).map_err(|err| ScoutError::VocabularyLoad(err.to_string()))?;
        Self::from_gzipped_json(&bytes)
    }

    /// The snapshot bundled with the binary.
    pub fn bundled() -> Result<Self, ScoutError> {
        Self::from_gzipped_json(include_bytes!("../data/metadata.json.gz"))
    }

    /// Process-wide snapshot, loaded on first use. `ESGF_SCOUT_METADATA`
    /// points at an alternative artifact.
    pub fn cached() -> Result<Arc<Self>, ScoutError> {
        let mut guard = CACHE
            .lock()
            .map_err(|_| ScoutError::VocabularyLoad("vocabulary cache poisoned".to_string()))?;
        if let Some(vocab) = guard.as_ref() {
            return Ok(Arc::clone(vocab));
        }
        let vocab = match std::env::var_os("ESGF_SCOUT_METADATA") {
            Some(path) => Self::load_file(Path::new(&path))?,
            None => Self::bundled()?,
        };
        let vocab = Arc::new(vocab);
        *guard = Some(Arc::clone(&vocab));
        Ok(vocab)
    }

    /// Drop the cached snapshot so the next `cached()` reloads it.
    pub fn reset_cache() {
        if let Ok(mut guard) = CACHE.lock() {
            *guard = None;
        }
    }
}

/// Check requested facet values against the project's known vocabulary.
///
/// Unknown facet *names* are fatal. A value absent from the vocabulary is
/// only warned about, with close matches as suggestions; the backing search
/// service stays the final arbiter of whether a value yields results.
pub fn check_facets(
    project: &ProjectConfig,
    vocab: &Vocabulary,
    filters: &FacetFilters,
) -> Result<(), ScoutError> {
    let unknown: Vec<String> = filters
        .names()
        .filter(|name| !project.has_facet(name))
        .map(str::to_string)
        .collect();
    if !unknown.is_empty() {
        return Err(ScoutError::UnknownFacets {
            project: project.esgf_project.to_string(),
            names: unknown,
        });
    }

    for (facet, values) in filters.iter() {
        let Some(known) = vocab.facet_values(project.esgf_project, facet) else {
            continue;
        };
        for value in values {
            if known.iter().any(|k| k == value) {
                continue;
            }
            let nearest = close_matches(value, known);
            warn!(
                "{}",
                mismatch_message(project.esgf_project, facet, value, &nearest)
            );
        }
    }

    Ok(())
}

pub fn mismatch_message(
    project: &str,
    facet: &str,
    value: &str,
    nearest: &[String],
) -> String {
    format!("No {project} {facet} named {value}, close matches {nearest:?}")
}

/// Vocabulary values most similar to `value`, best first.
///
/// Comparison is case-insensitive; returned values keep their original
/// casing.
pub fn close_matches(value: &str, candidates: &[String]) -> Vec<String> {
    let needle = value.to_lowercase();
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .filter_map(|candidate| {
            let score = similarity(&needle, &candidate.to_lowercase());
            (score >= CLOSE_MATCH_CUTOFF).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(CLOSE_MATCH_LIMIT)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Ratcliff/Obershelp similarity ratio: twice the number of matching
/// characters over the total length of both strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    2.0 * matched as f64 / (a.len() + b.len()) as f64
}

/// Total characters covered by recursively taking the longest common
/// substring and matching the pieces to either side of it.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j])
        + matching_chars(&a[i + len..], &b[j + len..])
}

fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // Lengths of common suffixes ending at the previous row.
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let len = prev[j] + 1;
                current[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = current;
    }
    best
}
