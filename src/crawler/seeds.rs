//! Seed keyword loading
//!
//! Seeds come from a JSON file of the form `{"keywords": ["ffmpeg", ...]}`.
//! Any failure here is fatal: a crawl never starts without seeds.

use crate::SeedError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SeedFile {
    keywords: Vec<String>,
}

/// Loads the ordered list of search keywords
///
/// Blank entries are dropped and surrounding whitespace is trimmed; order is
/// preserved.
///
/// # Returns
///
/// * `Ok(Vec<String>)` - At least one keyword
/// * `Err(SeedError)` - The file is unreadable, malformed, or has no keywords
pub fn load_seeds(path: &Path) -> Result<Vec<String>, SeedError> {
    let shown = path.display().to_string();

    let content = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: shown.clone(),
        source,
    })?;

    let seeds: SeedFile = serde_json::from_str(&content).map_err(|source| SeedError::Parse {
        path: shown.clone(),
        source,
    })?;

    let keywords: Vec<String> = seeds
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    if keywords.is_empty() {
        return Err(SeedError::Empty(shown));
    }

    tracing::info!("Loaded {} seed keywords from {}", keywords.len(), shown);
    Ok(keywords)
}
