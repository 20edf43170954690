//! Document loader.
//!
//! Walks the configured data root and turns every file with a recognized
//! extension into a [`Document`]. Files that cannot be read or parsed are
//! skipped with a warning; only a missing root or an empty result is fatal.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::DataConfig;
use crate::error::{RagError, Result};
use crate::extract::extract_text;
use crate::models::{Document, DocumentFormat};

/// A file that was matched but not loaded.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of a load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    /// Loaded document count per format, for the startup summary.
    pub fn counts_by_format(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.documents {
            *counts.entry(doc.format.label()).or_insert(0) += 1;
        }
        counts
    }
}

pub fn load_documents(config: &DataConfig) -> Result<LoadReport> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(RagError::MissingDataDir(root.display().to_string()));
    }

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let wanted: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut report = LoadReport::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                skip(&mut report, path, e.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if exclude_set.is_match(&relative) {
            continue;
        }

        let Some(ext) = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
        else {
            continue;
        };
        if !wanted.contains(&ext) {
            continue;
        }
        let Some(format) = DocumentFormat::from_extension(&ext) else {
            continue;
        };

        match read_document(path, &relative, format, config.max_file_bytes) {
            Ok(doc) => {
                tracing::debug!(source = %doc.source, format = doc.format.label(), "loaded document");
                report.documents.push(doc);
            }
            Err(reason) => skip(&mut report, relative, reason),
        }
    }

    if report.documents.is_empty() {
        return Err(RagError::NoDocuments(root.display().to_string()));
    }

    for (format, count) in report.counts_by_format() {
        tracing::info!("Loaded {} {} documents.", count, format);
    }
    if !report.skipped.is_empty() {
        tracing::warn!("Skipped {} unreadable files.", report.skipped.len());
    }

    Ok(report)
}

fn read_document(
    path: &Path,
    relative: &str,
    format: DocumentFormat,
    max_bytes: u64,
) -> std::result::Result<Document, String> {
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    if size > max_bytes {
        return Err(format!("file is {} bytes, limit is {}", size, max_bytes));
    }
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let text = extract_text(bytes, format).map_err(|e| e.to_string())?;
    Ok(Document {
        source: relative.to_string(),
        format,
        text,
    })
}

fn skip(report: &mut LoadReport, path: String, reason: String) {
    tracing::warn!(path = %path, reason = %reason, "skipping unreadable file");
    report.skipped.push(SkippedFile { path, reason });
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            RagError::InvalidArgument(format!("bad exclude glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::InvalidArgument(e.to_string()))
}
