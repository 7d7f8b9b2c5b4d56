//! Compact `<model_name>_summary.json` documents built from detailed results on disk.
//!
//! By default the detailed result is the newest `<model_name>*.json` in the
//! output directory. Two runs sharing a model name, or a model name that is a
//! prefix of another, can make that pick the wrong file; callers that know the
//! artifact should pass it with [`ArtifactSelection::Explicit`].

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::EvalContext;
use crate::engine::DetailedDocument;
use crate::engine::detailed::write_json;

pub const SUMMARY_SUFFIX: &str = "_summary.json";
pub const NOT_FOUND_ERROR: &str = "detailed JSON not found in outdir";
pub const READ_ERROR: &str = "failed to read detailed JSON";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_summary: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_summary: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which detailed artifact to compact
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArtifactSelection {
    /// Newest candidate by modification time
    #[default]
    LatestModified,
    Explicit(PathBuf),
}

/// What a cleanup pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

pub struct SummaryExtractor {
    outdir: PathBuf,
    model_name: String,
    selection: ArtifactSelection,
    context: EvalContext,
}

impl SummaryExtractor {
    pub fn new(outdir: impl Into<PathBuf>, model_name: impl Into<String>, context: EvalContext) -> Self {
        Self {
            outdir: outdir.into(),
            model_name: model_name.into(),
            selection: ArtifactSelection::LatestModified,
            context,
        }
    }

    pub fn with_selection(mut self, selection: ArtifactSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn summary_path(&self) -> PathBuf {
        self.outdir.join(format!("{}{}", self.model_name, SUMMARY_SUFFIX))
    }

    /// `<model_name>*.json` files in the output directory, minus summaries
    pub fn candidates(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.outdir) else {
            return Vec::new();
        };
        let mut out: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|s| s.to_str())
                    .map(|name| {
                        name.starts_with(&self.model_name)
                            && name.ends_with(".json")
                            && !name.ends_with(SUMMARY_SUFFIX)
                    })
                    .unwrap_or(false)
            })
            .collect();
        out.sort();
        out
    }

    /// Chosen detailed artifact, if any
    pub fn select(&self) -> Option<PathBuf> {
        match &self.selection {
            ArtifactSelection::Explicit(path) => Some(path.clone()),
            ArtifactSelection::LatestModified => self
                .candidates()
                .into_iter()
                .max_by_key(|p| modified(p)),
        }
    }

    /// Build the summary without touching disk
    pub fn extract(&self) -> SummaryDocument {
        let mut doc = SummaryDocument::default();
        doc.metadata
            .insert("model_name".to_string(), Value::String(self.model_name.clone()));

        let _span = self.context.span.enter();
        let Some(path) = self.select() else {
            tracing::warn!("no detailed JSON for {} in {}", self.model_name, self.outdir.display());
            doc.error = Some(NOT_FOUND_ERROR.to_string());
            return doc;
        };

        let detailed = match read_detailed(&path) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{:#}", e);
                doc.error = Some(READ_ERROR.to_string());
                return doc;
            }
        };

        let mut pixel = Map::new();
        let mut object = Map::new();
        for record in detailed.metrics.iter().filter(|r| r.feature == "average") {
            match record.stat_type.as_str() {
                "pixel" => {
                    pixel.insert(record.name.clone(), record.value.clone());
                }
                "object" => {
                    object.insert(record.name.clone(), record.value.clone());
                }
                _ => {}
            }
        }
        doc.metadata.extend(detailed.metadata);
        doc.pixel_summary = Some(pixel);
        doc.object_summary = Some(object);
        tracing::info!("summarized {}", path.display());
        doc
    }

    /// Extract and write `<model_name>_summary.json`
    pub fn write_summary(&self) -> Result<(PathBuf, SummaryDocument)> {
        let doc = self.extract();
        std::fs::create_dir_all(&self.outdir)
            .with_context(|| format!("Failed to create {:?}", self.outdir))?;
        let path = self.summary_path();
        write_json(&path, &doc)?;
        Ok((path, doc))
    }

    /// Delete every detailed candidate, never the summary itself
    pub fn cleanup(&self) -> CleanupReport {
        let summary = self.summary_path();
        let mut report = CleanupReport::default();
        let _span = self.context.span.enter();
        for path in self.candidates().into_iter().filter(|p| *p != summary) {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("removed {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => {
                    tracing::warn!("could not remove {}: {}", path.display(), e);
                    report.failed.push(path);
                }
            }
        }
        if report.removed.is_empty() && report.failed.is_empty() {
            tracing::info!("no detailed JSON files to remove");
        }
        report
    }
}

fn read_detailed(path: &Path) -> Result<DetailedDocument> {
    let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&null_non_finite(&data))
        .with_context(|| format!("Failed to parse {:?}", path))
}

/// Replace the bare `NaN`, `Infinity` and `-Infinity` tokens Python's `json`
/// module emits with `null`; string contents are left alone.
pub fn null_non_finite(text: &str) -> String {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.iter().find(|t| rest.starts_with(*t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
