mod common;

use cellseg_eval::summary::{NOT_FOUND_ERROR, READ_ERROR, null_non_finite};
use cellseg_eval::{ArtifactSelection, SummaryExtractor};
use serde_json::{Value, json};
use std::path::Path;
use std::time::{Duration, SystemTime};

use common::*;

fn extractor(dir: &Path, model: &str) -> SummaryExtractor {
    SummaryExtractor::new(dir, model, EvalContext::new())
}

fn detailed(precision: f64) -> Value {
    json!({
        "metadata": {"model_name": "model", "cutoff1": 0.4},
        "metrics": [
            {"name": "recall", "value": 0.9, "feature": "0", "stat_type": "pixel"},
            {"name": "recall", "value": 0.8, "feature": "average", "stat_type": "pixel"},
            {"name": "precision", "value": precision, "feature": "average", "stat_type": "object"},
            {"name": "size", "value": 3, "feature": "average", "stat_type": "other"}
        ]
    })
}

fn write(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn set_mtime(path: &Path, secs_ago: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago)).unwrap();
}

#[test]
fn test_missing_detailed_json_writes_error_document() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    let (path, _) = extractor(dir.path(), "model").write_summary()?;

    assert_eq!(path, dir.path().join("model_summary.json"));
    let written: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    assert_eq!(
        written,
        json!({"metadata": {"model_name": "model"}, "error": NOT_FOUND_ERROR})
    );
    Ok(())
}

#[test]
fn test_only_average_records_are_kept() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write(&dir.path().join("model_2024-05-01.json"), &detailed(0.7));

    let doc = extractor(dir.path(), "model").extract();

    assert_eq!(doc.error, None);
    assert_eq!(doc.metadata["cutoff1"], json!(0.4));
    assert_eq!(doc.metadata["model_name"], "model");
    assert_eq!(Value::Object(doc.pixel_summary.unwrap()), json!({"recall": 0.8}));
    assert_eq!(Value::Object(doc.object_summary.unwrap()), json!({"precision": 0.7}));
    Ok(())
}

#[test]
fn test_unreadable_detailed_json_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("model_2024-05-01.json"), "{ not json")?;

    let doc = extractor(dir.path(), "model").extract();

    assert_eq!(doc.error.as_deref(), Some(READ_ERROR));
    assert!(doc.pixel_summary.is_none());
    assert!(doc.object_summary.is_none());
    Ok(())
}

#[test]
fn test_newest_candidate_wins() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let old = dir.path().join("model_2024-05-02.json");
    let new = dir.path().join("model_2024-05-01.json");
    write(&old, &detailed(0.1));
    write(&new, &detailed(0.9));
    set_mtime(&old, 3600);
    set_mtime(&new, 60);

    let doc = extractor(dir.path(), "model").extract();

    assert_eq!(doc.object_summary.unwrap()["precision"], json!(0.9));
    Ok(())
}

#[test]
fn test_explicit_artifact_overrides_mtime() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let chosen = dir.path().join("model_a.json");
    let other = dir.path().join("model_b.json");
    write(&chosen, &detailed(0.3));
    write(&other, &detailed(0.6));
    set_mtime(&chosen, 3600);

    let doc = extractor(dir.path(), "model")
        .with_selection(ArtifactSelection::Explicit(chosen))
        .extract();

    assert_eq!(doc.object_summary.unwrap()["precision"], json!(0.3));
    Ok(())
}

#[test]
fn test_summary_is_not_its_own_candidate() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write(&dir.path().join("model_2024-05-01.json"), &detailed(0.5));
    std::fs::write(dir.path().join("other_2024-05-01.json"), "{}")?;
    std::fs::write(dir.path().join("model.txt"), "x")?;

    let extractor = extractor(dir.path(), "model");
    extractor.write_summary()?;

    let candidates = extractor.candidates();
    assert_eq!(candidates, vec![dir.path().join("model_2024-05-01.json")]);
    Ok(())
}

#[test]
fn test_cleanup_removes_detailed_files_only() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write(&dir.path().join("model_2024-05-01.json"), &detailed(0.5));
    write(&dir.path().join("model_extra.json"), &detailed(0.5));

    let extractor = extractor(dir.path(), "model");
    let (summary, _) = extractor.write_summary()?;
    let report = extractor.cleanup();

    assert_eq!(report.removed.len(), 2);
    assert!(report.failed.is_empty());
    assert!(summary.exists());
    assert!(extractor.candidates().is_empty());

    let again = extractor.cleanup();
    assert!(again.removed.is_empty());
    Ok(())
}

#[test]
fn test_undefined_statistics_written_as_nan_are_kept() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(
        dir.path().join("model_2024-05-01.json"),
        r#"{
  "metadata": {"model_name": "model", "note": "NaN stays text"},
  "metrics": [
    {"name": "recall", "value": 0.8, "feature": "average", "stat_type": "pixel"},
    {"name": "precision", "value": NaN, "feature": "average", "stat_type": "object"},
    {"name": "seg", "value": -Infinity, "feature": "average", "stat_type": "object"}
  ]
}"#,
    )?;

    let doc = extractor(dir.path(), "model").extract();

    assert_eq!(doc.error, None);
    assert_eq!(doc.metadata["note"], "NaN stays text");
    assert_eq!(
        Value::Object(doc.object_summary.unwrap()),
        json!({"precision": null, "seg": null})
    );
    assert_eq!(Value::Object(doc.pixel_summary.unwrap()), json!({"recall": 0.8}));
    Ok(())
}

#[test]
fn test_non_finite_tokens_outside_strings_become_null() {
    assert_eq!(
        null_non_finite(r#"[NaN, Infinity, -Infinity, "NaN \" Infinity", 1.5]"#),
        r#"[null, null, null, "NaN \" Infinity", 1.5]"#
    );
}
