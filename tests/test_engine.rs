//! Built-in IoU matching engine and the two-file detailed run.

mod common;

use cellseg_eval::engine::matching::OBJECT_COLUMNS;
use cellseg_eval::{DetailedRunner, IouMatchingEngine};

use common::*;

fn square(size: usize, x0: usize, y0: usize, side: usize, label: u32) -> Vec<u32> {
    let mut data = vec![0; size * size];
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            data[y * size + x] = label;
        }
    }
    data
}

fn stat(table: &MetricTable, column: &str) -> f64 {
    table.column(column).expect("missing column")[0]
}

#[test]
fn test_identical_masks_score_perfectly() -> anyhow::Result<()> {
    let mut data = square(32, 2, 2, 8, 1);
    for (i, v) in square(32, 20, 20, 6, 2).into_iter().enumerate() {
        if v != 0 {
            data[i] = v;
        }
    }
    let mask = LabelArray::new(vec![32, 32], data);

    let table = IouMatchingEngine::new().object_stats(&[mask.clone()], &[mask], 0.55)?;

    assert_eq!(table.columns, OBJECT_COLUMNS.to_vec());
    for metric in ["Precision", "Recall", "F1", "dice", "PQ", "jaccard", "seg"] {
        assert!(approx(stat(&table, metric), 1.0), "{}", metric);
    }
    assert_eq!(stat(&table, "n_true"), 2.0);
    assert_eq!(stat(&table, "correct_detections"), 2.0);
    assert_eq!(stat(&table, "gained_detections"), 0.0);
    Ok(())
}

#[test]
fn test_cutoff_sets_the_iou_needed_for_a_match() -> anyhow::Result<()> {
    // Shifted by two rows: IoU = 80 / 120
    let gt = LabelArray::new(vec![16, 16], square(16, 0, 0, 10, 1));
    let dt = LabelArray::new(vec![16, 16], square(16, 0, 2, 10, 5));
    let engine = IouMatchingEngine::new();

    let loose = engine.object_stats(&[gt.clone()], &[dt.clone()], 0.55)?;
    assert_eq!(stat(&loose, "correct_detections"), 1.0);
    assert!(approx(stat(&loose, "PQ"), 80.0 / 120.0));

    let strict = engine.object_stats(&[gt], &[dt], 0.2)?;
    assert_eq!(stat(&strict, "correct_detections"), 0.0);
    assert_eq!(stat(&strict, "missed_detections"), 1.0);
    assert_eq!(stat(&strict, "gained_detections"), 1.0);
    assert_eq!(stat(&strict, "Precision"), 0.0);
    assert!(approx(stat(&strict, "dice"), 160.0 / 200.0));
    Ok(())
}

#[test]
fn test_empty_prediction_leaves_precision_undefined() -> anyhow::Result<()> {
    let gt = LabelArray::new(vec![8, 8], square(8, 0, 0, 4, 1));
    let dt = LabelArray::new(vec![8, 8], vec![0; 64]);

    let table = IouMatchingEngine::new().object_stats(&[gt], &[dt], 0.55)?;
    assert!(stat(&table, "Precision").is_nan());
    assert_eq!(stat(&table, "Recall"), 0.0);
    assert_eq!(stat(&table, "PQ"), 0.0);
    Ok(())
}

#[test]
fn test_merged_prediction_is_counted() -> anyhow::Result<()> {
    let mut gt = square(16, 0, 0, 4, 1);
    for (i, v) in square(16, 4, 0, 4, 2).into_iter().enumerate() {
        if v != 0 {
            gt[i] = v;
        }
    }
    let mut dt = vec![0; 256];
    for y in 0..4 {
        for x in 0..8 {
            dt[y * 16 + x] = 1;
        }
    }
    let table = IouMatchingEngine::new().object_stats(
        &[LabelArray::new(vec![16, 16], gt)],
        &[LabelArray::new(vec![16, 16], dt)],
        0.2,
    )?;
    assert_eq!(stat(&table, "merge"), 1.0);
    assert_eq!(stat(&table, "split"), 0.0);
    Ok(())
}

#[test]
fn test_detailed_run_writes_average_records() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mask = LabelArray::new(vec![16, 16], square(16, 2, 2, 6, 3)).ensure_batch();

    let (path, doc) = DetailedRunner::new("unet", dir.path(), EvalContext::new()).run_all(&mask, &mask)?;

    assert!(path.exists());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("unet_") && name.ends_with(".json"));
    assert_eq!(doc.metadata["model_name"], "unet");

    let average_pixel: Vec<_> = doc
        .metrics
        .iter()
        .filter(|r| r.feature == "average" && r.stat_type == "pixel")
        .collect();
    assert_eq!(average_pixel.len(), 5);
    let f1 = doc
        .metrics
        .iter()
        .find(|r| r.name == "f1" && r.stat_type == "object")
        .expect("object f1");
    assert_eq!(f1.value.as_f64(), Some(1.0));
    Ok(())
}

#[test]
fn test_detailed_run_rejects_mismatched_shapes() {
    let dir = tempfile::TempDir::new().unwrap();
    let truth = LabelArray::new(vec![4, 4], vec![0; 16]).ensure_batch();
    let pred = LabelArray::new(vec![4, 5], vec![0; 20]).ensure_batch();

    let err = DetailedRunner::new("m", dir.path(), EvalContext::new())
        .run_all(&truth, &pred)
        .unwrap_err();
    assert!(err.to_string().contains("Shape mismatch"));
}
