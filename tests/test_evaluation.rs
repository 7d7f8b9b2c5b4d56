//! Threshold sweep over methods, end to end.

mod common;

use cellseg_eval::config::{EXCLUDED_COLUMNS, MULTI_CUTOFFS};
use cellseg_eval::orchestrator::{dataset_name, discover_methods, threshold_dir};
use cellseg_eval::render::BOXPLOT_FILE;
use cellseg_eval::table::TableStore;
use std::path::Path;

use common::*;

fn orchestrator(multi: bool) -> ThresholdOrchestrator {
    let config = EvalConfig::new()
        .with_multi_threshold(multi)
        .with_morphology(MorphologyConfig::disabled());
    ThresholdOrchestrator::new(config, EvalContext::new())
}

#[test]
fn test_evaluation_averages_each_metric_over_files() -> anyhow::Result<()> {
    let layout = Layout::new();
    for stem in ["a", "b", "c"] {
        layout.add_pair("cellpose", stem, (256, 256), &[(10, 10, 20, 1)], &[(10, 10, 20, 1)]);
    }
    let engine = StubEngine {
        columns: vec![
            "Precision", "Recall", "F1", "dice", "PQ", "jaccard", "n_true", "n_pred",
            "gained_detections",
        ],
        rows: vec![
            vec![0.5, 0.6, 0.7, 0.8, 0.9, 0.1, 3.0, 4.0, 1.0],
            vec![0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 3.0, 4.0, 1.0],
            vec![0.9, 0.9, 0.9, 0.9, 0.9, 0.3, 3.0, 4.0, 2.0],
        ],
    };
    let orch = orchestrator(false).with_engine(Box::new(engine));

    let result = orch.evaluate("cellpose", &layout.gt, &layout.method_dir("cellpose"), 0.55)?;
    let summary = &result.summary;

    for (metric, expected) in [
        ("Precision", (0.5 + 0.7 + 0.9) / 3.0),
        ("Recall", (0.6 + 0.6 + 0.9) / 3.0),
        ("F1", (0.7 + 0.5 + 0.9) / 3.0),
        ("dice", (0.8 + 0.4 + 0.9) / 3.0),
        ("PQ", (0.9 + 0.3 + 0.9) / 3.0),
    ] {
        assert!(approx(summary.get(metric).unwrap(), expected), "{}", metric);
    }
    for excluded in EXCLUDED_COLUMNS {
        assert!(!summary.contains(excluded), "{} leaked into summary", excluded);
    }
    assert!(summary.contains("gained_detections"));

    let names: Vec<&str> = result.table.rows.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(names, vec!["a_img.png", "b_img.png", "c_img.png"]);
    Ok(())
}

#[test]
fn test_threshold_directories_use_display_threshold() {
    let out = Path::new("/results");
    assert_eq!(threshold_dir(out, 0.2, true), out.join("eval@0.8"));
    assert_eq!(threshold_dir(out, 0.8, true), out.join("eval@0.2"));
    assert_eq!(threshold_dir(out, 0.55, true), out.join("eval@0.45"));
    assert_eq!(threshold_dir(out, 0.55, false), out.to_path_buf());
}

#[test]
fn test_multi_threshold_sweep_writes_artifacts_per_threshold() -> anyhow::Result<()> {
    let layout = Layout::new();
    for method in ["cellpose", "mymethod"] {
        layout.add_pair(method, "a", (40, 30), &[(2, 2, 8, 1), (20, 5, 6, 2)], &[(2, 2, 8, 1), (20, 5, 6, 2)]);
        layout.add_pair(method, "b", (32, 48), &[(4, 4, 10, 1)], &[(4, 5, 10, 7)]);
    }

    let runs = orchestrator(true).run(&layout.gt, &layout.dt, &layout.out)?;

    assert_eq!(runs.len(), MULTI_CUTOFFS.len());
    let cutoffs: Vec<f64> = runs.iter().map(|r| r.cutoff).collect();
    assert_eq!(cutoffs, MULTI_CUTOFFS.to_vec());
    for run in &runs {
        assert_eq!(run.out_dir, layout.out.join(format!("eval@{}", run.display_threshold())));
        assert!(run.out_dir.join("dataset_benchmark.png").exists());
        assert!(run.out_dir.join(BOXPLOT_FILE).exists());

        let tables = TableStore::new(&run.out_dir).read_all()?;
        let methods: Vec<&str> = tables.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["cellpose", "mymethod"]);

        let methods: Vec<&str> = run.summaries.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["cellpose", "mymethod"]);
    }

    // Every prediction clears the loosest IoU threshold
    let loose = &runs[0];
    assert!(approx(loose.summary("cellpose").unwrap().get("Precision").unwrap(), 1.0));
    assert!(approx(loose.summary("mymethod").unwrap().get("F1").unwrap(), 1.0));
    Ok(())
}

#[test]
fn test_single_threshold_writes_into_output_path() -> anyhow::Result<()> {
    let layout = Layout::new();
    layout.add_pair("sam", "a", (16, 16), &[(0, 0, 4, 1)], &[(0, 0, 4, 1)]);

    let runs = orchestrator(false).run(&layout.gt, &layout.dt, &layout.out)?;

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].cutoff, 0.55);
    assert_eq!(runs[0].out_dir, layout.out);
    assert!(layout.out.join("dataset_benchmark.png").exists());
    Ok(())
}

#[test]
fn test_method_without_predictions_aborts_the_run() {
    let layout = Layout::new();
    layout.add_pair("cellpose", "a", (16, 16), &[], &[]);
    std::fs::create_dir_all(layout.method_dir("empty")).unwrap();

    let err = orchestrator(false).run(&layout.gt, &layout.dt, &layout.out).unwrap_err();
    assert!(matches!(err.downcast_ref::<EvalError>(), Some(EvalError::EmptyDataset(_))));
}

#[test]
fn test_method_discovery_skips_hidden_entries_and_files() -> anyhow::Result<()> {
    let layout = Layout::new();
    for name in ["stardist", ".cache", "MEDIAR"] {
        std::fs::create_dir_all(layout.dt.join(name))?;
    }
    std::fs::write(layout.dt.join("readme.txt"), "x")?;

    assert_eq!(discover_methods(&layout.dt)?, vec!["MEDIAR", "stardist"]);
    Ok(())
}

#[test]
fn test_dataset_name_is_parent_directory_name() {
    assert_eq!(dataset_name(Path::new("/data/HE/gt")), "HE");
    assert_eq!(dataset_name(Path::new("/data/HE/gt/")), "gt");
    assert_eq!(dataset_name(Path::new("gt")), "");
}

#[test]
fn test_context_span_can_be_replaced_and_children_keep_switches() {
    let context = EvalContext::new()
        .with_span(tracing::Span::none())
        .with_verbose(true);
    assert!(context.span.is_none());

    let child = context.child("resolve");
    assert!(child.verbose);
}
