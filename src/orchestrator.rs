use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::aggregate::ResultAggregator;
use crate::config::EvalConfig;
use crate::context::EvalContext;
use crate::engine::{IouMatchingEngine, MetricsEngine};
use crate::models::{LabelArray, MetricSummary, ThresholdRun, display_threshold};
use crate::normalize::ImageNormalizer;
use crate::process::{ProcessRunner, morphology_command};
use crate::render::{BOXPLOT_FILE, ChartRenderer, RasterChartRenderer, bar_chart_file};
use crate::resolve::FileSetResolver;
use crate::table::{MetricTable, TableStore};

/// Summary and per-file table of one method at one cutoff
#[derive(Debug, Clone)]
pub struct MethodResult {
    pub summary: MetricSummary,
    pub table: MetricTable,
}

/// Runs every method under the DT root against the GT root for each cutoff
pub struct ThresholdOrchestrator {
    config: EvalConfig,
    context: EvalContext,
    engine: Box<dyn MetricsEngine>,
    renderer: Box<dyn ChartRenderer>,
}

impl ThresholdOrchestrator {
    pub fn new(config: EvalConfig, context: EvalContext) -> Self {
        Self {
            config,
            context,
            engine: Box::new(IouMatchingEngine::new()),
            renderer: Box::new(RasterChartRenderer::new()),
        }
    }

    pub fn with_engine(mut self, engine: Box<dyn MetricsEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Full sweep, then the morphology subprocess once
    pub fn run(&self, gt_root: &Path, dt_root: &Path, output: &Path) -> Result<Vec<ThresholdRun>> {
        let dataset = dataset_name(gt_root);
        let methods = discover_methods(dt_root)?;
        {
            let _span = self.context.span.enter();
            tracing::info!("dataset_name:{}", dataset);
            tracing::info!("methods:{:?}", methods);
        }

        let mut runs = Vec::with_capacity(self.config.cutoffs.len());
        for &cutoff in &self.config.cutoffs {
            runs.push(self.run_threshold(cutoff, &dataset, &methods, gt_root, dt_root, output)?);
        }

        self.run_morphology(gt_root, output);
        Ok(runs)
    }

    /// Evaluate all methods at one cutoff and draw the comparison charts
    pub fn run_threshold(
        &self,
        cutoff: f64,
        dataset: &str,
        methods: &[String],
        gt_root: &Path,
        dt_root: &Path,
        output: &Path,
    ) -> Result<ThresholdRun> {
        let out_dir = threshold_dir(output, cutoff, self.config.per_threshold_dirs);
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;
        {
            let _span = self.context.span.enter();
            tracing::info!("Evaluating with IoU threshold: {}", display_threshold(cutoff));
        }

        let store = TableStore::new(&out_dir);
        let mut summaries = Vec::with_capacity(methods.len());
        for method in methods {
            let result = self.evaluate(method, gt_root, &dt_root.join(method), cutoff)?;

            let _span = self.context.span.enter();
            if out_dir.exists() {
                let path = store.write(method, &result.table)?;
                tracing::info!("The evaluation results is stored under {}", path.display());
            } else {
                tracing::warn!("Output path not exists, will not dump result");
            }
            summaries.push((method.clone(), result.summary));
        }

        let aggregator = ResultAggregator::new(self.context.child("aggregate"));
        let title = format!(
            "dataset - {} (IoU threshold={})",
            dataset,
            display_threshold(cutoff)
        );
        let comparison = aggregator.compare(title, &summaries);
        self.renderer
            .bar_chart(&comparison, &out_dir.join(bar_chart_file(dataset)))?;

        let boxes = store.read_all().map(|tables| aggregator.box_stats(&tables));
        let drawn = boxes.and_then(|b| self.renderer.box_plot(&b, &out_dir.join(BOXPLOT_FILE)));
        if let Err(e) = drawn {
            let _span = self.context.span.enter();
            tracing::warn!("error in boxplot: {:#}", e);
        }

        Ok(ThresholdRun {
            cutoff,
            out_dir,
            summaries,
        })
    }

    /// Resolve, normalize and score one method's predictions
    pub fn evaluate(&self, method: &str, gt_root: &Path, dt_root: &Path, cutoff: f64) -> Result<MethodResult> {
        let files = FileSetResolver::new(self.context.child("resolve")).resolve(gt_root, dt_root)?;
        let batch = ImageNormalizer::new(self.context.child("normalize")).normalize(&files.pairs())?;

        let gt: Vec<LabelArray> = batch.gt.iter().map(LabelArray::from).collect();
        let dt: Vec<LabelArray> = batch.dt.iter().map(LabelArray::from).collect();
        {
            let _span = self.context.span.enter();
            tracing::info!(
                "Start evaluating {} ({} images) with {}, which will take some time.",
                method,
                batch.len(),
                self.engine.name()
            );
        }
        let mut table = self
            .engine
            .object_stats(&gt, &dt, cutoff)
            .with_context(|| format!("metrics engine failed for {}", method))?;

        let summary = ResultAggregator::new(self.context.child("aggregate"))
            .summarize(&mut table, &batch.names)?;
        Ok(MethodResult { summary, table })
    }

    fn run_morphology(&self, gt_root: &Path, output: &Path) {
        if !self.config.morphology.enabled {
            return;
        }
        let cmd = morphology_command(&self.config.morphology, gt_root, output);
        let runner = ProcessRunner::new(self.context.child("morphology"));
        if let Err(e) = runner.run(&cmd) {
            let _span = self.context.span.enter();
            tracing::warn!("Subprogram failed: {}", e);
        }
    }
}

/// Non-hidden subdirectories of the DT root, sorted by name
pub fn discover_methods(dt_root: &Path) -> Result<Vec<String>> {
    let mut methods: Vec<String> = std::fs::read_dir(dt_root)
        .with_context(|| format!("Failed to list methods under {:?}", dt_root))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    methods.sort();
    Ok(methods)
}

/// `<output>/eval@<threshold>` in multi-threshold mode, else `output`
pub fn threshold_dir(output: &Path, cutoff: f64, per_threshold: bool) -> PathBuf {
    if per_threshold {
        output.join(format!("eval@{}", display_threshold(cutoff)))
    } else {
        output.to_path_buf()
    }
}

/// Name of the directory containing the GT root, as `basename(dirname(gt))`
pub fn dataset_name(gt_root: &Path) -> String {
    let s = gt_root.to_string_lossy();
    let dir = s.rfind('/').map(|i| &s[..i]).unwrap_or("");
    let dir = dir.trim_end_matches('/');
    dir.rsplit('/').next().unwrap_or("").to_string()
}
