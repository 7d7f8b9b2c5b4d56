use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::engine::matching::{ImageStats, IouMatchingEngine};
use crate::models::LabelArray;
use crate::context::EvalContext;

/// One statistic in a detailed result document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: Value,
    pub feature: String,
    pub stat_type: String,
}

impl MetricRecord {
    fn new(name: &str, value: f64, feature: &str, stat_type: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Value::from(value),
            feature: feature.to_string(),
            stat_type: stat_type.to_string(),
        }
    }
}

/// Full per-metric output of one two-file run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedDocument {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
}

/// Scores a truth/prediction pair of batched arrays and writes
/// `<model_name>_<YYYY-MM-DD>.json` into `outdir`.
#[derive(Debug, Clone)]
pub struct DetailedRunner {
    pub model_name: String,
    pub outdir: PathBuf,
    pub cutoff1: f64,
    pub cutoff2: f64,
    pub pixel_threshold: f64,
    pub is_3d: bool,
    context: EvalContext,
}

impl DetailedRunner {
    pub fn new(model_name: impl Into<String>, outdir: impl Into<PathBuf>, context: EvalContext) -> Self {
        Self {
            model_name: model_name.into(),
            outdir: outdir.into(),
            cutoff1: 0.4,
            cutoff2: 0.1,
            pixel_threshold: 0.5,
            is_3d: false,
            context,
        }
    }

    pub fn with_cutoffs(mut self, cutoff1: f64, cutoff2: f64) -> Self {
        self.cutoff1 = cutoff1;
        self.cutoff2 = cutoff2;
        self
    }

    pub fn with_pixel_threshold(mut self, pixel_threshold: f64) -> Self {
        self.pixel_threshold = pixel_threshold;
        self
    }

    pub fn with_3d(mut self, is_3d: bool) -> Self {
        self.is_3d = is_3d;
        self
    }

    /// Compute pixel and object statistics and persist them
    pub fn run_all(&self, truth: &LabelArray, pred: &LabelArray) -> Result<(PathBuf, DetailedDocument)> {
        let truth = self.squeeze(truth)?;
        let pred = self.squeeze(pred)?;
        if truth.shape != pred.shape {
            anyhow::bail!(
                "Shape mismatch: truth {:?} vs pred {:?}",
                truth.shape,
                pred.shape
            );
        }

        let _span = self.context.span.enter();
        let mut doc = DetailedDocument {
            metadata: self.metadata(),
            metrics: Vec::new(),
        };
        doc.metrics.extend(self.pixel_records(&truth, &pred));
        doc.metrics.extend(self.object_records(&truth, &pred));

        std::fs::create_dir_all(&self.outdir)
            .with_context(|| format!("Failed to create {:?}", self.outdir))?;
        let path = self.outdir.join(format!("{}_{}.json", self.model_name, today()?));
        write_json(&path, &doc)?;
        tracing::info!("Saved detailed metrics to {}", path.display());
        Ok((path, doc))
    }

    /// Bring a batched array to `[batch, ...spatial]`
    fn squeeze(&self, array: &LabelArray) -> Result<LabelArray> {
        match (self.is_3d, array.shape.as_slice()) {
            (true, [_, _, _, _]) | (false, [_, _, _]) => Ok(array.clone()),
            (true, [_, _, _, _, 1]) | (false, [_, _, _, 1]) => {
                let mut out = array.clone();
                out.shape.pop();
                Ok(out)
            }
            (false, [_, _, _, c]) => anyhow::bail!("{} channels are not supported, expected 1", c),
            (is_3d, shape) => anyhow::bail!(
                "shape {:?} is not valid for {} data",
                shape,
                if is_3d { "3D" } else { "2D" }
            ),
        }
    }

    fn metadata(&self) -> Map<String, Value> {
        let value = json!({
            "model_name": self.model_name,
            "cutoff1": self.cutoff1,
            "cutoff2": self.cutoff2,
            "pixel_threshold": self.pixel_threshold,
            "is_3d": self.is_3d,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn pixel_records(&self, truth: &LabelArray, pred: &LabelArray) -> Vec<MetricRecord> {
        let (mut tp, mut fp, mut fneg) = (0u64, 0u64, 0u64);
        for (&t, &p) in truth.data.iter().zip(&pred.data) {
            let t = t as f64 > self.pixel_threshold;
            let p = p as f64 > self.pixel_threshold;
            match (t, p) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fneg += 1,
                (false, false) => {}
            }
        }
        let (tp, fp, fneg) = (tp as f64, fp as f64, fneg as f64);
        let stats = [
            ("recall", ratio(tp, tp + fneg)),
            ("precision", ratio(tp, tp + fp)),
            ("f1", ratio(2.0 * tp, 2.0 * tp + fp + fneg)),
            ("jaccard", ratio(tp, tp + fp + fneg)),
            ("dice", ratio(2.0 * tp, 2.0 * tp + fp + fneg)),
        ];

        // Single channel: the per-feature rows and the average coincide
        ["0", "average"]
            .iter()
            .flat_map(|feature| {
                stats
                    .iter()
                    .map(move |(name, value)| MetricRecord::new(name, *value, feature, "pixel"))
            })
            .collect()
    }

    fn object_records(&self, truth: &LabelArray, pred: &LabelArray) -> Vec<MetricRecord> {
        let engine = IouMatchingEngine::new().with_cutoff2(self.cutoff2);
        let per_item: Vec<ImageStats> = truth
            .items()
            .iter()
            .zip(pred.items())
            .map(|(t, p)| engine.image_stats(&t.data, &p.data, self.cutoff1))
            .collect();

        let total = per_item.iter().fold(ImageStats::default(), |acc, s| ImageStats {
            n_true: acc.n_true + s.n_true,
            n_pred: acc.n_pred + s.n_pred,
            correct: acc.correct + s.correct,
            merge: acc.merge + s.merge,
            split: acc.split + s.split,
            iou_sum: acc.iou_sum + s.iou_sum,
            seg_sum: acc.seg_sum + s.seg_sum,
            fg_true: acc.fg_true + s.fg_true,
            fg_pred: acc.fg_pred + s.fg_pred,
            fg_both: acc.fg_both + s.fg_both,
        });

        let stats = [
            ("n_true", total.n_true as f64),
            ("n_pred", total.n_pred as f64),
            ("correct_detections", total.correct as f64),
            ("missed_detections", total.missed() as f64),
            ("gained_detections", total.gained() as f64),
            ("merge", total.merge as f64),
            ("split", total.split as f64),
            ("precision", total.precision()),
            ("recall", total.recall()),
            ("f1", total.f1()),
            ("seg", total.seg()),
            ("pq", total.pq()),
        ];
        stats
            .iter()
            .map(|(name, value)| MetricRecord::new(name, *value, "average", "object"))
            .collect()
    }
}

fn ratio(num: f64, denom: f64) -> f64 {
    if denom == 0.0 { f64::NAN } else { num / denom }
}

fn today() -> Result<String> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(format_description!("[year]-[month]-[day]"))?)
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, value).with_context(|| format!("Failed to write {:?}", path))
}
