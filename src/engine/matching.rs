use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::engine::MetricsEngine;
use crate::models::LabelArray;
use crate::table::MetricTable;

/// Columns produced for every image, in order
pub const OBJECT_COLUMNS: [&str; 14] = [
    "Precision",
    "Recall",
    "F1",
    "dice",
    "PQ",
    "jaccard",
    "seg",
    "n_true",
    "n_pred",
    "correct_detections",
    "missed_detections",
    "gained_detections",
    "merge",
    "split",
];

/// Greedy one-to-one instance matching on IoU.
///
/// A GT/DT pair is a correct detection when its IoU exceeds `1 - cutoff`.
/// Leftover objects overlapping with IoU of at least `cutoff2` are counted as
/// merges (one prediction over several truths) or splits (the reverse).
#[derive(Debug, Clone)]
pub struct IouMatchingEngine {
    pub cutoff2: f64,
}

impl IouMatchingEngine {
    pub fn new() -> Self {
        Self { cutoff2: 0.1 }
    }

    pub fn with_cutoff2(mut self, cutoff2: f64) -> Self {
        self.cutoff2 = cutoff2;
        self
    }

    /// Statistics for a single pair, ordered as `OBJECT_COLUMNS`
    pub fn image_stats(&self, gt: &[u32], dt: &[u32], cutoff: f64) -> ImageStats {
        let overlap = Overlap::count(gt, dt);
        let iou_threshold = 1.0 - cutoff;

        let mut candidates: Vec<(u32, u32, f64)> = overlap
            .intersections
            .iter()
            .map(|(&(g, d), &inter)| (g, d, overlap.iou(g, d, inter)))
            .collect();
        candidates.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });

        let mut matched_gt = HashSet::new();
        let mut matched_dt = HashSet::new();
        let mut iou_sum = 0.0;
        for &(g, d, iou) in &candidates {
            if iou > iou_threshold && !matched_gt.contains(&g) && !matched_dt.contains(&d) {
                matched_gt.insert(g);
                matched_dt.insert(d);
                iou_sum += iou;
            }
        }

        let mut gt_hits: HashMap<u32, usize> = HashMap::new();
        let mut dt_hits: HashMap<u32, usize> = HashMap::new();
        for &(g, d, iou) in &candidates {
            if iou >= self.cutoff2 && !matched_gt.contains(&g) && !matched_dt.contains(&d) {
                *gt_hits.entry(g).or_default() += 1;
                *dt_hits.entry(d).or_default() += 1;
            }
        }

        let seg_scores: f64 = overlap
            .gt_areas
            .iter()
            .map(|(&g, &area)| {
                overlap
                    .intersections
                    .iter()
                    .filter(|((gg, _), inter)| *gg == g && **inter as f64 > 0.5 * area as f64)
                    .map(|(&(gg, d), &inter)| overlap.iou(gg, d, inter))
                    .fold(0.0, f64::max)
            })
            .sum();

        ImageStats {
            n_true: overlap.gt_areas.len(),
            n_pred: overlap.dt_areas.len(),
            correct: matched_gt.len(),
            merge: dt_hits.values().filter(|n| **n > 1).count(),
            split: gt_hits.values().filter(|n| **n > 1).count(),
            iou_sum,
            seg_sum: seg_scores,
            fg_true: overlap.fg_true,
            fg_pred: overlap.fg_pred,
            fg_both: overlap.fg_both,
        }
    }
}

impl Default for IouMatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEngine for IouMatchingEngine {
    fn object_stats(
        &self,
        gt: &[LabelArray],
        dt: &[LabelArray],
        cutoff: f64,
    ) -> Result<MetricTable> {
        if gt.len() != dt.len() {
            anyhow::bail!("GT batch has {} items but DT has {}", gt.len(), dt.len());
        }
        let mut table = MetricTable::new(OBJECT_COLUMNS);
        for (i, (g, d)) in gt.iter().zip(dt).enumerate() {
            if g.shape != d.shape {
                anyhow::bail!("item {}: GT shape {:?} differs from DT {:?}", i, g.shape, d.shape);
            }
            let stats = self.image_stats(&g.data, &d.data, cutoff);
            table.push_row(i.to_string(), stats.row())?;
        }
        Ok(table)
    }

    fn name(&self) -> &str {
        "iou-matching"
    }
}

/// Raw counts for one image; ratios are derived on demand
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageStats {
    pub n_true: usize,
    pub n_pred: usize,
    pub correct: usize,
    pub merge: usize,
    pub split: usize,
    /// Sum of IoU over matched pairs
    pub iou_sum: f64,
    pub seg_sum: f64,
    pub fg_true: u64,
    pub fg_pred: u64,
    pub fg_both: u64,
}

impl ImageStats {
    pub fn missed(&self) -> usize {
        self.n_true - self.correct
    }

    pub fn gained(&self) -> usize {
        self.n_pred - self.correct
    }

    pub fn precision(&self) -> f64 {
        ratio(self.correct as f64, self.n_pred as f64)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.correct as f64, self.n_true as f64)
    }

    pub fn f1(&self) -> f64 {
        ratio(2.0 * self.correct as f64, (self.n_true + self.n_pred) as f64)
    }

    pub fn dice(&self) -> f64 {
        ratio(2.0 * self.fg_both as f64, (self.fg_true + self.fg_pred) as f64)
    }

    pub fn jaccard(&self) -> f64 {
        ratio(self.fg_both as f64, (self.fg_true + self.fg_pred - self.fg_both) as f64)
    }

    pub fn seg(&self) -> f64 {
        ratio(self.seg_sum, self.n_true as f64)
    }

    /// Segmentation quality times recognition quality
    pub fn pq(&self) -> f64 {
        let tp = self.correct as f64;
        let denom = tp + 0.5 * self.gained() as f64 + 0.5 * self.missed() as f64;
        if denom == 0.0 {
            return f64::NAN;
        }
        let sq = if self.correct == 0 { 0.0 } else { self.iou_sum / tp };
        sq * (tp / denom)
    }

    pub fn row(&self) -> Vec<f64> {
        vec![
            self.precision(),
            self.recall(),
            self.f1(),
            self.dice(),
            self.pq(),
            self.jaccard(),
            self.seg(),
            self.n_true as f64,
            self.n_pred as f64,
            self.correct as f64,
            self.missed() as f64,
            self.gained() as f64,
            self.merge as f64,
            self.split as f64,
        ]
    }
}

fn ratio(num: f64, denom: f64) -> f64 {
    if denom == 0.0 { f64::NAN } else { num / denom }
}

/// Per-label areas and pairwise intersections in one pass
struct Overlap {
    gt_areas: HashMap<u32, u64>,
    dt_areas: HashMap<u32, u64>,
    intersections: HashMap<(u32, u32), u64>,
    fg_true: u64,
    fg_pred: u64,
    fg_both: u64,
}

impl Overlap {
    fn count(gt: &[u32], dt: &[u32]) -> Self {
        let mut out = Overlap {
            gt_areas: HashMap::new(),
            dt_areas: HashMap::new(),
            intersections: HashMap::new(),
            fg_true: 0,
            fg_pred: 0,
            fg_both: 0,
        };
        for (&g, &d) in gt.iter().zip(dt) {
            if g != 0 {
                *out.gt_areas.entry(g).or_default() += 1;
                out.fg_true += 1;
            }
            if d != 0 {
                *out.dt_areas.entry(d).or_default() += 1;
                out.fg_pred += 1;
            }
            if g != 0 && d != 0 {
                *out.intersections.entry((g, d)).or_default() += 1;
                out.fg_both += 1;
            }
        }
        out
    }

    fn iou(&self, g: u32, d: u32, inter: u64) -> f64 {
        let union = self.gt_areas[&g] + self.dt_areas[&d] - inter;
        inter as f64 / union as f64
    }
}
