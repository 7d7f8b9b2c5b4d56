use std::collections::BTreeMap;
use std::path::PathBuf;

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

/// Instance-labelled 2D mask; background is 0.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// (height, width) of a 2D frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    pub height: u32,
    pub width: u32,
}

impl Shape {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Element-wise maximum of two shapes
    pub fn max(self, other: Shape) -> Shape {
        Shape {
            height: self.height.max(other.height),
            width: self.width.max(other.width),
        }
    }

    pub fn fits_within(&self, canvas: Shape) -> bool {
        self.height <= canvas.height && self.width <= canvas.width
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.height, self.width)
    }
}

/// A ground-truth file and the prediction it is scored against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub gt_path: PathBuf,
    pub dt_path: PathBuf,
}

/// Dense N-d array of label values as loaded from disk.
///
/// Data is row-major; for images the shape is `[height, width]`, for stacks
/// the leading axes select the plane.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelArray {
    pub shape: Vec<usize>,
    pub data: Vec<u32>,
}

impl LabelArray {
    pub fn new(shape: Vec<usize>, data: Vec<u32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shape of the first 2D plane (the last two axes).
    ///
    /// A 1-d array is treated as a single row.
    pub fn plane_shape(&self) -> Shape {
        match self.shape.as_slice() {
            [] => Shape::new(0, 0),
            [w] => Shape::new(1, *w as u32),
            [.., h, w] => Shape::new(*h as u32, *w as u32),
        }
    }

    /// Values of the first 2D plane, row-major
    pub fn first_plane(&self) -> &[u32] {
        let shape = self.plane_shape();
        let n = shape.height as usize * shape.width as usize;
        &self.data[..n.min(self.data.len())]
    }

    /// Prepend a batch axis to 2D and 3D arrays; higher ranks pass through.
    pub fn ensure_batch(mut self) -> Self {
        if matches!(self.ndim(), 2 | 3) {
            self.shape.insert(0, 1);
        }
        self
    }

    /// Split along the leading axis
    pub fn items(&self) -> Vec<LabelArray> {
        let Some((&n, rest)) = self.shape.split_first() else {
            return Vec::new();
        };
        let step: usize = rest.iter().product();
        (0..n)
            .map(|i| LabelArray::new(rest.to_vec(), self.data[i * step..(i + 1) * step].to_vec()))
            .collect()
    }
}

impl From<&LabelImage> for LabelArray {
    fn from(img: &LabelImage) -> Self {
        let (w, h) = img.dimensions();
        LabelArray::new(vec![h as usize, w as usize], img.as_raw().clone())
    }
}

/// Per-method mean of every retained metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary(pub BTreeMap<String, f64>);

impl MetricSummary {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }

    pub fn remove(&mut self, metric: &str) -> Option<f64> {
        self.0.remove(metric)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Results of one cutoff across all methods, in processing order
#[derive(Debug, Clone)]
pub struct ThresholdRun {
    pub cutoff: f64,
    pub out_dir: PathBuf,
    pub summaries: Vec<(String, MetricSummary)>,
}

impl ThresholdRun {
    /// IoU-style threshold shown to users
    pub fn display_threshold(&self) -> f64 {
        display_threshold(self.cutoff)
    }

    pub fn summary(&self, method: &str) -> Option<&MetricSummary> {
        self.summaries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, s)| s)
    }
}

/// `round(1 - cutoff, 2)`
pub fn display_threshold(cutoff: f64) -> f64 {
    ((1.0 - cutoff) * 100.0).round() / 100.0
}
