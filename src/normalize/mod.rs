pub mod loader;
pub mod npy;

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::error::EvalError;
use crate::models::{ImagePair, LabelImage, LabelArray, Shape};
use crate::context::EvalContext;

pub use loader::{ImageKind, load_array};

/// GT and DT stacks with matching shapes, ready for the metrics engine
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub canonical: Shape,
    pub gt: Vec<LabelImage>,
    pub dt: Vec<LabelImage>,
    /// DT file basenames, used as table row keys
    pub names: Vec<String>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.dt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dt.is_empty()
    }
}

/// Pads every mask of a batch onto one canvas and relabels instances
pub struct ImageNormalizer {
    context: EvalContext,
}

impl ImageNormalizer {
    pub fn new(context: EvalContext) -> Self {
        Self { context }
    }

    /// Canonical shape from the DT side of `pairs`
    pub fn canonical_shape(&self, pairs: &[ImagePair]) -> Result<Shape> {
        let shapes = pairs
            .iter()
            .map(|p| load_array(&p.dt_path).map(|a| a.plane_shape()))
            .collect::<Result<Vec<_>>>()?;
        let canonical = canonical_shape(&shapes).ok_or_else(|| {
            let dir = pairs
                .first()
                .and_then(|p| p.dt_path.parent())
                .map(Path::to_path_buf)
                .unwrap_or_default();
            EvalError::EmptyDataset(dir)
        })?;

        let _span = self.context.span.enter();
        let mut distinct: Vec<(u32, u32)> = shapes.iter().map(Shape::as_tuple).collect();
        distinct.sort_unstable();
        distinct.dedup();
        tracing::info!("Uniform size {:?} into {:?}", distinct, canonical.as_tuple());
        Ok(canonical)
    }

    /// Load, pad and label every pair against one canonical shape
    pub fn normalize(&self, pairs: &[ImagePair]) -> Result<NormalizedBatch> {
        if pairs.is_empty() {
            return Err(EvalError::EmptyDataset(PathBuf::new()).into());
        }
        let canonical = self.canonical_shape(pairs)?;

        let _span = self.context.span.enter();
        let mut gt = Vec::with_capacity(pairs.len());
        let mut dt = Vec::with_capacity(pairs.len());
        let mut names = Vec::with_capacity(pairs.len());
        for (i, pair) in pairs.iter().enumerate() {
            if self.context.verbose {
                tracing::debug!("Load data {}/{}: {}", i + 1, pairs.len(), pair.dt_path.display());
            }
            let g = load_labeled(&pair.gt_path, canonical)?;
            let d = load_labeled(&pair.dt_path, canonical)?;
            if g.dimensions() != d.dimensions() {
                return Err(EvalError::ShapeMismatch {
                    path: pair.dt_path.clone(),
                    gt: (g.height(), g.width()),
                    dt: (d.height(), d.width()),
                }
                .into());
            }
            gt.push(g);
            dt.push(d);
            names.push(basename(&pair.dt_path));
        }

        Ok(NormalizedBatch {
            canonical,
            gt,
            dt,
            names,
        })
    }
}

/// Element-wise maximum of all shapes, `None` for an empty batch
pub fn canonical_shape(shapes: &[Shape]) -> Option<Shape> {
    shapes.iter().copied().reduce(Shape::max)
}

/// Load the first frame of `path`, pad it to `canvas` and relabel it
pub fn load_labeled(path: &Path, canvas: Shape) -> Result<LabelImage> {
    let array = load_array(path)?;
    let padded = pad_to_canvas(&array, canvas).map_err(|shape| EvalError::ShapeExceedsCanvas {
        path: path.to_path_buf(),
        shape: shape.as_tuple(),
        canvas: canvas.as_tuple(),
    })?;
    Ok(label_instances(&padded))
}

/// Copy the first plane top-left aligned into a zeroed canvas.
///
/// Returns the native shape as the error if it does not fit.
pub fn pad_to_canvas(array: &LabelArray, canvas: Shape) -> std::result::Result<LabelImage, Shape> {
    let shape = array.plane_shape();
    if !shape.fits_within(canvas) {
        return Err(shape);
    }
    let plane = array.first_plane();
    let mut out = LabelImage::new(canvas.width, canvas.height);
    let w = shape.width as usize;
    for (y, row) in plane.chunks_exact(w.max(1)).enumerate().take(shape.height as usize) {
        for (x, value) in row.iter().enumerate() {
            out.put_pixel(x as u32, y as u32, Luma([*value]));
        }
    }
    Ok(out)
}

/// 8-connected relabelling; touching regions with distinct values stay apart
pub fn label_instances(image: &LabelImage) -> LabelImage {
    connected_components(image, Connectivity::Eight, Luma([0u32]))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
