use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::error::EvalError;
use crate::models::ImagePair;
use crate::context::EvalContext;

/// Notebook autosave marker, ignored everywhere
pub const CHECKPOINT_MARKER: &str = ".ipynb_checkpoints";

/// Image extensions picked up from directory roots
pub const IMAGE_EXTENSIONS: [&str; 3] = ["tif", "png", "jpg"];

/// Substring expected in prediction file names
pub const DT_TAG: &str = "img";

/// Substring expected in ground-truth file names
pub const GT_TAG: &str = "mask";

/// Index-aligned GT and DT path lists for one method
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    pub gt: Vec<PathBuf>,
    pub dt: Vec<PathBuf>,
}

impl FileSet {
    pub fn len(&self) -> usize {
        self.dt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dt.is_empty()
    }

    pub fn pairs(&self) -> Vec<ImagePair> {
        self.gt
            .iter()
            .zip(&self.dt)
            .map(|(gt, dt)| ImagePair {
                gt_path: gt.clone(),
                dt_path: dt.clone(),
            })
            .collect()
    }
}

/// Discovers GT/DT files and pairs them by name substitution.
///
/// Pairing keeps the historical behaviour: the candidate GT list is the DT
/// list filtered by whether `mask -> img` and `gt_root -> dt_root` maps back
/// into the DT set, and each DT path is mapped to its GT counterpart with
/// `img -> mask` and `dt_root -> gt_root`. GT files with no prediction are
/// ignored rather than reported.
pub struct FileSetResolver {
    context: EvalContext,
}

impl FileSetResolver {
    pub fn new(context: EvalContext) -> Self {
        Self { context }
    }

    pub fn resolve(&self, gt_root: &Path, dt_root: &Path) -> Result<FileSet> {
        let _span = self.context.span.enter();

        let gt_root = strip_marker(gt_root);
        let dt_root = strip_marker(dt_root);
        for root in [&gt_root, &dt_root] {
            if !Path::new(root).exists() {
                return Err(EvalError::MissingPath(PathBuf::from(root)).into());
            }
        }
        tracing::info!("gt:{}", gt_root);
        tracing::info!("dt:{}", dt_root);

        let gt_masks: Vec<PathBuf> = if Path::new(&gt_root).is_file() {
            vec![PathBuf::from(&gt_root)]
        } else {
            search_files(Path::new(&gt_root))
                .into_iter()
                .filter(|p| p.to_string_lossy().contains(GT_TAG))
                .collect()
        };
        tracing::debug!("{} GT masks under {}", gt_masks.len(), gt_root);

        let dt: Vec<PathBuf> = if Path::new(&dt_root).is_file() {
            vec![PathBuf::from(&dt_root)]
        } else {
            search_files(Path::new(&dt_root))
        };

        let dt_set: HashSet<String> = dt.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let gt: Vec<PathBuf> = dt
            .iter()
            .filter(|p| {
                let mapped = p
                    .to_string_lossy()
                    .replace(GT_TAG, DT_TAG)
                    .replace(&gt_root, &dt_root);
                dt_set.contains(&mapped)
            })
            .map(|p| gt_counterpart(p, &gt_root, &dt_root))
            .collect();

        if gt.len() != dt.len() {
            return Err(EvalError::LengthMismatch {
                gt: gt.len(),
                dt: dt.len(),
            }
            .into());
        }

        if self.context.verbose {
            for (g, d) in gt.iter().zip(&dt) {
                tracing::debug!("pair {} <-> {}", g.display(), d.display());
            }
        }

        Ok(FileSet { gt, dt })
    }
}

/// GT path for a DT path: `img -> mask`, then `dt_root -> gt_root`
pub fn gt_counterpart(dt_path: &Path, gt_root: &str, dt_root: &str) -> PathBuf {
    PathBuf::from(
        dt_path
            .to_string_lossy()
            .replace(DT_TAG, GT_TAG)
            .replace(dt_root, gt_root),
    )
}

/// Recursively list image files under `root`, sorted by name within each directory
pub fn search_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().contains(CHECKPOINT_MARKER))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .collect()
}

fn strip_marker(root: &Path) -> String {
    root.to_string_lossy().replace(CHECKPOINT_MARKER, "")
}
