use std::path::{Path, PathBuf};

use cellseg_eval::{LabelArray, MetricTable, MetricsEngine};
use image::{ImageBuffer, Luma};

/// Filled square: (x, y, size, label)
pub type Square = (u32, u32, u32, u16);

/// Writes a 16-bit label image with the given squares; format follows the extension.
pub fn write_mask(path: &Path, width: u32, height: u32, squares: &[Square]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(width, height, |x, y| {
        let label = squares
            .iter()
            .find(|(sx, sy, size, _)| x >= *sx && x < sx + size && y >= *sy && y < sy + size)
            .map(|(_, _, _, l)| *l)
            .unwrap_or(0);
        Luma([label])
    });
    img.save(path).expect("Failed to save fixture mask");
}

/// A GT root with `<stem>_mask.png` files and a DT root with one method
/// directory holding the matching `<stem>_img.png` predictions.
pub struct Layout {
    pub _dir: tempfile::TempDir,
    pub gt: PathBuf,
    pub dt: PathBuf,
    pub out: PathBuf,
}

impl Layout {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let root = dir.path().join("dataset");
        let layout = Layout {
            gt: root.join("gt"),
            dt: root.join("dt"),
            out: root.join("out"),
            _dir: dir,
        };
        std::fs::create_dir_all(&layout.gt).expect("Failed to create gt dir");
        std::fs::create_dir_all(&layout.dt).expect("Failed to create dt dir");
        layout
    }

    pub fn add_pair(&self, method: &str, stem: &str, size: (u32, u32), gt: &[Square], dt: &[Square]) {
        let (w, h) = size;
        write_mask(&self.gt.join(format!("{}_mask.png", stem)), w, h, gt);
        write_mask(&self.dt.join(method).join(format!("{}_img.png", stem)), w, h, dt);
    }

    pub fn method_dir(&self, method: &str) -> PathBuf {
        self.dt.join(method)
    }
}

/// Engine returning preset rows, one per input pair, in order
pub struct StubEngine {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<f64>>,
}

impl MetricsEngine for StubEngine {
    fn object_stats(
        &self,
        gt: &[LabelArray],
        dt: &[LabelArray],
        _cutoff: f64,
    ) -> anyhow::Result<MetricTable> {
        assert_eq!(gt.len(), dt.len());
        let mut table = MetricTable::new(self.columns.iter().copied());
        for (i, (g, d)) in gt.iter().zip(dt).enumerate() {
            assert_eq!(g.shape, d.shape);
            table.push_row(i.to_string(), self.rows[i].clone())?;
        }
        Ok(table)
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
