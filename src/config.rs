use std::path::PathBuf;

use image::Rgb;

/// Cutoff used when a single threshold is evaluated
pub const DEFAULT_CUTOFF: f64 = 0.55;

/// Ordered sweep used in multi-threshold mode
pub const MULTI_CUTOFFS: [f64; 6] = [0.2, 0.4, 0.5, 0.55, 0.6, 0.8];

/// Raw or intermediate engine columns that never reach a summary
pub const EXCLUDED_COLUMNS: [&str; 13] = [
    "jaccard",
    "missed_det_from_merge",
    "gained_det_from_split",
    "true_det_in_catastrophe",
    "pred_det_in_catastrophe",
    "merge",
    "split",
    "catastrophe",
    "seg",
    "n_pred",
    "n_true",
    "correct_detections",
    "missed_detections",
];

/// Metrics shown in the grouped bar chart, in display order
pub const HEADLINE_METRICS: [&str; 5] = ["Precision", "Recall", "F1", "dice", "PQ"];

/// Transient column dropped before display
pub const GAINED_DETECTIONS: &str = "gained_detections";

/// Known methods in preferred plotting order, with their bar colors
pub const METHOD_STYLES: [(&str, &str); 10] = [
    ("cellprofiler", "#ff7f0e"),
    ("MEDIAR", "#d62728"),
    ("cellpose", "#1f77b4"),
    ("cellpose3", "#2ca02c"),
    ("sam", "#8c564b"),
    ("stardist", "#9467bd"),
    ("deepcell", "#17becf"),
    ("cellbin2", "#bcbd22"),
    ("hovernet", "#e377c2"),
    ("cyto3_train_at_cellbinDB", "#7f7f7f"),
];

/// Color for methods without a fixed style
pub const DEFAULT_METHOD_COLOR: Rgb<u8> = Rgb([96, 96, 96]);

/// Environment variable overriding the morphology script location
pub const MORPHOLOGY_SCRIPT_ENV: &str = "CELLSEG_MORPHOLOGY_SCRIPT";

/// Parse a `#rrggbb` color
pub fn parse_hex_color(hex: &str) -> Option<Rgb<u8>> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Color assigned to a method in plots
pub fn method_color(method: &str) -> Rgb<u8> {
    METHOD_STYLES
        .iter()
        .find(|(name, _)| *name == method)
        .and_then(|(_, hex)| parse_hex_color(hex))
        .unwrap_or(DEFAULT_METHOD_COLOR)
}

/// External morphological analysis run once after the sweep
#[derive(Debug, Clone)]
pub struct MorphologyConfig {
    pub enabled: bool,
    pub interpreter: String,
    pub script: PathBuf,
}

impl MorphologyConfig {
    /// Script from `CELLSEG_MORPHOLOGY_SCRIPT`, else `src/eval/cellmorphology/maskanalysis.py`
    /// under the working directory.
    pub fn from_env() -> Self {
        let script = std::env::var_os(MORPHOLOGY_SCRIPT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::current_dir()
                    .unwrap_or_default()
                    .join("src/eval/cellmorphology/maskanalysis.py")
            });
        Self {
            enabled: true,
            interpreter: "python".to_string(),
            script,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::from_env()
        }
    }
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Settings for a full evaluation sweep
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub cutoffs: Vec<f64>,
    /// Write each cutoff into its own `eval@<threshold>` directory
    pub per_threshold_dirs: bool,
    pub morphology: MorphologyConfig,
}

impl EvalConfig {
    pub fn new() -> Self {
        Self {
            cutoffs: vec![DEFAULT_CUTOFF],
            per_threshold_dirs: false,
            morphology: MorphologyConfig::default(),
        }
    }

    /// Switch between the single default cutoff and the six-value sweep
    pub fn with_multi_threshold(mut self, multi: bool) -> Self {
        if multi {
            self.cutoffs = MULTI_CUTOFFS.to_vec();
        } else {
            self.cutoffs = vec![DEFAULT_CUTOFF];
        }
        self.per_threshold_dirs = multi;
        self
    }

    pub fn with_morphology(mut self, morphology: MorphologyConfig) -> Self {
        self.morphology = morphology;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self::new()
    }
}
