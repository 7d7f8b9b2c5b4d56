pub mod aggregate;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod process;
pub mod render;
pub mod resolve;
pub mod summary;
pub mod table;

pub use aggregate::{ComparisonTable, ResultAggregator};
pub use config::{EvalConfig, MorphologyConfig};
pub use context::EvalContext;
pub use engine::{DetailedRunner, IouMatchingEngine, MetricsEngine};
pub use error::EvalError;
pub use models::{ImagePair, LabelArray, LabelImage, MetricSummary, Shape, ThresholdRun};
pub use normalize::{ImageKind, ImageNormalizer, NormalizedBatch};
pub use orchestrator::{MethodResult, ThresholdOrchestrator};
pub use resolve::{FileSet, FileSetResolver};
pub use summary::{ArtifactSelection, SummaryDocument, SummaryExtractor};
pub use table::{MetricTable, TableStore};

/// Install the `tracing` subscriber used by the binaries.
///
/// `RUST_LOG` wins; otherwise `debug` when verbose, `info` when not.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .try_init();
}
