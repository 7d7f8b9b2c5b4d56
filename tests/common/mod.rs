mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from cellseg_eval for tests
pub use cellseg_eval::{
    EvalConfig, EvalContext, EvalError, LabelArray, MetricSummary, MetricTable, MetricsEngine,
    MorphologyConfig, Shape, ThresholdOrchestrator,
};
