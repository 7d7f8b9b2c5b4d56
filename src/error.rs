use std::path::PathBuf;

use thiserror::Error;

/// Precondition violations that abort an evaluation run.
///
/// These are raised inside `anyhow::Error` so callers that only care about
/// the message can keep using `?`, while tests can `downcast_ref` them.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{} is not exists", .0.display())]
    MissingPath(PathBuf),

    #[error("Length of list GT {gt} are not equal to DT {dt}")]
    LengthMismatch { gt: usize, dt: usize },

    #[error("Shape of GT {gt:?} are not equal to DT {dt:?} ({})", .path.display())]
    ShapeMismatch {
        path: PathBuf,
        gt: (u32, u32),
        dt: (u32, u32),
    },

    #[error("image {} of shape {shape:?} does not fit canvas {canvas:?}", .path.display())]
    ShapeExceedsCanvas {
        path: PathBuf,
        shape: (u32, u32),
        canvas: (u32, u32),
    },

    #[error("no DT images found under {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("unsupported array {}: {reason}", .path.display())]
    UnsupportedArray { path: PathBuf, reason: String },
}
