//! Statistic computation behind a trait.
//!
//! The orchestration layer only needs "two label stacks and a cutoff in,
//! a per-image table out"; any engine honouring that contract can be
//! plugged into [`crate::orchestrator::ThresholdOrchestrator`].

pub mod detailed;
pub mod matching;

use anyhow::Result;

use crate::models::LabelArray;
use crate::table::MetricTable;

pub use detailed::{DetailedDocument, DetailedRunner, MetricRecord};
pub use matching::IouMatchingEngine;

/// Computes one row of named statistics per GT/DT pair
pub trait MetricsEngine {
    /// `gt[i]` and `dt[i]` share a shape; rows come back in input order.
    fn object_stats(&self, gt: &[LabelArray], dt: &[LabelArray], cutoff: f64)
    -> Result<MetricTable>;

    fn name(&self) -> &str;
}
