use anyhow::Result;
use image::Rgb;

use crate::config::{EXCLUDED_COLUMNS, GAINED_DETECTIONS, HEADLINE_METRICS, METHOD_STYLES, method_color};
use crate::context::EvalContext;
use crate::models::MetricSummary;
use crate::table::MetricTable;

/// One method's bars in the comparison chart
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSeries {
    pub method: String,
    pub color: Rgb<u8>,
    /// Aligned with `ComparisonTable::metrics`; NaN when the method lacks a metric
    pub values: Vec<f64>,
}

/// Headline metrics for every method of one threshold, in plotting order
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    pub title: String,
    pub metrics: Vec<String>,
    pub series: Vec<MethodSeries>,
}

impl ComparisonTable {
    pub fn methods(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.method.as_str()).collect()
    }

    pub fn value(&self, method: &str, metric: &str) -> Option<f64> {
        let idx = self.metrics.iter().position(|m| m == metric)?;
        self.series
            .iter()
            .find(|s| s.method == method)
            .map(|s| s.values[idx])
    }
}

/// Five-number summary used for one box
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

/// Boxes for one metric across methods
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBoxes {
    pub metric: String,
    pub boxes: Vec<(String, Rgb<u8>, Option<BoxStats>)>,
}

/// Turns per-file tables into per-method summaries and cross-method views
pub struct ResultAggregator {
    context: EvalContext,
}

impl ResultAggregator {
    pub fn new(context: EvalContext) -> Self {
        Self { context }
    }

    /// Drop raw columns, key rows by file name and average each metric
    pub fn summarize(&self, table: &mut MetricTable, names: &[String]) -> Result<MetricSummary> {
        table.drop_columns(&EXCLUDED_COLUMNS);
        table.set_index(names)?;

        let summary = table.mean();
        let _span = self.context.span.enter();
        if self.context.verbose {
            tracing::debug!("For each piece of data in the test set, the evaluation results are as follows:");
            for row in &table.rows {
                tracing::debug!("{} {:?}", row.file, row.values);
            }
        }
        tracing::info!("The statistical indicators for the entire data set are as follows: {:?}", summary.0);
        Ok(summary)
    }

    /// Headline table with known methods first, then the rest in input order
    pub fn compare(&self, title: impl Into<String>, results: &[(String, MetricSummary)]) -> ComparisonTable {
        let series = order_methods(results.iter().map(|(m, _)| m.as_str()))
            .into_iter()
            .filter_map(|method| {
                let summary = results.iter().find(|(m, _)| *m == method).map(|(_, s)| s)?;
                let mut summary = summary.clone();
                summary.remove(GAINED_DETECTIONS);
                Some(MethodSeries {
                    color: method_color(&method),
                    values: HEADLINE_METRICS
                        .iter()
                        .map(|metric| summary.get(metric).unwrap_or(f64::NAN))
                        .collect(),
                    method,
                })
            })
            .collect();

        ComparisonTable {
            title: title.into(),
            metrics: HEADLINE_METRICS.iter().map(|m| m.to_string()).collect(),
            series,
        }
    }

    /// Box statistics for every column of the first table, one box per method.
    ///
    /// A method appearing in several tables keeps its last one.
    pub fn box_stats(&self, tables: &[(String, MetricTable)]) -> Vec<MetricBoxes> {
        let mut latest: Vec<(&str, &MetricTable)> = Vec::new();
        for (method, table) in tables {
            match latest.iter_mut().find(|(m, _)| *m == method.as_str()) {
                Some(entry) => entry.1 = table,
                None => latest.push((method.as_str(), table)),
            }
        }
        let Some((_, first)) = latest.first() else {
            return Vec::new();
        };

        first
            .columns
            .iter()
            .map(|metric| MetricBoxes {
                metric: metric.clone(),
                boxes: latest
                    .iter()
                    .map(|(method, table)| {
                        let stats = table.column(metric).and_then(|v| box_stats(&v));
                        (method.to_string(), method_color(method), stats)
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Preferred plotting order: known methods first, unknown ones after, as given
pub fn order_methods<'a>(methods: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let methods: Vec<&str> = methods.into_iter().collect();
    let mut ordered: Vec<String> = METHOD_STYLES
        .iter()
        .filter(|(name, _)| methods.contains(name))
        .map(|(name, _)| name.to_string())
        .collect();
    ordered.extend(
        methods
            .iter()
            .filter(|m| !METHOD_STYLES.iter().any(|(name, _)| name == *m))
            .map(|m| m.to_string()),
    );
    ordered
}

/// Quartiles with linear interpolation, whiskers at 1.5 IQR clipped to the data
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile(&sorted, 0.25);
    let median = quantile(&sorted, 0.5);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let inside: Vec<f64> = sorted.iter().copied().filter(|v| *v >= lo && *v <= hi).collect();
    Some(BoxStats {
        q1,
        median,
        q3,
        whisker_low: inside.first().copied().unwrap_or(q1),
        whisker_high: inside.last().copied().unwrap_or(q3),
        outliers: sorted.iter().copied().filter(|v| *v < lo || *v > hi).collect(),
    })
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
