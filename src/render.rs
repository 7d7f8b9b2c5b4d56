use std::path::Path;

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::aggregate::{ComparisonTable, MetricBoxes};

/// File name of the box plot inside a threshold directory
pub const BOXPLOT_FILE: &str = "benchmark-boxplot.png";

/// `<dataset>_benchmark.png`
pub fn bar_chart_file(dataset_name: &str) -> String {
    format!("{}_benchmark.png", dataset_name)
}

/// Draws comparison charts to image files
pub trait ChartRenderer {
    fn bar_chart(&self, table: &ComparisonTable, path: &Path) -> Result<()>;

    fn box_plot(&self, boxes: &[MetricBoxes], path: &Path) -> Result<()>;
}

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);

/// Plain raster charts: bars, boxes, axes and grid lines, no text.
#[derive(Debug, Clone)]
pub struct RasterChartRenderer {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl RasterChartRenderer {
    pub fn new() -> Self {
        Self {
            width: 1600,
            height: 1200,
            margin: 60,
        }
    }

    fn plot_area(&self, width: u32) -> (f32, f32, f32, f32) {
        let m = self.margin as f32;
        (m, m, width as f32 - 2.0 * m, self.height as f32 - 2.0 * m)
    }

    fn draw_frame(&self, img: &mut RgbImage, x0: f32, y0: f32, w: f32, h: f32, ticks: usize) {
        for i in 0..=ticks {
            let y = y0 + h * i as f32 / ticks as f32;
            draw_line_segment_mut(img, (x0, y), (x0 + w, y), GRID);
        }
        draw_line_segment_mut(img, (x0, y0), (x0, y0 + h), BLACK);
        draw_line_segment_mut(img, (x0, y0 + h), (x0 + w, y0 + h), BLACK);
    }
}

impl Default for RasterChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderer for RasterChartRenderer {
    fn bar_chart(&self, table: &ComparisonTable, path: &Path) -> Result<()> {
        let mut img = RgbImage::from_pixel(self.width, self.height, WHITE);
        let (x0, y0, w, h) = self.plot_area(self.width);
        // Values live in [0, 1]
        self.draw_frame(&mut img, x0, y0, w, h, 5);

        let groups = table.metrics.len().max(1) as f32;
        let group_w = w / groups;
        let bar_w = group_w * 0.8 / table.series.len().max(1) as f32;
        for (si, series) in table.series.iter().enumerate() {
            for (mi, value) in series.values.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                let bar_h = (value.clamp(0.0, 1.0) as f32 * h).round();
                if bar_h < 1.0 {
                    continue;
                }
                let x = x0 + group_w * mi as f32 + group_w * 0.1 + bar_w * si as f32;
                let rect = Rect::at(x as i32, (y0 + h - bar_h) as i32)
                    .of_size((bar_w as u32).max(1), bar_h as u32);
                draw_filled_rect_mut(&mut img, rect, series.color);
            }
        }

        img.save(path)
            .map_err(|e| anyhow::anyhow!("Failed to save bar chart {:?}: {}", path, e))
    }

    fn box_plot(&self, boxes: &[MetricBoxes], path: &Path) -> Result<()> {
        if boxes.is_empty() {
            anyhow::bail!("no tables to draw a box plot from");
        }
        let panel_w = self.width.max(boxes.len() as u32 * 320) / boxes.len() as u32;
        let width = panel_w * boxes.len() as u32;
        let mut img = RgbImage::from_pixel(width, self.height, WHITE);

        for (pi, metric) in boxes.iter().enumerate() {
            let stats: Vec<_> = metric.boxes.iter().filter_map(|(_, _, s)| s.as_ref()).collect();
            let lo = stats
                .iter()
                .map(|s| s.outliers.iter().copied().fold(s.whisker_low, f64::min))
                .fold(f64::INFINITY, f64::min);
            let hi = stats
                .iter()
                .map(|s| s.outliers.iter().copied().fold(s.whisker_high, f64::max))
                .fold(f64::NEG_INFINITY, f64::max);
            let (lo, hi) = if lo.is_finite() && hi > lo {
                (lo, hi)
            } else {
                (lo.min(0.0), lo.max(0.0) + 1.0)
            };

            let (px, py, pw, ph) = self.plot_area(panel_w);
            let px = px + (panel_w * pi as u32) as f32;
            self.draw_frame(&mut img, px, py, pw, ph, 4);
            let to_y = |v: f64| py + ph - ((v - lo) / (hi - lo)) as f32 * ph;

            let slot = pw / metric.boxes.len().max(1) as f32;
            for (bi, (_, color, stats)) in metric.boxes.iter().enumerate() {
                let Some(s) = stats else {
                    continue;
                };
                let cx = px + slot * (bi as f32 + 0.5);
                let half = slot * 0.3;
                let (top, bottom) = (to_y(s.q3), to_y(s.q1));
                let rect = Rect::at((cx - half) as i32, top as i32)
                    .of_size(((2.0 * half) as u32).max(1), ((bottom - top) as u32).max(1));
                draw_filled_rect_mut(&mut img, rect, *color);
                draw_hollow_rect_mut(&mut img, rect, BLACK);
                draw_line_segment_mut(&mut img, (cx - half, to_y(s.median)), (cx + half, to_y(s.median)), BLACK);
                draw_line_segment_mut(&mut img, (cx, top), (cx, to_y(s.whisker_high)), BLACK);
                draw_line_segment_mut(&mut img, (cx, bottom), (cx, to_y(s.whisker_low)), BLACK);
                for v in &s.outliers {
                    let marker = Rect::at(cx as i32 - 2, to_y(*v) as i32 - 2).of_size(5, 5);
                    draw_hollow_rect_mut(&mut img, marker, BLACK);
                }
            }
        }

        img.save(path)
            .map_err(|e| anyhow::anyhow!("Failed to save box plot {:?}: {}", path, e))
    }
}
