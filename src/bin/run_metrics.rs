//! Score one truth/prediction file pair and write detailed and summary JSON.
//!
//! Inputs may be `.npy` arrays, TIFF files or any other image format the
//! `image` crate reads. 2D (and 3D) arrays get a leading batch axis.

use clap::Parser;
use std::path::PathBuf;

use cellseg_eval::normalize::load_array;
use cellseg_eval::{DetailedRunner, EvalContext, SummaryExtractor};

#[derive(Parser)]
#[command(name = "run-metrics")]
#[command(about = "Run segmentation metrics on two files")]
struct Cli {
    /// Path to ground-truth file (.npy, .tif, ...)
    truth: PathBuf,

    /// Path to predicted file (.npy, .tif, ...)
    pred: PathBuf,

    /// Name used in output filenames
    #[arg(long, default_value = "model")]
    model_name: String,

    /// Directory to save JSON output
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    #[arg(long, default_value_t = 0.4)]
    cutoff1: f64,

    #[arg(long, default_value_t = 0.1)]
    cutoff2: f64,

    #[arg(long, default_value_t = 0.5)]
    pixel_threshold: f64,

    /// Treat inputs as 3D (batch, z, x, y)
    #[arg(long)]
    is_3d: bool,

    /// Keep only the summary JSON, deleting detailed results afterwards
    #[arg(long)]
    summary_only: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    cellseg_eval::init_logging(args.verbose);
    let context = EvalContext::new()
        .with_span(tracing::info_span!("run_metrics", model = %args.model_name))
        .with_verbose(args.verbose);

    let truth = load_array(&args.truth)?.ensure_batch();
    let pred = load_array(&args.pred)?.ensure_batch();
    if truth.shape != pred.shape {
        eprintln!("Shape mismatch: truth {:?} vs pred {:?}", truth.shape, pred.shape);
        std::process::exit(1);
    }

    DetailedRunner::new(&args.model_name, &args.outdir, context.child("metrics"))
        .with_cutoffs(args.cutoff1, args.cutoff2)
        .with_pixel_threshold(args.pixel_threshold)
        .with_3d(args.is_3d)
        .run_all(&truth, &pred)?;
    println!("Saved metrics to {}", args.outdir.display());

    let extractor = SummaryExtractor::new(&args.outdir, &args.model_name, context.child("summary"));
    let (path, doc) = extractor.write_summary()?;
    match &doc.error {
        Some(err) => println!("Wrote summary {} (error: {})", path.display(), err),
        None => println!("Wrote summary {}", path.display()),
    }

    if args.summary_only {
        let report = extractor.cleanup();
        if report.removed.is_empty() {
            println!("No detailed JSON files removed");
        } else {
            for p in &report.removed {
                println!("Removed {}", p.display());
            }
        }
    }

    Ok(())
}
