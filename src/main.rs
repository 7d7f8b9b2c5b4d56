use clap::Parser;
use std::path::PathBuf;

use cellseg_eval::{EvalConfig, EvalContext, MorphologyConfig, ThresholdOrchestrator};

#[derive(Parser)]
#[command(name = "cellseg-eval")]
#[command(about = "Evaluate cell segmentation methods against ground-truth masks")]
#[command(version = "v0.0.1")]
struct Cli {
    /// Input GT path (file or directory of *mask* images)
    #[arg(short = 'g', long = "gt-path", alias = "gt_path", value_name = "PATH")]
    gt_path: PathBuf,

    /// Input DT path; every visible subdirectory is one method
    #[arg(short = 'd', long = "dt-path", alias = "dt_path", value_name = "PATH")]
    dt_path: PathBuf,

    /// Output result path
    #[arg(short = 'o', long = "output-path", alias = "output_path", value_name = "PATH")]
    output_path: PathBuf,

    /// Sweep cutoffs 0.2, 0.4, 0.5, 0.55, 0.6, 0.8 into eval@<threshold> subdirectories
    #[arg(long, alias = "multi_threshold")]
    multi_threshold: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Morphology analysis script (defaults to $CELLSEG_MORPHOLOGY_SCRIPT)
    #[arg(long, value_name = "PATH")]
    morphology_script: Option<PathBuf>,

    /// Interpreter used to run the morphology script
    #[arg(long, value_name = "PROG", default_value = "python")]
    python: String,

    /// Do not run the morphology analysis after evaluation
    #[arg(long)]
    skip_morphology: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    cellseg_eval::init_logging(args.verbose);

    let mut morphology = if args.skip_morphology {
        MorphologyConfig::disabled()
    } else {
        MorphologyConfig::from_env()
    };
    morphology.interpreter = args.python;
    if let Some(script) = args.morphology_script {
        morphology.script = script;
    }

    let config = EvalConfig::new()
        .with_multi_threshold(args.multi_threshold)
        .with_morphology(morphology);
    let span = tracing::info_span!(
        "cellseg_eval",
        gt = %args.gt_path.display(),
        multi_threshold = args.multi_threshold
    );
    let context = EvalContext::new().with_span(span).with_verbose(args.verbose);

    let runs = ThresholdOrchestrator::new(config, context)
        .run(&args.gt_path, &args.dt_path, &args.output_path)?;

    for run in &runs {
        println!("\n=== IoU threshold {} ({}) ===", run.display_threshold(), run.out_dir.display());
        for (method, summary) in &run.summaries {
            let values: Vec<String> = summary
                .0
                .iter()
                .map(|(name, value)| format!("{}={:.4}", name, value))
                .collect();
            println!("  {}: {}", method, values.join(", "));
        }
    }

    Ok(())
}
