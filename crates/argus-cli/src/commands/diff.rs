use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use argus_core::align::AlignMethod;
use argus_core::config::Config;
use argus_core::denoise::NoiseMethod;
use argus_core::detect::catalog::SortKey;
use argus_core::pipeline::{detect_stage, differ};
use argus_core::stretch::StretchMethod;

#[derive(Args)]
pub struct DiffArgs {
    /// Observation FITS file
    pub observation: PathBuf,

    /// Template FITS file
    pub template: PathBuf,

    /// Output directory (default: alongside the observation)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Alignment method
    #[arg(long, value_enum, default_value = "wcs")]
    pub alignment: AlignmentArg,

    /// Denoise passes, comma separated: outlier, hot_cold, adaptive_median
    #[arg(long, default_value = "outlier")]
    pub noise: String,

    /// Stretch method: peak or percentile
    #[arg(long, default_value = "percentile")]
    pub stretch: String,

    /// Low percentile for the percentile stretch
    #[arg(long, default_value = "99.95")]
    pub percentile_low: f64,

    /// Suppress bright lines before detection
    #[arg(long)]
    pub remove_lines: bool,

    /// Catalog sort key
    #[arg(long, value_enum, default_value = "aligned-snr")]
    pub sort_by: SortArg,

    /// Generate the two-frame blink animation per candidate
    #[arg(long)]
    pub animation: bool,

    /// Generate contour/hull/polygon audit frames per candidate
    #[arg(long)]
    pub shape_viz: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum AlignmentArg {
    Rigid,
    Wcs,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum SortArg {
    QualityScore,
    AlignedSnr,
    Snr,
}

pub fn run(args: &DiffArgs) -> Result<()> {
    let output_dir = args.output.clone().unwrap_or_else(|| {
        args.observation
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let config = build_config(args)?;

    println!("Differencing");
    println!("  Observation: {}", args.observation.display());
    println!("  Template:    {}", args.template.display());
    println!("  Output:      {}", output_dir.display());
    println!();

    let artifacts = differ::run_differ(&args.observation, &args.template, &output_dir, &config)
        .context("differencing failed")?;
    println!("Aligned with the {} method", artifacts.method_used);
    if let Some(bbox) = artifacts.bbox {
        println!(
            "Overlap region: ({},{}) - ({},{})",
            bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max
        );
    }

    let stem = args
        .observation
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "observation".into());
    let outcome = detect_stage::run_detect(&artifacts, &output_dir, &stem, "", &config)
        .context("detection failed")?;

    println!("Detected {} candidate source(s)", outcome.sources);
    println!("Results in {}", outcome.detection_dir.display());
    Ok(())
}

fn build_config(args: &DiffArgs) -> Result<Config> {
    let mut config = Config::default();
    config.alignment = match args.alignment {
        AlignmentArg::Rigid => AlignMethod::Rigid,
        AlignmentArg::Wcs => AlignMethod::Wcs,
    };
    config.noise_methods = parse_noise(&args.noise)?;
    config.stretch = match args.stretch.as_str() {
        "peak" => StretchMethod::Peak,
        "percentile" => StretchMethod::Percentile {
            low: args.percentile_low,
        },
        other => anyhow::bail!("unknown stretch method {other:?}; expected peak or percentile"),
    };
    config.suppress_lines = args.remove_lines;
    config.sort_by = match args.sort_by {
        SortArg::QualityScore => SortKey::QualityScore,
        SortArg::AlignedSnr => SortKey::AlignedSnr,
        SortArg::Snr => SortKey::Snr,
    };
    config.cutouts.animation = args.animation;
    config.cutouts.shape_viz = args.shape_viz;
    Ok(config)
}

pub fn parse_noise(list: &str) -> Result<Vec<NoiseMethod>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "none")
        .map(|s| match s {
            "outlier" => Ok(NoiseMethod::Outlier),
            "hot_cold" => Ok(NoiseMethod::HotCold),
            "adaptive_median" => Ok(NoiseMethod::AdaptiveMedian),
            other => anyhow::bail!("unknown noise method {other:?}"),
        })
        .collect()
}
