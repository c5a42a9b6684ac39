use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use argus_core::cutouts::{self, CutoutConfig};
use argus_core::detect::catalog::{self, CatalogProvenance, SortKey};
use argus_core::detect::{self, DetectConfig};
use argus_core::io::load_fits;
use argus_core::lines::{suppress_lines, LineSuppressConfig};
use argus_core::paths;
use argus_core::stretch::{stretch, StretchMethod};

use super::diff::SortArg;

#[derive(Args)]
pub struct DetectArgs {
    /// Difference FITS file
    pub difference: PathBuf,

    /// Reference (template) FITS for cutout context
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Aligned observation FITS for cutout context and aligned SNR
    #[arg(long)]
    pub aligned: Option<PathBuf>,

    /// Output directory (default: alongside the difference file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Detection threshold on the stretched image
    #[arg(long, default_value = "0.0")]
    pub threshold: f32,

    #[arg(long, default_value = "2")]
    pub min_area: usize,

    #[arg(long, default_value = "36")]
    pub max_area: usize,

    #[arg(long, default_value = "0.79")]
    pub min_circularity: f64,

    #[arg(long, default_value = "1.2")]
    pub max_jaggedness_ratio: f64,

    /// Stretch method: peak or percentile
    #[arg(long, default_value = "percentile")]
    pub stretch: String,

    #[arg(long, default_value = "99.95")]
    pub percentile_low: f64,

    /// Suppress bright lines before detection
    #[arg(long)]
    pub remove_lines: bool,

    /// Catalog sort key
    #[arg(long, value_enum, default_value = "quality-score")]
    pub sort_by: SortArg,

    /// Generate the two-frame blink animation per candidate
    #[arg(long)]
    pub animation: bool,

    /// Generate contour/hull/polygon audit frames per candidate
    #[arg(long)]
    pub shape_viz: bool,
}

pub fn run(args: &DetectArgs) -> Result<()> {
    let difference = load_fits(&args.difference)
        .with_context(|| format!("failed to load {}", args.difference.display()))?;

    let stretch_method = match args.stretch.as_str() {
        "peak" => StretchMethod::Peak,
        "percentile" => StretchMethod::Percentile {
            low: args.percentile_low,
        },
        other => anyhow::bail!("unknown stretch method {other:?}; expected peak or percentile"),
    };

    let stretched = stretch(&difference.data, stretch_method);
    println!(
        "Stretched with {} (anchors {:.6} - {:.6})",
        stretch_method, stretched.v_lo, stretched.v_hi
    );

    let working = if args.remove_lines {
        suppress_lines(&stretched.data, &LineSuppressConfig::default())
    } else {
        stretched.data
    };

    let detect_config = DetectConfig {
        detection_threshold: args.threshold,
        min_area: args.min_area,
        max_area: args.max_area,
        min_circularity: args.min_circularity,
        max_jaggedness_ratio: args.max_jaggedness_ratio,
    };
    let mut candidates = detect::detect(&working, &detect_config, None);

    let aligned = args
        .aligned
        .as_ref()
        .map(|p| load_fits(p))
        .transpose()
        .context("failed to load aligned image")?;
    if let Some(aligned) = &aligned {
        detect::attach_aligned_snr(&mut candidates, &aligned.data);
    }

    let sort_key = match args.sort_by {
        SortArg::QualityScore => SortKey::QualityScore,
        SortArg::AlignedSnr => SortKey::AlignedSnr,
        SortArg::Snr => SortKey::Snr,
    };
    catalog::sort_candidates(&mut candidates, sort_key);

    println!("Detected {} candidate source(s)", candidates.len());
    for (i, cand) in candidates.iter().take(20).enumerate() {
        println!(
            "  #{:<3} ({:8.2}, {:8.2})  area {:>3}  circ {:.3}  snr {:7.2}  score {:8.2}",
            i + 1,
            cand.x,
            cand.y,
            cand.area,
            cand.circularity,
            cand.snr,
            cand.quality_score
        );
    }

    let output_dir = args.output.clone().unwrap_or_else(|| {
        args.difference
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let detection_dir = paths::detection_dir(&output_dir, chrono::Local::now().naive_local());
    std::fs::create_dir_all(&detection_dir)?;

    let stem = args
        .difference
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "difference".into());

    let provenance = CatalogProvenance {
        input_file: args.difference.display().to_string(),
        stretch_method: stretch_method.to_string(),
        sort_key: sort_key.to_string(),
        detection_threshold: args.threshold,
        min_area: args.min_area,
        max_area: args.max_area,
        min_circularity: args.min_circularity,
        max_jaggedness_ratio: args.max_jaggedness_ratio,
    };
    catalog::write_catalog(
        &detection_dir.join(format!("{stem}_sources.txt")),
        &candidates,
        &provenance,
    )?;

    let overlay = cutouts::render_overlay(&working, &candidates);
    overlay.save(detection_dir.join(format!("{stem}_blobs.png")))?;

    if !candidates.is_empty() {
        let reference = args
            .reference
            .as_ref()
            .map(|p| load_fits(p))
            .transpose()
            .context("failed to load reference image")?;
        let ref_data = reference.map(|r| r.data).unwrap_or_else(|| working.clone());
        let aligned_data = aligned.map(|a| a.data).unwrap_or_else(|| working.clone());

        let cutout_config = CutoutConfig {
            animation: args.animation,
            shape_viz: args.shape_viz,
            ..CutoutConfig::default()
        };
        cutouts::write_cutouts(
            &paths::cutouts_dir(&detection_dir),
            &candidates,
            &ref_data,
            &aligned_data,
            &overlay,
            "",
            &cutout_config,
        )?;
    }

    println!("Results in {}", detection_dir.display());
    Ok(())
}
