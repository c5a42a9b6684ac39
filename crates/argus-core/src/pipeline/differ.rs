//! Differ stage: denoise, align, difference, stretch, optional streak
//! suppression. Intermediate FITS artifacts land in the job's output
//! directory for downstream consumers and manual inspection.

use std::path::Path;

use ndarray::Array2;
use tracing::info;

use crate::align::{self, AlignMethod};
use crate::config::Config;
use crate::denoise;
use crate::diff::{self, OverlapBBox};
use crate::error::Result;
use crate::frame::FitsImage;
use crate::io::{load_fits, save_fits};
use crate::lines;
use crate::stretch;

/// Everything the Detect stage needs from a finished difference.
pub struct DifferArtifacts {
    /// Noise-cleaned template pixels.
    pub reference: Array2<f32>,
    /// Observation resampled onto the template grid.
    pub aligned: Array2<f32>,
    /// Stretched difference, streaks suppressed when enabled.
    pub stretched: Array2<f32>,
    pub overlap_mask: Array2<u8>,
    pub bbox: Option<OverlapBBox>,
    pub method_used: AlignMethod,
    pub stretch_description: String,
}

/// Run the differ for one observation/template pair.
pub fn run_differ(
    observation_path: &Path,
    template_path: &Path,
    output_dir: &Path,
    config: &Config,
) -> Result<DifferArtifacts> {
    std::fs::create_dir_all(output_dir)?;

    let mut observation = load_fits(observation_path)?;
    let mut template = load_fits(template_path)?;

    if !config.noise_methods.is_empty() {
        observation = denoise_and_record(observation, observation_path, output_dir, config)?;
        template = denoise_and_record(template, template_path, output_dir, config)?;
    }

    // A solver-less run can leave the observation without WCS; feature
    // matching is then the only viable first attempt.
    let method = if observation.header.has_celestial_wcs() {
        config.alignment
    } else {
        AlignMethod::Rigid
    };

    let alignment = align::align(&template, &observation, method)?;
    info!(method = %alignment.method_used, "alignment complete");

    let mut aligned_image = FitsImage::new(alignment.data.clone(), template.header.clone());
    aligned_image
        .header
        .push_history(format!("Aligned to template using {} method", alignment.method_used));
    let aligned_path = output_dir.join(artifact_name(observation_path, "aligned"));
    save_fits(&aligned_image, &aligned_path)?;

    let difference = diff::build_difference(&template.data, &alignment.data, config.blur_sigma);

    let mut diff_image = FitsImage::new(difference.data.clone(), template.header.clone());
    diff_image.header.push_history("Difference of aligned observation and template");
    let diff_path = output_dir.join(artifact_name(observation_path, "difference"));
    save_fits(&diff_image, &diff_path)?;

    let stretched = stretch::stretch(&difference.data, config.stretch);
    let final_data = if config.suppress_lines {
        lines::suppress_lines(&stretched.data, &config.line_suppress)
    } else {
        stretched.data
    };

    Ok(DifferArtifacts {
        reference: template.data,
        aligned: alignment.data,
        stretched: final_data,
        overlap_mask: difference.overlap_mask,
        bbox: difference.bbox,
        method_used: alignment.method_used,
        stretch_description: config.stretch.to_string(),
    })
}

fn denoise_and_record(
    image: FitsImage,
    source_path: &Path,
    output_dir: &Path,
    config: &Config,
) -> Result<FitsImage> {
    let (cleaned, mask) = denoise::clean_sequence(&image.data, &config.noise_methods, config.noise_sigma);
    let replaced: usize = mask.iter().filter(|&&m| m).count();
    info!(
        file = %source_path.display(),
        replaced,
        methods = ?config.noise_methods,
        "noise cleaning complete"
    );

    let mut result = FitsImage::new(cleaned, image.header);
    let methods: Vec<String> = config.noise_methods.iter().map(|m| m.to_string()).collect();
    result
        .header
        .push_history(format!("Noise cleaned ({}), {replaced} pixels replaced", methods.join("+")));

    let cleaned_path = output_dir.join(artifact_name(source_path, "noise_cleaned"));
    save_fits(&result, &cleaned_path)?;
    Ok(result)
}

fn artifact_name(source: &Path, suffix: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    format!("{stem}_{suffix}.fits")
}
