//! Detect stage: blob detection, catalog ordering, catalog file, cutouts.
//!
//! Products are assembled in a work directory and renamed to the final
//! `detection_YYYYMMDD_HHMMSS` name only on success, so a rerun never
//! mistakes a partial run for a completed one.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::cutouts;
use crate::detect::catalog::{self, CatalogProvenance};
use crate::detect::{self, DetectionCandidate};
use crate::error::Result;
use crate::paths;

use super::differ::DifferArtifacts;

pub struct DetectOutcome {
    pub sources: usize,
    pub detection_dir: PathBuf,
}

/// Run detection and write all products for one job.
///
/// `label` carries the telescope/region filename tokens; `stem` names the
/// catalog file.
pub fn run_detect(
    artifacts: &DifferArtifacts,
    output_dir: &Path,
    stem: &str,
    label: &str,
    config: &Config,
) -> Result<DetectOutcome> {
    let timestamp = chrono::Local::now().naive_local();
    let final_dir = paths::detection_dir(output_dir, timestamp);
    let work_dir = output_dir.join(format!("work_{}", timestamp.format("%Y%m%d_%H%M%S")));
    std::fs::create_dir_all(&work_dir)?;

    let result = build_products(artifacts, &work_dir, stem, label, config);
    match result {
        Ok(candidates) => {
            std::fs::rename(&work_dir, &final_dir)?;
            info!(
                sources = candidates.len(),
                dir = %final_dir.display(),
                "detection complete"
            );
            Ok(DetectOutcome {
                sources: candidates.len(),
                detection_dir: final_dir,
            })
        }
        Err(e) => {
            let _ = std::fs::remove_dir_all(&work_dir);
            Err(e)
        }
    }
}

fn build_products(
    artifacts: &DifferArtifacts,
    work_dir: &Path,
    stem: &str,
    label: &str,
    config: &Config,
) -> Result<Vec<DetectionCandidate>> {
    let mut candidates = detect::detect(
        &artifacts.stretched,
        &config.detection,
        Some(&artifacts.overlap_mask),
    );
    detect::attach_aligned_snr(&mut candidates, &artifacts.aligned);
    catalog::sort_candidates(&mut candidates, config.sort_by);

    let provenance = CatalogProvenance {
        input_file: stem.to_string(),
        stretch_method: artifacts.stretch_description.clone(),
        sort_key: config.sort_by.to_string(),
        detection_threshold: config.detection.detection_threshold,
        min_area: config.detection.min_area,
        max_area: config.detection.max_area,
        min_circularity: config.detection.min_circularity,
        max_jaggedness_ratio: config.detection.max_jaggedness_ratio,
    };
    catalog::write_catalog(
        &work_dir.join(format!("{stem}_sources.txt")),
        &candidates,
        &provenance,
    )?;

    let overlay = cutouts::render_overlay(&artifacts.stretched, &candidates);
    overlay.save(work_dir.join(format!("{stem}_blobs.png")))?;

    if !candidates.is_empty() {
        let cutouts_dir = paths::cutouts_dir(work_dir);
        cutouts::write_cutouts(
            &cutouts_dir,
            &candidates,
            &artifacts.reference,
            &artifacts.aligned,
            &overlay,
            label,
            &config.cutouts,
        )?;
    }

    Ok(candidates)
}
