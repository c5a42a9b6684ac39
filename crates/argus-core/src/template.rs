//! Template lookup: given an observation filename, find the matching
//! long-exposure template on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::observation::ObservationDescriptor;

/// Find the template for an observation.
///
/// Matching is by filename tokens: the file must contain both the telescope
/// id and the region-with-index (`K096-1`); when that fails, retry with the
/// bare region (`K096`). Deterministic: the lexicographically first match
/// wins when several templates qualify.
pub fn find_template(observation_filename: &str, template_dir: &Path) -> Option<PathBuf> {
    let descriptor = ObservationDescriptor::parse(observation_filename)?;

    let full = descriptor.region_full();
    if let Some(path) = search(template_dir, &descriptor.telescope, &full) {
        debug!(template = %path.display(), token = %full, "template matched");
        return Some(path);
    }

    if descriptor.region_index.is_some() {
        if let Some(path) = search(template_dir, &descriptor.telescope, &descriptor.region) {
            debug!(template = %path.display(), token = %descriptor.region, "template matched on bare region");
            return Some(path);
        }
    }

    warn!(
        telescope = %descriptor.telescope,
        region = %full,
        dir = %template_dir.display(),
        "no matching template"
    );
    None
}

fn search(template_dir: &Path, telescope: &str, region_token: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(template_dir).ok()?;

    let telescope = telescope.to_uppercase();
    let region_token = region_token.to_uppercase();

    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_uppercase();
            is_fits_name(&name) && name.contains(&telescope) && name.contains(&region_token)
        })
        .map(|e| e.path())
        .collect();

    matches.sort();
    matches.into_iter().next()
}

fn is_fits_name(upper_name: &str) -> bool {
    upper_name.ends_with(".FITS") || upper_name.ends_with(".FIT") || upper_name.ends_with(".FTS")
}
