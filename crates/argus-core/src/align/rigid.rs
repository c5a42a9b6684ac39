//! Feature-based rigid alignment.
//!
//! Stars are detected in both images and a rotation + translation mapping
//! template coordinates onto observation coordinates is estimated with a
//! two-point RANSAC followed by a least-squares refinement over the inlier
//! set. When the rigid estimate fails, one degrade to a similarity transform
//! (rotation + uniform scale + translation) is attempted before giving up.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::align::stars::{detect_stars, Star};
use crate::align::{bilinear_sample, AlignMethod, AlignmentResult};
use crate::consts::{
    MAX_ALIGNMENT_STARS, MIN_STAR_MATCHES, PARALLEL_PIXEL_THRESHOLD, RANSAC_MAX_ITERS,
    RANSAC_RIGID_THRESHOLD, RANSAC_SIMILARITY_THRESHOLD,
};
use crate::error::{ArgusError, Result};

/// Rotation + uniform scale + translation mapping reference coordinates to
/// observation coordinates. Rigid transforms have scale 1.
#[derive(Clone, Copy, Debug)]
pub struct RigidTransform {
    pub rotation: f64,
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
}

impl RigidTransform {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let (s, c) = self.rotation.sin_cos();
        (
            self.scale * (c * x - s * y) + self.tx,
            self.scale * (s * x + c * y) + self.ty,
        )
    }

    pub fn rotation_deg(&self) -> f64 {
        self.rotation.to_degrees()
    }
}

/// Align `observation` onto the grid of `reference` with star matching.
pub fn align_rigid(
    reference: &Array2<f32>,
    observation: &Array2<f32>,
) -> Result<AlignmentResult> {
    let ref_stars = detect_stars(reference, MAX_ALIGNMENT_STARS);
    let obs_stars = detect_stars(observation, MAX_ALIGNMENT_STARS);
    info!(
        reference_stars = ref_stars.len(),
        observation_stars = obs_stars.len(),
        "detected alignment features"
    );

    if ref_stars.len() < MIN_STAR_MATCHES || obs_stars.len() < MIN_STAR_MATCHES {
        return Err(ArgusError::AlignmentFailed("too_few_features".into()));
    }

    let transform = match estimate(&ref_stars, &obs_stars, false, RANSAC_RIGID_THRESHOLD) {
        Some((t, inliers)) => {
            info!(inliers, "rigid transform estimated");
            t
        }
        None => {
            warn!("rigid estimation failed; degrading to similarity transform");
            match estimate(&ref_stars, &obs_stars, true, RANSAC_SIMILARITY_THRESHOLD) {
                Some((t, inliers)) => {
                    info!(inliers, "similarity transform estimated");
                    t
                }
                None => return Err(ArgusError::AlignmentFailed("no_alignment".into())),
            }
        }
    };

    info!(
        dx = transform.tx,
        dy = transform.ty,
        rotation_deg = transform.rotation_deg(),
        scale = transform.scale,
        "alignment transform"
    );

    Ok(resample(reference.dim(), observation, transform))
}

/// Resample the observation over the reference grid under `transform`.
fn resample(
    shape: (usize, usize),
    observation: &Array2<f32>,
    transform: RigidTransform,
) -> AlignmentResult {
    let (h, w) = shape;
    let (oh, ow) = observation.dim();

    let one_row = |row: usize| -> (Vec<f32>, Vec<u8>) {
        let mut values = Vec::with_capacity(w);
        let mut mask = Vec::with_capacity(w);
        for col in 0..w {
            let (x, y) = transform.apply(col as f64, row as f64);
            let inside = x >= -1e-6
                && y >= -1e-6
                && x <= (ow - 1) as f64 + 1e-6
                && y <= (oh - 1) as f64 + 1e-6;
            if inside {
                values.push(bilinear_sample(observation, y, x));
                mask.push(1);
            } else {
                values.push(0.0);
                mask.push(0);
            }
        }
        (values, mask)
    };

    let rows: Vec<(Vec<f32>, Vec<u8>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(one_row).collect()
    } else {
        (0..h).map(one_row).collect()
    };

    let mut data = Array2::<f32>::zeros((h, w));
    let mut mask = Array2::<u8>::zeros((h, w));
    for (row, (values, flags)) in rows.into_iter().enumerate() {
        for (col, v) in values.into_iter().enumerate() {
            data[[row, col]] = v;
        }
        for (col, m) in flags.into_iter().enumerate() {
            mask[[row, col]] = m;
        }
    }

    AlignmentResult {
        data,
        mask,
        method_used: AlignMethod::Rigid,
        transform: Some(transform),
    }
}

/// Two-point RANSAC over unmatched star sets.
///
/// Each hypothesis takes a star pair from either image; matching segment
/// lengths constrain the candidate (equal for rigid, ratio-bounded for
/// similarity). The transform with the most reference stars landing within
/// `threshold` pixels of some observation star wins, then gets a
/// least-squares polish over its inlier pairs. Deterministic: the sampler is
/// a fixed-seed LCG, so identical inputs yield identical transforms.
fn estimate(
    ref_stars: &[Star],
    obs_stars: &[Star],
    allow_scale: bool,
    threshold: f64,
) -> Option<(RigidTransform, usize)> {
    let mut rng = Lcg::new(0x5DEECE66D);
    let mut best: Option<(RigidTransform, usize)> = None;

    for _ in 0..RANSAC_MAX_ITERS {
        let i1 = rng.below(ref_stars.len());
        let i2 = rng.below(ref_stars.len());
        let j1 = rng.below(obs_stars.len());
        let j2 = rng.below(obs_stars.len());
        if i1 == i2 || j1 == j2 {
            continue;
        }

        let (a1, a2) = (ref_stars[i1], ref_stars[i2]);
        let (b1, b2) = (obs_stars[j1], obs_stars[j2]);

        let len_a = ((a2.x - a1.x).powi(2) + (a2.y - a1.y).powi(2)).sqrt();
        let len_b = ((b2.x - b1.x).powi(2) + (b2.y - b1.y).powi(2)).sqrt();
        if len_a < 4.0 || len_b < 4.0 {
            continue;
        }

        let scale = if allow_scale {
            let s = len_b / len_a;
            if !(0.8..=1.25).contains(&s) {
                continue;
            }
            s
        } else {
            if (len_a - len_b).abs() > threshold {
                continue;
            }
            1.0
        };

        let rotation = (b2.y - b1.y).atan2(b2.x - b1.x) - (a2.y - a1.y).atan2(a2.x - a1.x);
        let (s, c) = rotation.sin_cos();
        let tx = b1.x - scale * (c * a1.x - s * a1.y);
        let ty = b1.y - scale * (s * a1.x + c * a1.y);
        let candidate = RigidTransform {
            rotation,
            scale,
            tx,
            ty,
        };

        let inliers = match_inliers(ref_stars, obs_stars, &candidate, threshold);
        if inliers.len() >= MIN_STAR_MATCHES
            && best.as_ref().map_or(true, |(_, n)| inliers.len() > *n)
        {
            let refined = least_squares(&inliers, allow_scale).unwrap_or(candidate);
            let refined_inliers = match_inliers(ref_stars, obs_stars, &refined, threshold);
            if refined_inliers.len() >= inliers.len() {
                best = Some((refined, refined_inliers.len()));
            } else {
                best = Some((candidate, inliers.len()));
            }
        }
    }

    best
}

/// Reference stars whose transformed position lands within `threshold` of
/// some observation star, paired with that star.
fn match_inliers(
    ref_stars: &[Star],
    obs_stars: &[Star],
    transform: &RigidTransform,
    threshold: f64,
) -> Vec<(Star, Star)> {
    let t2 = threshold * threshold;
    let mut pairs = Vec::new();
    for &r in ref_stars {
        let (x, y) = transform.apply(r.x, r.y);
        let mut best: Option<(f64, Star)> = None;
        for &o in obs_stars {
            let d2 = (o.x - x).powi(2) + (o.y - y).powi(2);
            if d2 <= t2 && best.map_or(true, |(bd, _)| d2 < bd) {
                best = Some((d2, o));
            }
        }
        if let Some((_, o)) = best {
            pairs.push((r, o));
        }
    }
    pairs
}

/// Closed-form 2D Procrustes fit over matched pairs.
fn least_squares(pairs: &[(Star, Star)], allow_scale: bool) -> Option<RigidTransform> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let (mut mrx, mut mry, mut mox, mut moy) = (0.0, 0.0, 0.0, 0.0);
    for (r, o) in pairs {
        mrx += r.x;
        mry += r.y;
        mox += o.x;
        moy += o.y;
    }
    mrx /= n;
    mry /= n;
    mox /= n;
    moy /= n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut norm = 0.0;
    for (r, o) in pairs {
        let ax = r.x - mrx;
        let ay = r.y - mry;
        let bx = o.x - mox;
        let by = o.y - moy;
        sxx += ax * bx + ay * by;
        sxy += ax * by - ay * bx;
        norm += ax * ax + ay * ay;
    }
    if norm == 0.0 {
        return None;
    }

    let rotation = sxy.atan2(sxx);
    let scale = if allow_scale {
        (sxx * sxx + sxy * sxy).sqrt() / norm
    } else {
        1.0
    };
    let (s, c) = rotation.sin_cos();
    Some(RigidTransform {
        rotation,
        scale,
        tx: mox - scale * (c * mrx - s * mry),
        ty: moy - scale * (s * mrx + c * mry),
    })
}

/// Minimal deterministic pseudo-random sampler (64-bit LCG).
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn below(&mut self, bound: usize) -> usize {
        ((self.next() >> 16) % bound as u64) as usize
    }
}
