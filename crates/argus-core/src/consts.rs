/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// |pixel| above this counts as valid data when building the overlap mask.
pub const OVERLAP_EPSILON: f32 = 1e-6;

/// Gaussian blur sigma applied to both inputs before differencing.
pub const DEFAULT_DIFF_SIGMA: f32 = 1.0;

/// Histogram bins for the peak-stretch modal search.
pub const STRETCH_HISTOGRAM_BINS: usize = 2000;

/// A histogram bin must exceed this count to qualify as a peak.
pub const STRETCH_PEAK_MIN_COUNT: u64 = 1000;

/// Fraction of the peak-to-max span used as the peak-stretch white point.
pub const STRETCH_PEAK_RATIO: f32 = 2.0 / 3.0;

/// Default low percentile for the percentile stretch.
pub const DEFAULT_PERCENTILE_LOW: f64 = 99.95;

/// MAD to standard deviation conversion factor.
pub const MAD_SIGMA_FACTOR: f32 = 1.4826;

/// Default sigma multiplier for outlier-style denoising.
pub const DEFAULT_NOISE_SIGMA: f32 = 4.0;

/// Detection defaults (see BlobDetector).
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.0;
pub const DEFAULT_MIN_AREA: usize = 2;
pub const DEFAULT_MAX_AREA: usize = 36;
pub const DEFAULT_MIN_CIRCULARITY: f64 = 0.79;
pub const DEFAULT_MAX_JAGGEDNESS_RATIO: f64 = 1.2;

/// Composite quality score scale factor: circularity^2 * 2000 * norm_area.
pub const QUALITY_SCORE_SCALE: f64 = 2000.0;

/// Side length of the aperture used for the aligned-image SNR sort key.
pub const ALIGNED_SNR_APERTURE: usize = 7;

/// Default cutout side length in pixels.
pub const DEFAULT_CUTOUT_SIZE: usize = 100;

/// Per-frame delay of the cutout blink animation, in milliseconds.
pub const ANIMATION_FRAME_MS: u32 = 800;

/// Rigid alignment: RANSAC reprojection threshold in pixels.
pub const RANSAC_RIGID_THRESHOLD: f64 = 3.0;

/// Similarity fallback: looser reprojection threshold in pixels.
pub const RANSAC_SIMILARITY_THRESHOLD: f64 = 5.0;

/// RANSAC iteration budget.
pub const RANSAC_MAX_ITERS: usize = 2000;

/// Minimum matched star pairs for a usable transform.
pub const MIN_STAR_MATCHES: usize = 4;

/// Maximum stars kept per image for matching.
pub const MAX_ALIGNMENT_STARS: usize = 100;

/// WCS validation: per-axis pixel scale ratio tolerance around 1.0.
pub const WCS_SCALE_TOLERANCE: f64 = 0.2;

/// WCS validation: maximum sky separation of image centers, degrees.
pub const WCS_MAX_CENTER_SEPARATION_DEG: f64 = 1.0;

/// WCS reprojection: minimum overlap fraction before falling back to rigid.
pub const WCS_MIN_OVERLAP_FRACTION: f64 = 0.1;

/// Line suppression defaults.
pub const LINE_BRIGHTNESS_THRESHOLD: f32 = 50.0 / 255.0;
pub const LINE_VOTE_THRESHOLD: usize = 50;
pub const LINE_MIN_LENGTH: usize = 30;
pub const LINE_MAX_GAP: usize = 10;
pub const LINE_DILATE_SIZE: usize = 5;

/// Fixed photometric zero point for catalog magnitudes.
pub const MAGNITUDE_ZERO_POINT: f64 = 25.0;

/// Download retry defaults.
pub const DEFAULT_RETRY_TIMES: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
