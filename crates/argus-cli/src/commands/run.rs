use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use argus_core::config::{Config, ConfigStore, SolverConfig};
use argus_core::pipeline::{JobSpec, Pipeline, ProgressSink};
use argus_core::scan::{expand_url_template, DirectoryScanner, Scanner};

use crate::summary;

/// Telescopes tried when none is given and the settings store is silent.
const DEFAULT_TELESCOPES: [&str; 6] = ["GY1", "GY2", "GY3", "GY4", "GY5", "GY6"];

const SETTINGS_FILE: &str = ".argus_settings.toml";

#[derive(Args)]
pub struct RunArgs {
    /// Observation date, YYYYMMDD
    #[arg(long)]
    pub date: String,

    /// Telescope id, e.g. GY5 (default: all telescopes)
    #[arg(long)]
    pub telescope: Option<String>,

    /// Sky region, e.g. K096 (default: all regions of the telescope)
    #[arg(long)]
    pub region: Option<String>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    #[arg(long)]
    pub template_dir: Option<PathBuf>,

    #[arg(long)]
    pub diff_output_dir: Option<PathBuf>,

    /// Listing URL template with {telescope}/{date}/{region} placeholders
    #[arg(long)]
    pub url_template: Option<String>,

    /// Worker count for the solve/differ/detect stages
    #[arg(long)]
    pub thread_count: Option<usize>,

    /// Download worker cap (the download stage is single-worker; values
    /// above 1 are accepted and capped)
    #[arg(long, default_value = "1")]
    pub max_workers: usize,

    /// Download retry attempts
    #[arg(long)]
    pub retry_times: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Plate-solver binary (enables the PlateSolve stage)
    #[arg(long)]
    pub solver: Option<PathBuf>,

    /// Skip plate solving entirely
    #[arg(long)]
    pub no_astap: bool,

    /// Suppress bright lines before detection
    #[arg(long)]
    pub remove_lines: bool,
}

/// Exit codes: 0 = all jobs terminal, 1 = aborted, 2 = interrupted.
pub fn run(args: &RunArgs) -> Result<i32> {
    validate_date(&args.date)?;

    let mut store = ConfigStore::load(&PathBuf::from(SETTINGS_FILE));
    let config = build_config(args, &store)?;
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        return Ok(1);
    }

    if args.max_workers > 1 {
        warn!(
            max_workers = args.max_workers,
            "download stage is single-worker; capping to 1"
        );
    }

    store.set("download_directory", config.download_root.display().to_string());
    store.set("template_directory", config.template_dir.display().to_string());
    store.set("diff_output_directory", config.diff_root.display().to_string());
    store.set("url_template", config.url_template.clone());
    store.save();

    let specs = match collect_jobs(args, &config) {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Ok(1);
        }
    };
    if specs.is_empty() {
        println!("No observations to process.");
        return Ok(0);
    }

    summary::print_run_header(&config, &args.date, specs.len());

    let bar = ProgressBar::new(specs.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:24} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message("processing");

    let progress = Arc::new(DownloadBar::new(bar.clone()));
    let mut pipeline = Pipeline::with_progress(config, progress);
    let started = std::time::Instant::now();
    pipeline.submit(specs);

    while !pipeline.is_finished() {
        bar.set_position(pipeline.stats().terminal() as u64);
        std::thread::sleep(Duration::from_millis(200));
    }
    pipeline.wait();
    bar.set_position(pipeline.stats().terminal() as u64);
    bar.finish_with_message("done");

    summary::print_run_summary(&pipeline.status(), &pipeline.stats(), started.elapsed());

    if pipeline.was_stopped() {
        return Ok(2);
    }
    Ok(0)
}

fn validate_date(date: &str) -> Result<()> {
    anyhow::ensure!(
        date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()),
        "invalid date {date:?}: expected YYYYMMDD"
    );
    Ok(())
}

fn build_config(args: &RunArgs, store: &ConfigStore) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    let stored_path = |key: &str| store.get(key).map(PathBuf::from);
    if let Some(dir) = args.download_dir.clone().or_else(|| stored_path("download_directory")) {
        config.download_root = dir;
    }
    if let Some(dir) = args.template_dir.clone().or_else(|| stored_path("template_directory")) {
        config.template_dir = dir;
    }
    if let Some(dir) = args
        .diff_output_dir
        .clone()
        .or_else(|| stored_path("diff_output_directory"))
    {
        config.diff_root = dir;
    }
    if let Some(template) = args
        .url_template
        .clone()
        .or_else(|| store.get("url_template").map(str::to_string))
    {
        config.url_template = template;
    }
    if let Some(n) = args.thread_count {
        config.thread_count = n;
    }
    if let Some(n) = args.retry_times {
        config.retry_times = n;
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    if args.remove_lines {
        config.suppress_lines = true;
    }

    if args.no_astap {
        config.solver = None;
    } else if let Some(binary) = &args.solver {
        config.solver = Some(SolverConfig {
            binary: binary.clone(),
            args: vec!["-f".into()],
            timeout_secs: 300,
        });
    }

    anyhow::ensure!(
        !config.url_template.is_empty(),
        "no listing URL template configured; pass --url-template or set it in the config file"
    );
    Ok(config)
}

/// Scan the archive listing and expand the selection into job specs.
fn collect_jobs(args: &RunArgs, config: &Config) -> Result<Vec<JobSpec>> {
    let scanner = DirectoryScanner::new(config.timeout())?;

    let telescopes: Vec<String> = match &args.telescope {
        Some(t) => vec![t.to_uppercase()],
        None => DEFAULT_TELESCOPES.iter().map(|t| t.to_string()).collect(),
    };

    let mut specs = Vec::new();
    let mut scan_errors = 0usize;
    for telescope in &telescopes {
        let regions: Vec<String> = match &args.region {
            Some(r) => vec![r.to_uppercase()],
            None => {
                let url = expand_url_template(&config.url_template, telescope, &args.date, "");
                match scanner.scan_regions(&url) {
                    Ok(regions) => regions,
                    Err(e) => {
                        warn!(telescope, error = %e, "region scan failed");
                        scan_errors += 1;
                        continue;
                    }
                }
            }
        };
        info!(telescope, regions = regions.len(), "regions selected");

        for region in &regions {
            let url = expand_url_template(&config.url_template, telescope, &args.date, region);
            let files = match scanner.scan(&url) {
                Ok(files) => files,
                Err(e) => {
                    warn!(telescope, region, error = %e, "file scan failed");
                    scan_errors += 1;
                    continue;
                }
            };
            for file in files {
                specs.push(JobSpec {
                    filename: file.filename,
                    url: file.url,
                    size: file.size,
                    telescope: telescope.clone(),
                    date: args.date.clone(),
                    region: region.clone(),
                });
            }
        }
    }

    anyhow::ensure!(
        !(specs.is_empty() && scan_errors > 0),
        "every listing scan failed; archive unreachable?"
    );
    Ok(specs)
}

/// Routes download progress onto the job progress bar's message line.
struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressSink for DownloadBar {
    fn progress(&self, done_bytes: u64, total_bytes: Option<u64>, filename: &str) {
        let done_mb = done_bytes as f64 / (1024.0 * 1024.0);
        let message = match total_bytes {
            Some(total) => format!(
                "{} {:.1}/{:.1} MB",
                truncate(filename, 40),
                done_mb,
                total as f64 / (1024.0 * 1024.0)
            ),
            None => format!("{} {:.1} MB", truncate(filename, 40), done_mb),
        };
        self.bar.set_message(message);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
