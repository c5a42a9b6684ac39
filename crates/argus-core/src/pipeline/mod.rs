//! The staged processing engine.
//!
//! Four bounded stages wired by typed queues:
//! Download (1 worker) -> PlateSolve (N) -> Differ (N) -> Detect (N).
//! Queue capacity (2N) provides backpressure; a worker draws one job,
//! processes it to completion including I/O, then pushes downstream. Job
//! order is not preserved across workers and no global finish order is
//! promised.
//!
//! Pause flips a shared flag that workers check between jobs; Stop lets the
//! current stage of every in-flight job finish, then the workers exit. A
//! job's only cross-thread state is its status record; image buffers are
//! owned by the worker holding them and the filesystem is the coordination
//! medium.

pub mod detect_stage;
pub mod differ;
pub mod download;
pub mod error_log;
pub mod job;
pub mod solve;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ArgusError;
use crate::io::read_header;
use crate::observation::ObservationDescriptor;
use crate::paths::{self, OutputProbe};
use crate::template;

use self::differ::DifferArtifacts;
pub use self::job::{JobId, JobRecord, JobSpec, JobStage, JobStatus, PipelineJob};

/// Download progress callback. Implementations may buffer or drop updates.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, _done_bytes: u64, _total_bytes: Option<u64>, _filename: &str) {}
}

/// Default sink that drops all updates.
pub struct NoOpProgress;
impl ProgressSink for NoOpProgress {}

/// Snapshot counters, updated under one mutex; readers snapshot.
#[derive(Clone, Debug, Default)]
pub struct PipelineStats {
    pub total: usize,
    pub downloaded: usize,
    pub bytes_downloaded: u64,
    pub solved: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PipelineStats {
    pub fn terminal(&self) -> usize {
        self.done + self.skipped + self.failed
    }
}

struct Control {
    paused: Mutex<bool>,
    resume: Condvar,
    stopped: AtomicBool,
}

impl Control {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            resume: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Block while paused. Returns false when the pipeline is stopping.
    fn wait_if_paused(&self) -> bool {
        let mut paused = self.paused.lock().unwrap();
        while *paused && !self.is_stopped() {
            let (guard, _) = self
                .resume
                .wait_timeout(paused, Duration::from_millis(200))
                .unwrap();
            paused = guard;
        }
        !self.is_stopped()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct Shared {
    config: Config,
    control: Control,
    records: Mutex<Vec<JobRecord>>,
    stats: Mutex<PipelineStats>,
    progress: Arc<dyn ProgressSink>,
}

impl Shared {
    fn set_status(&self, id: JobId, status: JobStatus) {
        let mut stats = self.stats.lock().unwrap();
        match &status {
            JobStatus::Done { .. } => stats.done += 1,
            JobStatus::Skipped { .. } => stats.skipped += 1,
            JobStatus::Failed { .. } => stats.failed += 1,
            JobStatus::Downloaded => stats.downloaded += 1,
            JobStatus::Solved => stats.solved += 1,
            _ => {}
        }
        drop(stats);

        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(id) {
            record.status = status;
        }
    }

    fn record_stage(&self, id: JobId, stage: JobStage, started: Instant) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(id) {
            record.stage_secs.push((stage, started.elapsed().as_secs_f64()));
        }
    }

    fn add_bytes(&self, bytes: u64) {
        self.stats.lock().unwrap().bytes_downloaded += bytes;
    }

    /// Terminal failure: status, log line, error-log row. The worker moves
    /// on to its next job; one bad observation never stops the pipeline.
    fn fail(&self, job: &PipelineJob, stage: JobStage, err: &ArgusError) {
        let kind = err.kind();
        warn!(
            file = %job.spec.filename,
            stage = %stage,
            kind = kind.as_str(),
            error = %err,
            "job failed"
        );
        error_log::append(
            &job.output_dir,
            &job.spec.filename,
            kind.as_str(),
            &err.to_string(),
        );
        self.set_status(
            job.id,
            JobStatus::Failed {
                kind,
                reason: err.to_string(),
            },
        );
    }

    fn skip(&self, job: &PipelineJob, reason: &str, log_row: bool) {
        info!(file = %job.spec.filename, reason, "job skipped");
        if log_row {
            error_log::append(&job.output_dir, &job.spec.filename, "skipped", reason);
        }
        self.set_status(
            job.id,
            JobStatus::Skipped {
                reason: reason.to_string(),
            },
        );
    }
}

/// The pipeline engine. One instance drives one batch of observations.
pub struct Pipeline {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self::with_progress(config, Arc::new(NoOpProgress))
    }

    pub fn with_progress(config: Config, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                control: Control::new(),
                records: Mutex::new(Vec::new()),
                stats: Mutex::new(PipelineStats::default()),
                progress,
            }),
            handles: Vec::new(),
        }
    }

    /// Enqueue jobs and begin execution. Returns immediately; use
    /// [`Pipeline::wait`] to block until all stages drain.
    pub fn submit(&mut self, specs: Vec<JobSpec>) {
        {
            let mut records = self.shared.records.lock().unwrap();
            for (id, spec) in specs.iter().enumerate() {
                records.push(JobRecord {
                    id,
                    filename: spec.filename.clone(),
                    status: JobStatus::Pending,
                    stage_secs: Vec::new(),
                });
            }
            self.shared.stats.lock().unwrap().total = specs.len();
        }

        let n = self.shared.config.thread_count.max(1);
        let cap = 2 * n;
        let (solve_tx, solve_rx) = bounded::<PipelineJob>(cap);
        let (differ_tx, differ_rx) = bounded::<PipelineJob>(cap);
        let (detect_tx, detect_rx) = bounded::<(PipelineJob, DifferArtifacts)>(cap);

        // Download: single worker; host bandwidth is the bottleneck.
        {
            let shared = Arc::clone(&self.shared);
            let differ_tx = differ_tx.clone();
            self.handles.push(std::thread::spawn(move || {
                download_worker(&shared, specs, solve_tx, differ_tx);
            }));
        }

        for _ in 0..n {
            let shared = Arc::clone(&self.shared);
            let rx = solve_rx.clone();
            let tx = differ_tx.clone();
            self.handles.push(std::thread::spawn(move || {
                solve_worker(&shared, &rx, &tx);
            }));
        }
        drop(differ_tx);
        drop(solve_rx);

        for _ in 0..n {
            let shared = Arc::clone(&self.shared);
            let rx = differ_rx.clone();
            let tx = detect_tx.clone();
            self.handles.push(std::thread::spawn(move || {
                differ_worker(&shared, &rx, &tx);
            }));
        }
        drop(detect_tx);
        drop(differ_rx);

        for _ in 0..n {
            let shared = Arc::clone(&self.shared);
            let rx = detect_rx.clone();
            self.handles.push(std::thread::spawn(move || {
                detect_worker(&shared, &rx);
            }));
        }
        drop(detect_rx);
    }

    /// True once every worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|h| h.is_finished())
    }

    /// Block until every stage has drained and all workers exited.
    pub fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Idempotent. Workers finish their current job's current stage, then
    /// block until [`Pipeline::resume`].
    pub fn pause(&self) {
        *self.shared.control.paused.lock().unwrap() = true;
        info!("pipeline paused");
    }

    /// Idempotent.
    pub fn resume(&self) {
        *self.shared.control.paused.lock().unwrap() = false;
        self.shared.control.resume.notify_all();
        info!("pipeline resumed");
    }

    /// Idempotent. In-flight jobs complete their current stage, then all
    /// workers exit; no mid-stage cancellation, so no partial outputs.
    pub fn stop(&self) {
        self.shared.control.stopped.store(true, Ordering::SeqCst);
        self.shared.control.resume.notify_all();
        info!("pipeline stop requested");
    }

    pub fn was_stopped(&self) -> bool {
        self.shared.control.is_stopped()
    }

    /// Read-only snapshot of every job.
    pub fn status(&self) -> Vec<JobRecord> {
        self.shared.records.lock().unwrap().clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.lock().unwrap().clone()
    }
}

/// Bounded send that keeps checking the stop flag; false means the pipeline
/// is stopping or the stage downstream is gone.
fn send_checked<T>(tx: &Sender<T>, mut item: T, control: &Control) -> bool {
    loop {
        match tx.send_timeout(item, Duration::from_millis(200)) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if control.is_stopped() {
                    return false;
                }
                item = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Bounded receive with stop polling; None ends the worker loop.
fn recv_checked<T>(rx: &Receiver<T>, control: &Control) -> Option<T> {
    loop {
        if !control.wait_if_paused() {
            return None;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(item) => return Some(item),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn download_worker(
    shared: &Shared,
    specs: Vec<JobSpec>,
    solve_tx: Sender<PipelineJob>,
    differ_tx: Sender<PipelineJob>,
) {
    let client = match download::build_client(shared.config.timeout()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "download client construction failed; all jobs fail");
            for (id, spec) in specs.into_iter().enumerate() {
                let job = make_job(shared, id, spec);
                shared.fail(&job, JobStage::Download, &e);
            }
            return;
        }
    };

    for (id, spec) in specs.into_iter().enumerate() {
        if !shared.control.wait_if_paused() {
            break;
        }
        let job = make_job(shared, id, spec);

        // Re-runs skip anything with a completed detection on disk.
        if paths::probe_output(&job.output_dir) == OutputProbe::Complete {
            shared.skip(&job, "already-processed", false);
            continue;
        }

        shared.set_status(job.id, JobStatus::Downloading);
        let started = Instant::now();
        if download::already_downloaded(&job.local_path) {
            info!(file = %job.spec.filename, "already on disk; download skipped");
        } else {
            match download::download_file(
                &client,
                &job.spec.url,
                &job.local_path,
                shared.config.retry_times,
                shared.progress.as_ref(),
                &job.spec.filename,
            ) {
                Ok(bytes) => shared.add_bytes(bytes),
                Err(e) => {
                    shared.fail(&job, JobStage::Download, &e);
                    continue;
                }
            }
        }
        shared.record_stage(job.id, JobStage::Download, started);
        shared.set_status(job.id, JobStatus::Downloaded);

        let has_wcs = match read_header(&job.local_path) {
            Ok(header) => header.has_celestial_wcs(),
            Err(e) => {
                shared.fail(&job, JobStage::Download, &e);
                continue;
            }
        };

        // Solved observations bypass PlateSolve; with the solver disabled
        // the stage would be a no-op, so those jobs go straight to Differ
        // and the aligner leads with feature matching.
        let routed = if has_wcs || shared.config.solver.is_none() {
            send_checked(&differ_tx, job, &shared.control)
        } else {
            send_checked(&solve_tx, job, &shared.control)
        };
        if !routed {
            break;
        }
    }
}

fn make_job(shared: &Shared, id: JobId, spec: JobSpec) -> PipelineJob {
    let local_path = paths::download_path(
        &shared.config.download_root,
        &spec.telescope,
        &spec.date,
        &spec.region,
        &spec.filename,
    );
    let output_dir = paths::diff_output_dir(
        &shared.config.diff_root,
        &spec.telescope,
        &spec.date,
        &spec.region,
        &spec.filename,
    );
    PipelineJob {
        id,
        spec,
        local_path,
        output_dir,
    }
}

fn solve_worker(shared: &Shared, rx: &Receiver<PipelineJob>, differ_tx: &Sender<PipelineJob>) {
    while let Some(job) = recv_checked(rx, &shared.control) {
        shared.set_status(job.id, JobStatus::Solving);
        let started = Instant::now();

        let Some(solver) = shared.config.solver.as_ref() else {
            // Routing sends jobs here only when a solver is configured.
            if !send_checked(differ_tx, job, &shared.control) {
                break;
            }
            continue;
        };

        let result = solve::solve(&job.local_path, solver).and_then(|()| {
            let header = read_header(&job.local_path)?;
            if header.has_celestial_wcs() {
                Ok(())
            } else {
                Err(ArgusError::ExternalTool(format!(
                    "solver produced no usable WCS for {}",
                    job.spec.filename
                )))
            }
        });

        match result {
            Ok(()) => {
                shared.record_stage(job.id, JobStage::PlateSolve, started);
                shared.set_status(job.id, JobStatus::Solved);
                if !send_checked(differ_tx, job, &shared.control) {
                    break;
                }
            }
            Err(e) => shared.fail(&job, JobStage::PlateSolve, &e),
        }
    }
}

fn differ_worker(
    shared: &Shared,
    rx: &Receiver<PipelineJob>,
    detect_tx: &Sender<(PipelineJob, DifferArtifacts)>,
) {
    while let Some(job) = recv_checked(rx, &shared.control) {
        let Some(template_path) =
            template::find_template(&job.spec.filename, &shared.config.template_dir)
        else {
            shared.skip(&job, "no_template", true);
            continue;
        };

        shared.set_status(job.id, JobStatus::Differing);
        let started = Instant::now();
        match differ::run_differ(&job.local_path, &template_path, &job.output_dir, &shared.config)
        {
            Ok(artifacts) => {
                shared.record_stage(job.id, JobStage::Differ, started);
                shared.set_status(job.id, JobStatus::Differed);
                if !send_checked(detect_tx, (job, artifacts), &shared.control) {
                    break;
                }
            }
            Err(e) => shared.fail(&job, JobStage::Differ, &e),
        }
    }
}

fn detect_worker(shared: &Shared, rx: &Receiver<(PipelineJob, DifferArtifacts)>) {
    while let Some((job, artifacts)) = recv_checked(rx, &shared.control) {
        shared.set_status(job.id, JobStatus::Detecting);
        let started = Instant::now();

        let stem = std::path::Path::new(&job.spec.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.spec.filename.clone());
        let label = ObservationDescriptor::parse(&job.spec.filename)
            .map(|d| format!("{}_{}", d.telescope, d.region_full()))
            .unwrap_or_else(|| format!("{}_{}", job.spec.telescope, job.spec.region));

        match detect_stage::run_detect(&artifacts, &job.output_dir, &stem, &label, &shared.config)
        {
            Ok(outcome) => {
                shared.record_stage(job.id, JobStage::Detect, started);
                shared.set_status(
                    job.id,
                    JobStatus::Done {
                        sources: outcome.sources,
                    },
                );
            }
            Err(e) => shared.fail(&job, JobStage::Detect, &e),
        }
    }
}
