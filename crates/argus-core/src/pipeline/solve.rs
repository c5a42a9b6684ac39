//! External plate-solver invocation.
//!
//! The solver is an opaque binary: it receives a FITS path and is expected
//! to write a WCS into the file's header. Success requires both a zero exit
//! code and usable WCS keys afterwards; the caller re-reads the header.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::SolverConfig;
use crate::error::{ArgusError, Result};

/// Run the solver on one FITS file.
pub fn solve(path: &Path, solver: &SolverConfig) -> Result<()> {
    info!(file = %path.display(), binary = %solver.binary.display(), "invoking plate solver");

    let mut child = Command::new(&solver.binary)
        .args(&solver.args)
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ArgusError::ExternalTool(format!("{}: {e}", solver.binary.display())))?;

    let deadline = Instant::now() + Duration::from_secs(solver.timeout_secs);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(ArgusError::ExternalTool(format!(
                    "solver exited with {status} for {}",
                    path.display()
                )));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!(file = %path.display(), timeout_secs = solver.timeout_secs, "solver timed out; killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ArgusError::ExternalTool(format!(
                        "solver timed out after {}s for {}",
                        solver.timeout_secs,
                        path.display()
                    )));
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => {
                return Err(ArgusError::ExternalTool(format!("solver wait failed: {e}")));
            }
        }
    }
}
