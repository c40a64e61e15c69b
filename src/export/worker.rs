//! Dedicated export thread so encode/mux latency never stalls the capture cadence.

use super::{ClipExporter, ClipJob, ExportKind};
use crate::capture::SharedFrame;
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Pending jobs the capture thread may queue before requests are rejected.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Debug)]
pub enum ExportJob {
    Clip(ClipJob),
    Screenshot {
        number: u32,
        frame: SharedFrame,
        path: PathBuf,
    },
}

impl ExportJob {
    pub fn describe(&self) -> String {
        match self {
            ExportJob::Clip(job) => job.kind.label(),
            ExportJob::Screenshot { number, .. } => format!("screenshot {number}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    ClipSaved {
        kind: ExportKind,
        path: PathBuf,
        frames: usize,
        samples: usize,
        elapsed: Duration,
    },
    ScreenshotSaved {
        number: u32,
        path: PathBuf,
    },
    Failed {
        job: String,
        error: String,
    },
}

/// Owns the export thread. Dropping or calling [`ExportWorker::shutdown`] closes the
/// queue and joins the thread, so queued clips are finished before exit.
pub struct ExportWorker {
    jobs: Option<Sender<ExportJob>>,
    outcomes: Receiver<ExportOutcome>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ExportWorker {
    pub fn spawn(exporter: ClipExporter, queue_depth: usize) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<ExportJob>(queue_depth.max(1));
        let (outcome_tx, outcome_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("bugreel-export".to_string())
            .spawn(move || run_jobs(&exporter, &job_rx, &outcome_tx))
            .context("failed to spawn export worker")?;
        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            handle: Some(handle),
        })
    }

    /// True when a `submit` right now would be rejected. Only the capture thread
    /// submits, so a `false` here guarantees the next `submit` has room.
    pub fn is_full(&self) -> bool {
        self.jobs.as_ref().map_or(true, |sender| sender.is_full())
    }

    /// Queue `job` without blocking. A full queue rejects the job; the caller
    /// must not advance any counters in that case.
    pub fn submit(&self, job: ExportJob) -> Result<()> {
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("export worker is shut down"))?;
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => Err(anyhow!(
                "export queue is full; dropped {}",
                job.describe()
            )),
            Err(TrySendError::Disconnected(job)) => Err(anyhow!(
                "export worker stopped; dropped {}",
                job.describe()
            )),
        }
    }

    /// Outcomes finished since the last call.
    pub fn drain_outcomes(&self) -> Vec<ExportOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Close the queue, wait for queued jobs, and return their outcomes.
    pub fn shutdown(mut self) -> Vec<ExportOutcome> {
        self.close_and_join();
        self.drain_outcomes()
    }

    fn close_and_join(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_debug("export worker panicked");
            }
        }
    }
}

impl Drop for ExportWorker {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

fn run_jobs(
    exporter: &ClipExporter,
    jobs: &Receiver<ExportJob>,
    outcomes: &Sender<ExportOutcome>,
) {
    for job in jobs.iter() {
        let outcome = run_job(exporter, job);
        if outcomes.send(outcome).is_err() {
            log_debug("export outcome receiver dropped");
        }
    }
}

fn run_job(exporter: &ClipExporter, job: ExportJob) -> ExportOutcome {
    let label = job.describe();
    let started = Instant::now();
    match job {
        ExportJob::Screenshot {
            number,
            frame,
            path,
        } => match exporter.save_screenshot(&frame, &path) {
            Ok(()) => {
                tracing::info!(
                    job = %label,
                    path = %path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "screenshot saved"
                );
                ExportOutcome::ScreenshotSaved { number, path }
            }
            Err(err) => failed(label, err),
        },
        ExportJob::Clip(clip) => {
            let kind = clip.kind;
            match exporter.export_clip(clip) {
                Ok(report) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        job = %label,
                        path = %report.path.display(),
                        frames = report.frames,
                        samples = report.samples,
                        muxed = report.muxed,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "clip exported"
                    );
                    ExportOutcome::ClipSaved {
                        kind,
                        path: report.path,
                        frames: report.frames,
                        samples: report.samples,
                        elapsed,
                    }
                }
                Err(err) => failed(label, err),
            }
        }
    }
}

fn failed(job: String, err: anyhow::Error) -> ExportOutcome {
    let error = format!("{err:#}");
    tracing::warn!(job = %job, error = %error, "export failed");
    log_debug(&format!("export {job} failed: {error}"));
    ExportOutcome::Failed { job, error }
}
