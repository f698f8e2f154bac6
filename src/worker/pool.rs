use std::thread;

use crossbeam_channel as channel;

use super::{process_item, WorkItem};
use crate::error::PipelineError;
use crate::segmentation::Segmenter;

/// Log a progress line every this many completed items.
const PROGRESS_INTERVAL: usize = 10;

/// Upper bound on the error messages surfaced to the caller.
const MAX_SURFACED_ERRORS: usize = 32;

/// Aggregated outcome of a pool run.
#[derive(Debug)]
pub struct PoolReport {
    /// Items that went through full segmentation and wrote both outputs.
    pub successful: u64,
    /// Per-item failure messages, completion-ordered, bounded.
    pub errors: Vec<String>,
}

enum WorkerEvent {
    Finished(Result<(), String>),
    InitFailed(String),
}

/// Run the work items on a fixed-size pool of worker threads.
///
/// Each worker builds exactly one segmentation session via `factory` before
/// taking any item, then drains a shared queue; results are collected in
/// completion order. A single item's failure never aborts the rest, but any
/// worker failing to initialize fails the whole run once the queue drains.
pub fn run_pool<F>(
    items: Vec<WorkItem>,
    max_workers: usize,
    factory: F,
) -> Result<PoolReport, PipelineError>
where
    F: Fn() -> anyhow::Result<Box<dyn Segmenter>> + Send + Sync,
{
    if items.is_empty() {
        return Ok(PoolReport {
            successful: 0,
            errors: Vec::new(),
        });
    }

    let total = items.len();
    let workers = max_workers.clamp(1, total);
    tracing::info!("Starting parallel processing with {workers} workers for {total} frames");

    let (work_tx, work_rx) = channel::unbounded::<WorkItem>();
    let (event_tx, event_rx) = channel::unbounded::<WorkerEvent>();
    for item in items {
        let _ = work_tx.send(item);
    }
    drop(work_tx);

    let mut successful = 0u64;
    let mut errors = Vec::new();
    let mut init_failures: Vec<String> = Vec::new();

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let work_rx = work_rx.clone();
            let event_tx = event_tx.clone();
            let factory = &factory;
            scope.spawn(move || {
                let mut segmenter = match factory() {
                    Ok(segmenter) => segmenter,
                    Err(e) => {
                        let _ = event_tx
                            .send(WorkerEvent::InitFailed(format!("worker {worker_id}: {e:#}")));
                        return;
                    }
                };
                tracing::debug!("worker {worker_id} session ready");

                for item in work_rx.iter() {
                    let result = process_item(segmenter.as_mut(), &item);
                    let _ = event_tx.send(WorkerEvent::Finished(result));
                }
            });
        }
        // Workers hold the remaining senders; the loop below ends when the
        // last worker exits.
        drop(event_tx);

        let mut completed = 0usize;
        for event in event_rx.iter() {
            match event {
                WorkerEvent::Finished(result) => {
                    completed += 1;
                    match result {
                        Ok(()) => successful += 1,
                        Err(message) => {
                            tracing::debug!("{message}");
                            errors.push(message);
                        }
                    }
                    if completed % PROGRESS_INTERVAL == 0 || completed == total {
                        tracing::info!("Progress: {completed}/{total} ({successful} successful)");
                    }
                }
                WorkerEvent::InitFailed(message) => init_failures.push(message),
            }
        }
    });

    if let Some(first) = init_failures.into_iter().next() {
        return Err(PipelineError::WorkerInit(first));
    }

    if errors.len() > MAX_SURFACED_ERRORS {
        tracing::warn!(
            "{} task errors total, surfacing the first {MAX_SURFACED_ERRORS}",
            errors.len()
        );
        errors.truncate(MAX_SURFACED_ERRORS);
    }

    Ok(PoolReport { successful, errors })
}
