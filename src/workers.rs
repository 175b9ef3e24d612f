//! Worker pool for parallel chunk encoding
//!
//! Workers pull indexed jobs from a bounded queue and send indexed results
//! back. The collector restores input order with a reorder buffer, so the
//! output never depends on which worker finishes first.

use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};
use std::collections::BTreeMap;
use std::thread;

pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `job` to every item and return the results in input order.
    ///
    /// `on_complete` sees each result in order as soon as it can be placed.
    /// The first error stops the run; remaining jobs are not started.
    pub fn map_ordered<T, R, F, C>(&self, items: &[T], job: F, mut on_complete: C) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
        C: FnMut(&R),
    {
        let threads = self.threads.min(items.len());
        if threads <= 1 {
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                let result = job(item)?;
                on_complete(&result);
                results.push(result);
            }
            return Ok(results);
        }

        let (job_sender, job_receiver) = bounded::<(usize, &T)>(threads * 2);
        let (result_sender, result_receiver) = bounded::<(usize, Result<R>)>(threads * 2);

        thread::scope(|scope| {
            for worker_id in 0..threads {
                let job_receiver = job_receiver.clone();
                let result_sender = result_sender.clone();
                let job = &job;
                scope.spawn(move || worker_loop(worker_id, job_receiver, result_sender, job));
            }
            drop(job_receiver);
            drop(result_sender);

            scope.spawn(move || {
                for (index, item) in items.iter().enumerate() {
                    if job_sender.send((index, item)).is_err() {
                        break;
                    }
                }
            });

            collect_ordered(result_receiver, items.len(), &mut on_complete)
        })
    }
}

fn worker_loop<T, R, F>(
    worker_id: usize,
    jobs: Receiver<(usize, &T)>,
    results: Sender<(usize, Result<R>)>,
    job: &F,
) where
    F: Fn(&T) -> Result<R>,
{
    debug!("Worker {} started", worker_id);

    while let Ok((index, item)) = jobs.recv() {
        let result = job(item);
        if let Err(e) = &result {
            error!("Worker {} failed on chunk {}: {}", worker_id, index, e);
        }
        if results.send((index, result)).is_err() {
            break;
        }
    }

    debug!("Worker {} finished", worker_id);
}

/// Drain results into input order. Dropping the receiver on return makes
/// any still-running worker stop at its next send.
fn collect_ordered<R, C>(results: Receiver<(usize, Result<R>)>, total: usize, on_complete: &mut C) -> Result<Vec<R>>
where
    C: FnMut(&R),
{
    let mut ordered = Vec::with_capacity(total);
    let mut pending = BTreeMap::new();

    for (index, result) in results.iter() {
        pending.insert(index, result?);
        while let Some(result) = pending.remove(&ordered.len()) {
            on_complete(&result);
            ordered.push(result);
        }
    }

    Ok(ordered)
}
