use log::{debug, warn};
use snafu::ResultExt;
use std::sync::mpsc;
use std::thread;

use crate::error::*;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single thread running jobs one at a time, in submission order.
pub struct BackgroundQueue {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackgroundQueue {
    pub fn new(name: &str) -> VettingResult<BackgroundQueue> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
                debug!("BackgroundQueue: {} stopped", thread_name);
            })
            .context(WorkerSpawnSnafu)?;
        Ok(BackgroundQueue {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) -> VettingResult<()> {
        match &self.sender {
            Some(sender) => sender
                .send(Box::new(job))
                .map_err(|_| VettingError::WorkerStopped {}),
            None => WorkerStoppedSnafu.fail(),
        }
    }

    /// Runs the queued jobs, then stops the thread.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("BackgroundQueue: a job panicked");
            }
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
