// src/augment/worker.rs
//
// One augmentation worker: a named thread that owns a copy of the data loader
// and of the transform pipeline, turns index groups into batches and pushes
// them back to the coordinator.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{error, trace};

use crate::augment::abort::{AbortFlag, AbortOnPanic};
use crate::constants::WORKER_THREAD_PREFIX;
use crate::data_loader::batch::Batch;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::transform::Transform;
use crate::error::AugmentError;

/// Message on a worker's index channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IndexMessage {
    /// Build the batch for these dataset indices.
    Group(Vec<usize>),
    /// No more work; exit cleanly.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Aborting,
    Terminated,
}

/// How a worker ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Received the stop sentinel.
    Stopped,
    /// Observed the abort flag.
    Aborted,
    /// The coordinator dropped one of the channels.
    Disconnected,
}

pub(crate) type WorkerResult = Result<WorkerExit, AugmentError>;

enum Step {
    Continue,
    Stop(WorkerExit),
    Abort,
}

pub(crate) struct Worker {
    id: usize,
    loader: DataLoader,
    transforms: Option<Box<dyn Transform>>,
    index_rx: Receiver<IndexMessage>,
    data_tx: Sender<Batch>,
    abort: AbortFlag,
    poll_interval: Duration,
    state: WorkerState,
}

impl Worker {
    /// Takes ownership of a loader and transform copy and stamps them with the
    /// worker id.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        mut loader: DataLoader,
        mut transforms: Option<Box<dyn Transform>>,
        seed: u64,
        index_rx: Receiver<IndexMessage>,
        data_tx: Sender<Batch>,
        abort: AbortFlag,
        poll_interval: Duration,
    ) -> Result<Self, AugmentError> {
        loader.set_process_id(id)?;
        if let Some(t) = transforms.as_mut() {
            t.reseed(seed.wrapping_add(id as u64));
        }
        Ok(Self {
            id,
            loader,
            transforms,
            index_rx,
            data_tx,
            abort,
            poll_interval,
            state: WorkerState::Running,
        })
    }

    /// Start the worker on its own named thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<WorkerResult>, AugmentError> {
        thread::Builder::new()
            .name(format!("{}-{}", WORKER_THREAD_PREFIX, self.id))
            .spawn(move || self.run())
            .map_err(AugmentError::Spawn)
    }

    /// Drive the state machine until it reaches `Terminated`.
    pub(crate) fn run(mut self) -> WorkerResult {
        let _guard = AbortOnPanic(self.abort.clone());
        let mut exit = WorkerExit::Stopped;
        let mut failure = None;

        loop {
            self.state = match self.state {
                WorkerState::Running => match self.poll() {
                    Ok(Step::Continue) => WorkerState::Running,
                    Ok(Step::Stop(how)) => {
                        exit = how;
                        WorkerState::Terminated
                    }
                    Ok(Step::Abort) => {
                        exit = WorkerExit::Aborted;
                        WorkerState::Aborting
                    }
                    Err(e) => {
                        self.abort.set();
                        error!(worker = self.id, "augmentation failed: {}", e);
                        failure = Some(e);
                        WorkerState::Aborting
                    }
                },
                WorkerState::Aborting => WorkerState::Terminated,
                WorkerState::Terminated => break,
            };
        }

        trace!(worker = self.id, ?exit, "worker terminated");
        match failure {
            Some(e) => Err(AugmentError::WorkerFailure {
                worker: self.id,
                source: Box::new(e),
            }),
            None => Ok(exit),
        }
    }

    fn poll(&mut self) -> Result<Step, AugmentError> {
        if self.abort.is_set() {
            return Ok(Step::Abort);
        }

        match self.index_rx.recv_timeout(self.poll_interval) {
            Ok(IndexMessage::Group(indices)) => {
                let batch = self.process(&indices)?;
                if self.data_tx.send(batch).is_err() {
                    return Ok(Step::Stop(WorkerExit::Disconnected));
                }
                Ok(Step::Continue)
            }
            Ok(IndexMessage::Stop) => Ok(Step::Stop(WorkerExit::Stopped)),
            // abort flag is re-checked on the next poll
            Err(RecvTimeoutError::Timeout) => Ok(Step::Continue),
            Err(RecvTimeoutError::Disconnected) => Ok(Step::Stop(WorkerExit::Disconnected)),
        }
    }

    fn process(&mut self, indices: &[usize]) -> Result<Batch, AugmentError> {
        let batch = self.loader.fetch(indices)?;
        trace!(worker = self.id, size = indices.len(), "fetched batch");
        match self.transforms.as_mut() {
            Some(t) => t.apply(batch).map_err(AugmentError::Transform),
            None => Ok(batch),
        }
    }
}
