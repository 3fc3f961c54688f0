// src/augment/pool.rs
//
// Worker pool with round-robin dispatch and skip-if-empty round-robin
// collection.  Each worker is connected by two one-way channels: indices go
// out on one, batches come back on the other.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::augment::abort::AbortFlag;
use crate::augment::worker::{IndexMessage, Worker, WorkerExit, WorkerResult};
use crate::data_loader::batch::Batch;
use crate::data_loader::dataloader::DataLoader;
use crate::data_loader::transform::Transform;
use crate::error::AugmentError;

/// Coordinator-side view of one worker.
struct WorkerSlot {
    thread: JoinHandle<WorkerResult>,
    index_tx: Sender<IndexMessage>,
    data_rx: Receiver<Batch>,
    /// dispatched but not yet collected
    pending: usize,
}

/// A pool of augmentation workers.
///
/// The pool is empty until [`WorkerPool::start`]; [`WorkerPool::shutdown`]
/// stops and joins every worker and is also run on drop.
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    abort: Option<AbortFlag>,
    index_cursor: usize,
    data_cursor: usize,
    /// dispatched and not yet collected, across all workers
    in_flight: usize,
    /// highest `in_flight` since the last `start`
    peak_in_flight: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            slots: Vec::new(),
            abort: None,
            index_cursor: 0,
            data_cursor: 0,
            in_flight: 0,
            peak_in_flight: 0,
            poll_interval,
        }
    }

    /// Spawn `num_workers` workers, each with its own copy of `loader` and
    /// `transforms`, sharing a fresh abort flag.
    pub fn start(
        &mut self,
        num_workers: usize,
        loader: &DataLoader,
        transforms: Option<&dyn Transform>,
        seed: u64,
    ) -> Result<(), AugmentError> {
        if num_workers == 0 {
            return Err(AugmentError::InvalidOption(
                "a worker pool needs at least one worker".to_string(),
            ));
        }
        if self.is_running() {
            self.shutdown();
        }

        // retire the previous flag so orphaned workers of an old pool stop
        if let Some(old) = self.abort.take() {
            old.set();
        }
        let abort = AbortFlag::new();
        self.abort = Some(abort.clone());
        self.peak_in_flight = 0;

        for id in 0..num_workers {
            let (index_tx, index_rx) = unbounded();
            let (data_tx, data_rx) = unbounded();
            let spawned = Worker::new(
                id,
                loader.clone(),
                transforms.map(|t| t.box_clone()),
                seed,
                index_rx,
                data_tx,
                abort.clone(),
                self.poll_interval,
            )
            .and_then(Worker::spawn);

            match spawned {
                Ok(thread) => self.slots.push(WorkerSlot {
                    thread,
                    index_tx,
                    data_rx,
                    pending: 0,
                }),
                Err(e) => {
                    self.shutdown();
                    return Err(e);
                }
            }
        }

        debug!(workers = num_workers, "worker pool started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn num_workers(&self) -> usize {
        self.slots.len()
    }

    /// Abort flag of the current (or most recent) pool.
    pub fn abort_flag(&self) -> Option<AbortFlag> {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortFlag::is_set)
    }

    /// Pending-batch counter of every worker, in slot order.
    pub fn pending(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.pending).collect()
    }

    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    /// Most groups that were in flight at once since the pool was started.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// Number of worker threads that have not finished yet.
    pub fn alive(&self) -> usize {
        self.slots.iter().filter(|s| !s.thread.is_finished()).count()
    }

    fn next_index_slot(&mut self) -> usize {
        let slot = self.index_cursor;
        self.index_cursor = (self.index_cursor + 1) % self.slots.len();
        slot
    }

    fn next_data_slot(&mut self) -> usize {
        let slot = self.data_cursor;
        self.data_cursor = (self.data_cursor + 1) % self.slots.len();
        slot
    }

    /// Send one index group to the next worker in strict slot order.
    pub fn dispatch(&mut self, group: Vec<usize>) -> Result<(), AugmentError> {
        if !self.is_running() {
            return Err(AugmentError::PoolAbort);
        }
        let slot = self.next_index_slot();
        let worker = &mut self.slots[slot];
        worker
            .index_tx
            .send(IndexMessage::Group(group))
            .map_err(|_| AugmentError::PoolAbort)?;
        worker.pending += 1;
        trace!(slot, pending = worker.pending, "dispatched index group");
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
        Ok(())
    }

    /// Receive the next batch, visiting workers round robin and skipping those
    /// with nothing pending.  Returns `Ok(None)` when nothing is pending.
    ///
    /// Blocks until the chosen worker delivers; wakes every poll interval to
    /// check the abort flag.
    pub fn collect(&mut self) -> Result<Option<Batch>, AugmentError> {
        if !self.has_pending() {
            return Ok(None);
        }
        let mut slot = self.next_data_slot();
        while self.slots[slot].pending == 0 {
            slot = self.next_data_slot();
        }

        loop {
            if self.is_aborted() {
                return Err(AugmentError::PoolAbort);
            }
            let worker = &mut self.slots[slot];
            match worker.data_rx.recv_timeout(self.poll_interval) {
                Ok(batch) => {
                    worker.pending -= 1;
                    trace!(slot, pending = worker.pending, "collected batch");
                    self.in_flight -= 1;
                    return Ok(Some(batch));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // worker ended while still owing batches
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(slot, "worker hung up with {} batches pending", worker.pending);
                    return Err(AugmentError::PoolAbort);
                }
            }
        }
    }

    /// Stop every worker: set the abort flag, send the stop sentinel, join the
    /// threads, drop the channels and reset the cursors.  Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(abort) = &self.abort {
            abort.set();
        }
        if self.slots.is_empty() {
            return;
        }

        for slot in &self.slots {
            let _ = slot.index_tx.send(IndexMessage::Stop);
        }

        let n = self.slots.len();
        for (id, slot) in self.slots.drain(..).enumerate() {
            let WorkerSlot {
                thread,
                index_tx,
                data_rx,
                pending,
            } = slot;
            drop(index_tx);
            match thread.join() {
                Ok(Ok(WorkerExit::Stopped | WorkerExit::Aborted)) => {}
                Ok(Ok(WorkerExit::Disconnected)) => trace!(worker = id, "worker disconnected"),
                Ok(Err(e)) => warn!(worker = id, "worker ended with error: {}", e),
                Err(_) => warn!(worker = id, "worker panicked"),
            }
            if pending > 0 {
                trace!(worker = id, pending, "discarding undelivered batches");
            }
            drop(data_rx);
        }

        self.index_cursor = 0;
        self.data_cursor = 0;
        self.in_flight = 0;
        debug!(workers = n, "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.slots.len())
            .field("pending", &self.pending())
            .field("peak_in_flight", &self.peak_in_flight)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
