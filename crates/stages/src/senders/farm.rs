//! A bounded worker pool dedicated to ECDSA sender recovery.
//!
//! The producer (`SendersStage::run_recovery`) hands over batches of
//! [`RecoveryPackage`]s; the farm fans each batch out to a reused or freshly
//! spawned worker thread, tags it with a monotonic sequence number, and lets
//! the producer pull results back in that same order regardless of which
//! worker finished first.

use std::{
    collections::{HashMap, VecDeque},
    sync::mpsc,
    thread::{self, JoinHandle},
};

use esync_primitives::{recover_signer, Address, BlockNumber, Signature, StopSignal, B256};
use esync_stages_api::StageError;
use parking_lot::{Condvar, Mutex};

/// One transaction ready for signer recovery: everything a worker needs,
/// tagged with the block it belongs to so the producer can regroup recovered
/// addresses without tracking batch/block boundaries itself.
#[derive(Debug, Clone)]
pub(super) struct RecoveryPackage {
    pub(super) block: BlockNumber,
    pub(super) signing_hash: B256,
    pub(super) signature: Signature,
}

enum WorkerMsg {
    Work { seq: u64, packages: Vec<RecoveryPackage> },
    Shutdown,
}

struct BatchResult {
    seq: u64,
    outcome: Result<Vec<(BlockNumber, Address)>, StageError>,
}

struct Shared {
    state: Mutex<FarmState>,
    cv: Condvar,
    /// The caller's cooperative-cancellation flag, polled to abort recovery
    /// early. Never set by the farm itself — it is shared with, and owned by,
    /// whoever constructed this farm.
    stop: StopSignal,
    /// The farm's own shutdown flag, set only from `Drop`, to wake and retire
    /// idle/in-flight workers when the farm itself goes out of scope. Distinct
    /// from `stop` so that dropping a farm after a *successful* run never
    /// trips the caller's flag.
    shutdown: StopSignal,
}

struct FarmState {
    idle: VecDeque<mpsc::Sender<WorkerMsg>>,
    /// Workers currently holding a dispatched batch they have not yet reported
    /// back for. A worker counts as live from the moment it is handed work
    /// (spawn or reuse) until it re-joins `idle`.
    live_workers: usize,
    harvest: VecDeque<BatchResult>,
}

/// The worker pool itself. Dropping it stops every worker (in-flight or idle)
/// and joins every thread it spawned before returning.
pub(super) struct RecoveryFarm {
    shared: std::sync::Arc<Shared>,
    max_workers: usize,
    next_seq: u64,
    next_seq_to_emit: u64,
    pending: HashMap<u64, BatchResult>,
    joins: Vec<JoinHandle<()>>,
}

impl RecoveryFarm {
    #[must_use]
    pub(super) fn new(max_workers: usize, stop: StopSignal) -> Self {
        Self {
            shared: std::sync::Arc::new(Shared {
                state: Mutex::new(FarmState { idle: VecDeque::new(), live_workers: 0, harvest: VecDeque::new() }),
                cv: Condvar::new(),
                stop,
                shutdown: StopSignal::new(),
            }),
            max_workers,
            next_seq: 0,
            next_seq_to_emit: 0,
            pending: HashMap::new(),
            joins: Vec::new(),
        }
    }

    /// The cooperative-cancellation flag this farm was built with.
    #[must_use]
    pub(super) fn stop(&self) -> &StopSignal {
        &self.shared.stop
    }

    /// Hands `packages` to an idle worker, reusing one if available, spawning
    /// a new one if the pool has not yet reached `max_workers`, or blocking
    /// on the pool's condition variable until either happens. Returns
    /// immediately once the batch has been sent; it does not wait for the
    /// batch to complete.
    ///
    /// # Errors
    /// Returns `aborted` if the stop signal is observed before dispatch, or
    /// `unexpected_error` if every worker channel has unexpectedly closed.
    pub(super) fn dispatch(&mut self, packages: Vec<RecoveryPackage>) -> Result<(), StageError> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut state = self.shared.state.lock();
        loop {
            if self.shared.stop.is_set() || self.shared.shutdown.is_set() {
                return Err(StageError::Aborted);
            }
            if let Some(tx) = state.idle.pop_front() {
                state.live_workers += 1;
                drop(state);
                return tx
                    .send(WorkerMsg::Work { seq, packages })
                    .map_err(|_| StageError::UnexpectedError("recovery worker channel closed".to_string()));
            }
            if state.idle.len() + state.live_workers < self.max_workers {
                state.live_workers += 1;
                drop(state);
                self.spawn_worker(seq, packages);
                return Ok(());
            }
            self.shared.cv.wait(&mut state);
        }
    }

    /// Blocks until every dispatched batch has been picked up and reported
    /// back (`live_workers == 0`), without consuming the harvest queue —
    /// callers still need to call [`RecoveryFarm::harvest_in_order`] after
    /// this returns to actually collect the last results.
    pub(super) fn wait_until_idle(&self) {
        let mut state = self.shared.state.lock();
        while state.live_workers != 0 {
            self.shared.cv.wait(&mut state);
        }
    }

    /// Drains every harvested batch currently available and returns the
    /// `(block, address)` pairs that are now ready to emit in original
    /// block/transaction order. Out-of-order arrivals are buffered until the
    /// gap closes, so a prefix of results may be withheld until the batch
    /// that precedes them also completes.
    ///
    /// # Errors
    /// The first `BatchResult` in sequence order that failed recovery short-
    /// circuits with that failure; later results for that same call are
    /// discarded.
    pub(super) fn harvest_in_order(&mut self) -> Result<Vec<(BlockNumber, Address)>, StageError> {
        let harvested: Vec<BatchResult> = {
            let mut state = self.shared.state.lock();
            state.harvest.drain(..).collect()
        };
        for result in harvested {
            self.pending.insert(result.seq, result);
        }

        let mut out = Vec::new();
        while let Some(result) = self.pending.remove(&self.next_seq_to_emit) {
            self.next_seq_to_emit += 1;
            out.extend(result.outcome?);
        }
        Ok(out)
    }

    fn spawn_worker(&mut self, seq: u64, packages: Vec<RecoveryPackage>) {
        let (tx, rx) = mpsc::channel::<WorkerMsg>();
        let self_tx = tx;
        let shared = std::sync::Arc::clone(&self.shared);
        let handle = thread::spawn(move || worker_loop(&shared, &rx, &self_tx, Some((seq, packages))));
        self.joins.push(handle);
    }
}

impl Drop for RecoveryFarm {
    fn drop(&mut self) {
        self.shared.shutdown.set();
        {
            let mut state = self.shared.state.lock();
            while let Some(tx) = state.idle.pop_front() {
                let _ = tx.send(WorkerMsg::Shutdown);
            }
        }
        self.shared.cv.notify_all();
        for handle in self.joins.drain(..) {
            let _ = handle.join();
        }
    }
}

/// A worker's main loop: processes an optional initial batch handed to it at
/// spawn time, then waits on `rx` for further dispatches until it either
/// receives `Shutdown` or observes the cooperative-cancellation or farm-
/// shutdown flag right after finishing a batch, at which point it exits
/// without re-registering as idle.
fn worker_loop(shared: &Shared, rx: &mpsc::Receiver<WorkerMsg>, self_tx: &mpsc::Sender<WorkerMsg>, initial: Option<(u64, Vec<RecoveryPackage>)>) {
    let mut next = initial.map(|(seq, packages)| WorkerMsg::Work { seq, packages });
    loop {
        let msg = match next.take() {
            Some(msg) => msg,
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };
        match msg {
            WorkerMsg::Shutdown => break,
            WorkerMsg::Work { seq, packages } => {
                let outcome = recover_batch(shared, packages);
                let mut state = shared.state.lock();
                state.harvest.push_back(BatchResult { seq, outcome });
                state.live_workers -= 1;
                if shared.stop.is_set() || shared.shutdown.is_set() {
                    shared.cv.notify_all();
                    break;
                }
                state.idle.push_back(self_tx.clone());
                shared.cv.notify_all();
            }
        }
    }
}

/// Recovers every package in a batch, stopping at the first signature that
/// fails to recover or the first observation of the stop signal between
/// packages.
fn recover_batch(shared: &Shared, packages: Vec<RecoveryPackage>) -> Result<Vec<(BlockNumber, Address)>, StageError> {
    let mut out = Vec::with_capacity(packages.len());
    for package in packages {
        if shared.stop.is_set() || shared.shutdown.is_set() {
            return Err(StageError::Aborted);
        }
        let address = recover_signer(package.signing_hash, &package.signature).map_err(|_| StageError::InvalidTransaction)?;
        out.push((package.block, address));
    }
    Ok(out)
}
