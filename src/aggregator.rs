//! Batch-wide completion tracking.

use std::{
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use crate::{
    error::{BatchError, UnitFailure},
    unit::{PendingUnit, UnitResult},
    Clock, ProgressSink, SystemClock, WorkUnit, WorkerOptions,
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// A batch's lifecycle state.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(u8)]
pub enum BatchState {
    /// The batch has been created, no units have been dispatched.
    Created = 1,
    /// The batch's units have been dispatched.
    Running = 2,
    /// The batch has been joined.
    Joined = 3,
}

impl BatchState {
    fn from_repr(repr: u8) -> Self {
        match repr {
            x if x == Self::Created as u8 => Self::Created,
            x if x == Self::Running as u8 => Self::Running,
            x if x == Self::Joined as u8 => Self::Joined,
            unknown => unreachable!("invalid batch state: {unknown}"),
        }
    }
}

struct AtomicBatchState(AtomicU8);

impl AtomicBatchState {
    fn new(state: BatchState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self, order: Ordering) -> BatchState {
        BatchState::from_repr(self.0.load(order))
    }

    fn transition(&self, from: BatchState, to: BatchState) -> Result<(), BatchState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(BatchState::from_repr)
    }
}

/// A point-in-time view of a batch's progress.
#[derive(Clone, PartialEq, Debug)]
pub struct Snapshot {
    /// The number of units that have resolved.
    pub completed: usize,
    /// The number of units in the batch.
    pub total: usize,
    /// `completed * 100 / total`, rounded down.
    pub percentage: u8,
    /// A fractional representation of progress within range of `0.0..=1.0`.
    pub fraction: f64,
    /// The batch's lifecycle state.
    pub state: BatchState,
    /// The time elapsed since the batch's units were dispatched, if they were.
    pub elapsed: Option<Duration>,
}

/// Tracks the completion of one batch of units.
///
/// Each batch owns its aggregator; aggregators are never reused.
pub struct Aggregator {
    id: usize,
    total: usize,
    completed: AtomicUsize,
    state: AtomicBatchState,
    started: OnceLock<Instant>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    /// Creates an aggregator for a batch of `total` units, timed by the system clock.
    pub fn new(total: usize) -> Result<Self, BatchError> {
        Self::with_clock(total, Arc::new(SystemClock))
    }

    /// Creates an aggregator for a batch of `total` units, timed by `clock`.
    pub fn with_clock(total: usize, clock: Arc<dyn Clock>) -> Result<Self, BatchError> {
        if total == 0 {
            return Err(BatchError::Empty);
        }

        Ok(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            total,
            completed: AtomicUsize::new(0),
            state: AtomicBatchState::new(BatchState::Created),
            started: OnceLock::new(),
            clock,
        })
    }

    /// Returns the number of units in the batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the number of units that have resolved.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns the batch's progress in percent, rounded down.
    pub fn percentage(&self) -> u8 {
        self.percentage_of(self.completed())
    }

    /// Returns the batch's lifecycle state.
    pub fn state(&self) -> BatchState {
        self.state.load(Ordering::Acquire)
    }

    /// Returns the instant the batch's units were dispatched, if they were.
    pub fn started(&self) -> Option<Instant> {
        self.started.get().copied()
    }

    /// Returns a snapshot of the batch's progress.
    pub fn snapshot(&self) -> Snapshot {
        let completed = self.completed();

        Snapshot {
            completed,
            total: self.total,
            percentage: self.percentage_of(completed),
            fraction: completed as f64 / self.total as f64,
            state: self.state(),
            elapsed: self
                .started()
                .map(|started| self.clock.elapsed(started, self.clock.now())),
        }
    }

    /// Records the completion of one unit, returning the new completed count.
    ///
    /// Safe to call from any number of threads; no two calls observe the same count.
    ///
    /// # Panics
    ///
    /// Panics if called before the batch was dispatched or after it was joined,
    /// or more often than the batch has units.
    pub fn record_completion(&self) -> usize {
        match self.state() {
            BatchState::Running => {}
            BatchState::Created => panic!("completion recorded before the batch was dispatched"),
            BatchState::Joined => panic!("completion recorded after the batch was joined"),
        }

        let previous = self.completed.fetch_add(1, Ordering::AcqRel);

        assert!(
            previous < self.total,
            "more completions than units: {} of {}",
            previous + 1,
            self.total
        );

        previous + 1
    }

    /// Dispatches `units` to worker threads, moving the batch to `Running`.
    ///
    /// Each unit records its completion here and reports progress to `sink`.
    ///
    /// # Panics
    ///
    /// Panics if the batch was dispatched before,
    /// or if `units` does not hold exactly `total` units.
    pub fn dispatch<T>(
        self: &Arc<Self>,
        units: Vec<WorkUnit<T>>,
        sink: &ProgressSink,
    ) -> Vec<PendingUnit<T>>
    where
        T: Send + 'static,
    {
        self.dispatch_with(&WorkerOptions::default(), units, sink)
    }

    /// Like [`dispatch`](Self::dispatch), with explicit worker `options`.
    pub fn dispatch_with<T>(
        self: &Arc<Self>,
        options: &WorkerOptions,
        units: Vec<WorkUnit<T>>,
        sink: &ProgressSink,
    ) -> Vec<PendingUnit<T>>
    where
        T: Send + 'static,
    {
        assert_eq!(
            units.len(),
            self.total,
            "dispatched unit count does not match the batch total"
        );

        self.mark_running();

        #[cfg(feature = "tracing")]
        tracing::debug!(total = self.total, owner = sink.owner().as_raw(), "Dispatching batch.");

        units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| unit.spawn(index, options, self, sink))
            .collect()
    }

    /// Blocks until every unit in `pending` has resolved, moving the batch to `Joined`.
    ///
    /// Returns the results in the order of `pending`, together with the time
    /// between dispatch and the resolution of the slowest unit.
    ///
    /// # Panics
    ///
    /// Panics if no units were dispatched, if `pending` does not hold
    /// exactly `total` units, if any of them was dispatched by another
    /// aggregator, or if the batch was joined before.
    pub fn join<T>(&self, pending: Vec<PendingUnit<T>>) -> Joined<T> {
        assert!(
            !pending.is_empty() && self.state() != BatchState::Created,
            "join called before any units were submitted"
        );
        assert_eq!(
            pending.len(),
            self.total,
            "joined unit count does not match the batch total"
        );
        assert!(
            pending.iter().all(|unit| unit.batch() == self.id),
            "joined units were dispatched by a different batch"
        );

        let started = self.started().unwrap_or_else(|| self.clock.now());
        let mut last_finished = started;

        let results: Vec<_> = pending
            .into_iter()
            .map(|unit| {
                let resolved = unit.wait();
                last_finished = last_finished.max(resolved.finished);
                resolved.result
            })
            .collect();

        if let Err(state) = self.state.transition(BatchState::Running, BatchState::Joined) {
            panic!("batch joined while {state:?}");
        }

        debug_assert_eq!(self.completed(), self.total);

        let elapsed = self.clock.elapsed(started, last_finished);

        #[cfg(feature = "tracing")]
        tracing::debug!(total = self.total, ?elapsed, "Joined batch.");

        Joined { results, elapsed }
    }

    /// Identifies the batch; later batches have larger ids.
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn mark_running(&self) {
        if let Err(state) = self.state.transition(BatchState::Created, BatchState::Running) {
            panic!("units dispatched to a batch that is already {state:?}");
        }

        let _ = self.started.set(self.clock.now());
    }

    pub(crate) fn percentage_of(&self, completed: usize) -> u8 {
        let percentage = (completed as u128 * 100) / self.total as u128;

        // `completed <= total` keeps this in range.
        percentage as u8
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("id", &self.id)
            .field("total", &self.total)
            .field("completed", &self.completed())
            .field("state", &self.state())
            .field("started", &self.started())
            .finish_non_exhaustive()
    }
}

/// The results of a joined batch.
#[derive(Debug)]
pub struct Joined<T> {
    results: Vec<UnitResult<T>>,
    elapsed: Duration,
}

impl<T> Joined<T> {
    /// Returns the units' results in submission order.
    pub fn results(&self) -> &[UnitResult<T>] {
        &self.results
    }

    /// Returns the time between dispatch and the resolution of the slowest unit.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns the failed units' failures in submission order.
    pub fn failures(&self) -> impl Iterator<Item = &UnitFailure> {
        self.results.iter().filter_map(|result| result.as_ref().err())
    }

    /// Returns the units' results in submission order.
    pub fn into_results(self) -> Vec<UnitResult<T>> {
        self.results
    }

    /// Returns the units' outputs in submission order,
    /// or the first failure in submission order.
    pub fn into_outputs(self) -> Result<Vec<T>, UnitFailure> {
        self.results.into_iter().collect()
    }
}
