//! Fan-out, funnel, join.

use std::{
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crate::{
    aggregator::{Joined, Snapshot},
    error::BatchError,
    unit::PendingUnit,
    Aggregator, Dispatcher, EventLoop, Marshal, ProgressSink, WorkUnit, WorkerOptions,
};

/// A group of units submitted together, sharing one aggregator and one sink.
///
/// Every unit of a batch is observable through [`join`](Self::join);
/// a batch that is dropped without being joined leaves its workers running
/// to completion, still reporting progress.
pub struct Batch<T> {
    aggregator: Arc<Aggregator>,
    pending: Vec<PendingUnit<T>>,
}

impl<T> Batch<T>
where
    T: Send + 'static,
{
    /// Dispatches `units` to worker threads, reporting progress to `sink`.
    ///
    /// Returns immediately. Fails if `units` is empty.
    pub fn submit(units: Vec<WorkUnit<T>>, sink: &ProgressSink) -> Result<Self, BatchError> {
        Self::submit_with(&WorkerOptions::default(), units, sink)
    }

    /// Like [`submit`](Self::submit), with explicit worker `options`.
    pub fn submit_with(
        options: &WorkerOptions,
        units: Vec<WorkUnit<T>>,
        sink: &ProgressSink,
    ) -> Result<Self, BatchError> {
        let aggregator = Arc::new(Aggregator::new(units.len())?);
        let pending = aggregator.dispatch_with(options, units, sink);

        Ok(Self {
            aggregator,
            pending,
        })
    }

    /// Returns the batch's aggregator.
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Returns a snapshot of the batch's progress.
    pub fn snapshot(&self) -> Snapshot {
        self.aggregator.snapshot()
    }

    /// Returns the units' labels in submission order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(PendingUnit::label)
    }

    /// Blocks the calling thread until every unit has resolved.
    ///
    /// Progress callbacks marshaled to the calling thread's own context
    /// stay queued until it runs its event loop again.
    pub fn join(self) -> Joined<T> {
        self.aggregator.join(self.pending)
    }

    /// Joins the batch while `event_loop` keeps running marshaled jobs.
    ///
    /// Progress callbacks are delivered as units complete, and every one of
    /// them has run by the time this returns.
    pub fn join_pumping(self, event_loop: &EventLoop) -> Joined<T> {
        let done = Arc::new(AtomicBool::new(false));

        let wake = WakeOnDrop {
            done: Arc::clone(&done),
            dispatcher: event_loop.dispatcher(),
        };

        thread::scope(|scope| {
            let joiner = scope.spawn(move || {
                let _wake = wake;
                self.join()
            });

            event_loop.run_until(|| done.load(Ordering::Acquire));

            // Reports queued ahead of the wake-up job may still be waiting.
            event_loop.run_pending();

            match joiner.join() {
                Ok(joined) => joined,
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }
}

impl<T> std::fmt::Debug for Batch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("aggregator", &self.aggregator)
            .field("pending", &self.pending)
            .finish()
    }
}

/// Wakes the owning context once the joiner is done, even if it panicked.
struct WakeOnDrop {
    done: Arc<AtomicBool>,
    dispatcher: Dispatcher,
}

impl Drop for WakeOnDrop {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        self.dispatcher.marshal(Box::new(|| {}));
    }
}

#[doc(hidden)]
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use crate::ContextId;

    #[doc(hidden)]
    pub struct NopMarshal(ContextId);

    impl Default for NopMarshal {
        fn default() -> Self {
            Self(ContextId::new_unique())
        }
    }

    impl Marshal for NopMarshal {
        fn context_id(&self) -> ContextId {
            self.0
        }

        fn marshal(&self, job: crate::Job) {
            std::hint::black_box(job);
        }
    }

    #[doc(hidden)]
    pub fn make_nop_sink() -> ProgressSink {
        ProgressSink::new(NopMarshal::default(), |percentage| {
            std::hint::black_box(percentage);
        })
    }

    #[doc(hidden)]
    pub fn make_running_aggregator(total: usize) -> Aggregator {
        let aggregator = Aggregator::new(total).expect("non-empty batch");
        aggregator.mark_running();
        aggregator
    }

    #[doc(hidden)]
    pub fn make_units(count: usize) -> Vec<WorkUnit<usize>> {
        (0..count)
            .map(|index| WorkUnit::new(format!("unit {index}"), move || index))
            .collect()
    }
}
