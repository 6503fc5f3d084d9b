//! A unit of background work.

use std::{
    any::Any,
    borrow::Cow,
    error::Error,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{error::UnitFailure, Aggregator, ProgressSink, WorkerOptions};

/// The outcome of a single unit of work.
pub type UnitResult<T> = Result<T, UnitFailure>;

type BoxError = Box<dyn Error + Send + Sync>;

type Work<T> = Box<dyn FnOnce() -> Result<T, BoxError> + Send>;

/// One unit of work, run once on its own worker thread.
pub struct WorkUnit<T> {
    label: Cow<'static, str>,
    work: Work<T>,
}

impl<T> WorkUnit<T>
where
    T: Send + 'static,
{
    /// Creates a unit running the infallible `work`.
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        work: impl FnOnce() -> T + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            work: Box::new(move || Ok::<T, BoxError>(work())),
        }
    }

    /// Creates a unit running `work`, whose error is captured in the unit's result slot.
    pub fn fallible<E>(
        label: impl Into<Cow<'static, str>>,
        work: impl FnOnce() -> Result<T, E> + Send + 'static,
    ) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            label: label.into(),
            work: Box::new(move || work().map_err(Into::<BoxError>::into)),
        }
    }

    /// Returns the unit's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the unit on a new worker thread.
    ///
    /// Whatever the outcome, the worker records a completion with
    /// `aggregator` and reports the new percentage to `sink`
    /// before the unit resolves.
    pub(crate) fn spawn(
        self,
        index: usize,
        options: &WorkerOptions,
        aggregator: &Arc<Aggregator>,
        sink: &ProgressSink,
    ) -> PendingUnit<T> {
        let label = self.label.clone();

        let worker_aggregator = Arc::clone(aggregator);
        let worker_sink = sink.clone();

        let spawned = options.builder(index).spawn(move || {
            let Self { label, work } = self;
            let result = execute(&label, work);
            resolve(&label, result, &worker_aggregator, &worker_sink)
        });

        let inner = match spawned {
            Ok(handle) => PendingInner::Running(handle),
            Err(source) => {
                let failure = UnitFailure::Spawn {
                    label: label.clone(),
                    source,
                };
                PendingInner::Resolved(resolve(&label, Err(failure), aggregator, sink))
            }
        };

        PendingUnit {
            label,
            batch: aggregator.id(),
            inner,
        }
    }
}

impl WorkUnit<String> {
    /// Creates a unit that sleeps for `duration`, then yields its label.
    pub fn simulated(label: impl Into<Cow<'static, str>>, duration: Duration) -> Self {
        let label = label.into();
        let output = label.clone().into_owned();

        Self::new(label, move || {
            thread::sleep(duration);
            output
        })
    }
}

impl<T> std::fmt::Debug for WorkUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

fn execute<T>(label: &Cow<'static, str>, work: Work<T>) -> UnitResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(UnitFailure::Failed {
            label: label.clone(),
            source,
        }),
        Err(payload) => Err(UnitFailure::Panicked {
            label: label.clone(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn resolve<T>(
    _label: &str,
    result: UnitResult<T>,
    aggregator: &Aggregator,
    sink: &ProgressSink,
) -> Resolved<T> {
    let completed = aggregator.record_completion();
    let percentage = aggregator.percentage_of(completed);

    #[cfg(feature = "tracing")]
    match &result {
        Ok(_) => tracing::debug!(
            label = _label,
            completed,
            total = aggregator.total(),
            percentage,
            "Unit completed."
        ),
        Err(failure) => tracing::warn!(
            label = _label,
            completed,
            total = aggregator.total(),
            percentage,
            %failure,
            "Unit failed."
        ),
    }

    sink.report_for(aggregator.id(), percentage);

    Resolved {
        result,
        finished: aggregator.now(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// A resolved unit's result and the instant it resolved.
pub(crate) struct Resolved<T> {
    pub(crate) result: UnitResult<T>,
    pub(crate) finished: Instant,
}

enum PendingInner<T> {
    Running(JoinHandle<Resolved<T>>),
    Resolved(Resolved<T>),
}

/// A dispatched unit of work, awaiting its result.
pub struct PendingUnit<T> {
    label: Cow<'static, str>,
    batch: usize,
    inner: PendingInner<T>,
}

impl<T> PendingUnit<T> {
    /// Returns the unit's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn batch(&self) -> usize {
        self.batch
    }

    /// Returns `true` if the unit has resolved, otherwise `false`.
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            PendingInner::Running(handle) => handle.is_finished(),
            PendingInner::Resolved(_) => true,
        }
    }

    /// Blocks until the unit resolves.
    ///
    /// Panics raised by the aggregation itself (not by the unit's work)
    /// are propagated to the caller.
    pub(crate) fn wait(self) -> Resolved<T> {
        match self.inner {
            PendingInner::Running(handle) => match handle.join() {
                Ok(resolved) => resolved,
                Err(payload) => panic::resume_unwind(payload),
            },
            PendingInner::Resolved(resolved) => resolved,
        }
    }
}

impl<T> std::fmt::Debug for PendingUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUnit")
            .field("label", &self.label)
            .field("is_finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt, sync::Mutex};

    use super::*;
    use crate::EventLoop;

    #[derive(Debug)]
    struct DiskFull;

    impl fmt::Display for DiskFull {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "disk full")
        }
    }

    impl Error for DiskFull {}

    fn setup(total: usize) -> (EventLoop, Arc<Aggregator>, ProgressSink, Arc<Mutex<Vec<u8>>>) {
        let event_loop = EventLoop::acquire().unwrap();
        let aggregator = Arc::new(Aggregator::new(total).unwrap());
        let reports = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&reports);
        let sink = ProgressSink::new(event_loop.dispatcher(), move |percentage| {
            recorded.lock().unwrap().push(percentage);
        });
        (event_loop, aggregator, sink, reports)
    }

    fn run<T: Send + 'static>(
        unit: WorkUnit<T>,
        aggregator: &Arc<Aggregator>,
        sink: &ProgressSink,
    ) -> UnitResult<T> {
        aggregator.mark_running();
        unit.spawn(0, &WorkerOptions::default(), aggregator, sink)
            .wait()
            .result
    }

    #[test]
    fn successful_unit_records_and_reports() {
        let (event_loop, aggregator, sink, reports) = setup(2);

        let result = run(WorkUnit::new("A", || 7), &aggregator, &sink);
        event_loop.run_pending();

        assert_eq!(result.unwrap(), 7);
        assert_eq!(aggregator.completed(), 1);
        assert_eq!(*reports.lock().unwrap(), vec![50]);
    }

    #[test]
    fn failing_unit_still_records_and_reports() {
        let (event_loop, aggregator, sink, reports) = setup(1);

        let unit = WorkUnit::<u32>::fallible("B", || Err(DiskFull));
        let result = run(unit, &aggregator, &sink);
        event_loop.run_pending();

        let failure = result.unwrap_err();
        assert!(matches!(failure, UnitFailure::Failed { .. }));
        assert_eq!(failure.label(), "B");
        assert_eq!(aggregator.completed(), 1);
        assert_eq!(*reports.lock().unwrap(), vec![100]);
    }

    #[test]
    fn panicking_unit_is_captured() {
        let (event_loop, aggregator, sink, reports) = setup(1);

        let unit = WorkUnit::<()>::new("C", || panic!("worker exploded"));
        let result = run(unit, &aggregator, &sink);
        event_loop.run_pending();

        match result {
            Err(UnitFailure::Panicked { label, message }) => {
                assert_eq!(label, "C");
                assert_eq!(message, "worker exploded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(*reports.lock().unwrap(), vec![100]);
    }

    #[test]
    fn simulated_unit_sleeps_and_yields_label() {
        let (_event_loop, aggregator, sink, _reports) = setup(1);

        let started = Instant::now();
        let result = run(
            WorkUnit::simulated("D", Duration::from_millis(50)),
            &aggregator,
            &sink,
        );

        assert_eq!(result.unwrap(), "D");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn worker_threads_are_named() {
        let (_event_loop, aggregator, sink, _reports) = setup(1);
        aggregator.mark_running();

        let unit = WorkUnit::new("E", || thread::current().name().map(str::to_owned));
        let options = WorkerOptions::default().name_prefix("loader");
        let result = unit.spawn(3, &options, &aggregator, &sink).wait().result;

        assert_eq!(result.unwrap().as_deref(), Some("loader-3"));
    }

    #[test]
    fn work_runs_off_the_owning_context() {
        let (event_loop, aggregator, sink, _reports) = setup(1);
        let owner = event_loop.id();

        let result = run(WorkUnit::new("F", move || owner.is_current()), &aggregator, &sink);

        assert!(!result.unwrap());
    }
}
