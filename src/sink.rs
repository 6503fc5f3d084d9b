//! A progress sink.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{ContextId, Marshal};

/// The callback invoked with a percentage in `0..=100`.
pub type Callback = dyn Fn(u8) + Send + Sync;

struct SinkInner {
    marshal: Arc<dyn Marshal>,
    callback: Arc<Callback>,
    /// Only read and written on the owning context.
    mark: Arc<Mutex<Mark>>,
}

/// The highest percentage delivered for the most recent batch.
#[derive(Default, Debug)]
struct Mark {
    batch: Option<usize>,
    percentage: u8,
}

/// Delivers progress reports to a callback on its owning context.
///
/// `report` may be called from any thread. The callback always runs on the
/// context behind the sink's [`Marshal`] implementation, and only ever sees
/// a non-decreasing sequence of percentages per batch.
///
/// A sink may serve several batches in turn. A batch's first report
/// restarts the sequence, and reports from a batch superseded by a
/// later one are dropped.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
}

impl ProgressSink {
    /// Creates a sink running `callback` on the context behind `marshal`.
    pub fn new(
        marshal: impl Marshal + 'static,
        callback: impl Fn(u8) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                marshal: Arc::new(marshal),
                callback: Arc::new(callback),
                mark: Arc::new(Mutex::new(Mark::default())),
            }),
        }
    }

    /// Returns the context running the callback.
    pub fn owner(&self) -> ContextId {
        self.inner.marshal.context_id()
    }

    /// Reports `percentage`, returning without waiting for the callback.
    ///
    /// A report arriving after a higher one has been delivered is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `percentage > 100`.
    pub fn report(&self, percentage: u8) {
        self.deliver(None, percentage);
    }

    /// Reports `percentage` on behalf of the batch identified by `batch`.
    pub(crate) fn report_for(&self, batch: usize, percentage: u8) {
        self.deliver(Some(batch), percentage);
    }

    fn deliver(&self, batch: Option<usize>, percentage: u8) {
        assert!(
            percentage <= 100,
            "progress percentage out of range: {percentage}"
        );

        let callback = Arc::clone(&self.inner.callback);
        let mark = Arc::clone(&self.inner.mark);

        self.inner.marshal.marshal(Box::new(move || {
            if !mark.lock().advance(batch, percentage) {
                return;
            }

            callback(percentage);
        }));
    }
}

impl Mark {
    /// Returns `true` if `percentage` should be delivered, raising the mark if so.
    fn advance(&mut self, batch: Option<usize>, percentage: u8) -> bool {
        match (batch, self.batch) {
            (Some(batch), Some(current)) if batch < current => {
                #[cfg(feature = "tracing")]
                tracing::trace!(batch, current, percentage, "Dropping superseded progress report.");
                false
            }
            (Some(batch), current) if current != Some(batch) => {
                *self = Self {
                    batch: Some(batch),
                    percentage,
                };
                true
            }
            _ if percentage < self.percentage => {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    percentage,
                    previous = self.percentage,
                    "Dropping stale progress report."
                );
                false
            }
            _ => {
                self.percentage = percentage;
                true
            }
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("owner", &self.owner())
            .field("mark", &*self.inner.mark.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, thread};

    use super::*;
    use crate::EventLoop;

    fn recording_sink(event_loop: &EventLoop) -> (ProgressSink, Arc<Mutex<Vec<(u8, bool)>>>) {
        let owner = event_loop.id();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&reports);

        let sink = ProgressSink::new(event_loop.dispatcher(), move |percentage| {
            recorded
                .lock()
                .unwrap()
                .push((percentage, owner.is_current()));
        });

        (sink, reports)
    }

    #[test]
    fn report_is_fire_and_continue() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, reports) = recording_sink(&event_loop);

        sink.report(50);

        assert!(reports.lock().unwrap().is_empty());

        event_loop.run_pending();

        assert_eq!(*reports.lock().unwrap(), vec![(50, true)]);
    }

    #[test]
    fn callback_runs_on_owner_when_reported_from_worker() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, reports) = recording_sink(&event_loop);

        let worker_sink = sink.clone();
        thread::spawn(move || worker_sink.report(100))
            .join()
            .unwrap();

        event_loop.run_pending();

        assert_eq!(*reports.lock().unwrap(), vec![(100, true)]);
        assert_eq!(sink.owner(), event_loop.id());
    }

    #[test]
    fn stale_reports_are_dropped() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, reports) = recording_sink(&event_loop);

        for percentage in [10, 30, 20, 30, 100, 90] {
            sink.report(percentage);
        }

        event_loop.run_pending();

        let percentages: Vec<_> = reports.lock().unwrap().iter().map(|r| r.0).collect();
        assert_eq!(percentages, vec![10, 30, 30, 100]);
    }

    #[test]
    fn each_batch_restarts_the_sequence() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, reports) = recording_sink(&event_loop);

        sink.report_for(1, 50);
        sink.report_for(1, 100);
        sink.report_for(2, 25);
        sink.report_for(1, 100);
        sink.report_for(2, 20);
        sink.report_for(2, 50);

        event_loop.run_pending();

        let percentages: Vec<_> = reports.lock().unwrap().iter().map(|r| r.0).collect();
        assert_eq!(percentages, vec![50, 100, 25, 50]);
    }

    #[test]
    fn accepts_bounds() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, reports) = recording_sink(&event_loop);

        sink.report(0);
        sink.report(100);
        event_loop.run_pending();

        assert_eq!(reports.lock().unwrap().len(), 2);
    }

    #[test]
    #[should_panic(expected = "progress percentage out of range: 101")]
    fn report_above_100_panics() {
        let event_loop = EventLoop::acquire().unwrap();
        let (sink, _reports) = recording_sink(&event_loop);

        sink.report(101);
    }
}
