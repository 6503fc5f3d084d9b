//! Owning contexts and the marshaling capability.

use std::{
    cell::Cell,
    marker::PhantomData,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    },
    time::{Duration, Instant},
};

use crate::error::ContextError;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT: Cell<Option<ContextId>> = Cell::new(None);
}

/// A job marshaled onto an owning context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An owning context's unique identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ContextId(pub(crate) usize);

impl ContextId {
    pub(crate) fn new_unique() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the context bound to the calling thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT.with(Cell::get)
    }

    /// Returns `true` if the calling thread is bound to `self`.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(*self)
    }

    /// Returns the raw internal identifier value.
    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Types for delivering jobs onto an owning context.
pub trait Marshal: Send + Sync {
    /// Returns the context that runs marshaled jobs.
    fn context_id(&self) -> ContextId;

    /// Schedules `job` to run on the owning context.
    ///
    /// Returns immediately, without waiting for `job` to run.
    fn marshal(&self, job: Job);
}

/// The owning context: a queue of jobs drained by the thread that acquired it.
///
/// An `EventLoop` cannot leave its thread.
pub struct EventLoop {
    id: ContextId,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    _thread_bound: PhantomData<*const ()>,
}

impl EventLoop {
    /// Binds a new owning context to the calling thread.
    ///
    /// Fails if the calling thread already owns a live context.
    pub fn acquire() -> Result<Self, ContextError> {
        if let Some(existing) = ContextId::current() {
            return Err(ContextError::AlreadyBound(existing));
        }

        let id = ContextId::new_unique();
        CURRENT.with(|current| current.set(Some(id)));

        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            id,
            sender,
            receiver,
            _thread_bound: PhantomData,
        })
    }

    /// Returns the associated unique ID.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns a handle for marshaling jobs onto this context from any thread.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            id: self.id,
            sender: self.sender.clone(),
        }
    }

    /// Runs every job queued so far, without blocking.
    ///
    /// Returns the number of jobs that were run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;

        loop {
            match self.receiver.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Runs jobs as they arrive until `done()` returns `true`.
    ///
    /// Blocks on the queue between jobs. `done` is checked before
    /// waiting and after every job.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        while !done() {
            // `self.sender` keeps the channel connected.
            let Ok(job) = self.receiver.recv() else {
                return;
            };
            job();
        }
    }

    /// Like [`run_until`](Self::run_until), but gives up after `timeout`.
    ///
    /// Returns `true` if `done()` returned `true` in time.
    pub fn run_until_timeout(&self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while !done() {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match self.receiver.recv_timeout(remaining) {
                Ok(job) => job(),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return done(),
            }
        }

        true
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            if current.get() == Some(self.id) {
                current.set(None);
            }
        });
    }
}

/// A cloneable handle for marshaling jobs onto an [`EventLoop`].
#[derive(Clone, Debug)]
pub struct Dispatcher {
    id: ContextId,
    sender: Sender<Job>,
}

impl Marshal for Dispatcher {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn marshal(&self, job: Job) {
        if self.sender.send(job).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                context = self.id.as_raw(),
                "Owning context is gone. Dropping marshaled job."
            );
        }
    }
}
