#![warn(missing_docs)]

//! Fan out background work, funnel its progress to an owning context, join ordered results.
//!
//! Resources such as views are bound to the context that created them. Work
//! runs elsewhere, and only reaches them through a [`ProgressSink`], which
//! marshals every report onto the owning [`EventLoop`]. A [`Batch`] joins its
//! units in submission order and reports the time taken by the slowest one.

mod affine;
mod aggregator;
mod batch;
mod clock;
mod config;
mod context;
mod error;
mod sink;
mod unit;

pub use self::{
    affine::Affine,
    aggregator::{Aggregator, BatchState, Joined, Snapshot},
    batch::Batch,
    clock::{Clock, SystemClock},
    config::WorkerOptions,
    context::{ContextId, Dispatcher, EventLoop, Job, Marshal},
    error::{AccessError, BatchError, ContextError, UnitFailure},
    sink::{Callback, ProgressSink},
    unit::{PendingUnit, UnitResult, WorkUnit},
};

#[cfg(any(test, feature = "test-utils"))]
pub use self::batch::test_utils;
