//! Error types for batches, units and owning contexts.

use std::{borrow::Cow, fmt, io};

use crate::ContextId;

/// Error type for batches that cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// The batch has no units of work.
    Empty,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "batch must contain at least one unit of work"),
        }
    }
}

impl std::error::Error for BatchError {}

/// The failure of a single unit of work.
///
/// Failures are carried in the unit's result slot; they never abort the batch.
#[derive(Debug)]
pub enum UnitFailure {
    /// The unit's work returned an error.
    Failed {
        /// The unit's label.
        label: Cow<'static, str>,
        /// The error returned by the work.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The unit's work panicked.
    Panicked {
        /// The unit's label.
        label: Cow<'static, str>,
        /// The panic payload, if it was a string.
        message: String,
    },
    /// No worker thread could be spawned for the unit.
    Spawn {
        /// The unit's label.
        label: Cow<'static, str>,
        /// The error reported by the operating system.
        source: io::Error,
    },
}

impl UnitFailure {
    /// Returns the label of the unit that failed.
    pub fn label(&self) -> &str {
        match self {
            Self::Failed { label, .. }
            | Self::Panicked { label, .. }
            | Self::Spawn { label, .. } => label,
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { label, source } => write!(f, "unit {label:?} failed: {source}"),
            Self::Panicked { label, message } => write!(f, "unit {label:?} panicked: {message}"),
            Self::Spawn { label, source } => {
                write!(f, "unit {label:?} could not be spawned: {source}")
            }
        }
    }
}

impl std::error::Error for UnitFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed { source, .. } => Some(source.as_ref()),
            Self::Spawn { source, .. } => Some(source),
            Self::Panicked { .. } => None,
        }
    }
}

/// Error type for accessing an [`Affine`](crate::Affine) resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The resource was accessed from a context other than its owner.
    WrongContext {
        /// The context owning the resource.
        owner: ContextId,
        /// The context bound to the calling thread, if any.
        caller: Option<ContextId>,
    },
    /// The resource was accessed while already being accessed on its owning context.
    Busy {
        /// The context owning the resource.
        owner: ContextId,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongContext {
                owner,
                caller: Some(caller),
            } => write!(
                f,
                "resource owned by context {} accessed from context {}",
                owner.as_raw(),
                caller.as_raw()
            ),
            Self::WrongContext {
                owner,
                caller: None,
            } => write!(
                f,
                "resource owned by context {} accessed from a thread without a context",
                owner.as_raw()
            ),
            Self::Busy { owner } => write!(
                f,
                "resource owned by context {} is already being accessed",
                owner.as_raw()
            ),
        }
    }
}

impl std::error::Error for AccessError {}

/// Error type for acquiring an owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The calling thread already owns a live context.
    AlreadyBound(ContextId),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBound(id) => {
                write!(f, "thread already owns context {}", id.as_raw())
            }
        }
    }
}

impl std::error::Error for ContextError {}
