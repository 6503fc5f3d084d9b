//! Worker thread configuration.

use std::{borrow::Cow, sync::OnceLock};

const STACK_SIZE_KEY: &str = "FUNNEL_WORKER_STACK";

pub(crate) fn global_stack_size() -> Option<usize> {
    static STACK_SIZE: OnceLock<Option<usize>> = OnceLock::new();

    *STACK_SIZE.get_or_init(stack_size_from_env)
}

fn stack_size_from_env() -> Option<usize> {
    let Ok(value) = std::env::var(STACK_SIZE_KEY) else {
        return None;
    };

    match parse_stack_size(&value) {
        Some(size) => Some(size),
        None => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                env_key = STACK_SIZE_KEY,
                value = ?value,
                "Unrecognized value for environment variable. Using default."
            );
            None
        }
    }
}

fn parse_stack_size(value: &str) -> Option<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(size) => Some(size),
    }
}

/// Options for the worker threads running a batch's units.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WorkerOptions {
    pub(crate) name_prefix: Cow<'static, str>,
    pub(crate) stack_size: Option<usize>,
}

impl WorkerOptions {
    /// Builder-style method for setting the worker threads' name prefix.
    ///
    /// Workers are named `"{prefix}-{index}"`. The default prefix is `"funnel"`.
    pub fn name_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Builder-style method for setting the worker threads' stack size in bytes.
    ///
    /// The default is the `FUNNEL_WORKER_STACK` environment variable,
    /// or the platform default if it is unset.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub(crate) fn builder(&self, index: usize) -> std::thread::Builder {
        let builder = std::thread::Builder::new().name(format!("{}-{index}", self.name_prefix));

        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}

impl Default for WorkerOptions {
    /// Returns options with following default values:
    ///
    /// - `name_prefix: "funnel"`,
    /// - `stack_size: $FUNNEL_WORKER_STACK`,
    fn default() -> Self {
        Self {
            name_prefix: Cow::Borrowed("funnel"),
            stack_size: global_stack_size(),
        }
    }
}
