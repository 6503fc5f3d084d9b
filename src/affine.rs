//! Resources bound to an owning context.

use parking_lot::Mutex;

use crate::{error::AccessError, ContextId, EventLoop};

/// A value that may only be touched on the context that created it.
///
/// `Affine` can be shared with worker threads, but any access from them
/// fails with [`AccessError::WrongContext`]. Workers are expected to
/// marshal their changes onto the owning context instead.
#[derive(Debug)]
pub struct Affine<T> {
    owner: ContextId,
    value: Mutex<T>,
}

impl<T> Affine<T> {
    /// Binds `value` to the context of `event_loop`.
    pub fn new(event_loop: &EventLoop, value: T) -> Self {
        Self {
            owner: event_loop.id(),
            value: Mutex::new(value),
        }
    }

    /// Returns the context owning the value.
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    /// Runs `access` with the value, if called on the owning context.
    ///
    /// Nested access to the same value from within `access` fails with
    /// [`AccessError::Busy`].
    pub fn with<R>(&self, access: impl FnOnce(&mut T) -> R) -> Result<R, AccessError> {
        let caller = ContextId::current();

        if caller != Some(self.owner) {
            return Err(AccessError::WrongContext {
                owner: self.owner,
                caller,
            });
        }

        // Only the owning thread gets this far, so a held lock means re-entry.
        let mut value = self
            .value
            .try_lock()
            .ok_or(AccessError::Busy { owner: self.owner })?;

        Ok(access(&mut value))
    }

    /// Consumes the resource, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn owner_can_access() {
        let event_loop = EventLoop::acquire().unwrap();
        let bar = Affine::new(&event_loop, 0u8);

        bar.with(|value| *value = 42).unwrap();

        assert_eq!(bar.with(|value| *value), Ok(42));
        assert_eq!(bar.owner(), event_loop.id());
    }

    #[test]
    fn worker_access_is_rejected() {
        let event_loop = EventLoop::acquire().unwrap();
        let bar = Arc::new(Affine::new(&event_loop, 0u8));
        let owner = event_loop.id();

        let worker_bar = Arc::clone(&bar);
        let result = thread::spawn(move || worker_bar.with(|value| *value = 100))
            .join()
            .unwrap();

        assert_eq!(
            result,
            Err(AccessError::WrongContext {
                owner,
                caller: None
            })
        );
        assert_eq!(bar.with(|value| *value), Ok(0));
    }

    #[test]
    fn other_context_access_is_rejected() {
        let event_loop = EventLoop::acquire().unwrap();
        let bar = Arc::new(Affine::new(&event_loop, String::from("idle")));

        let other_bar = Arc::clone(&bar);
        let (other, result) = thread::spawn(move || {
            let other_loop = EventLoop::acquire().unwrap();
            let result = other_bar.with(|label| label.push_str("!"));
            (other_loop.id(), result)
        })
        .join()
        .unwrap();

        assert_eq!(
            result,
            Err(AccessError::WrongContext {
                owner: event_loop.id(),
                caller: Some(other),
            })
        );
    }

    #[test]
    fn nested_access_is_rejected() {
        let event_loop = EventLoop::acquire().unwrap();
        let bar = Affine::new(&event_loop, 7u8);

        let nested = bar.with(|_| bar.with(|value| *value));

        assert_eq!(
            nested,
            Ok(Err(AccessError::Busy {
                owner: event_loop.id()
            }))
        );
        assert_eq!(bar.with(|value| *value), Ok(7));
    }

    #[test]
    fn marshaled_access_succeeds() {
        let event_loop = EventLoop::acquire().unwrap();
        let dispatcher = event_loop.dispatcher();
        let bar = Arc::new(Affine::new(&event_loop, 0u8));

        let worker_bar = Arc::clone(&bar);
        thread::spawn(move || {
            use crate::Marshal as _;

            dispatcher.marshal(Box::new(move || {
                worker_bar.with(|value| *value = 100).unwrap();
            }));
        })
        .join()
        .unwrap();

        event_loop.run_pending();

        assert_eq!(bar.with(|value| *value), Ok(100));
    }
}
