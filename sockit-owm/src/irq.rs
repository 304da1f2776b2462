use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Event flag posted by the interrupt handler at the end of a bus cycle.
///
/// Cloning yields another handle to the same flag, so the platform's interrupt glue can
/// keep one while the controller waits on another.
#[derive(Debug, Clone, Default)]
pub struct IrqFlag {
    inner: Arc<FlagInner>,
}

#[derive(Debug, Default)]
struct FlagInner {
    set: Mutex<bool>,
    cond: Condvar,
}

impl IrqFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the flag and wake the waiting context.
    pub fn post(&self) {
        *self.lock() = true;
        self.inner.cond.notify_all();
    }

    /// Clear the flag before starting a new cycle.
    pub fn clear(&self) {
        *self.lock() = false;
    }

    /// Current state, without consuming it.
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the flag is posted or `timeout` elapses, consuming the flag.
    ///
    /// Returns `true` if the flag was posted.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (mut guard, _) = self
            .inner
            .cond
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        let posted = *guard;
        *guard = false;
        posted
    }
}
