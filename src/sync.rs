//! Cooperative cancellation for the background loops.
//!
//! A loop owns nothing but a shared `StopSignal`; it checks the signal at each
//! iteration boundary and sleeps through `wait_timeout`, so raising the signal
//! also cuts a pacing sleep short. Nothing is ever interrupted mid-iteration.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::SimError;

/// Lock a scratch mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct StopSignal {
    raised: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *lock(&self.raised) = true;
        self.wake.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *lock(&self.raised)
    }

    /// Sleep for up to `timeout`. Returns true if the signal is (or becomes) raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = lock(&self.raised);
        if *guard || timeout.is_zero() {
            return *guard;
        }
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// A named background loop plus the signal that stops it.
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl LoopHandle {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self, SimError>
    where
        F: FnOnce(&StopSignal) + Send + 'static,
    {
        let signal = Arc::new(StopSignal::new());
        let loop_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(&loop_signal))
            .map_err(|source| SimError::Spawn { name, source })?;
        log::debug!("started {name} loop");
        Ok(LoopHandle {
            name,
            signal,
            handle,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Raise the stop signal and wait for the loop to exit.
    pub fn stop(self) {
        self.signal.raise();
        if self.handle.join().is_err() {
            log::error!("{} loop panicked before it was stopped", self.name);
        } else {
            log::debug!("stopped {} loop", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_wait_returns_early_when_raised() {
        let signal = Arc::new(StopSignal::new());
        let remote = Arc::clone(&signal);
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.raise();
        });

        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn test_wait_times_out_when_not_raised() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        assert!(!signal.wait_timeout(Duration::ZERO));
        signal.raise();
        assert!(signal.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn test_loop_handle_stops_and_joins() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = LoopHandle::spawn("test", move |stop| {
            while !stop.wait_timeout(Duration::from_millis(1)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.name(), "test");
        handle.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }
}
