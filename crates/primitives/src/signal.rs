use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A shared cooperative-cancellation flag.
///
/// Cloning a [`StopSignal`] shares the same underlying atomic. Workers and the
/// driver poll [`StopSignal::is_set`] at loop heads; nothing forces interruption
/// of an in-flight syscall.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a new, unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Returns whether the signal has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sets the signal. Safe to call from a signal handler: this is the only thing
    /// it does.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Installs a `SIGINT`/`SIGTERM` handler that sets `signal` and nothing else.
///
/// This is a minimal stand-in for a downstream node's full signal-handling stack
/// (which also flushes metrics, drains connections, etc.); this core only needs a
/// single atomic touch on cancellation, so it hands that off to `ctrlc` rather
/// than driving `sigaction` directly.
///
/// # Errors
///
/// Returns an error if a handler could not be installed (e.g. one is already
/// registered for the process).
pub fn register_stop_handler(signal: StopSignal) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || signal.set())
}
