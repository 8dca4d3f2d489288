use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Error, Result};

/// Progress hook. Algorithms report a completed fraction in `[0, 1]`;
/// the default reporter drops it.
#[derive(Clone, Default)]
pub struct Progress(Option<Arc<dyn Fn(f64) + Send + Sync>>);

impl Progress {
    pub fn new(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn update(&self, fraction: f64) {
        if let Some(f) = &self.0 {
            f(fraction.clamp(0.0, 1.0));
        }
    }
}

/// Execution context for one algorithm invocation: the worker count, the
/// shared interrupt flag and the progress hook.
///
/// The worker count is constant during an invocation. The thread driving
/// the invocation blocks on the rayon scope and does not count towards
/// it.
#[derive(Clone)]
pub struct ExecContext {
    thread_count: usize,
    interrupted: Arc<AtomicBool>,
    progress: Progress,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl ExecContext {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
            interrupted: Arc::new(AtomicBool::new(false)),
            progress: Progress::default(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// The shared flag a caller flips to cancel the invocation. Workers
    /// observe it between morsels.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn check_interrupted(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn update_progress(&self, fraction: f64) {
        self.progress.update(fraction);
    }
}
