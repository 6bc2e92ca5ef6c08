//! Scoped timing for profiling one-shot passes.

use std::time::Instant;

use tracing::info;

/// Scoped timer that logs its elapsed time when dropped.
///
/// Used around expensive one-shot passes such as scene creation and
/// acceleration-structure builds.
///
/// # Example
/// ```
/// use raytracer_core::ScopedTimer;
///
/// {
///     let _timer = ScopedTimer::new("BLAS build");
///     // ... expensive work ...
/// } // logs "BLAS build took ...ms"
/// ```
pub struct ScopedTimer {
    label: &'static str,
    start: Instant,
}

impl ScopedTimer {
    /// Start a scoped timer with the given label.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        info!(
            "{} took {:.2}ms",
            self.label,
            self.start.elapsed().as_secs_f64() * 1000.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_timer_drops_cleanly() {
        let timer = ScopedTimer::new("test pass");
        drop(timer);
    }
}
