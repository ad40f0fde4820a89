use std::time::Instant;
use tracing::{debug, trace};

/// Logs how long the enclosing scope took when dropped.
///
/// Created by [`debug_time!`](crate::debug_time) and [`trace_time!`](crate::trace_time).
#[derive(Debug)]
#[must_use]
pub struct PhaseTimer {
    phase: &'static str,
    debug: bool,
    start: Option<Instant>,
}

impl PhaseTimer {
    #[doc(hidden)]
    #[inline]
    pub fn start(phase: &'static str, debug: bool, enabled: bool) -> Self {
        Self { phase, debug, start: enabled.then(Instant::now) }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let Some(start) = self.start else { return };
        let elapsed = start.elapsed();
        if self.debug {
            debug!(target: "evmjit::time", "{:<16} {elapsed:?}", self.phase);
        } else {
            trace!(target: "evmjit::time", "{:<16} {elapsed:?}", self.phase);
        }
    }
}

/// Evaluates the expression and logs how long it took at `debug` level.
#[macro_export]
macro_rules! debug_time {
    ($phase:literal, || $e:expr) => {{
        let _timer = $crate::PhaseTimer::start(
            $phase,
            true,
            $crate::private::tracing::enabled!(
                target: "evmjit::time",
                $crate::private::tracing::Level::DEBUG
            ),
        );
        $e
    }};
}

/// Evaluates the expression and logs how long it took at `trace` level.
#[macro_export]
macro_rules! trace_time {
    ($phase:literal, || $e:expr) => {{
        let _timer = $crate::PhaseTimer::start(
            $phase,
            false,
            $crate::private::tracing::enabled!(
                target: "evmjit::time",
                $crate::private::tracing::Level::TRACE
            ),
        );
        $e
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_once() {
        let mut calls = 0;
        let value = debug_time!("count", || {
            calls += 1;
            calls * 2
        });
        assert_eq!((calls, value), (1, 2));
        let res: Result<u8, &str> = trace_time!("fail", || Err("nope"));
        assert_eq!(res, Err("nope"));
    }

    #[test]
    fn disabled_timer_does_not_read_clock() {
        let timer = PhaseTimer::start("idle", true, false);
        assert!(timer.start.is_none());
    }
}
