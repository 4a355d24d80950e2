//! Wall-clock budget for a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Grace period added to the remaining budget when it is turned into a
/// statement timeout, so an interrupted concurrent build can abort cleanly.
pub const STATEMENT_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Largest `statement_timeout` the server accepts (`INT_MAX` milliseconds,
/// in whole seconds).
pub const MAX_STATEMENT_TIMEOUT: Duration = Duration::from_secs(2_147_483);

/// Time source for the run.
///
/// Allows tests to control both the current time and the pauses between
/// attempts. Production code uses [`SystemClock`].
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Blocks for the given duration.
    fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Start time and deadline of a run.
///
/// The deadline is fixed when the budget is created. Running past it is
/// never an error; it only stops further indexes from being started. A
/// budget too large to represent as an instant has no deadline at all.
pub struct RunBudget {
    start: Instant,
    deadline: Option<Instant>,
    enforce: bool,
    clock: Arc<dyn Clock>,
}

impl RunBudget {
    /// Starts a budget of `run_time` using the system clock.
    pub fn start(run_time: Duration, enforce: bool) -> Self {
        Self::start_with_clock(run_time, enforce, Arc::new(SystemClock))
    }

    /// Starts a budget of `run_time` measured on `clock`.
    pub fn start_with_clock(run_time: Duration, enforce: bool, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            start,
            deadline: start.checked_add(run_time),
            enforce,
            clock,
        }
    }

    /// Time left until the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline
            .map_or(Duration::MAX, |deadline| deadline.saturating_duration_since(self.clock.now()))
    }

    /// True when the current time is at or past the deadline.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| self.clock.now() >= deadline)
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    /// Whether the budget is enforced through a statement timeout.
    pub fn enforced(&self) -> bool {
        self.enforce
    }

    /// Statement timeout to apply before a build, if enforcement is on.
    ///
    /// Whole seconds of remaining budget plus [`STATEMENT_TIMEOUT_GRACE`],
    /// capped at [`MAX_STATEMENT_TIMEOUT`].
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.enforce.then(|| {
            Duration::from_secs(self.remaining().as_secs())
                .saturating_add(STATEMENT_TIMEOUT_GRACE)
                .min(MAX_STATEMENT_TIMEOUT)
        })
    }

    /// Pauses on the run's clock.
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration);
        }
    }
}
