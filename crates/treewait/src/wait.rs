//! Wait Mechanisms
//!
//! Cooperative, timer-driven waits. Nothing here blocks a thread or spins
//! one up: every wait is a future that suspends on tokio timers or on
//! holding-promise settlement, so any number of waits can be pending on
//! the same runtime, each with its own state.
//!
//! Two primitives:
//!
//! - [`poll_for`]: evaluate a condition now, then every
//!   [`POLL_INTERVAL`] until it holds or the accumulated wait exceeds the
//!   timeout.
//! - [`until_settled`]: evaluate a condition each time the set of
//!   in-flight calls present at some append has fully settled, resolving
//!   the first time it holds. The condition learns how many calls the
//!   cycle covered. It never times out by itself.
//!
//! Elapsed time is the sum of timer delays, not a wall-clock deadline,
//! so a paused or virtualized tokio clock drives both primitives.

use crate::holding::{settle_all, HoldingRegistry};
use crate::result::{HarnessError, HarnessResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Polling interval in milliseconds
pub const POLL_INTERVAL_MS: u64 = 50;

/// Polling interval between condition evaluations
pub const POLL_INTERVAL: Duration = Duration::from_millis(POLL_INTERVAL_MS);

// =============================================================================
// WAIT CONDITION TRAIT
// =============================================================================

/// A condition a wait re-evaluates until it holds
///
/// Every `FnMut() -> bool` closure is a condition described by its type
/// name; wrap it in [`FnCondition`] to give it a readable description.
pub trait WaitCondition {
    /// Check if the condition is satisfied
    fn check(&mut self) -> bool;

    /// Get description for error messages
    fn description(&self) -> String;
}

impl<F: FnMut() -> bool> WaitCondition for F {
    fn check(&mut self) -> bool {
        self()
    }

    fn description(&self) -> String {
        std::any::type_name::<F>().to_string()
    }
}

/// A condition re-evaluated after settle cycles
///
/// `check` receives the number of holding promises the finished cycle
/// covered: the first `settled` promises ever appended have all settled.
pub trait SettledCondition {
    /// Check if the condition is satisfied once `settled` promises settled
    fn check(&mut self, settled: usize) -> bool;

    /// Get description for log messages
    fn description(&self) -> String;
}

impl<F: FnMut(usize) -> bool> SettledCondition for F {
    fn check(&mut self, settled: usize) -> bool {
        self(settled)
    }

    fn description(&self) -> String {
        std::any::type_name::<F>().to_string()
    }
}

/// A function-based wait condition with a description
pub struct FnCondition<F> {
    func: F,
    description: String,
}

impl<F> std::fmt::Debug for FnCondition<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCondition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<F> FnCondition<F> {
    /// Create a new function condition
    pub fn new(func: F, description: impl Into<String>) -> Self {
        Self {
            func,
            description: description.into(),
        }
    }
}

impl<F: FnMut() -> bool> WaitCondition for FnCondition<F> {
    fn check(&mut self) -> bool {
        (self.func)()
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

impl<F: FnMut(usize) -> bool> SettledCondition for FnCondition<F> {
    fn check(&mut self, settled: usize) -> bool {
        (self.func)(settled)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
}

impl WaitResult {
    /// Create a wait result
    #[must_use]
    pub fn new(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            elapsed,
            waited_for: waited_for.into(),
        }
    }

    /// Elapsed time in milliseconds
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Poll `condition` until it holds or the wait exceeds `timeout`
///
/// The condition is evaluated immediately; if it already holds the wait
/// succeeds with zero elapsed time and no timer is ever scheduled.
/// Otherwise it is re-evaluated every [`POLL_INTERVAL`]. On each tick the
/// condition goes first; the wait fails only once elapsed time is
/// strictly greater than `timeout`, so a tick landing exactly on the
/// timeout still gets one more evaluation.
pub async fn poll_for<C: WaitCondition>(
    mut condition: C,
    timeout: Duration,
) -> HarnessResult<WaitResult> {
    let mut elapsed = Duration::ZERO;
    loop {
        if condition.check() {
            tracing::debug!(
                condition = %condition.description(),
                elapsed_ms = elapsed.as_millis() as u64,
                "wait condition satisfied"
            );
            return Ok(WaitResult::new(elapsed, condition.description()));
        }
        if elapsed > timeout {
            let description = condition.description();
            tracing::warn!(
                condition = %description,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "wait timed out"
            );
            return Err(HarnessError::PollTimeout {
                description,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        elapsed += POLL_INTERVAL;
        tracing::trace!(elapsed_ms = elapsed.as_millis() as u64, "poll tick");
    }
}

// =============================================================================
// SETTLE-THEN-CHECK
// =============================================================================

/// Resolve the first time `condition` holds after a settle cycle
///
/// A settle cycle waits for every holding promise present at one moment
/// to settle, then evaluates `condition` with the number of promises it
/// covered. One cycle starts right away for the promises present now, and
/// one more for every later append to `registry`, covering the promises
/// present at that append. Cycles run concurrently and every completion
/// is checked; the first passing check resolves the wait.
///
/// Promises are a prefix of the registry, so a condition that only counts
/// work whose promise index is below `settled` never passes while that
/// work is still in flight, however many later calls remain pending.
///
/// The listener is registered before this function returns, so appends
/// made before the future is first polled are not missed. It is
/// deregistered when the future completes or is dropped. There is no
/// timeout: if the condition never holds the future stays pending, and
/// callers wanting a bound should race it with `tokio::time::timeout`.
pub fn until_settled<C>(
    registry: &HoldingRegistry,
    mut condition: C,
) -> impl Future<Output = WaitResult> + Send + 'static
where
    C: SettledCondition + Send + 'static,
{
    let (tx, mut appended) = tokio::sync::mpsc::unbounded_channel::<usize>();
    let subscription = registry.subscribe(move |len| {
        // The receiver is gone once the wait resolved
        let _ = tx.send(len);
    });
    let registry = registry.clone();
    let initial = settle_cycle(&registry, registry.len());

    async move {
        let _subscription = subscription;
        let start = tokio::time::Instant::now();
        let mut cycles = FuturesUnordered::new();
        cycles.push(initial);
        let mut completed = 0usize;

        loop {
            tokio::select! {
                Some(len) = appended.recv() => {
                    tracing::trace!(holding = len, "settle cycle scheduled");
                    cycles.push(settle_cycle(&registry, len));
                }
                Some(settled) = cycles.next() => {
                    completed += 1;
                    if condition.check(settled) {
                        tracing::debug!(
                            condition = %condition.description(),
                            cycles = completed,
                            settled,
                            "settled condition satisfied"
                        );
                        return WaitResult::new(start.elapsed(), condition.description());
                    }
                    tracing::trace!(cycles = completed, settled, "settled condition not yet satisfied");
                }
                else => std::future::pending::<()>().await,
            }
        }
    }
}

/// Settle the first `len` promises, yielding `len`
fn settle_cycle(
    registry: &HoldingRegistry,
    len: usize,
) -> impl Future<Output = usize> + Send + 'static {
    let pending = registry.pending(len);
    async move {
        settle_all(pending).await;
        len
    }
}

/// Wait for a fixed duration (diagnostic only - prefer wait conditions)
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

// =============================================================================
// TESTS
// =============================================================================
