//! Start throttling and completion staleness for the single run slot.
//!
//! A [`RunSlot`] holds the only state shared between concurrent runs: when the
//! last run was accepted and which token it received. The [`RateGate`] writes
//! it on acceptance; completions read it back through [`RunSlot::is_current`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Minimum spacing between accepted run starts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(300);

/// Source of monotonic time for the gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time via [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Identifies one accepted run. Later acceptances always compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunToken(u64);

impl RunToken {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct SlotState {
    last_start: Option<Instant>,
    /// Sequence of the most recently accepted run; 0 until the first one.
    latest: u64,
}

/// Marker for the most recently accepted run.
#[derive(Debug, Default)]
pub struct RunSlot {
    state: Mutex<SlotState>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `token` still belongs to the newest accepted run.
    pub fn is_current(&self, token: RunToken) -> bool {
        self.lock().latest == token.0
    }

    /// Token of the newest accepted run, if any run was accepted yet.
    pub fn latest(&self) -> Option<RunToken> {
        let latest = self.lock().latest;
        (latest > 0).then_some(RunToken(latest))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        // The state is two plain values; a panicking holder cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rejects run starts that arrive inside the cool-down window.
pub struct RateGate {
    slot: Arc<RunSlot>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateGate {
    pub fn new(slot: Arc<RunSlot>, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot,
            window,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Accept a new run, or return `None` if the previous accepted start is
    /// less than one window ago.
    ///
    /// Acceptance records the start time and advances the slot's latest token
    /// under a single lock, so completions observe either the old or the new
    /// run, never a mix.
    pub fn try_start(&self) -> Option<RunToken> {
        let now = self.clock.now();
        let mut state = self.slot.lock();
        if let Some(last) = state.last_start
            && now.saturating_duration_since(last) < self.window
        {
            return None;
        }
        state.last_start = Some(now);
        state.latest += 1;
        Some(RunToken(state.latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ManualClock;

    fn gate(window_ms: u64) -> (RateGate, Arc<RunSlot>, Arc<ManualClock>) {
        let slot = Arc::new(RunSlot::new());
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(
            slot.clone(),
            Duration::from_millis(window_ms),
            clock.clone(),
        );
        (gate, slot, clock)
    }

    #[test]
    fn first_start_is_accepted() {
        let (gate, slot, _clock) = gate(300);
        assert_eq!(slot.latest(), None);
        let token = gate.try_start().expect("accepted");
        assert!(slot.is_current(token));
        assert_eq!(slot.latest(), Some(token));
    }

    #[test]
    fn start_inside_window_is_rejected() {
        let (gate, slot, clock) = gate(300);
        let first = gate.try_start().expect("accepted");
        clock.advance(Duration::from_millis(299));
        assert!(gate.try_start().is_none());
        // Rejection leaves the slot untouched.
        assert!(slot.is_current(first));
    }

    #[test]
    fn window_is_measured_from_last_accepted_start() {
        let (gate, _slot, clock) = gate(300);
        gate.try_start().expect("first");
        clock.advance(Duration::from_millis(200));
        assert!(gate.try_start().is_none());
        clock.advance(Duration::from_millis(100));
        assert!(gate.try_start().is_some());
        clock.advance(Duration::from_millis(250));
        assert!(gate.try_start().is_none());
    }

    #[test]
    fn newer_acceptance_makes_older_token_stale() {
        let (gate, slot, clock) = gate(300);
        let first = gate.try_start().expect("first");
        clock.advance(Duration::from_secs(1));
        let second = gate.try_start().expect("second");
        assert!(second > first);
        assert!(!slot.is_current(first));
        assert!(slot.is_current(second));
    }

    #[test]
    fn zero_window_accepts_back_to_back_starts() {
        let (gate, _slot, _clock) = gate(0);
        let a = gate.try_start().expect("a");
        let b = gate.try_start().expect("b");
        assert_eq!(b.sequence(), a.sequence() + 1);
    }
}
