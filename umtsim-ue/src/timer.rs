//! UE Timer Management
//!
//! Every guard, retry and periodic timer of the UE runs on one [`TimerCore`]
//! driven by the simulation clock. Expiry is delivered as a typed
//! [`TimerEvent`], one enum per sublayer, so a handler never has to decode an
//! opaque payload.
//!
//! # Ownership
//!
//! A state machine keeps each outstanding timer in a [`TimerSlot`]. A slot
//! holds at most one handle: arming an occupied slot is a logic error and
//! panics. On expiry the owner checks the fired handle against its slot with
//! [`TimerSlot::take_if`]; a mismatch means the timer was superseded and the
//! event is ignored.
//!
//! Guard timers with a retransmission budget use [`GuardedRetry`].
//!
//! # Timer Definitions
//!
//! ## RRC (3GPP TS 25.331)
//! - T300: RRC CONNECTION REQUEST guard
//! - T308: RRC CONNECTION RELEASE COMPLETE retransmission
//!
//! ## MM / GMM (3GPP TS 24.008)
//! - T3210: location updating guard
//! - T3211: location updating retry
//! - T3212: periodic location updating
//! - T3230: CM service request guard
//! - T3240: wait for network command
//! - T3310: attach guard
//! - T3312: periodic routing area updating
//! - T3317: service request guard
//! - T3321: detach guard
//! - T3330: routing area updating guard
//!
//! ## CC / SM (3GPP TS 24.008)
//! - T303, T305, T308, T310, T313: call control guards
//! - T3380: PDP context activation guard
//! - T3390: PDP context deactivation guard

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;

use umtsim_common::SimTime;

use crate::flow::FlowId;

// ============================================================================
// Timer Constants
// ============================================================================

/// Default T300 interval: 1 second
pub const DEFAULT_T300_INTERVAL: Duration = Duration::from_secs(1);
/// Default T308 interval: 160 ms
pub const DEFAULT_T308_INTERVAL: Duration = Duration::from_millis(160);
/// Back-off used when RRC CONNECTION REJECT carries no wait time
pub const DEFAULT_RRC_WAIT_TIME: Duration = Duration::from_secs(10);

/// Default T3210 interval: 20 seconds
pub const DEFAULT_T3210_INTERVAL: Duration = Duration::from_secs(20);
/// Default T3211 interval: 15 seconds
pub const DEFAULT_T3211_INTERVAL: Duration = Duration::from_secs(15);
/// Default T3212 interval: 50 minutes (network controlled)
pub const DEFAULT_T3212_INTERVAL: Duration = Duration::from_secs(50 * 60);
/// Default T3230 interval: 15 seconds
pub const DEFAULT_T3230_INTERVAL: Duration = Duration::from_secs(15);
/// Default T3240 interval: 10 seconds
pub const DEFAULT_T3240_INTERVAL: Duration = Duration::from_secs(10);

/// Default T3310 interval: 15 seconds
pub const DEFAULT_T3310_INTERVAL: Duration = Duration::from_secs(15);
/// Default T3312 interval: 54 minutes (network controlled)
pub const DEFAULT_T3312_INTERVAL: Duration = Duration::from_secs(54 * 60);
/// Default T3317 interval: 15 seconds
pub const DEFAULT_T3317_INTERVAL: Duration = Duration::from_secs(15);
/// Default T3321 interval: 15 seconds
pub const DEFAULT_T3321_INTERVAL: Duration = Duration::from_secs(15);
/// Default T3330 interval: 15 seconds
pub const DEFAULT_T3330_INTERVAL: Duration = Duration::from_secs(15);

/// Default T303 interval: 30 seconds
pub const DEFAULT_T303_INTERVAL: Duration = Duration::from_secs(30);
/// Default T305 interval: 30 seconds
pub const DEFAULT_T305_INTERVAL: Duration = Duration::from_secs(30);
/// Default CC T308 interval: 30 seconds
pub const DEFAULT_CC_T308_INTERVAL: Duration = Duration::from_secs(30);
/// Default T310 interval: 30 seconds
pub const DEFAULT_T310_INTERVAL: Duration = Duration::from_secs(30);
/// Default T313 interval: 30 seconds
pub const DEFAULT_T313_INTERVAL: Duration = Duration::from_secs(30);

/// Default T3380 interval: 30 seconds
pub const DEFAULT_T3380_INTERVAL: Duration = Duration::from_secs(30);
/// Default T3390 interval: 8 seconds
pub const DEFAULT_T3390_INTERVAL: Duration = Duration::from_secs(8);

/// N300: RRC CONNECTION REQUEST transmissions
pub const MAX_T300_RETRIES: u32 = 3;
/// N308: RRC CONNECTION RELEASE COMPLETE transmissions
pub const MAX_T308_RETRIES: u32 = 3;
/// Location updating attempts before giving up until the next trigger
pub const MAX_LU_ATTEMPTS: u32 = 4;
/// Attach attempts (GMM attempt counter limit)
pub const MAX_T3310_RETRIES: u32 = 4;
/// Detach request transmissions
pub const MAX_T3321_RETRIES: u32 = 4;
/// Routing area update request transmissions
pub const MAX_T3330_RETRIES: u32 = 4;
/// SETUP transmissions
pub const MAX_T303_RETRIES: u32 = 2;
/// RELEASE transmissions
pub const MAX_CC_T308_RETRIES: u32 = 2;
/// ACTIVATE PDP CONTEXT REQUEST transmissions
pub const MAX_T3380_RETRIES: u32 = 4;
/// DEACTIVATE PDP CONTEXT REQUEST transmissions
pub const MAX_T3390_RETRIES: u32 = 4;

// ============================================================================
// Timer Events
// ============================================================================

/// RRC timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RrcTimer {
    T300,
    T308,
    /// Back-off after RRC CONNECTION REJECT
    WaitTime,
    /// Idle mode cell (re)selection evaluation
    CellSelection,
    /// Periodic staleness sweep of the cell list
    CpichCheck,
    /// Periodic measurement report evaluation in CELL_DCH
    MeasReportCheck,
}

/// MM timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmTimer {
    T3210,
    T3211,
    T3212,
    T3230,
    T3240,
}

/// GMM timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GmmTimer {
    T3310,
    T3312,
    T3317,
    T3321,
    T3330,
}

/// Per-call CC timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcTimer {
    T303,
    T305,
    T308,
    T310,
    T313,
}

/// Per-context SM timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmTimer {
    T3380,
    T3390,
}

/// Event delivered when a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerEvent {
    Rrc(RrcTimer),
    Mm(MmTimer),
    Gmm(GmmTimer),
    Cc { flow: FlowId, timer: CcTimer },
    Sm { flow: FlowId, timer: SmTimer },
    /// Periodic sweep over PS flows
    FlowSweep,
}

impl fmt::Display for TimerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerEvent::Rrc(t) => write!(f, "RRC {t:?}"),
            TimerEvent::Mm(t) => write!(f, "MM {t:?}"),
            TimerEvent::Gmm(t) => write!(f, "GMM {t:?}"),
            TimerEvent::Cc { flow, timer } => write!(f, "CC {timer:?} flow {flow}"),
            TimerEvent::Sm { flow, timer } => write!(f, "SM {timer:?} flow {flow}"),
            TimerEvent::FlowSweep => write!(f, "flow sweep"),
        }
    }
}

// ============================================================================
// Timer Core
// ============================================================================

/// Handle of an armed timer. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Deadline-ordered timer queue on the simulation clock.
///
/// Timers with equal deadlines fire in the order they were armed. Cancelled
/// timers stay in the heap until they reach the front and are then skipped.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use umtsim_common::SimTime;
/// use umtsim_ue::timer::{MmTimer, TimerCore, TimerEvent};
///
/// let mut timers = TimerCore::new();
/// let h = timers.arm(Duration::from_secs(10), TimerEvent::Mm(MmTimer::T3240));
///
/// timers.advance(SimTime::from_secs(10));
/// assert_eq!(timers.pop_due(), Some((h, TimerEvent::Mm(MmTimer::T3240))));
/// assert_eq!(timers.pop_due(), None);
/// ```
#[derive(Debug, Default)]
pub struct TimerCore {
    now: SimTime,
    next_id: u64,
    queue: BinaryHeap<Reverse<(SimTime, u64)>>,
    live: HashMap<u64, TimerEvent>,
}

impl TimerCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Moves the clock forward. Time never goes backwards.
    pub fn advance(&mut self, now: SimTime) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Arms a timer firing `delay` after the current time.
    pub fn arm(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = self.now + delay;
        self.queue.push(Reverse((deadline, id)));
        self.live.insert(id, event);
        TimerHandle(id)
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle.0).is_some()
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.live.contains_key(&handle.0)
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if self.live.contains_key(&id) {
                return Some(deadline);
            }
            self.queue.pop();
        }
        None
    }

    /// Removes and returns the next timer whose deadline has passed.
    pub fn pop_due(&mut self) -> Option<(TimerHandle, TimerEvent)> {
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if deadline > self.now {
                return None;
            }
            self.queue.pop();
            if let Some(event) = self.live.remove(&id) {
                return Some((TimerHandle(id), event));
            }
        }
        None
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

// ============================================================================
// Timer Slot
// ============================================================================

/// Storage for at most one outstanding timer of one kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot(Option<TimerHandle>);

impl TimerSlot {
    pub const fn new() -> Self {
        Self(None)
    }

    /// Arms the slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot already holds a live timer.
    pub fn arm(&mut self, timers: &mut TimerCore, delay: Duration, event: TimerEvent) {
        if let Some(h) = self.0 {
            if timers.is_armed(h) {
                tracing::error!("{} armed while still outstanding", event);
                panic!("timer {event} armed twice");
            }
        }
        self.0 = Some(timers.arm(delay, event));
    }

    /// Cancels the outstanding timer, if any.
    pub fn cancel(&mut self, timers: &mut TimerCore) -> bool {
        match self.0.take() {
            Some(h) => timers.cancel(h),
            None => false,
        }
    }

    /// Clears the slot if `handle` is the one it holds.
    ///
    /// Returns false for a stale handle, which the caller must ignore.
    pub fn take_if(&mut self, handle: TimerHandle) -> bool {
        if self.0 == Some(handle) {
            self.0 = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }
}

// ============================================================================
// Guarded Retry
// ============================================================================

/// Outcome of a guard timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The handle does not belong to this guard
    Stale,
    /// Budget remains: retransmit and call [`GuardedRetry::retry`]
    Retry,
    /// Budget used up: abort the procedure
    Exhausted,
}

/// Guard timer with a bounded number of attempts.
///
/// ```
/// use std::time::Duration;
/// use umtsim_common::SimTime;
/// use umtsim_ue::timer::{GmmTimer, GuardedRetry, RetryDecision, TimerCore, TimerEvent};
///
/// let mut timers = TimerCore::new();
/// let mut guard = GuardedRetry::new(TimerEvent::Gmm(GmmTimer::T3310), Duration::from_secs(15), 2);
/// guard.start(&mut timers);
///
/// timers.advance(SimTime::from_secs(15));
/// let (h, _) = timers.pop_due().unwrap();
/// assert_eq!(guard.on_expiry(h), RetryDecision::Retry);
/// guard.retry(&mut timers);
///
/// timers.advance(SimTime::from_secs(30));
/// let (h, _) = timers.pop_due().unwrap();
/// assert_eq!(guard.on_expiry(h), RetryDecision::Exhausted);
/// ```
#[derive(Debug, Clone)]
pub struct GuardedRetry {
    slot: TimerSlot,
    event: TimerEvent,
    interval: Duration,
    attempts: u32,
    max_attempts: u32,
}

impl GuardedRetry {
    pub fn new(event: TimerEvent, interval: Duration, max_attempts: u32) -> Self {
        Self {
            slot: TimerSlot::new(),
            event,
            interval,
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// First attempt: resets the counter and arms the guard.
    pub fn start(&mut self, timers: &mut TimerCore) {
        self.slot.cancel(timers);
        self.attempts = 1;
        self.slot.arm(timers, self.interval, self.event);
    }

    /// Counts one more attempt and re-arms the guard.
    pub fn retry(&mut self, timers: &mut TimerCore) {
        self.attempts += 1;
        self.slot.arm(timers, self.interval, self.event);
    }

    /// Classifies a fired handle.
    pub fn on_expiry(&mut self, handle: TimerHandle) -> RetryDecision {
        if !self.slot.take_if(handle) {
            return RetryDecision::Stale;
        }
        if self.attempts < self.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::Exhausted
        }
    }

    /// Cancels the guard and clears the counter.
    pub fn stop(&mut self, timers: &mut TimerCore) {
        self.slot.cancel(timers);
        self.attempts = 0;
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_armed()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Periodic update interval signalled by the network in deci-hours, as
/// broadcast in SIB1 or sent in LOCATION UPDATING ACCEPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicInterval {
    /// Signalled as zero: no periodic updating
    Disabled,
    Every(Duration),
}

impl PeriodicInterval {
    pub fn from_deci_hours(value: u8) -> Self {
        match value {
            0 => PeriodicInterval::Disabled,
            v => PeriodicInterval::Every(Duration::from_secs(u64::from(v) * 360)),
        }
    }

    pub fn duration(self) -> Option<Duration> {
        match self {
            PeriodicInterval::Disabled => None,
            PeriodicInterval::Every(interval) => Some(interval),
        }
    }
}
