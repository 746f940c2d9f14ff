//! Screen Number Allocation
//!
//! The broker addresses every request and realtime registration with a
//! four-digit "screen number". Screens are a scarce, reusable namespace:
//! at most one query may own a screen at a time, and the broker keeps
//! delivering late events tagged with an old screen for a while after the
//! owner is gone.
//!
//! # Design
//!
//! Allocation is monotonic with wraparound so a just-released screen is the
//! last candidate to be handed out again. Released screens additionally sit
//! in a quarantine queue for a configurable window before they become
//! allocatable, and every allocation carries a generation counter, so a
//! recycled screen is always a distinguishable lease even if the clock is
//! unreliable.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// =============================================================================
// Screen Numbers
// =============================================================================

/// A four-digit screen number ("0101").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ScreenNo(u16);

impl ScreenNo {
    /// Highest representable screen number.
    pub const MAX: u16 = 9999;

    /// Create a screen number, rejecting values outside the 4-digit range.
    #[must_use]
    pub const fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// The numeric value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ScreenNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for ScreenNo {
    type Err = ScreenPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| ScreenPoolError::InvalidScreen(s.to_string()))
    }
}

/// One allocation of a screen number.
///
/// The generation is unique across the lifetime of the pool, so two leases
/// of the same recycled screen never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenLease {
    /// The allocated screen number.
    pub screen: ScreenNo,
    /// Monotonic allocation counter.
    pub generation: u64,
}

impl std::fmt::Display for ScreenLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.screen, self.generation)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the screen pool.
#[derive(Debug, Clone)]
pub struct ScreenPoolConfig {
    /// First allocatable screen number.
    pub first: u16,
    /// Last allocatable screen number.
    pub last: u16,
    /// Ranges inside [first, last] that are never handed out.
    pub reserved: Vec<RangeInclusive<u16>>,
    /// How long a released screen stays unallocatable.
    pub quarantine: Duration,
}

impl Default for ScreenPoolConfig {
    fn default() -> Self {
        Self {
            // 0000-0099 are conventionally reserved for the broker UI.
            first: 100,
            last: ScreenNo::MAX,
            reserved: Vec::new(),
            quarantine: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Screen pool failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScreenPoolError {
    /// Every screen in the configured range is live, quarantined, or reserved.
    #[error("screen pool exhausted")]
    Exhausted,
    /// The screen is not currently allocated.
    #[error("screen {0} is not allocated")]
    NotAllocated(ScreenNo),
    /// The value does not name a four-digit screen.
    #[error("invalid screen number: {0:?}")]
    InvalidScreen(String),
}

// =============================================================================
// Screen Pool
// =============================================================================

#[derive(Debug, Default)]
struct PoolState {
    cursor: u16,
    next_generation: u64,
    live: HashMap<u16, u64>,
    quarantine: VecDeque<(u16, Instant)>,
    quarantined: HashSet<u16>,
}

/// Bounded allocator for screen numbers.
///
/// A single lock protects the whole namespace; allocate and release are
/// O(1) amortized.
///
/// # Example
///
/// ```rust
/// use kiwoom_gateway::domain::screen::{ScreenPool, ScreenPoolConfig};
///
/// let pool = ScreenPool::new(ScreenPoolConfig::default());
/// let lease = pool.allocate().unwrap();
/// pool.release(lease.screen).unwrap();
/// ```
#[derive(Debug)]
pub struct ScreenPool {
    config: ScreenPoolConfig,
    state: Mutex<PoolState>,
}

impl ScreenPool {
    /// Create a pool over the configured range.
    #[must_use]
    pub fn new(config: ScreenPoolConfig) -> Self {
        let cursor = config.first;
        Self {
            config,
            state: Mutex::new(PoolState {
                cursor,
                ..PoolState::default()
            }),
        }
    }

    /// Allocate an unused screen number.
    pub fn allocate(&self) -> Result<ScreenLease, ScreenPoolError> {
        self.allocate_at(Instant::now())
    }

    /// Clock-injected variant of [`Self::allocate`].
    pub fn allocate_at(&self, now: Instant) -> Result<ScreenLease, ScreenPoolError> {
        let mut state = self.state.lock();
        Self::drain_quarantine(&mut state, now, self.config.quarantine);

        let span = usize::from(self.config.last.saturating_sub(self.config.first)) + 1;
        if self.config.first > self.config.last {
            return Err(ScreenPoolError::Exhausted);
        }

        let mut candidate = state.cursor;
        for _ in 0..span {
            if candidate < self.config.first || candidate > self.config.last {
                candidate = self.config.first;
            }

            let free = !state.live.contains_key(&candidate)
                && !state.quarantined.contains(&candidate)
                && !self.is_reserved(candidate);

            if free {
                state.cursor = if candidate == self.config.last {
                    self.config.first
                } else {
                    candidate + 1
                };
                state.next_generation += 1;
                let generation = state.next_generation;
                state.live.insert(candidate, generation);

                // Allocatable values are always <= ScreenNo::MAX by config.
                let screen = ScreenNo(candidate);
                return Ok(ScreenLease { screen, generation });
            }

            candidate = if candidate == self.config.last {
                self.config.first
            } else {
                candidate + 1
            };
        }

        Err(ScreenPoolError::Exhausted)
    }

    /// Release a live screen into quarantine.
    ///
    /// The caller (the gateway facade) is responsible for confirming no
    /// pending request or realtime registration still references the
    /// screen before releasing it.
    pub fn release(&self, screen: ScreenNo) -> Result<(), ScreenPoolError> {
        self.release_at(screen, Instant::now())
    }

    /// Clock-injected variant of [`Self::release`].
    pub fn release_at(&self, screen: ScreenNo, now: Instant) -> Result<(), ScreenPoolError> {
        let mut state = self.state.lock();
        if state.live.remove(&screen.0).is_none() {
            return Err(ScreenPoolError::NotAllocated(screen));
        }
        state.quarantine.push_back((screen.0, now));
        state.quarantined.insert(screen.0);
        Ok(())
    }

    /// Whether the screen is currently allocated.
    #[must_use]
    pub fn is_live(&self, screen: ScreenNo) -> bool {
        self.state.lock().live.contains_key(&screen.0)
    }

    /// Number of live allocations.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of screens waiting out their quarantine window.
    #[must_use]
    pub fn quarantined_count(&self) -> usize {
        self.state.lock().quarantined.len()
    }

    fn is_reserved(&self, value: u16) -> bool {
        self.config.reserved.iter().any(|r| r.contains(&value))
    }

    fn drain_quarantine(state: &mut PoolState, now: Instant, window: Duration) {
        while let Some(&(value, released_at)) = state.quarantine.front() {
            if now.duration_since(released_at) < window {
                break;
            }
            state.quarantine.pop_front();
            state.quarantined.remove(&value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn small_pool(quarantine: Duration) -> ScreenPool {
        ScreenPool::new(ScreenPoolConfig {
            first: 100,
            last: 104,
            reserved: Vec::new(),
            quarantine,
        })
    }

    #[test]
    fn screen_no_formats_four_digits() {
        let screen = ScreenNo::new(101).unwrap();
        assert_eq!(screen.to_string(), "0101");
        assert_eq!("0101".parse::<ScreenNo>().unwrap(), screen);
    }

    #[test]
    fn screen_no_rejects_out_of_range() {
        assert!(ScreenNo::new(10_000).is_none());
        assert!("10000".parse::<ScreenNo>().is_err());
        assert!("abcd".parse::<ScreenNo>().is_err());
    }

    #[test]
    fn allocation_is_monotonic() {
        let pool = small_pool(Duration::ZERO);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(a.screen.value(), 100);
        assert_eq!(b.screen.value(), 101);
        assert!(b.generation > a.generation);
    }

    #[test]
    fn exhaustion_is_a_hard_ceiling() {
        let pool = small_pool(Duration::ZERO);
        for _ in 0..5 {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.allocate().unwrap_err(), ScreenPoolError::Exhausted);
    }

    #[test]
    fn release_requires_live_screen() {
        let pool = small_pool(Duration::ZERO);
        let screen = ScreenNo::new(100).unwrap();
        assert_eq!(
            pool.release(screen).unwrap_err(),
            ScreenPoolError::NotAllocated(screen)
        );
    }

    #[test]
    fn released_screen_stays_quarantined_for_the_window() {
        let pool = small_pool(Duration::from_secs(30));
        let t0 = Instant::now();

        // Use up the whole range, then release one screen.
        let leases: Vec<_> = (0..5).map(|_| pool.allocate_at(t0).unwrap()).collect();
        pool.release_at(leases[0].screen, t0).unwrap();

        // Inside the window the released screen is not allocatable.
        let before = t0 + Duration::from_secs(29);
        assert_eq!(
            pool.allocate_at(before).unwrap_err(),
            ScreenPoolError::Exhausted
        );

        // After the window it comes back with a fresh generation.
        let after = t0 + Duration::from_secs(30);
        let recycled = pool.allocate_at(after).unwrap();
        assert_eq!(recycled.screen, leases[0].screen);
        assert!(recycled.generation > leases[4].generation);
    }

    #[test]
    fn wraparound_prefers_least_recently_used() {
        let pool = small_pool(Duration::ZERO);
        let t0 = Instant::now();
        let first = pool.allocate_at(t0).unwrap();
        pool.release_at(first.screen, t0).unwrap();

        // Even with 0100 free again, allocation continues from the cursor.
        let next = pool.allocate_at(t0).unwrap();
        assert_eq!(next.screen.value(), 101);
    }

    #[test]
    fn reserved_ranges_are_skipped() {
        let pool = ScreenPool::new(ScreenPoolConfig {
            first: 100,
            last: 105,
            reserved: vec![101..=103],
            quarantine: Duration::ZERO,
        });
        let screens: Vec<u16> = (0..3)
            .map(|_| pool.allocate().unwrap().screen.value())
            .collect();
        assert_eq!(screens, vec![100, 104, 105]);
        assert_eq!(pool.allocate().unwrap_err(), ScreenPoolError::Exhausted);
    }

    proptest! {
        /// No two concurrently-held leases ever share a screen, and a
        /// released screen is never reallocated before its quarantine
        /// window elapses.
        #[test]
        fn held_screens_are_unique_and_quarantine_holds(ops in proptest::collection::vec(any::<(bool, u8)>(), 1..200)) {
            let quarantine = Duration::from_secs(10);
            let pool = ScreenPool::new(ScreenPoolConfig {
                first: 100,
                last: 115,
                reserved: Vec::new(),
                quarantine,
            });

            let t0 = Instant::now();
            let mut clock = t0;
            let mut held: Vec<ScreenLease> = Vec::new();
            let mut released_at: HashMap<u16, Instant> = HashMap::new();

            for (release, advance) in ops {
                clock += Duration::from_secs(u64::from(advance % 4));

                if release && !held.is_empty() {
                    let lease = held.swap_remove(0);
                    pool.release_at(lease.screen, clock).unwrap();
                    released_at.insert(lease.screen.value(), clock);
                } else if let Ok(lease) = pool.allocate_at(clock) {
                    prop_assert!(
                        held.iter().all(|h| h.screen != lease.screen),
                        "screen {} handed out twice", lease.screen
                    );
                    if let Some(freed) = released_at.get(&lease.screen.value()) {
                        prop_assert!(
                            clock.duration_since(*freed) >= quarantine,
                            "screen {} reallocated during quarantine", lease.screen
                        );
                    }
                    held.push(lease);
                }
            }
        }
    }
}
