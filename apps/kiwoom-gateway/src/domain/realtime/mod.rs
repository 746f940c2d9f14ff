//! Realtime Registration Tracking
//!
//! Tracks which screens registered which instrument codes and FIDs for
//! realtime delivery. Registrations live independently of the query
//! lifecycle: a screen may host zero-or-more registrations while also
//! owning (or not owning) a pending query.
//!
//! # Design
//!
//! Realtime pushes arrive without a screen tag (only the instrument code),
//! so the registry maintains a reverse index from code to screens for O(1)
//! fan-out. Registration caps mirror the broker's hard limits (100 codes
//! and 100 FIDs per registration call); realtime condition searches draw
//! from their own pool of at most 10 screens system-wide.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;

use crate::domain::condition::ConditionId;
use crate::domain::screen::ScreenNo;
use crate::error::GatewayError;

// =============================================================================
// Modes and Targets
// =============================================================================

/// How a registration call combines with existing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMode {
    /// Discard any prior registration on the screen first.
    ReplaceAll,
    /// Union with the screen's existing registration.
    Append,
}

impl RegMode {
    /// The broker's registration-type marker ("0" replace, "1" add).
    #[must_use]
    pub const fn as_opt_type(self) -> &'static str {
        match self {
            Self::ReplaceAll => "0",
            Self::Append => "1",
        }
    }
}

/// What an unregister call removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    /// One instrument code.
    Code(String),
    /// Every code on the screen.
    All,
}

// =============================================================================
// Caps
// =============================================================================

/// Broker-imposed registration limits.
#[derive(Debug, Clone, Copy)]
pub struct RealtimeCaps {
    /// Maximum instrument codes per screen.
    pub max_codes_per_screen: usize,
    /// Maximum FIDs per screen.
    pub max_fids_per_screen: usize,
    /// Maximum screens hosting realtime condition searches, system-wide.
    pub max_condition_screens: usize,
}

impl Default for RealtimeCaps {
    fn default() -> Self {
        Self {
            max_codes_per_screen: 100,
            max_fids_per_screen: 100,
            max_condition_screens: 10,
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Registration state of one screen, as captured for rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegSnapshot {
    /// Registered instrument codes.
    pub codes: HashSet<String>,
    /// Registered FIDs.
    pub fids: BTreeSet<u32>,
}

#[derive(Debug, Default)]
struct RegistryState {
    screens: HashMap<ScreenNo, RegSnapshot>,
    code_index: HashMap<String, HashSet<ScreenNo>>,
    conditions: HashMap<ScreenNo, HashSet<ConditionId>>,
}

impl RegistryState {
    fn unindex_screen(&mut self, screen: ScreenNo, codes: &HashSet<String>) {
        for code in codes {
            if let Some(screens) = self.code_index.get_mut(code) {
                screens.remove(&screen);
                if screens.is_empty() {
                    self.code_index.remove(code);
                }
            }
        }
    }

    fn index_screen(&mut self, screen: ScreenNo, codes: &HashSet<String>) {
        for code in codes {
            self.code_index.entry(code.clone()).or_default().insert(screen);
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    /// Screens with at least one code registration.
    pub screens: usize,
    /// Unique instrument codes registered anywhere.
    pub codes: usize,
    /// Screens hosting realtime condition searches.
    pub condition_screens: usize,
    /// Active realtime condition searches.
    pub conditions: usize,
}

// =============================================================================
// Realtime Registry
// =============================================================================

/// Thread-safe registration table with reverse-index fan-out.
///
/// # Example
///
/// ```rust
/// use kiwoom_gateway::domain::realtime::{RealtimeCaps, RealtimeRegistry, RegMode};
/// use kiwoom_gateway::domain::screen::ScreenNo;
///
/// let registry = RealtimeRegistry::new(RealtimeCaps::default());
/// let screen = ScreenNo::new(102).unwrap();
/// registry
///     .register(screen, &["005930".into()], &[10, 13], RegMode::ReplaceAll)
///     .unwrap();
/// assert_eq!(registry.screens_for("005930"), vec![screen]);
/// ```
#[derive(Debug)]
pub struct RealtimeRegistry {
    caps: RealtimeCaps,
    state: Mutex<RegistryState>,
}

impl RealtimeRegistry {
    /// Create a registry with the given caps.
    #[must_use]
    pub fn new(caps: RealtimeCaps) -> Self {
        Self {
            caps,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Install or extend a screen's registration.
    ///
    /// Returns the screen's previous state for rollback (None if the screen
    /// had no registration). Fails with [`GatewayError::CapacityExceeded`]
    /// without mutating anything if the resulting set would exceed a cap.
    pub fn register(
        &self,
        screen: ScreenNo,
        codes: &[String],
        fids: &[u32],
        mode: RegMode,
    ) -> Result<Option<RegSnapshot>, GatewayError> {
        let mut state = self.state.lock();
        let previous = state.screens.get(&screen).cloned();

        let mut next = match (mode, &previous) {
            (RegMode::Append, Some(existing)) => existing.clone(),
            _ => RegSnapshot::default(),
        };
        next.codes.extend(codes.iter().cloned());
        next.fids.extend(fids.iter().copied());

        if next.codes.len() > self.caps.max_codes_per_screen {
            return Err(GatewayError::CapacityExceeded {
                what: "instrument codes per screen",
                limit: self.caps.max_codes_per_screen,
            });
        }
        if next.fids.len() > self.caps.max_fids_per_screen {
            return Err(GatewayError::CapacityExceeded {
                what: "FIDs per screen",
                limit: self.caps.max_fids_per_screen,
            });
        }

        if let Some(prior) = &previous {
            let codes = prior.codes.clone();
            state.unindex_screen(screen, &codes);
        }
        let new_codes = next.codes.clone();
        state.index_screen(screen, &new_codes);
        state.screens.insert(screen, next);
        Ok(previous)
    }

    /// Put a screen back to a previously captured state (rollback after a
    /// synchronous broker rejection).
    pub fn restore(&self, screen: ScreenNo, previous: Option<RegSnapshot>) {
        let mut state = self.state.lock();
        if let Some(current) = state.screens.remove(&screen) {
            state.unindex_screen(screen, &current.codes);
        }
        if let Some(snapshot) = previous {
            state.index_screen(screen, &snapshot.codes);
            state.screens.insert(screen, snapshot);
        }
    }

    /// Remove one code or every code from a screen.
    ///
    /// Returns the codes actually removed. A screen whose last code is
    /// removed drops out of the registry entirely.
    pub fn unregister(&self, screen: ScreenNo, target: &RemoveTarget) -> Vec<String> {
        let mut state = self.state.lock();
        let Some(entry) = state.screens.get_mut(&screen) else {
            return Vec::new();
        };

        let removed: Vec<String> = match target {
            RemoveTarget::All => entry.codes.drain().collect(),
            RemoveTarget::Code(code) => {
                if entry.codes.remove(code) {
                    vec![code.clone()]
                } else {
                    Vec::new()
                }
            }
        };

        if entry.codes.is_empty() {
            state.screens.remove(&screen);
        }
        let removed_set: HashSet<String> = removed.iter().cloned().collect();
        state.unindex_screen(screen, &removed_set);
        removed
    }

    /// Global teardown: remove every code registration on every screen.
    ///
    /// A privileged, rarely-used operation: explicit in the API, never
    /// implied by anything else. Condition registrations are untouched
    /// (they are stopped individually).
    pub fn unregister_all(&self) -> usize {
        let mut state = self.state.lock();
        let screens = state.screens.len();
        state.screens.clear();
        state.code_index.clear();
        screens
    }

    /// Screens registered for an instrument code, for event fan-out.
    ///
    /// Sorted for deterministic delivery order.
    #[must_use]
    pub fn screens_for(&self, code: &str) -> Vec<ScreenNo> {
        let state = self.state.lock();
        let mut screens: Vec<ScreenNo> = state
            .code_index
            .get(code)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        screens.sort_unstable();
        screens
    }

    /// Whether the screen has any code or condition registration.
    #[must_use]
    pub fn has_registrations(&self, screen: ScreenNo) -> bool {
        let state = self.state.lock();
        state.screens.contains_key(&screen) || state.conditions.contains_key(&screen)
    }

    /// The screen's registered FIDs, if any.
    #[must_use]
    pub fn fids_for(&self, screen: ScreenNo) -> Option<BTreeSet<u32>> {
        self.state.lock().screens.get(&screen).map(|e| e.fids.clone())
    }

    // =========================================================================
    // Condition Pool
    // =========================================================================

    /// Occupy a condition-pool slot for a realtime condition search.
    ///
    /// Idempotent for an already-registered (screen, condition) pair. Fails
    /// with [`GatewayError::CapacityExceeded`] when a new screen would push
    /// the pool past its system-wide cap.
    pub fn register_condition(
        &self,
        screen: ScreenNo,
        condition: &ConditionId,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if !state.conditions.contains_key(&screen)
            && state.conditions.len() >= self.caps.max_condition_screens
        {
            return Err(GatewayError::CapacityExceeded {
                what: "realtime condition screens",
                limit: self.caps.max_condition_screens,
            });
        }
        state
            .conditions
            .entry(screen)
            .or_default()
            .insert(condition.clone());
        Ok(())
    }

    /// Release a condition-pool slot. Returns whether it was registered.
    pub fn unregister_condition(&self, screen: ScreenNo, condition: &ConditionId) -> bool {
        let mut state = self.state.lock();
        let Some(set) = state.conditions.get_mut(&screen) else {
            return false;
        };
        let removed = set.remove(condition);
        if set.is_empty() {
            state.conditions.remove(&screen);
        }
        removed
    }

    /// Conditions running on a screen, for screen teardown.
    #[must_use]
    pub fn conditions_for(&self, screen: ScreenNo) -> Vec<ConditionId> {
        self.state
            .lock()
            .conditions
            .get(&screen)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Screens running a realtime search for the condition, sorted.
    #[must_use]
    pub fn screens_for_condition(&self, condition: &ConditionId) -> Vec<ScreenNo> {
        let state = self.state.lock();
        let mut screens: Vec<ScreenNo> = state
            .conditions
            .iter()
            .filter(|(_, set)| set.contains(condition))
            .map(|(screen, _)| *screen)
            .collect();
        screens.sort_unstable();
        screens
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            screens: state.screens.len(),
            codes: state.code_index.len(),
            condition_screens: state.conditions.len(),
            conditions: state.conditions.values().map(HashSet::len).sum(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(value: u16) -> ScreenNo {
        ScreenNo::new(value).unwrap()
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn registry() -> RealtimeRegistry {
        RealtimeRegistry::new(RealtimeCaps::default())
    }

    #[test]
    fn replace_all_discards_prior_state() {
        let r = registry();
        r.register(screen(102), &codes(&["005930", "000660"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register(screen(102), &codes(&["035720"]), &[10, 13], RegMode::ReplaceAll)
            .unwrap();

        assert!(r.screens_for("005930").is_empty());
        assert!(r.screens_for("000660").is_empty());
        assert_eq!(r.screens_for("035720"), vec![screen(102)]);
    }

    #[test]
    fn append_unions_with_existing_state() {
        let r = registry();
        r.register(screen(102), &codes(&["005930"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register(screen(102), &codes(&["000660"]), &[13], RegMode::Append)
            .unwrap();

        assert_eq!(r.screens_for("005930"), vec![screen(102)]);
        assert_eq!(r.screens_for("000660"), vec![screen(102)]);
        assert_eq!(
            r.fids_for(screen(102)),
            Some([10u32, 13].into_iter().collect())
        );
    }

    #[test]
    fn append_without_prior_state_equals_replace_all() {
        let via_append = registry();
        via_append
            .register(screen(102), &codes(&["005930", "000660"]), &[10], RegMode::Append)
            .unwrap();

        let via_replace = registry();
        via_replace
            .register(
                screen(102),
                &codes(&["005930", "000660"]),
                &[10],
                RegMode::ReplaceAll,
            )
            .unwrap();

        assert_eq!(
            via_append.screens_for("005930"),
            via_replace.screens_for("005930")
        );
        assert_eq!(
            via_append.fids_for(screen(102)),
            via_replace.fids_for(screen(102))
        );
    }

    #[test]
    fn code_cap_is_enforced_without_mutation() {
        let r = RealtimeRegistry::new(RealtimeCaps {
            max_codes_per_screen: 2,
            ..RealtimeCaps::default()
        });
        r.register(screen(102), &codes(&["A", "B"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        let err = r
            .register(screen(102), &codes(&["C"]), &[], RegMode::Append)
            .unwrap_err();
        assert!(matches!(err, GatewayError::CapacityExceeded { limit: 2, .. }));

        // Nothing changed.
        assert_eq!(r.screens_for("A"), vec![screen(102)]);
        assert!(r.screens_for("C").is_empty());
    }

    #[test]
    fn fid_cap_is_enforced() {
        let r = RealtimeRegistry::new(RealtimeCaps {
            max_fids_per_screen: 3,
            ..RealtimeCaps::default()
        });
        let err = r
            .register(screen(102), &codes(&["A"]), &[1, 2, 3, 4], RegMode::ReplaceAll)
            .unwrap_err();
        assert!(matches!(err, GatewayError::CapacityExceeded { limit: 3, .. }));
    }

    #[test]
    fn fan_out_covers_every_registered_screen() {
        let r = registry();
        r.register(screen(102), &codes(&["005930"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register(screen(103), &codes(&["005930", "000660"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        assert_eq!(r.screens_for("005930"), vec![screen(102), screen(103)]);
        assert_eq!(r.screens_for("000660"), vec![screen(103)]);
        assert!(r.screens_for("999999").is_empty());
    }

    #[test]
    fn unregister_single_code_keeps_the_rest() {
        let r = registry();
        r.register(screen(102), &codes(&["005930", "000660"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        let removed = r.unregister(screen(102), &RemoveTarget::Code("005930".into()));
        assert_eq!(removed, vec!["005930".to_string()]);
        assert!(r.screens_for("005930").is_empty());
        assert_eq!(r.screens_for("000660"), vec![screen(102)]);
    }

    #[test]
    fn unregister_all_codes_clears_the_screen() {
        let r = registry();
        r.register(screen(102), &codes(&["005930", "000660"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        let mut removed = r.unregister(screen(102), &RemoveTarget::All);
        removed.sort();
        assert_eq!(removed, vec!["000660".to_string(), "005930".to_string()]);
        assert!(!r.has_registrations(screen(102)));
    }

    #[test]
    fn unregister_unknown_screen_is_a_no_op() {
        let r = registry();
        assert!(r.unregister(screen(200), &RemoveTarget::All).is_empty());
    }

    #[test]
    fn global_teardown_clears_every_screen() {
        let r = registry();
        r.register(screen(102), &codes(&["A"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register(screen(103), &codes(&["B"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        assert_eq!(r.unregister_all(), 2);
        assert!(r.screens_for("A").is_empty());
        assert!(r.screens_for("B").is_empty());
        assert_eq!(r.stats().screens, 0);
    }

    #[test]
    fn restore_rolls_back_to_the_previous_snapshot() {
        let r = registry();
        r.register(screen(102), &codes(&["005930"]), &[10], RegMode::ReplaceAll)
            .unwrap();

        let previous = r
            .register(screen(102), &codes(&["000660"]), &[13], RegMode::ReplaceAll)
            .unwrap();
        r.restore(screen(102), previous);

        assert_eq!(r.screens_for("005930"), vec![screen(102)]);
        assert!(r.screens_for("000660").is_empty());
    }

    #[test]
    fn restore_to_none_removes_the_screen() {
        let r = registry();
        let previous = r
            .register(screen(102), &codes(&["005930"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        assert!(previous.is_none());

        r.restore(screen(102), previous);
        assert!(!r.has_registrations(screen(102)));
        assert!(r.screens_for("005930").is_empty());
    }

    #[test]
    fn condition_pool_caps_distinct_screens() {
        let r = RealtimeRegistry::new(RealtimeCaps {
            max_condition_screens: 2,
            ..RealtimeCaps::default()
        });
        let cond = ConditionId::new("gap up", 0);

        r.register_condition(screen(110), &cond).unwrap();
        r.register_condition(screen(111), &cond).unwrap();
        // Another condition on an occupied screen is fine.
        r.register_condition(screen(110), &ConditionId::new("volume", 1))
            .unwrap();

        let err = r.register_condition(screen(112), &cond).unwrap_err();
        assert!(matches!(err, GatewayError::CapacityExceeded { limit: 2, .. }));
    }

    #[test]
    fn condition_registration_is_idempotent() {
        let r = registry();
        let cond = ConditionId::new("gap up", 0);
        r.register_condition(screen(110), &cond).unwrap();
        r.register_condition(screen(110), &cond).unwrap();
        assert_eq!(r.stats().conditions, 1);
    }

    #[test]
    fn condition_unregister_releases_the_slot() {
        let r = RealtimeRegistry::new(RealtimeCaps {
            max_condition_screens: 1,
            ..RealtimeCaps::default()
        });
        let cond = ConditionId::new("gap up", 0);
        r.register_condition(screen(110), &cond).unwrap();
        assert!(r.unregister_condition(screen(110), &cond));
        assert!(!r.unregister_condition(screen(110), &cond));

        // Slot is free again.
        r.register_condition(screen(111), &cond).unwrap();
        assert_eq!(r.screens_for_condition(&cond), vec![screen(111)]);
    }

    #[test]
    fn stats_reflect_registrations() {
        let r = registry();
        r.register(screen(102), &codes(&["A", "B"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register(screen(103), &codes(&["B"]), &[10], RegMode::ReplaceAll)
            .unwrap();
        r.register_condition(screen(110), &ConditionId::new("gap up", 0))
            .unwrap();

        let stats = r.stats();
        assert_eq!(stats.screens, 2);
        assert_eq!(stats.codes, 2);
        assert_eq!(stats.condition_screens, 1);
        assert_eq!(stats.conditions, 1);
    }
}
