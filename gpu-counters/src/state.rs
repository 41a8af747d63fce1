//! Group set lifecycle tracking shared by every backend
//!
//! Each pass moves Created -> Enabled <-> Disabled -> Destroyed. Backends
//! call the `check_*` method before touching the driver and the matching
//! `commit_*` method only after the driver reported success, so a failed
//! driver call leaves the tracked state untouched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cupti::bindings::CUPTI_ERROR_UNKNOWN;
use crate::error::{CounterError, Result};
use crate::types::{EventGroup, EventGroupSet, EventGroupSets, EventId};

/// Distinguishes interface instances so foreign handles can be rejected.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Created,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GroupEntry {
    pub pass: u64,
    pub per_instance_requested: bool,
    /// Applied at enable time; decides the readout width
    pub per_instance_active: bool,
}

#[derive(Debug)]
pub(crate) struct GroupSetTracker {
    owner: u64,
    next_pass: u64,
    passes: HashMap<u64, PassState>,
    groups: HashMap<EventGroup, GroupEntry>,
}

impl GroupSetTracker {
    pub fn new() -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            next_pass: 0,
            passes: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Record freshly created passes. Each entry is the driver's raw pass
    /// pointer and the raw group handles it contains.
    pub fn register(&mut self, raw: usize, passes: Vec<(usize, Vec<usize>)>) -> EventGroupSets {
        let owner = self.owner;
        let sets = passes
            .into_iter()
            .map(|(raw_pass, raw_groups)| {
                let key = self.next_pass;
                self.next_pass += 1;
                self.passes.insert(key, PassState::Created);

                let groups: Vec<EventGroup> = raw_groups
                    .into_iter()
                    .map(|g| EventGroup::new(owner, key, g))
                    .collect();
                for group in &groups {
                    self.groups.insert(
                        *group,
                        GroupEntry {
                            pass: key,
                            per_instance_requested: false,
                            per_instance_active: false,
                        },
                    );
                }
                EventGroupSet::new(owner, key, raw_pass, groups)
            })
            .collect();

        EventGroupSets::new(owner, raw, sets)
    }

    pub fn state(&self, set: &EventGroupSet) -> Option<PassState> {
        if set.owner() != self.owner {
            return None;
        }
        self.passes.get(&set.key()).copied()
    }

    fn pass_state(&self, set: &EventGroupSet, op: &'static str) -> Result<PassState> {
        if set.owner() != self.owner {
            return Err(CounterError::invalid(
                op,
                format!("{set} belongs to another interface"),
            ));
        }
        self.passes
            .get(&set.key())
            .copied()
            .ok_or_else(|| CounterError::invalid(op, format!("{set} was destroyed")))
    }

    pub fn check_enable(&self, set: &EventGroupSet, op: &'static str) -> Result<()> {
        match self.pass_state(set, op)? {
            PassState::Created | PassState::Disabled => Ok(()),
            PassState::Enabled => Err(CounterError::invalid(
                op,
                format!("{set} is already enabled"),
            )),
        }
    }

    pub fn commit_enable(&mut self, set: &EventGroupSet) {
        self.passes.insert(set.key(), PassState::Enabled);
        for group in set.groups() {
            if let Some(entry) = self.groups.get_mut(group) {
                entry.per_instance_active = entry.per_instance_requested;
            }
        }
    }

    pub fn check_disable(&self, set: &EventGroupSet, op: &'static str) -> Result<()> {
        match self.pass_state(set, op)? {
            PassState::Enabled => Ok(()),
            state => Err(CounterError::invalid(
                op,
                format!("{set} is not enabled (state {state:?})"),
            )),
        }
    }

    pub fn commit_disable(&mut self, set: &EventGroupSet) {
        self.passes.insert(set.key(), PassState::Disabled);
    }

    pub fn check_destroy(&self, sets: &EventGroupSets, op: &'static str) -> Result<()> {
        if sets.is_released() {
            return Err(CounterError::invalid(op, "group sets were already destroyed"));
        }
        if sets.owner() != self.owner {
            return Err(CounterError::invalid(
                op,
                "group sets belong to another interface",
            ));
        }
        for set in sets.sets() {
            if self.pass_state(set, op)? == PassState::Enabled {
                return Err(CounterError::invalid(
                    op,
                    format!("{set} is still enabled; disable it first"),
                ));
            }
        }
        Ok(())
    }

    pub fn commit_destroy(&mut self, sets: &mut EventGroupSets) {
        for set in sets.sets() {
            self.passes.remove(&set.key());
            for group in set.groups() {
                self.groups.remove(group);
            }
        }
        sets.mark_released();
    }

    /// Look up a live group
    pub fn group(&self, group: EventGroup, op: &'static str) -> Result<GroupEntry> {
        if group.owner() != self.owner {
            return Err(CounterError::invalid(
                op,
                format!("{group} belongs to another interface"),
            ));
        }
        self.groups
            .get(&group)
            .copied()
            .ok_or_else(|| CounterError::invalid(op, format!("{group} is unknown or destroyed")))
    }

    pub fn request_per_instance(&mut self, group: EventGroup) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.per_instance_requested = true;
        }
    }

    /// A group may only be read while its pass is enabled
    pub fn check_readable(&self, group: EventGroup, op: &'static str) -> Result<GroupEntry> {
        let entry = self.group(group, op)?;
        match self.passes.get(&entry.pass) {
            Some(PassState::Enabled) => Ok(entry),
            state => Err(CounterError::invalid(
                op,
                format!("{group} is not in an enabled group set (state {state:?})"),
            )),
        }
    }
}

/// Reject empty or duplicated event lists before asking the driver
pub(crate) fn validate_event_list(ids: &[EventId], op: &'static str) -> Result<()> {
    if ids.is_empty() {
        return Err(CounterError::invalid(op, "event list is empty"));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(CounterError::invalid(op, format!("{id} requested twice")));
        }
    }
    Ok(())
}

/// Every requested event must have been placed exactly once
pub(crate) fn verify_coverage(
    requested: &[EventId],
    placed: &[EventId],
    op: &'static str,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(placed.len());
    for id in placed {
        if !seen.insert(*id) {
            return Err(CounterError::DriverFault {
                op,
                code: CUPTI_ERROR_UNKNOWN,
                detail: format!("{id} placed in more than one group"),
            });
        }
    }
    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !seen.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CounterError::ResourceExhausted {
            op,
            detail: format!("driver could not schedule {}", missing.join(", ")),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn one_pass(tracker: &mut GroupSetTracker) -> EventGroupSets {
        tracker.register(0, vec![(0, vec![0x10, 0x20])])
    }

    #[test]
    fn test_state_transitions() {
        let mut tracker = GroupSetTracker::new();
        let mut sets = one_pass(&mut tracker);
        let set = &sets.sets()[0];

        assert_eq!(tracker.state(set), Some(PassState::Created));
        assert!(tracker.check_disable(set, "t").is_err());

        tracker.check_enable(set, "t").unwrap();
        tracker.commit_enable(set);
        assert_eq!(tracker.state(set), Some(PassState::Enabled));
        assert!(tracker.check_enable(set, "t").is_err());
        assert!(tracker.check_destroy(&sets, "t").is_err());

        tracker.check_disable(set, "t").unwrap();
        tracker.commit_disable(set);
        tracker.check_destroy(&sets, "t").unwrap();
        tracker.commit_destroy(&mut sets);

        assert!(sets.is_released());
        assert!(tracker.check_destroy(&sets, "t").is_err());
    }

    #[test]
    fn test_per_instance_applies_on_enable() {
        let mut tracker = GroupSetTracker::new();
        let mut sets = one_pass(&mut tracker);
        let group = sets.sets()[0].groups()[0];

        tracker.request_per_instance(group);
        assert!(!tracker.group(group, "t").unwrap().per_instance_active);

        tracker.commit_enable(&sets.sets()[0]);
        assert!(tracker.check_readable(group, "t").unwrap().per_instance_active);

        tracker.commit_disable(&sets.sets()[0]);
        tracker.commit_destroy(&mut sets);
    }

    #[test]
    fn test_reused_raw_group_does_not_revive_stale_handle() {
        let mut tracker = GroupSetTracker::new();
        let mut first = tracker.register(0xa000, vec![(0xb000, vec![0x10])]);
        let stale = first.sets()[0].groups()[0];
        tracker.commit_destroy(&mut first);

        let mut second = tracker.register(0xa000, vec![(0xb000, vec![0x10])]);
        let fresh = second.sets()[0].groups()[0];
        assert_ne!(stale, fresh);

        let err = tracker.group(stale, "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(tracker.group(fresh, "t").is_ok());

        tracker.commit_enable(&second.sets()[0]);
        assert!(tracker.check_readable(stale, "t").is_err());
        assert!(tracker.check_readable(fresh, "t").is_ok());

        tracker.commit_disable(&second.sets()[0]);
        tracker.commit_destroy(&mut second);
    }

    #[test]
    fn test_foreign_handles_rejected() {
        let mut a = GroupSetTracker::new();
        let b = GroupSetTracker::new();
        let mut sets = one_pass(&mut a);

        let err = b.check_enable(&sets.sets()[0], "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(b.group(sets.sets()[0].groups()[0], "t").is_err());
        assert!(b.check_destroy(&sets, "t").is_err());

        a.commit_destroy(&mut sets);
    }

    #[test]
    fn test_event_list_validation() {
        assert!(validate_event_list(&[], "t").is_err());
        assert!(validate_event_list(&[EventId(1), EventId(1)], "t").is_err());
        assert!(validate_event_list(&[EventId(1), EventId(2)], "t").is_ok());
    }

    #[test]
    fn test_coverage() {
        let requested = [EventId(1), EventId(2)];
        assert!(verify_coverage(&requested, &[EventId(2), EventId(1)], "t").is_ok());

        let err = verify_coverage(&requested, &[EventId(1)], "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

        let err = verify_coverage(&requested, &[EventId(1), EventId(2), EventId(1)], "t")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DriverFault);
    }
}
