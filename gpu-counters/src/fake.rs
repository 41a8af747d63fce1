//! In-memory counter backend for tests
//!
//! [`FakeEventCounters`] models a device with a named event catalog, counter
//! domains with a fixed instance count, and limited counters per group. It
//! records every call, returns scripted counter values, and can be told to
//! fail the next call of a given operation with a driver status code.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::cupti::bindings::*;
use crate::error::{ops, CounterError, Result};
use crate::state::{validate_event_list, verify_coverage, GroupSetTracker, PassState};
use crate::types::{DeviceId, EventGroup, EventGroupSet, EventGroupSets, EventId};
use crate::EventCounters;

#[derive(Debug, Clone)]
struct FakeEvent {
    name: String,
    id: EventId,
    domain: u32,
}

/// Description of the device a [`FakeEventCounters`] pretends to be
#[derive(Debug, Clone)]
pub struct FakeDevice {
    device: DeviceId,
    supported: bool,
    counters_per_group: usize,
    groups_per_pass: usize,
    max_passes: usize,
    events: Vec<FakeEvent>,
    domain_instances: HashMap<u32, u32>,
    dropped: Vec<String>,
}

impl FakeDevice {
    /// A device with no events, 4 counters per group, 4 groups per pass and
    /// at most 8 passes.
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            supported: true,
            counters_per_group: 4,
            groups_per_pass: 4,
            max_passes: 8,
            events: Vec::new(),
            domain_instances: HashMap::new(),
            dropped: Vec::new(),
        }
    }

    /// Add an event counted in `domain`. Ids are assigned in insertion order.
    pub fn with_event(mut self, name: &str, domain: u32) -> Self {
        let id = EventId(0x1000 + self.events.len() as u32);
        self.events.push(FakeEvent {
            name: name.to_string(),
            id,
            domain,
        });
        self
    }

    /// Number of hardware instances feeding `domain` (default 1)
    pub fn with_domain_instances(mut self, domain: u32, instances: u32) -> Self {
        self.domain_instances.insert(domain, instances);
        self
    }

    pub fn with_counters_per_group(mut self, counters: usize) -> Self {
        self.counters_per_group = counters.max(1);
        self
    }

    pub fn with_groups_per_pass(mut self, groups: usize) -> Self {
        self.groups_per_pass = groups.max(1);
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    /// Accept `name` in group set requests but leave it out of every group,
    /// like a driver that silently fails to schedule an event.
    pub fn with_dropped_event(mut self, name: &str) -> Self {
        self.dropped.push(name.to_string());
        self
    }

    /// Make construction fail as if the context did not support event counting
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    fn event(&self, id: EventId) -> Option<&FakeEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    fn instances(&self, domain: u32) -> u32 {
        self.domain_instances.get(&domain).copied().unwrap_or(1)
    }
}

/// A call observed by [`FakeEventCounters`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateGroupSets(Vec<EventId>),
    DestroyGroupSets,
    SetContinuousMode,
    EnablePerInstance(EventGroup),
    InstanceCount(EventGroup),
    EnableGroupSet(Vec<EventGroup>),
    DisableGroupSet(Vec<EventGroup>),
    ReadEvent(EventGroup, EventId),
    EventsInGroup(EventGroup),
    EventId(String),
}

#[derive(Debug)]
struct FakeGroup {
    domain: u32,
    events: Vec<EventId>,
}

/// Scripted [`EventCounters`] implementation
#[derive(Debug)]
pub struct FakeEventCounters {
    device: FakeDevice,
    tracker: GroupSetTracker,
    continuous: bool,
    next_group: usize,
    /// Raw ids of destroyed groups, handed out again before fresh ones
    free_groups: Vec<usize>,
    groups: HashMap<EventGroup, FakeGroup>,
    values: HashMap<EventId, Vec<u64>>,
    failures: RefCell<HashMap<&'static str, CUptiResult>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeEventCounters {
    pub fn new(device: FakeDevice) -> Result<Self> {
        if !device.supported {
            return Err(CounterError::from_driver(
                ops::CONSTRUCT,
                CUPTI_ERROR_NOT_SUPPORTED,
                format!("{} does not support event counting", device.device),
            ));
        }
        debug!("fake event counters bound to {}", device.device);
        Ok(Self {
            device,
            tracker: GroupSetTracker::new(),
            continuous: false,
            next_group: 1,
            free_groups: Vec::new(),
            groups: HashMap::new(),
            values: HashMap::new(),
            failures: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
        })
    }

    /// Set the raw per-instance values of an event. Entries past the domain's
    /// instance count are ignored; missing entries read as zero.
    pub fn set_event_values(&mut self, id: EventId, values: Vec<u64>) {
        self.values.insert(id, values);
    }

    /// Make the next call of `op` fail with the given driver status
    pub fn fail_next(&mut self, op: &'static str, status: CUptiResult) {
        self.failures.get_mut().insert(op, status);
    }

    pub fn continuous_mode(&self) -> bool {
        self.continuous
    }

    pub fn pass_state(&self, set: &EventGroupSet) -> Option<PassState> {
        self.tracker.state(set)
    }

    /// Number of groups currently allocated
    pub fn live_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&mut self) {
        self.calls.get_mut().clear();
    }

    fn record(&self, call: Call) {
        trace!("fake call: {:?}", call);
        self.calls.borrow_mut().push(call);
    }

    fn injected(&self, op: &'static str) -> Result<()> {
        match self.failures.borrow_mut().remove(op) {
            Some(status) => Err(CounterError::from_driver(op, status, "injected failure")),
            None => Ok(()),
        }
    }

    fn allocate_group(&mut self) -> usize {
        match self.free_groups.pop() {
            Some(raw) => raw,
            None => {
                let raw = self.next_group;
                self.next_group += 1;
                raw
            }
        }
    }

    fn release(&mut self, sets: &mut EventGroupSets) {
        for group in sets.groups() {
            if self.groups.remove(&group).is_some() {
                self.free_groups.push(group.raw());
            }
        }
        self.tracker.commit_destroy(sets);
    }

    fn fake_group(&self, group: EventGroup, op: &'static str) -> Result<&FakeGroup> {
        self.tracker.group(group, op)?;
        self.groups
            .get(&group)
            .ok_or_else(|| CounterError::invalid(op, format!("{group} is unknown")))
    }

    /// Pack events into groups by domain, then groups into passes
    fn partition(&self, ids: &[EventId]) -> Result<Vec<Vec<(u32, Vec<EventId>)>>> {
        let op = ops::CREATE_GROUP_SETS;
        let mut by_domain: Vec<(u32, Vec<EventId>)> = Vec::new();
        for id in ids {
            let event = self.device.event(*id).ok_or_else(|| {
                CounterError::from_driver(
                    op,
                    CUPTI_ERROR_INVALID_EVENT_ID,
                    format!("{id} is not available on {}", self.device.device),
                )
            })?;
            if self.device.dropped.contains(&event.name) {
                continue;
            }
            match by_domain.iter_mut().find(|(d, _)| *d == event.domain) {
                Some((_, events)) => events.push(*id),
                None => by_domain.push((event.domain, vec![*id])),
            }
        }

        let groups: Vec<(u32, Vec<EventId>)> = by_domain
            .into_iter()
            .flat_map(|(domain, events)| {
                events
                    .chunks(self.device.counters_per_group)
                    .map(|chunk| (domain, chunk.to_vec()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let passes: Vec<Vec<(u32, Vec<EventId>)>> = groups
            .chunks(self.device.groups_per_pass)
            .map(|chunk| chunk.to_vec())
            .collect();

        if passes.len() > self.device.max_passes {
            return Err(CounterError::from_driver(
                op,
                CUPTI_ERROR_MAX_LIMIT_REACHED,
                format!(
                    "{} events need {} passes, device allows {}",
                    ids.len(),
                    passes.len(),
                    self.device.max_passes
                ),
            ));
        }
        Ok(passes)
    }
}

impl EventCounters for FakeEventCounters {
    fn device(&self) -> DeviceId {
        self.device.device
    }

    fn create_group_sets(&mut self, ids: &[EventId]) -> Result<EventGroupSets> {
        let op = ops::CREATE_GROUP_SETS;
        self.record(Call::CreateGroupSets(ids.to_vec()));
        validate_event_list(ids, op)?;
        self.injected(op)?;

        let passes = self.partition(ids)?;

        let mut layout = Vec::with_capacity(passes.len());
        let mut pending = Vec::new();
        for pass in passes {
            let mut raw_groups = Vec::with_capacity(pass.len());
            for (domain, events) in pass {
                raw_groups.push(self.allocate_group());
                pending.push(FakeGroup { domain, events });
            }
            layout.push((0, raw_groups));
        }

        let mut sets = self.tracker.register(0, layout);
        let handles: Vec<EventGroup> = sets.groups().collect();
        let mut placed = Vec::new();
        for (group, fake) in handles.into_iter().zip(pending) {
            placed.extend(fake.events.iter().copied());
            self.groups.insert(group, fake);
        }

        if let Err(e) = verify_coverage(ids, &placed, op) {
            self.release(&mut sets);
            return Err(e);
        }

        debug!(
            "created {} passes with {} groups for {} events",
            sets.pass_count(),
            sets.groups().count(),
            ids.len()
        );
        Ok(sets)
    }

    fn destroy_group_sets(&mut self, sets: &mut EventGroupSets) -> Result<()> {
        let op = ops::DESTROY_GROUP_SETS;
        self.record(Call::DestroyGroupSets);
        self.tracker.check_destroy(sets, op)?;
        self.injected(op)?;
        self.release(sets);
        Ok(())
    }

    fn set_continuous_mode(&mut self) -> Result<()> {
        self.record(Call::SetContinuousMode);
        self.injected(ops::SET_CONTINUOUS_MODE)?;
        self.continuous = true;
        Ok(())
    }

    fn enable_per_instance(&mut self, group: EventGroup) -> Result<()> {
        let op = ops::ENABLE_PER_INSTANCE;
        self.record(Call::EnablePerInstance(group));
        self.fake_group(group, op)?;
        self.injected(op)?;
        self.tracker.request_per_instance(group);
        Ok(())
    }

    fn instance_count(&self, group: EventGroup) -> Result<u32> {
        let op = ops::INSTANCE_COUNT;
        self.record(Call::InstanceCount(group));
        let domain = self.fake_group(group, op)?.domain;
        self.injected(op)?;
        Ok(self.device.instances(domain))
    }

    fn enable_group_set(&mut self, set: &EventGroupSet) -> Result<()> {
        let op = ops::ENABLE_GROUP_SET;
        self.record(Call::EnableGroupSet(set.groups().to_vec()));
        self.tracker.check_enable(set, op)?;
        self.injected(op)?;
        self.tracker.commit_enable(set);
        Ok(())
    }

    fn disable_group_set(&mut self, set: &EventGroupSet) -> Result<()> {
        let op = ops::DISABLE_GROUP_SET;
        self.record(Call::DisableGroupSet(set.groups().to_vec()));
        self.tracker.check_disable(set, op)?;
        self.injected(op)?;
        self.tracker.commit_disable(set);
        Ok(())
    }

    fn read_event(&self, group: EventGroup, id: EventId, values: &mut Vec<u64>) -> Result<()> {
        let op = ops::READ_EVENT;
        self.record(Call::ReadEvent(group, id));
        let entry = self.tracker.check_readable(group, op)?;
        let fake = self.fake_group(group, op)?;
        if !fake.events.contains(&id) {
            return Err(CounterError::from_driver(
                op,
                CUPTI_ERROR_INVALID_EVENT_ID,
                format!("{id} is not in {group}"),
            ));
        }
        self.injected(op)?;

        let instances = self.device.instances(fake.domain) as usize;
        let scripted = self.values.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        let per_instance = (0..instances).map(|i| scripted.get(i).copied().unwrap_or(0));

        values.clear();
        if entry.per_instance_active {
            values.extend(per_instance);
        } else {
            values.push(per_instance.fold(0u64, u64::saturating_add));
        }
        Ok(())
    }

    fn events_in_group(&self, group: EventGroup) -> Result<Vec<EventId>> {
        let op = ops::EVENTS_IN_GROUP;
        self.record(Call::EventsInGroup(group));
        let events = self.fake_group(group, op)?.events.clone();
        self.injected(op)?;
        Ok(events)
    }

    fn event_id(&self, name: &str) -> Result<EventId> {
        let op = ops::EVENT_ID;
        self.record(Call::EventId(name.to_string()));
        self.injected(op)?;
        self.device
            .events
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.id)
            .ok_or_else(|| {
                CounterError::from_driver(
                    op,
                    CUPTI_ERROR_INVALID_EVENT_NAME,
                    format!("no event named {name:?} on {}", self.device.device),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn device() -> FakeDevice {
        FakeDevice::new(DeviceId(0))
            .with_event("active_cycles", 0)
            .with_event("inst_issued", 0)
            .with_event("l2_hit", 1)
            .with_domain_instances(0, 4)
            .with_domain_instances(1, 2)
    }

    #[test]
    fn test_partition_splits_by_domain() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        let ids: Vec<EventId> = ["active_cycles", "l2_hit", "inst_issued"]
            .iter()
            .map(|n| counters.event_id(n).unwrap())
            .collect();

        let mut sets = counters.create_group_sets(&ids).unwrap();
        assert_eq!(sets.pass_count(), 1);
        let groups: Vec<EventGroup> = sets.groups().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            counters.events_in_group(groups[0]).unwrap(),
            vec![ids[0], ids[2]]
        );
        assert_eq!(counters.events_in_group(groups[1]).unwrap(), vec![ids[1]]);
        assert_eq!(counters.instance_count(groups[0]).unwrap(), 4);
        assert_eq!(counters.instance_count(groups[1]).unwrap(), 2);

        counters.destroy_group_sets(&mut sets).unwrap();
        assert_eq!(counters.live_groups(), 0);
    }

    #[test]
    fn test_aggregated_read_sums_instances() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        let id = counters.event_id("active_cycles").unwrap();
        counters.set_event_values(id, vec![1, 2, 3, 4]);

        let mut sets = counters.create_group_sets(&[id]).unwrap();
        let group = sets.sets()[0].groups()[0];
        counters.enable_group_set(&sets.sets()[0]).unwrap();

        let mut values = Vec::new();
        counters.read_event(group, id, &mut values).unwrap();
        assert_eq!(values, vec![10]);

        counters.disable_group_set(&sets.sets()[0]).unwrap();
        counters.destroy_group_sets(&mut sets).unwrap();
    }

    #[test]
    fn test_per_instance_waits_for_next_enable() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        let id = counters.event_id("l2_hit").unwrap();
        counters.set_event_values(id, vec![7, 9]);

        let mut sets = counters.create_group_sets(&[id]).unwrap();
        let group = sets.sets()[0].groups()[0];
        let mut values = Vec::new();

        counters.enable_group_set(&sets.sets()[0]).unwrap();
        counters.enable_per_instance(group).unwrap();
        counters.read_event(group, id, &mut values).unwrap();
        assert_eq!(values, vec![16]);
        counters.disable_group_set(&sets.sets()[0]).unwrap();

        counters.enable_group_set(&sets.sets()[0]).unwrap();
        counters.read_event(group, id, &mut values).unwrap();
        assert_eq!(values, vec![7, 9]);

        counters.disable_group_set(&sets.sets()[0]).unwrap();
        counters.destroy_group_sets(&mut sets).unwrap();
    }

    #[test]
    fn test_injected_failure_leaves_state() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        let id = counters.event_id("active_cycles").unwrap();
        let mut sets = counters.create_group_sets(&[id]).unwrap();

        counters.fail_next(ops::ENABLE_GROUP_SET, CUPTI_ERROR_HARDWARE_BUSY);
        let err = counters.enable_group_set(&sets.sets()[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(counters.pass_state(&sets.sets()[0]), Some(PassState::Created));

        counters.enable_group_set(&sets.sets()[0]).unwrap();
        counters.disable_group_set(&sets.sets()[0]).unwrap();
        counters.destroy_group_sets(&mut sets).unwrap();
    }

    #[test]
    fn test_failed_create_allocates_nothing() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        let known = counters.event_id("active_cycles").unwrap();

        let err = counters
            .create_group_sets(&[known, EventId(0xdead)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(counters.live_groups(), 0);
    }

    #[test]
    fn test_calls_are_recorded() {
        let mut counters = FakeEventCounters::new(device()).unwrap();
        counters.set_continuous_mode().unwrap();
        counters.set_continuous_mode().unwrap();
        let _ = counters.event_id("missing");

        assert!(counters.continuous_mode());
        assert_eq!(
            counters.calls(),
            vec![
                Call::SetContinuousMode,
                Call::SetContinuousMode,
                Call::EventId("missing".to_string()),
            ]
        );
        counters.clear_calls();
        assert!(counters.calls().is_empty());
    }
}
