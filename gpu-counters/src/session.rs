//! One counter configuration driven through its group set lifecycle
//!
//! A [`CounterSession`] resolves the configured event names, creates the
//! group sets, and then lets the caller walk the passes one at a time:
//! enable, run the workload, read, disable. [`CounterSession::finish`]
//! disables whatever is still enabled and destroys the group sets.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::CounterConfig;
use crate::error::{ops, CounterError, Result};
use crate::reading::EventReading;
use crate::types::{EventGroup, EventGroupSets, EventId};
use crate::EventCounters;

pub struct CounterSession<'a, C: EventCounters + ?Sized> {
    counters: &'a mut C,
    sets: EventGroupSets,
    events: Vec<(String, EventId)>,
    names: HashMap<EventId, String>,
    per_instance: bool,
    active: Option<usize>,
    finished: bool,
}

impl<'a, C: EventCounters + ?Sized> CounterSession<'a, C> {
    /// Resolve `config.events` and create group sets for them.
    ///
    /// If applying per-instance mode fails, the freshly created group sets
    /// are destroyed before the error is returned.
    pub fn start(counters: &'a mut C, config: &CounterConfig) -> Result<Self> {
        let mut events = Vec::with_capacity(config.events.len());
        for name in &config.events {
            events.push((name.clone(), counters.event_id(name)?));
        }

        if config.continuous_mode {
            counters.set_continuous_mode()?;
        }

        let ids: Vec<EventId> = events.iter().map(|(_, id)| *id).collect();
        let mut sets = counters.create_group_sets(&ids)?;

        if config.per_instance {
            let groups: Vec<EventGroup> = sets.groups().collect();
            for group in groups {
                if let Err(e) = counters.enable_per_instance(group) {
                    if let Err(cleanup) = counters.destroy_group_sets(&mut sets) {
                        warn!("failed to destroy group sets after setup error: {}", cleanup);
                    }
                    return Err(e);
                }
            }
        }

        debug!(
            "counter session on {}: {} events in {} passes",
            counters.device(),
            events.len(),
            sets.pass_count()
        );

        let names = events.iter().map(|(name, id)| (*id, name.clone())).collect();
        Ok(Self {
            counters,
            sets,
            events,
            names,
            per_instance: config.per_instance,
            active: None,
            finished: false,
        })
    }

    /// Configured events in configuration order
    pub fn events(&self) -> &[(String, EventId)] {
        &self.events
    }

    pub fn pass_count(&self) -> usize {
        self.sets.pass_count()
    }

    pub fn active_pass(&self) -> Option<usize> {
        self.active
    }

    /// Start counting for pass `pass`. Only one pass can be enabled at a time.
    pub fn enable_pass(&mut self, pass: usize) -> Result<()> {
        let op = ops::ENABLE_GROUP_SET;
        if let Some(active) = self.active {
            return Err(CounterError::invalid(
                op,
                format!("pass {active} is still enabled"),
            ));
        }
        let set = self.sets.sets().get(pass).ok_or_else(|| {
            CounterError::invalid(
                op,
                format!("pass {pass} out of range ({} passes)", self.sets.pass_count()),
            )
        })?;
        self.counters.enable_group_set(set)?;
        self.active = Some(pass);
        Ok(())
    }

    pub fn disable_pass(&mut self) -> Result<()> {
        let pass = self
            .active
            .ok_or_else(|| CounterError::invalid(ops::DISABLE_GROUP_SET, "no pass is enabled"))?;
        self.counters.disable_group_set(&self.sets.sets()[pass])?;
        self.active = None;
        Ok(())
    }

    /// Read every event of the enabled pass
    pub fn read_pass(&self) -> Result<Vec<EventReading>> {
        let pass = self
            .active
            .ok_or_else(|| CounterError::invalid(ops::READ_EVENT, "no pass is enabled"))?;

        let mut readings = Vec::new();
        let mut values = Vec::new();
        for group in self.sets.sets()[pass].groups() {
            for id in self.counters.events_in_group(*group)? {
                self.counters.read_event(*group, id, &mut values)?;
                let name = self
                    .names
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| id.to_string());
                readings.push(EventReading::new(
                    name,
                    id,
                    values.clone(),
                    self.per_instance,
                ));
            }
        }
        Ok(readings)
    }

    /// Disable the active pass, if any, then destroy the group sets
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        if self.active.is_some() {
            self.disable_pass()?;
        }
        self.counters.destroy_group_sets(&mut self.sets)
    }
}

impl<C: EventCounters + ?Sized> Drop for CounterSession<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "counter session dropped without finish (active pass {:?})",
                self.active
            );
        }
    }
}
