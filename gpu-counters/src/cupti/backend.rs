//! CUPTI event counter backend

use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;

use libc::c_void;
use tracing::{debug, info, trace, warn};

use super::bindings::*;
use crate::error::{ops, CounterError, Result};
use crate::state::{validate_event_list, verify_coverage, GroupSetTracker};
use crate::types::{DeviceContext, DeviceId, EventGroup, EventGroupSet, EventGroupSets, EventId};
use crate::EventCounters;

fn result_string(status: CUptiResult) -> String {
    let mut message: *const libc::c_char = ptr::null();
    let lookup = unsafe { cuptiGetResultString(status, &mut message) };
    if lookup != CUPTI_SUCCESS || message.is_null() {
        return format!("CUPTI status {status}");
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

fn check(op: &'static str, status: CUptiResult) -> Result<()> {
    if status == CUPTI_SUCCESS {
        Ok(())
    } else {
        Err(CounterError::from_driver(op, status, result_string(status)))
    }
}

/// Event counters backed by the CUPTI Event API
#[derive(Debug)]
pub struct CuptiEventCounters {
    context: DeviceContext,
    device: DeviceId,
    tracker: GroupSetTracker,
}

impl CuptiEventCounters {
    /// Bind to `context` and cache its device id
    pub fn new(context: DeviceContext) -> Result<Self> {
        let mut device = 0u32;
        trace!("cuptiGetDeviceId {:p}", context.as_raw());
        check(ops::CONSTRUCT, unsafe {
            cuptiGetDeviceId(context.as_raw(), &mut device)
        })?;
        debug!("CUPTI event counters bound to device {}", device);

        Ok(Self {
            context,
            device: DeviceId(device),
            tracker: GroupSetTracker::new(),
        })
    }

    fn group_attribute_u32(
        &self,
        group: EventGroup,
        attr: CUpti_EventGroupAttribute,
        op: &'static str,
    ) -> Result<u32> {
        let mut value = 0u32;
        let mut size = mem::size_of::<u32>();
        trace!("cuptiEventGroupGetAttribute {} attr {}", group, attr);
        check(op, unsafe {
            cuptiEventGroupGetAttribute(
                group.raw() as CUpti_EventGroup,
                attr,
                &mut size,
                &mut value as *mut u32 as *mut c_void,
            )
        })?;
        Ok(value)
    }

    fn placed_events(&self, sets: &EventGroupSets) -> Result<Vec<EventId>> {
        let mut placed = Vec::new();
        for group in sets.groups() {
            placed.extend(self.events_in_group(group)?);
        }
        Ok(placed)
    }

    /// Tear down driver sets that never reached the caller
    fn release_raw(raw: *mut CUpti_EventGroupSets) {
        trace!("cuptiEventGroupSetsDestroy {:p} after rejected create", raw);
        let status = unsafe { cuptiEventGroupSetsDestroy(raw) };
        if status != CUPTI_SUCCESS {
            warn!(
                "failed to release rejected group sets: {}",
                result_string(status)
            );
        }
    }
}

impl EventCounters for CuptiEventCounters {
    fn device(&self) -> DeviceId {
        self.device
    }

    fn create_group_sets(&mut self, ids: &[EventId]) -> Result<EventGroupSets> {
        let op = ops::CREATE_GROUP_SETS;
        validate_event_list(ids, op)?;

        let mut raw_ids: Vec<CUpti_EventID> = ids.iter().map(|id| id.0).collect();
        let mut raw: *mut CUpti_EventGroupSets = ptr::null_mut();
        trace!("cuptiEventGroupSetsCreate with {} events", raw_ids.len());
        check(op, unsafe {
            cuptiEventGroupSetsCreate(
                self.context.as_raw(),
                mem::size_of_val(raw_ids.as_slice()),
                raw_ids.as_mut_ptr(),
                &mut raw,
            )
        })?;
        if raw.is_null() {
            return Err(CounterError::DriverFault {
                op,
                code: CUPTI_ERROR_UNKNOWN,
                detail: "driver returned no group sets".to_string(),
            });
        }

        let mut layout = Vec::new();
        let passes = unsafe { &*raw };
        for i in 0..passes.numSets as usize {
            let pass = unsafe { passes.sets.add(i) };
            let pass_ref = unsafe { &*pass };
            let groups: Vec<usize> = (0..pass_ref.numEventGroups as usize)
                .map(|g| unsafe { *pass_ref.eventGroups.add(g) as usize })
                .collect();
            layout.push((pass as usize, groups));
        }
        let mut sets = self.tracker.register(raw as usize, layout);

        let coverage = self
            .placed_events(&sets)
            .and_then(|placed| verify_coverage(ids, &placed, op));
        if let Err(e) = coverage {
            self.tracker.commit_destroy(&mut sets);
            Self::release_raw(raw);
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
        self.tracker.check_destroy(sets, op)?;
        trace!("cuptiEventGroupSetsDestroy {:#x}", sets.raw());
        check(op, unsafe {
            cuptiEventGroupSetsDestroy(sets.raw() as *mut CUpti_EventGroupSets)
        })?;
        self.tracker.commit_destroy(sets);
        Ok(())
    }

    fn set_continuous_mode(&mut self) -> Result<()> {
        trace!("cuptiSetEventCollectionMode continuous on {}", self.device);
        check(ops::SET_CONTINUOUS_MODE, unsafe {
            cuptiSetEventCollectionMode(
                self.context.as_raw(),
                CUPTI_EVENT_COLLECTION_MODE_CONTINUOUS,
            )
        })?;
        info!("{} switched to continuous event collection", self.device);
        Ok(())
    }

    fn enable_per_instance(&mut self, group: EventGroup) -> Result<()> {
        let op = ops::ENABLE_PER_INSTANCE;
        self.tracker.group(group, op)?;
        let mut all_instances = 1u32;
        trace!("profile all domain instances for {}", group);
        check(op, unsafe {
            cuptiEventGroupSetAttribute(
                group.raw() as CUpti_EventGroup,
                CUPTI_EVENT_GROUP_ATTR_PROFILE_ALL_DOMAIN_INSTANCES,
                mem::size_of::<u32>(),
                &mut all_instances as *mut u32 as *mut c_void,
            )
        })?;
        self.tracker.request_per_instance(group);
        Ok(())
    }

    fn instance_count(&self, group: EventGroup) -> Result<u32> {
        let op = ops::INSTANCE_COUNT;
        self.tracker.group(group, op)?;
        self.group_attribute_u32(group, CUPTI_EVENT_GROUP_ATTR_INSTANCE_COUNT, op)
    }

    fn enable_group_set(&mut self, set: &EventGroupSet) -> Result<()> {
        let op = ops::ENABLE_GROUP_SET;
        self.tracker.check_enable(set, op)?;
        trace!("cuptiEventGroupSetEnable {}", set);
        check(op, unsafe {
            cuptiEventGroupSetEnable(set.raw() as *mut CUpti_EventGroupSet)
        })?;
        self.tracker.commit_enable(set);
        Ok(())
    }

    fn disable_group_set(&mut self, set: &EventGroupSet) -> Result<()> {
        let op = ops::DISABLE_GROUP_SET;
        self.tracker.check_disable(set, op)?;
        trace!("cuptiEventGroupSetDisable {}", set);
        check(op, unsafe {
            cuptiEventGroupSetDisable(set.raw() as *mut CUpti_EventGroupSet)
        })?;
        self.tracker.commit_disable(set);
        Ok(())
    }

    fn read_event(&self, group: EventGroup, id: EventId, values: &mut Vec<u64>) -> Result<()> {
        let op = ops::READ_EVENT;
        let entry = self.tracker.check_readable(group, op)?;
        let len = if entry.per_instance_active {
            self.group_attribute_u32(group, CUPTI_EVENT_GROUP_ATTR_INSTANCE_COUNT, op)? as usize
        } else {
            1
        };

        values.clear();
        values.resize(len, 0);
        let mut size = mem::size_of_val(values.as_slice());
        trace!("cuptiEventGroupReadEvent {} {} into {} slots", group, id, len);
        check(op, unsafe {
            cuptiEventGroupReadEvent(
                group.raw() as CUpti_EventGroup,
                CUPTI_EVENT_READ_FLAG_NONE,
                id.0,
                &mut size,
                values.as_mut_ptr(),
            )
        })?;
        values.truncate(size / mem::size_of::<u64>());
        Ok(())
    }

    fn events_in_group(&self, group: EventGroup) -> Result<Vec<EventId>> {
        let op = ops::EVENTS_IN_GROUP;
        self.tracker.group(group, op)?;
        let count = self.group_attribute_u32(group, CUPTI_EVENT_GROUP_ATTR_NUM_EVENTS, op)?;

        let mut ids: Vec<CUpti_EventID> = vec![0; count as usize];
        let mut size = mem::size_of_val(ids.as_slice());
        trace!("cuptiEventGroupGetAttribute {} events ({} expected)", group, count);
        check(op, unsafe {
            cuptiEventGroupGetAttribute(
                group.raw() as CUpti_EventGroup,
                CUPTI_EVENT_GROUP_ATTR_EVENTS,
                &mut size,
                ids.as_mut_ptr() as *mut c_void,
            )
        })?;
        ids.truncate(size / mem::size_of::<CUpti_EventID>());
        Ok(ids.into_iter().map(EventId).collect())
    }

    fn event_id(&self, name: &str) -> Result<EventId> {
        let op = ops::EVENT_ID;
        let c_name = CString::new(name)
            .map_err(|_| CounterError::invalid(op, format!("event name {name:?} contains NUL")))?;
        let mut id: CUpti_EventID = 0;
        trace!("cuptiEventGetIdFromName {:?} on {}", name, self.device);
        check(op, unsafe {
            cuptiEventGetIdFromName(self.device.0 as CUdevice, c_name.as_ptr(), &mut id)
        })?;
        Ok(EventId(id))
    }
}
