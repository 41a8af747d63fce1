//! Handle types for devices, events and event groups

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Non-owning handle to a driver context (`CUcontext`).
///
/// The context is created and destroyed by whoever embeds this crate; an
/// interface only borrows it for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceContext(NonNull<c_void>);

impl DeviceContext {
    /// Wrap a raw context pointer. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be a live `CUcontext` that stays valid for as long as any
    /// interface constructed from it is in use.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Device ordinal reported by the driver for a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device {}", self.0)
    }
}

/// Identifier of one countable hardware event type on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {:#x}", self.0)
    }
}

/// Opaque handle to a driver event group.
///
/// Groups are created by the driver inside `create_group_sets` and become
/// invalid once the enclosing [`EventGroupSets`] is destroyed. The driver may
/// hand the same raw pointer to a later group, so a handle also carries the
/// pass it was registered under and never compares equal to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventGroup {
    owner: u64,
    pass: u64,
    raw: usize,
}

impl EventGroup {
    pub(crate) fn new(owner: u64, pass: u64, raw: usize) -> Self {
        Self { owner, pass, raw }
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    pub(crate) fn raw(&self) -> usize {
        self.raw
    }
}

impl fmt::Display for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {:#x}", self.raw)
    }
}

/// Event groups that are counted together in a single pass
#[derive(Debug)]
pub struct EventGroupSet {
    owner: u64,
    key: u64,
    raw: usize,
    groups: Vec<EventGroup>,
}

impl EventGroupSet {
    pub(crate) fn new(owner: u64, key: u64, raw: usize, groups: Vec<EventGroup>) -> Self {
        Self {
            owner,
            key,
            raw,
            groups,
        }
    }

    pub fn groups(&self) -> &[EventGroup] {
        &self.groups
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    #[cfg_attr(not(feature = "cuda"), allow(dead_code))]
    pub(crate) fn raw(&self) -> usize {
        self.raw
    }
}

impl fmt::Display for EventGroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group set #{} ({} groups)", self.key, self.groups.len())
    }
}

/// All passes needed to count one requested list of events.
///
/// Owned by the caller between `create_group_sets` and `destroy_group_sets`.
/// Dropping it without destroying it leaks the driver resources; nothing is
/// reclaimed implicitly.
#[must_use = "event group sets must be released with destroy_group_sets"]
#[derive(Debug)]
pub struct EventGroupSets {
    owner: u64,
    raw: usize,
    sets: Vec<EventGroupSet>,
    released: bool,
}

impl EventGroupSets {
    pub(crate) fn new(owner: u64, raw: usize, sets: Vec<EventGroupSet>) -> Self {
        Self {
            owner,
            raw,
            sets,
            released: false,
        }
    }

    /// One entry per pass
    pub fn sets(&self) -> &[EventGroupSet] {
        &self.sets
    }

    pub fn pass_count(&self) -> usize {
        self.sets.len()
    }

    /// Every group across every pass, in pass order
    pub fn groups(&self) -> impl Iterator<Item = EventGroup> + '_ {
        self.sets.iter().flat_map(|set| set.groups.iter().copied())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    #[cfg_attr(not(feature = "cuda"), allow(dead_code))]
    pub(crate) fn raw(&self) -> usize {
        self.raw
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
        self.sets.clear();
    }
}

impl Drop for EventGroupSets {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "event group sets with {} passes dropped without destroy_group_sets; driver resources leaked",
                self.sets.len()
            );
        }
    }
}
