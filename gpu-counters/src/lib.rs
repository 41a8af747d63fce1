//! GPU hardware event counters
//!
//! Wraps the CUPTI Event API (event groups, group sets, per-instance and
//! aggregated counting, continuous collection) behind the [`EventCounters`]
//! trait so a profiler can enable, read and tear down GPU hardware events
//! without touching the driver directly.
//!
//! Two backends implement the trait:
//! - `cupti::CuptiEventCounters` talks to the driver (`cuda` feature)
//! - [`fake::FakeEventCounters`] models a device in memory and records calls
//!
//! An interface is bound to one device context and is not meant to be shared
//! between threads. Counter state such as continuous mode is global to the
//! context, so callers sharing a context must coordinate among themselves.

pub mod config;
pub mod cupti;
pub mod error;
pub mod fake;
pub mod reading;
pub mod session;
mod state;
pub mod types;

pub use config::CounterConfig;
pub use error::{CounterError, ErrorKind, Result};
pub use reading::EventReading;
pub use session::CounterSession;
pub use state::PassState;
pub use types::{DeviceContext, DeviceId, EventGroup, EventGroupSet, EventGroupSets, EventId};

/// Access to one device's hardware event counters.
///
/// Group sets follow Created -> Enabled <-> Disabled -> Destroyed. Every
/// implementation rejects out-of-order calls with
/// [`ErrorKind::InvalidArgument`] instead of forwarding them to the driver.
pub trait EventCounters {
    /// Device the interface was bound to at construction
    fn device(&self) -> DeviceId;

    /// Ask the driver to split `ids` into event groups and passes.
    ///
    /// `ids` must be non-empty and free of duplicates. On failure nothing is
    /// left allocated.
    fn create_group_sets(&mut self, ids: &[EventId]) -> Result<EventGroupSets>;

    /// Release every driver resource held by `sets`.
    ///
    /// Fails while any pass is enabled. Afterwards all groups of `sets` are
    /// invalid for every other operation.
    fn destroy_group_sets(&mut self, sets: &mut EventGroupSets) -> Result<()>;

    /// Switch the whole device context to continuous collection, so counters
    /// keep accumulating across kernel launches. Affects every group set on
    /// the context, not only the caller's. Idempotent.
    fn set_continuous_mode(&mut self) -> Result<()>;

    /// Report one value per hardware instance for `group`. Takes effect the
    /// next time its group set is enabled.
    fn enable_per_instance(&mut self, group: EventGroup) -> Result<()>;

    /// Number of hardware instances feeding `group`
    fn instance_count(&self, group: EventGroup) -> Result<u32>;

    fn enable_group_set(&mut self, set: &EventGroupSet) -> Result<()>;

    fn disable_group_set(&mut self, set: &EventGroupSet) -> Result<()>;

    /// Read the current value(s) of `id` in `group` into `values`.
    ///
    /// `values` is resized to one entry, or to [`instance_count`] entries when
    /// per-instance counting was active at enable time. Reading does not reset
    /// the counters; callers wanting deltas keep their own baselines. On error
    /// the content of `values` is unspecified.
    ///
    /// [`instance_count`]: EventCounters::instance_count
    fn read_event(&self, group: EventGroup, id: EventId, values: &mut Vec<u64>) -> Result<()>;

    /// Events the driver placed in `group`, in driver order
    fn events_in_group(&self, group: EventGroup) -> Result<Vec<EventId>>;

    /// Resolve an event name for the bound device
    fn event_id(&self, name: &str) -> Result<EventId>;
}
