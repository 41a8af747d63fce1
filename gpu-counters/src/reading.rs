//! Raw counter readings handed back to profilers

use serde::Serialize;

use crate::types::EventId;

/// Values of one event read during one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReading {
    pub name: String,
    pub id: EventId,

    /// One entry per hardware instance, or a single device total when the
    /// group was counted in aggregated mode
    pub instance_values: Vec<u64>,

    /// Sum of `instance_values`, saturating at `u64::MAX`
    pub total: u64,

    /// Whether the group was counted per instance. A single-instance domain
    /// yields one value in either mode.
    pub per_instance: bool,
}

impl EventReading {
    pub fn new(
        name: impl Into<String>,
        id: EventId,
        instance_values: Vec<u64>,
        per_instance: bool,
    ) -> Self {
        let total = instance_values
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(*v));
        Self {
            name: name.into(),
            id,
            instance_values,
            total,
            per_instance,
        }
    }

    pub fn is_per_instance(&self) -> bool {
        self.per_instance
    }

    /// Largest single-instance value
    pub fn max_instance(&self) -> u64 {
        self.instance_values.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_saturates() {
        let reading = EventReading::new("a", EventId(1), vec![u64::MAX, 5], true);
        assert_eq!(reading.total, u64::MAX);
        assert_eq!(reading.max_instance(), u64::MAX);
        assert!(reading.is_per_instance());
    }

    #[test]
    fn test_serializes_for_exporters() {
        let reading = EventReading::new("active_cycles", EventId(7), vec![3], false);
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["name"], "active_cycles");
        assert_eq!(json["id"], 7);
        assert_eq!(json["total"], 3);
        assert_eq!(json["per_instance"], false);
        assert!(!reading.is_per_instance());
    }

    #[test]
    fn test_single_instance_keeps_mode() {
        let reading = EventReading::new("warps_launched", EventId(2), vec![42], true);
        assert!(reading.is_per_instance());
        assert_eq!(reading.total, 42);
    }
}
