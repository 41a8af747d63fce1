//! Error type shared by every counter backend

use thiserror::Error;

use crate::cupti::bindings::*;

/// Operation names carried by every [`CounterError`]
pub mod ops {
    pub const CONSTRUCT: &str = "construct";
    pub const CREATE_GROUP_SETS: &str = "create_group_sets";
    pub const DESTROY_GROUP_SETS: &str = "destroy_group_sets";
    pub const SET_CONTINUOUS_MODE: &str = "set_continuous_mode";
    pub const ENABLE_PER_INSTANCE: &str = "enable_per_instance";
    pub const INSTANCE_COUNT: &str = "instance_count";
    pub const ENABLE_GROUP_SET: &str = "enable_group_set";
    pub const DISABLE_GROUP_SET: &str = "disable_group_set";
    pub const READ_EVENT: &str = "read_event";
    pub const EVENTS_IN_GROUP: &str = "events_in_group";
    pub const EVENT_ID: &str = "event_id";
}

/// Coarse classification of a [`CounterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown event name, invalid or foreign handle, or an operation issued
    /// in the wrong group set state
    InvalidArgument,
    /// The device or driver does not support the requested mode or event
    Unsupported,
    /// Counter hardware cannot fit the requested events
    ResourceExhausted,
    /// Opaque low-level failure reported by the driver
    DriverFault,
}

/// Errors returned by [`EventCounters`](crate::EventCounters) operations.
///
/// Every variant names the operation that failed. None of them are retried
/// by this crate.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("{op}: invalid argument: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    #[error("{op}: unsupported: {detail}")]
    Unsupported { op: &'static str, detail: String },

    #[error("{op}: resource exhausted: {detail}")]
    ResourceExhausted { op: &'static str, detail: String },

    #[error("{op}: driver fault (status {code}): {detail}")]
    DriverFault {
        op: &'static str,
        code: u32,
        detail: String,
    },
}

impl CounterError {
    pub fn invalid(op: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }

    /// Classify a CUPTI status code.
    pub fn from_driver(op: &'static str, code: CUptiResult, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match code {
            CUPTI_ERROR_INVALID_PARAMETER
            | CUPTI_ERROR_INVALID_DEVICE
            | CUPTI_ERROR_INVALID_CONTEXT
            | CUPTI_ERROR_INVALID_EVENT_DOMAIN_ID
            | CUPTI_ERROR_INVALID_EVENT_ID
            | CUPTI_ERROR_INVALID_EVENT_NAME
            | CUPTI_ERROR_INVALID_OPERATION
            | CUPTI_ERROR_INVALID_HANDLE
            | CUPTI_ERROR_PARAMETER_SIZE_NOT_SUFFICIENT => Self::InvalidArgument { op, detail },
            CUPTI_ERROR_NOT_SUPPORTED
            | CUPTI_ERROR_API_NOT_IMPLEMENTED
            | CUPTI_ERROR_NOT_COMPATIBLE
            | CUPTI_ERROR_INSUFFICIENT_PRIVILEGES
            | CUPTI_ERROR_LEGACY_PROFILER_NOT_SUPPORTED => Self::Unsupported { op, detail },
            CUPTI_ERROR_OUT_OF_MEMORY | CUPTI_ERROR_MAX_LIMIT_REACHED | CUPTI_ERROR_HARDWARE_BUSY => {
                Self::ResourceExhausted { op, detail }
            }
            code => Self::DriverFault { op, code, detail },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::DriverFault { .. } => ErrorKind::DriverFault,
        }
    }

    /// Name of the operation that failed
    pub fn op(&self) -> &'static str {
        match self {
            Self::InvalidArgument { op, .. }
            | Self::Unsupported { op, .. }
            | Self::ResourceExhausted { op, .. }
            | Self::DriverFault { op, .. } => op,
        }
    }
}

pub type Result<T, E = CounterError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_codes_map_to_kinds() {
        let cases = [
            (CUPTI_ERROR_INVALID_EVENT_NAME, ErrorKind::InvalidArgument),
            (CUPTI_ERROR_INVALID_OPERATION, ErrorKind::InvalidArgument),
            (CUPTI_ERROR_NOT_SUPPORTED, ErrorKind::Unsupported),
            (CUPTI_ERROR_LEGACY_PROFILER_NOT_SUPPORTED, ErrorKind::Unsupported),
            (CUPTI_ERROR_INSUFFICIENT_PRIVILEGES, ErrorKind::Unsupported),
            (CUPTI_ERROR_MAX_LIMIT_REACHED, ErrorKind::ResourceExhausted),
            (CUPTI_ERROR_HARDWARE, ErrorKind::DriverFault),
            (CUPTI_ERROR_OPENACC_UNDEFINED_ROUTINE, ErrorKind::DriverFault),
            (CUPTI_ERROR_UNKNOWN, ErrorKind::DriverFault),
        ];
        for (code, kind) in cases {
            assert_eq!(CounterError::from_driver("op", code, "x").kind(), kind);
        }
    }

    #[test]
    fn test_raw_status_values() {
        // newer GPUs report 38 from the Event API, restricted counters 35
        assert_eq!(CounterError::from_driver("op", 35, "x").kind(), ErrorKind::Unsupported);
        assert_eq!(CounterError::from_driver("op", 38, "x").kind(), ErrorKind::Unsupported);
        assert_eq!(CounterError::from_driver("op", 37, "x").kind(), ErrorKind::DriverFault);
    }

    #[test]
    fn test_message_names_operation() {
        let err = CounterError::from_driver(ops::READ_EVENT, CUPTI_ERROR_HARDWARE, "ECC error");
        assert_eq!(err.op(), "read_event");
        assert_eq!(
            err.to_string(),
            "read_event: driver fault (status 9): ECC error"
        );
    }
}
