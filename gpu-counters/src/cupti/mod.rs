//! CUDA CUPTI integration
//!
//! `bindings` is always available for its status codes; the driver-backed
//! [`CuptiEventCounters`] needs the `cuda` feature.

pub mod bindings;

#[cfg(feature = "cuda")]
mod backend;

#[cfg(feature = "cuda")]
pub use backend::CuptiEventCounters;
