//! Wire-level building blocks shared by the seismq crates.
//!
//! Everything here speaks MQTT 3.1 / 3.1.1: there are no properties and no
//! MQTT 5.0 reason codes.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod qos;
pub mod return_code;
pub mod topic;

/// A specialized `Result` type for codec operations.
pub type Result<T> = std::result::Result<T, crate::error::Error>;
