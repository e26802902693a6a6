//! The subset of the Kafka wire protocol needed to inspect group offsets and topic layout.
//!
//! # References
//! - <https://kafka.apache.org/protocol>
//! - <https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol>

pub mod api_key;
pub mod api_version;
pub mod error;
pub mod frame;
pub mod messages;
pub mod primitives;
pub mod traits;
mod vec_builder;

#[cfg(test)]
mod test_utils;
