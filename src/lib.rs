#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::use_self,
    missing_debug_implementations
)]

//! Reports Kafka partitions that a consumer group has no committed offset for.
//!
//! A [`Poller`](checker::Poller) periodically lists all consumer groups with their committed offsets, looks up the
//! current partitions of every topic the groups committed to and emits a [`Finding`](checker::Finding) for each
//! partition a group never committed. The cluster is only read, nothing is ever repaired.
//!
//! The Kafka client underneath speaks the wire protocol natively and only implements the handful of messages needed
//! for that: ApiVersions, Metadata, ListGroups, FindCoordinator and OffsetFetch.

pub mod backoff;
pub mod build_info;
pub mod checker;
pub mod client;
pub mod config;
mod connection;
mod messenger;
pub mod protocol;
mod throttle;
pub mod topic;
