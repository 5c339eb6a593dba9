//! Shared types for post-process-forwarder.
//!
//! This crate defines the data that flows through the forwarder and the narrow
//! interfaces of its external collaborators.
//!
//! # Architecture
//!
//! ```text
//! RecordSource ─▶ ConsumedRecord ─▶ TaskDescriptor ─▶ DispatchRequest ─▶ WorkQueue
//!                        │                                                  │
//!                        └──────────── (partition, offset) ─▶ CommitSink ◀──┘
//! ```
//!
//! # Modules
//!
//! - [`record`] - Records as handed over by the log transport
//! - [`descriptor`] - Decoded task descriptors and the work-queue payload
//! - [`collaborators`] - Traits for the transport, work queue, flags and metrics
//! - [`error`] - Error types for decoding, dispatching and forwarding

pub mod collaborators;
pub mod descriptor;
pub mod error;
pub mod record;

// Re-export main types for convenient access
pub use collaborators::{CommitSink, FeatureFlags, Metrics, RecordSource, WorkQueue};
pub use descriptor::{cache_key_for_event, DispatchRequest, GroupState, TaskDescriptor};
pub use error::{DecodeError, DispatchError, Error, Result};
pub use record::{ConsumedRecord, Header, Partition};
