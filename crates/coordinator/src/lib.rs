#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Coordinator
//!
//! Runs sliced, relocatable bulk operations:
//!
//! - [`slicing`]: slice count resolution, role assignment and fan-out
//! - [`relocation`]: the sticky target picker and the shutdown handoff
//! - [`Orchestrator`]: the end-to-end sequence and the resume entry point
//! - [`ScrollWorker`]: the page-by-page worker loop
//! - [`ports`]: traits for the collaborators the host provides
//! - [`CoordinatorConfig`]: TOML and environment configuration

pub mod config;
pub mod error;
pub mod local;
pub mod metrics;
pub mod orchestrator;
pub mod ports;
pub mod relocation;
pub mod request;
pub mod slicing;
pub mod source;
pub mod worker;

pub use config::{CoordinatorConfig, RelocationConfig, RemoteConfig, ScrollConfig};
pub use error::{CoordinatorError, RelocationSignal};
pub use local::LocalClusterClient;
pub use metrics::{BulkMetrics, FacadeMetrics, NoopMetrics};
pub use orchestrator::{Collaborators, Orchestrator};
pub use ports::{
    BatchOutcome, BatchSink, ClusterClient, RemoteClientFactory, ScrollSource, ShardTopology,
    SourceFactory, WorkerAction,
};
pub use relocation::{RelocationCoordinator, StickyNodePicker, check_shutdown};
pub use request::{
    BulkRequest, DEFAULT_SLICE_FIELD, OperationKind, RemoteInfo, ResumeRequest, SliceSpec, Slices,
    partition_of,
};
pub use slicing::{AUTO_SLICE_CAP, fan_out, init_role, partition, resolve_slice_count};
pub use source::{HttpRemoteFactory, RemoteSourceFactory};
pub use worker::ScrollWorker;
