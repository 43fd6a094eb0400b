//! Distributed execution
//!
//! # Architecture
//!
//! A run is a fixed group of ranks in a star:
//!
//! - **Coordinator** (rank 0): reads the input, broadcasts the kernel,
//!   distributes targets, gathers metrics and produces the summary
//! - **Node Service** (ranks 1..N): receives its share of the targets and
//!   reports one metric per target
//! - **Workers**: threads inside each rank convolving its local targets
//!
//! # Modules
//!
//! - `partition`: which rank owns which target
//! - `protocol`: message definitions and framing
//! - `communicator`: point-to-point and broadcast messaging between ranks
//! - `context`: per-rank run state
//! - `broadcast`: kernel and metadata dissemination
//! - `distribution`: target scatter
//! - `coordinator`, `node_service`: the two sides of a run
//! - `cluster`: every rank inside one process

pub mod broadcast;
pub mod cluster;
pub mod communicator;
pub mod context;
pub mod coordinator;
pub mod distribution;
pub mod node_service;
pub mod partition;
pub mod protocol;

// Re-export key types
pub use protocol::{
    AbortMessage,
    JoinMessage,
    KernelRowMessage,
    Message,
    MetadataMessage,
    MetricMessage,
    ProtocolError,
    ReadyMessage,
    TargetRowMessage,
    PROTOCOL_VERSION,
};

pub use cluster::LocalCluster;
pub use communicator::{Communicator, COORDINATOR_RANK};
pub use context::{ProcessContext, RunMetadata};
pub use coordinator::{DistributedCoordinator, RunReport};
pub use node_service::NodeService;
pub use partition::Partition;
