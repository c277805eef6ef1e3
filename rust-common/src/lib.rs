//! Constraint synthesis for scheduling SDF applications on clustered multicores.
//!
//! An [SdfSchedulingProblem] is turned once into a [SchedulingContext] (DMA tasks spliced in,
//! unfolded, dependencies derived, resources assigned), from which [build_model] fills a
//! [ModelSession] for every solver query. [decode_schedule] reads a satisfying assignment
//! back as a [flowsched_core::Schedule].
pub mod analysis;
pub mod cluster;
pub mod config;
pub mod context;
pub mod decode;
pub mod models;
pub mod passes;
pub mod precedence;
pub mod session;
pub mod strategy;
pub mod unfold;

pub use cluster::{splice_dma_actors, DmaLink, SplicedApplication};
pub use config::{
    BufferEncoding, Objective, PeriodicFolding, ProcessorBudget, Regime, SchedulingConfig,
    SchedulingConfigBuilder,
};
pub use context::{BufferGroup, ResourceWindow, SchedulingContext};
pub use decode::{decode_schedule, emit_schedule, processors_used};
pub use models::SdfSchedulingProblem;
pub use passes::{build_model, objective_key, standard_passes, ConstraintPass};
pub use session::{ChannelRole, GlobalRole, InstanceRole, ModelSession, VarKey};
pub use strategy::{NonPipelined, Pipelined, SchedulingStrategy};
pub use unfold::{Hsdf, HsdfChannel};
