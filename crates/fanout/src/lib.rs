//! Virtual audio fan-out pipelines on a PulseAudio-compatible sound server.
//!
//! One input stream runs through optional effect sinks into a base sink whose
//! monitor is split into per-channel sources, each looped back to a physical
//! output. [`Reconciler`] owns the lifecycle; [`PipelineService`] serializes
//! it for async callers.

pub mod catalog;
pub mod effects;
pub mod error;
pub mod matcher;
pub mod plan;
pub mod prerequisites;
pub mod presets;
pub mod reconciler;
pub mod router;
pub mod sampler;
pub mod server;
pub mod service;
pub mod teardown;
pub mod types;

pub use catalog::{suggest_routing, Catalog, ModuleListing, RoutingSuggestion};
pub use effects::{EffectChain, EffectKind, EffectSettings};
pub use error::{ConfigurationError, DiscoveryAmbiguity, ExternalCallFailure, PipelineError};
pub use matcher::ModuleLocator;
pub use plan::{BuildPlan, NodeSpec, PipelineGraph, PlanBuilder};
pub use prerequisites::{CardProfiles, NoPrerequisites, Prerequisites};
pub use presets::Preset;
pub use reconciler::{ApplyReport, GenerationState, Reconciler};
pub use router::{balance_factors, ChannelRouter, GainReport, VolumeCommand};
pub use sampler::{MonitorHistory, MonitorSampler};
pub use server::{CommandRunner, ModuleControl, PactlRunner};
pub use service::{PipelineEvent, PipelineOp, PipelineService};
pub use teardown::{DiscoveryPredicate, StopReport, TeardownSequence, TeardownSequencer};
pub use types::*;
