//! Strategy component registry and composition engine.
//!
//! A typed, versioned catalog of pluggable evaluator components
//! (probability / entry / sizing / exit) composed into named
//! strategies: compose, execute, fork, diff, upgrade, lineage. The
//! composer is a pure evaluator; durable writes go through the
//! [`StrategyStore`] seam.

pub mod builtin;
pub mod catalog;
pub mod component;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod version;

pub use catalog::Catalog;
pub use component::{
    ComponentMetadata, ComponentModel, ComponentVersion, ConfigValidation, EvalContext, Evaluator,
    PositionContext,
};
pub use error::{RegistryError, RegistryResult};
pub use merge::deep_merge;
pub use pipeline::{DecisionAction, StageResults, StrategyDecision};
pub use registry::{
    BatchUpgradeOptions, BatchUpgradeReport, ConfigDiff, ForkSpec, LineageEntry, Registry,
    SlotDiff, StrategyDiff, StrategyStore,
};
pub use version::{generate_version_id, parse_version_id, ParsedVersionId};
