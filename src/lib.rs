//! Auto-rigging engine for binary 3D-model containers.
//!
//! Given an arbitrary chunked container and a subscription tier, the
//! pipeline parses it defensively, analyzes its structure, fits a bone and
//! morph-target budget into the tier's size envelope, synthesizes the rig
//! and writes it back, rewriting the structural chunk when the container
//! parsed, or appending a self-contained rig block when it did not.

pub mod error;
pub mod rig;

pub use error::RigError;
pub use rig::{
    Classifier, ClassifierScore, ContainerAnalysis, EmbedStrategy, EngineConfig, RigResult,
    StaticTierTable, TierBudget, TierBudgetProvider, analyze_container, rig_container,
};
