//! Engine and runtime installation.
//!
//! # Structure
//!
//! - `release` - release manifests and the provider that serves them
//! - `manager` - locate-or-install lifecycle with crash-safe filesystem
//!   operations

pub mod manager;
pub mod release;

pub use manager::RuntimeVersionManager;
pub use release::{
    EngineRelease, HttpReleaseProvider, ReleaseArtifact, ReleaseManifest, ReleaseProvider,
    RuntimeRelease,
};
