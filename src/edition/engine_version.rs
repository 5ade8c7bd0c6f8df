//! Choosing the concrete engine version for an edition.

use log::debug;

use super::RawEdition;
use super::provider::EditionProvider;
use super::resolver::EditionResolver;
use crate::error::Result;
use crate::runtime::Runtime;

/// Resolves the engine version an edition requires, falling back to a
/// distribution-supplied default when no edition in the chain names one.
///
/// The default is injected by the caller rather than baked in, so a
/// distribution can override it without rebuilding.
pub struct EngineVersionResolver {
    default_version: semver::Version,
}

impl EngineVersionResolver {
    pub fn new(default_version: semver::Version) -> Self {
        Self { default_version }
    }

    pub fn default_version(&self) -> &semver::Version {
        &self.default_version
    }

    /// Resolves `raw` through the provider and picks its engine version.
    ///
    /// Delegated failures (`EditionNotFound`, `EditionCycleDetected`,
    /// `EditionParseError`) pass through unchanged.
    #[tracing::instrument(skip(self, resolver, raw))]
    pub async fn resolve_engine_version<R: Runtime, P: EditionProvider>(
        &self,
        resolver: &EditionResolver<R, P>,
        raw: RawEdition,
    ) -> Result<semver::Version> {
        let resolved = resolver.resolve(raw).await?;
        match resolved.engine_version {
            Some(version) => Ok(version),
            None => {
                debug!(
                    "No engine version in edition chain, using default {}",
                    self.default_version
                );
                Ok(self.default_version.clone())
            }
        }
    }
}
