//! Parent-chain resolution of editions.
//!
//! Resolution walks the parent chain through an [`EditionProvider`],
//! carrying an explicit visited set so a cycle is reported as soon as a
//! name repeats on the current path, long before any stack is exhausted.
//! Merging gives child fields priority: scalars override, list fields are
//! concatenated child-then-parent and de-duplicated by equality with
//! first-seen order preserved.

use log::debug;
use std::sync::Arc;

use super::provider::EditionProvider;
use super::{RawEdition, ResolvedEdition};
use crate::error::{DistributionError, Result};
use crate::runtime::Runtime;

pub struct EditionResolver<R: Runtime, P: EditionProvider> {
    runtime: Arc<R>,
    provider: P,
}

impl<R: Runtime, P: EditionProvider> EditionResolver<R, P> {
    pub fn new(runtime: Arc<R>, provider: P) -> Self {
        Self { runtime, provider }
    }

    /// Resolves `raw` into a self-contained edition.
    ///
    /// Fails with `EditionNotFound` when a named parent cannot be located,
    /// `EditionCycleDetected` when the ancestor path repeats a name,
    /// `EditionParseError` when a located document cannot be parsed, and
    /// `Io` when it cannot be read at all.
    #[tracing::instrument(skip(self, raw))]
    pub async fn resolve(&self, raw: RawEdition) -> Result<ResolvedEdition> {
        // Load the chain child-first, then fold it root-down. The loop
        // replaces recursion so the visited set, not call depth, bounds
        // the walk.
        let mut chain = vec![raw];
        let mut visited: Vec<String> = Vec::new();

        while let Some(parent_name) = chain.last().and_then(|e| e.parent.clone()) {
            if visited.iter().any(|seen| *seen == parent_name) {
                return Err(DistributionError::EditionCycleDetected {
                    name: parent_name.clone(),
                    chain: format!("{} -> {}", visited.join(" -> "), parent_name),
                });
            }
            visited.push(parent_name.clone());

            let path = self.provider.find_edition(&parent_name).await.ok_or_else(|| {
                DistributionError::EditionNotFound {
                    name: parent_name.clone(),
                }
            })?;
            let contents = self.runtime.read_to_string(&path).map_err(|e| {
                DistributionError::io(&path, std::io::Error::other(e.to_string()))
            })?;
            chain.push(RawEdition::from_json_str(&parent_name, &contents)?);
        }

        debug!("Resolving edition chain of depth {}", chain.len());

        // Fold root-down: the deepest ancestor merges over an empty
        // configuration, then each descendant merges over the result.
        let mut resolved = ResolvedEdition {
            engine_version: None,
            repositories: Vec::new(),
            libraries: Vec::new(),
        };
        while let Some(child) = chain.pop() {
            resolved = merge(child, resolved);
        }
        Ok(resolved)
    }
}

/// Merges a child edition over its resolved parent. Child scalars win;
/// child list entries take priority position.
fn merge(child: RawEdition, parent: ResolvedEdition) -> ResolvedEdition {
    let mut repositories = child.repositories;
    repositories.extend(parent.repositories);
    let mut libraries = child.libraries;
    libraries.extend(parent.libraries);

    ResolvedEdition {
        engine_version: child.engine_version.or(parent.engine_version),
        repositories: dedup(repositories),
        libraries: dedup(libraries),
    }
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut result: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !result.contains(&item) {
            result.push(item);
        }
    }
    result
}
