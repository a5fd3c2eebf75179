// cryoforge search: federated STAC catalog search over partitioned storage
// Copyright 2025 cryoforge Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Federated search across catalog partitions.
//!
//! A search runs in three steps:
//!
//! 1. Validate the request. Bad input (geometry, scheme, filter) fails here,
//!    before any I/O.
//! 2. Plan: compute candidate partitions for the `intersects` geometry and
//!    keep the paths that hold data, or fall back to whole-catalog globs.
//! 3. Query every glob through the engine with bounded concurrency, each
//!    under a timeout, and merge the hrefs into one sorted set.
//!
//! A failing or timed-out glob never aborts the search. It is logged and
//! reported in [`Diagnostics::failed_globs`], and the hrefs of the other
//! globs are still returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cryoforge_search::config::FederationConfig;
//! use cryoforge_search::engine::{QueryEngine, SearchParams};
//! use cryoforge_search::federation::Federator;
//! use cryoforge_search::geometry::SearchGeometry;
//! use cryoforge_search::storage::{CatalogRoot, ObjectStoreProbe};
//!
//! # async fn example(engine: Arc<dyn QueryEngine>) -> cryoforge_search::error::Result<()> {
//! let config = FederationConfig::from_env()?;
//! let root = CatalogRoot::parse("s3://its-live-data/test-space/stac/geoparquet/latlon")?;
//! let probe = Arc::new(ObjectStoreProbe::for_root(&root, &config.store)?);
//! let federator = Federator::new(engine, probe, config);
//!
//! let params = SearchParams::builder()
//!     .intersects(SearchGeometry::from_bbox([-52.0, 58.0, -38.0, 62.0])?)
//!     .build();
//! let outcome = federator.search(&root, &params).await?;
//! println!("{} hrefs, {} failed globs", outcome.hrefs.len(), outcome.diagnostics.failed_globs.len());
//! # Ok(())
//! # }
//! ```

use crate::config::FederationConfig;
use crate::engine::{EngineRegistry, QueryEngine, SearchParams};
use crate::error::{Error, Result};
use crate::grid::compute_candidate_partitions;
use crate::paths::{ResolvedGlobs, build_search_globs, fallback_globs};
use crate::storage::{CatalogRoot, ExistenceProbe};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A glob whose query failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobFailure {
    pub glob: String,
    pub error: String,
}

/// What a search skipped or lost on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Candidate paths before existence checks.
    pub candidates: usize,
    /// Candidates dropped because they hold no objects.
    pub pruned: usize,
    /// Candidates dropped because their existence check failed.
    pub probe_failures: usize,
    /// Globs that were queried.
    pub queried: usize,
    /// Globs whose query failed, sorted by glob.
    pub failed_globs: Vec<GlobFailure>,
    /// True when the whole catalog was scanned instead of selected partitions.
    pub fallback: bool,
}

impl Diagnostics {
    /// True when every queried glob answered and no probe failed.
    pub fn is_complete(&self) -> bool {
        self.failed_globs.is_empty() && self.probe_failures == 0
    }
}

/// Result of a federated search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    /// Unique hrefs, sorted.
    pub hrefs: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Runs searches over a partitioned catalog with one engine.
pub struct Federator {
    engine: Arc<dyn QueryEngine>,
    probe: Arc<dyn ExistenceProbe>,
    config: FederationConfig,
}

impl Federator {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        probe: Arc<dyn ExistenceProbe>,
        config: FederationConfig,
    ) -> Self {
        Self {
            engine,
            probe,
            config,
        }
    }

    /// Creates a federator with the engine named by `config.engine`.
    pub fn from_registry(
        registry: &EngineRegistry,
        probe: Arc<dyn ExistenceProbe>,
        config: FederationConfig,
    ) -> Result<Self> {
        let engine = registry.resolve(&config.engine)?;
        Ok(Self::new(engine, probe, config))
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Computes the globs a search would query, without querying them.
    ///
    /// The returned flag is true when the search falls back to whole-catalog
    /// globs.
    pub async fn plan(
        &self,
        root: &CatalogRoot,
        params: &SearchParams,
    ) -> Result<(ResolvedGlobs, bool)> {
        self.config.validate()?;

        let geometry = match &params.intersects {
            Some(geometry) if self.config.reduce_spatial_search => geometry,
            _ => {
                log::warn!(
                    "no spatial reduction for this search; scanning all of {root}"
                );
                let globs = fallback_globs(root, &self.config);
                let resolved = ResolvedGlobs {
                    candidates: globs.len(),
                    globs,
                    ..Default::default()
                };
                return Ok((resolved, true));
            }
        };

        let partitions = compute_candidate_partitions(geometry, &self.config.scheme)?;
        let resolved =
            build_search_globs(self.probe.as_ref(), root, &partitions, &self.config).await;
        Ok((resolved, false))
    }

    /// Runs `params` against every relevant partition under `root`.
    ///
    /// Fails only for invalid input; I/O failures are reported in the
    /// outcome's diagnostics.
    pub async fn search(&self, root: &CatalogRoot, params: &SearchParams) -> Result<SearchOutcome> {
        self.engine.validate(params)?;

        let (resolved, fallback) = self.plan(root, params).await?;
        let mut diagnostics = Diagnostics {
            candidates: resolved.candidates,
            pruned: resolved.pruned,
            probe_failures: resolved.probe_failures,
            queried: resolved.globs.len(),
            failed_globs: Vec::new(),
            fallback,
        };

        let engine = self.engine.as_ref();
        let query_timeout = self.config.query_timeout;
        let results: Vec<(String, Result<BTreeSet<String>>)> = stream::iter(resolved.globs)
            .map(|glob| async move {
                let result = match tokio::time::timeout(query_timeout, engine.query(&glob, params))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        what: format!("query against '{glob}'"),
                        after: query_timeout,
                    }),
                };
                (glob, result)
            })
            .buffer_unordered(self.config.concurrency())
            .collect()
            .await;

        let mut hrefs = BTreeSet::new();
        for (glob, result) in results {
            match result {
                Ok(found) => {
                    log::debug!("{glob}: {} hrefs", found.len());
                    hrefs.extend(found);
                }
                Err(e) => {
                    log::warn!("skipping {glob}: {e}");
                    diagnostics.failed_globs.push(GlobFailure {
                        glob,
                        error: e.to_string(),
                    });
                }
            }
        }
        diagnostics.failed_globs.sort_by(|a, b| a.glob.cmp(&b.glob));

        log::info!(
            "{} engine: {} hrefs from {} globs ({} candidates, {} pruned, {} probe failures, {} failed)",
            self.engine.name(),
            hrefs.len(),
            diagnostics.queried,
            diagnostics.candidates,
            diagnostics.pruned,
            diagnostics.probe_failures,
            diagnostics.failed_globs.len()
        );

        Ok(SearchOutcome {
            hrefs: hrefs.into_iter().collect(),
            diagnostics,
        })
    }
}
