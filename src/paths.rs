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

//! Resolution of candidate partitions into existing search globs.
//!
//! Catalog layouts:
//!
//! - lat/lon grid: `<root>/<mission>/<tile>/...`, e.g.
//!   `s3://its-live-data/test-space/stac/geoparquet/latlon/sentinel2/N60W040/`
//! - H3 grid: `<root>/<cell>/...`
//!
//! Candidates without any object below them are pruned, so empty missions
//! and tiles never reach a query engine.

use crate::config::FederationConfig;
use crate::error::Error;
use crate::grid::{PartitionId, PartitionScheme};
use crate::storage::{CatalogPath, CatalogRoot, ExistenceProbe};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::collections::BTreeSet;

/// Existing search globs plus what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedGlobs {
    /// Globs over paths that hold data, in candidate order.
    pub globs: Vec<String>,
    /// Number of candidate paths before pruning.
    pub candidates: usize,
    /// Candidates confirmed to hold no objects.
    pub pruned: usize,
    /// Candidates whose probe failed or timed out; treated as non-existent.
    pub probe_failures: usize,
}

/// Candidate paths for `partitions`, before any existence check.
///
/// Lat/lon partitions are crossed with every mission (partition order outer,
/// mission order inner); H3 partitions sit directly under the root.
pub fn candidate_paths(
    root: &CatalogRoot,
    scheme: &PartitionScheme,
    partitions: &BTreeSet<PartitionId>,
    missions: &[String],
) -> Vec<CatalogPath> {
    match scheme {
        PartitionScheme::LatLonGrid => partitions
            .iter()
            .flat_map(|partition| {
                let name = partition.to_string();
                missions
                    .iter()
                    .map(move |mission| root.child(&[mission.as_str(), name.as_str()]))
            })
            .collect(),
        PartitionScheme::H3Grid { .. } => partitions
            .iter()
            .map(|partition| root.child(&[partition.to_string().as_str()]))
            .collect(),
    }
}

/// Globs covering the whole catalog, used when the search is not spatially
/// reduced.
pub fn fallback_globs(root: &CatalogRoot, config: &FederationConfig) -> Vec<String> {
    match config.scheme {
        PartitionScheme::LatLonGrid => config
            .missions
            .iter()
            .map(|mission| root.child(&[mission.as_str()]).glob(&config.file_extension))
            .collect(),
        PartitionScheme::H3Grid { .. } => vec![root.glob(&config.file_extension)],
    }
}

/// Probes every candidate path of `partitions` and returns globs for those
/// holding data.
///
/// Probes run concurrently up to `config.max_concurrency`, each bounded by
/// `config.probe_timeout`. Failed probes are logged and counted, never raised.
pub async fn build_search_globs(
    probe: &dyn ExistenceProbe,
    root: &CatalogRoot,
    partitions: &BTreeSet<PartitionId>,
    config: &FederationConfig,
) -> ResolvedGlobs {
    let candidates = candidate_paths(root, &config.scheme, partitions, &config.missions);
    let mut resolved = ResolvedGlobs {
        candidates: candidates.len(),
        ..Default::default()
    };

    let probe_timeout = config.probe_timeout;
    let outcomes: Vec<(CatalogPath, Result<bool, Error>)> = stream::iter(candidates)
        .map(|path| async move {
            let outcome = match tokio::time::timeout(probe_timeout, probe.exists(&path)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    what: format!("existence check for '{}'", path.location),
                    after: probe_timeout,
                }),
            };
            (path, outcome)
        })
        .buffered(config.concurrency())
        .collect()
        .await;

    for (path, outcome) in outcomes {
        match outcome {
            Ok(true) => resolved.globs.push(path.glob(&config.file_extension)),
            Ok(false) => {
                log::debug!("pruned empty path {}", path.location);
                resolved.pruned += 1;
            }
            Err(e) => {
                log::warn!("treating {} as empty: {e}", path.location);
                resolved.probe_failures += 1;
            }
        }
    }

    log::debug!(
        "{} of {} candidate paths hold data ({} pruned, {} probe failures)",
        resolved.globs.len(),
        resolved.candidates,
        resolved.pruned,
        resolved.probe_failures
    );
    resolved
}
