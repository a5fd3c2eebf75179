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

//! Spatial partition elimination.
//!
//! The catalog is physically split into partitions keyed by spatial region.
//! Given a search geometry, this module computes the set of partitions whose
//! extent can intersect it, so the federator only scans those.
//!
//! # Schemes
//!
//! - [`PartitionScheme::LatLonGrid`]: fixed 10°×10° tiles named by their
//!   centre, e.g. `N60W040` covers 55°N..65°N, 45°W..35°W.
//! - [`PartitionScheme::H3Grid`]: hexagonal H3 cells at a chosen resolution
//!   and overlap policy, identified by their 64-bit cell index.
//!
//! Candidate sets are [`BTreeSet`]s, so iteration order is deterministic and
//! independent of hashing.

pub mod h3;
pub mod latlon;

use crate::error::{Error, Result};
use crate::geometry::SearchGeometry;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub use latlon::LatLonTile;

/// How H3 cells are matched against a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Cells whose centroid lies inside the polygon.
    Center,
    /// Cells fully contained by the polygon.
    Full,
    /// Cells with any overlap at all.
    #[default]
    Overlap,
    /// Cells with any overlap, plus neighbouring cells whose lon/lat
    /// bounding box overlaps the polygon.
    BboxOverlap,
}

impl OverlapPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OverlapPolicy::Center => "center",
            OverlapPolicy::Full => "full",
            OverlapPolicy::Overlap => "overlap",
            OverlapPolicy::BboxOverlap => "bbox_overlap",
        }
    }
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "center" => Ok(OverlapPolicy::Center),
            "full" => Ok(OverlapPolicy::Full),
            "overlap" => Ok(OverlapPolicy::Overlap),
            "bbox_overlap" | "bbox-overlap" => Ok(OverlapPolicy::BboxOverlap),
            other => Err(Error::UnsupportedScheme(format!(
                "unknown H3 overlap policy '{other}'"
            ))),
        }
    }
}

/// Partitioning strategy of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionScheme {
    #[default]
    LatLonGrid,
    H3Grid {
        resolution: u8,
        policy: OverlapPolicy,
    },
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionScheme::LatLonGrid => write!(f, "latlon"),
            PartitionScheme::H3Grid { resolution, policy } => {
                write!(f, "h3:{resolution}:{}", policy.as_str())
            }
        }
    }
}

impl FromStr for PartitionScheme {
    type Err = Error;

    /// Parses `latlon` or `h3:<resolution>[:<policy>]`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let mut parts = lower.split(':');
        match parts.next() {
            Some("latlon") | Some("latlon-grid") | Some("latlongrid") if parts.next().is_none() => {
                Ok(PartitionScheme::LatLonGrid)
            }
            Some("h3") | Some("h3grid") => {
                let resolution = parts
                    .next()
                    .and_then(|r| r.parse::<u8>().ok())
                    .filter(|r| *r <= h3::MAX_RESOLUTION)
                    .ok_or_else(|| Error::UnsupportedScheme(s.to_string()))?;
                let policy = match parts.next() {
                    Some(p) => p.parse()?,
                    None => OverlapPolicy::default(),
                };
                if parts.next().is_some() {
                    return Err(Error::UnsupportedScheme(s.to_string()));
                }
                Ok(PartitionScheme::H3Grid { resolution, policy })
            }
            _ => Err(Error::UnsupportedScheme(s.to_string())),
        }
    }
}

/// Identifier of one spatial partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionId {
    LatLon(LatLonTile),
    H3(u64),
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionId::LatLon(tile) => tile.fmt(f),
            PartitionId::H3(cell) => write!(f, "{cell}"),
        }
    }
}

/// Computes the partitions of `scheme` that can intersect `geometry`.
///
/// Pure function of its inputs. Over-inclusion near tile edges is allowed,
/// under-inclusion is not.
pub fn compute_candidate_partitions(
    geometry: &SearchGeometry,
    scheme: &PartitionScheme,
) -> Result<BTreeSet<PartitionId>> {
    let partitions: BTreeSet<PartitionId> = match scheme {
        PartitionScheme::LatLonGrid => latlon::candidate_tiles(geometry)?
            .into_iter()
            .map(PartitionId::LatLon)
            .collect(),
        PartitionScheme::H3Grid { resolution, policy } => {
            h3::candidate_cells(geometry, *resolution, *policy)?
                .into_iter()
                .map(PartitionId::H3)
                .collect()
        }
    };
    log::debug!(
        "{} candidate partitions for scheme {scheme}",
        partitions.len()
    );
    Ok(partitions)
}
