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

//! # cryoforge search
//!
//! Spatial query planning and federation over a STAC catalog stored as many
//! small stac-geoparquet files, such as the ITS_LIVE granule catalog.
//!
//! Scanning the whole catalog for every query is slow. This crate works out
//! which spatial partitions a query can touch, keeps only the partition paths
//! that hold data, sends one query per partition to a pluggable engine, and
//! merges the answers into one sorted, deduplicated list of asset hrefs.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use cryoforge_search::config::FederationConfig;
//! use cryoforge_search::engine::{ItemSearcher, Item, StructuredEngine, StructuredQuery};
//! use cryoforge_search::engine::SearchParams;
//! use cryoforge_search::error::Result;
//! use cryoforge_search::federation::Federator;
//! use cryoforge_search::filter::FilterBuilder;
//! use cryoforge_search::geometry::SearchGeometry;
//! use cryoforge_search::storage::{CatalogRoot, ObjectStoreProbe};
//!
//! struct MyClient;
//!
//! #[async_trait]
//! impl ItemSearcher for MyClient {
//!     async fn search(&self, query: &StructuredQuery) -> Result<Vec<Item>> {
//!         // evaluate `query.body` over the files matching `query.glob`
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = FederationConfig::default();
//!     let root = CatalogRoot::parse("s3://its-live-data/test-space/stac/geoparquet/latlon")?;
//!     let probe = Arc::new(ObjectStoreProbe::for_root(&root, &config.store)?);
//!     let engine = Arc::new(StructuredEngine::new(MyClient, &config.data_asset_suffix));
//!     let federator = Federator::new(engine, probe, config);
//!
//!     let params = SearchParams::builder()
//!         .intersects(SearchGeometry::from_bbox([-52.0, 58.0, -38.0, 62.0])?)
//!         .filter(FilterBuilder::property("percent_valid_pixels").gte(50))
//!         .build();
//!     let outcome = federator.search(&root, &params).await?;
//!     for href in &outcome.hrefs {
//!         println!("{href}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//! - [`grid`]: candidate partitions for a geometry (10° lat/lon tiles or H3 cells)
//! - [`filter`]: CQL2-JSON filter trees and their SQL translation
//! - [`storage`] and [`paths`]: catalog roots, existence probes, search globs
//! - [`engine`]: the query engine seam plus the structured, SQL and STAC API clients
//! - [`federation`]: fan-out, merge and diagnostics

#![allow(clippy::result_large_err)]

pub mod config;
pub mod engine;
pub mod error;
pub mod federation;
pub mod filter;
pub mod geometry;
pub mod grid;
pub mod paths;
pub mod storage;

pub use config::FederationConfig;
pub use error::{Error, Result};
pub use federation::{Diagnostics, Federator, SearchOutcome};

#[cfg(test)]
#[macro_use]
extern crate quickcheck;
