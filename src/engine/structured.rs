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

//! Engine backed by a STAC-aware search client.

use super::{Item, QueryEngine, SearchParams, collect_data_hrefs};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One structured search: the files to read plus a STAC search body
/// (`intersects`, `filter`, `filter-lang`, `limit`, `datetime`,
/// `collections` and any passthrough keys).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredQuery {
    #[serde(rename = "href")]
    pub glob: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// Client that evaluates structured STAC searches over columnar files.
#[async_trait]
pub trait ItemSearcher: Send + Sync {
    async fn search(&self, query: &StructuredQuery) -> Result<Vec<Item>>;
}

#[async_trait]
impl<T: ItemSearcher + ?Sized> ItemSearcher for Arc<T> {
    async fn search(&self, query: &StructuredQuery) -> Result<Vec<Item>> {
        (**self).search(query).await
    }
}

/// Runs each partition query through an [`ItemSearcher`], keeping data
/// assets with the configured suffix.
pub struct StructuredEngine<C> {
    client: C,
    data_asset_suffix: String,
}

impl<C: ItemSearcher> StructuredEngine<C> {
    pub const NAME: &'static str = "structured";

    pub fn new(client: C, data_asset_suffix: impl Into<String>) -> Self {
        Self {
            client,
            data_asset_suffix: data_asset_suffix.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: ItemSearcher> QueryEngine for StructuredEngine<C> {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn query(&self, glob: &str, params: &SearchParams) -> Result<BTreeSet<String>> {
        let query = StructuredQuery {
            glob: glob.to_string(),
            body: params.to_search_body(),
        };
        let items = self.client.search(&query).await?;
        let hrefs = collect_data_hrefs(&items, &self.data_asset_suffix);
        log::debug!(
            "{glob}: {} items, {} data hrefs",
            items.len(),
            hrefs.len()
        );
        Ok(hrefs)
    }
}
