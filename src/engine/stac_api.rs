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

//! Client for a STAC API `/search` endpoint.
//!
//! This searches the hosted catalog directly instead of the partitioned
//! files, paging through `next` links until enough items are collected.
//!
//! # Example
//!
//! ```no_run
//! use cryoforge_search::engine::{SearchParams, StacApiClient};
//! use cryoforge_search::filter::FilterBuilder;
//! use cryoforge_search::geometry::SearchGeometry;
//!
//! # async fn example() -> cryoforge_search::error::Result<()> {
//! let client = StacApiClient::new("https://stac.itslive.cloud/")?;
//! let params = SearchParams::builder()
//!     .collections(vec!["itslive-granules".to_string()])
//!     .intersects(SearchGeometry::from_bbox([-49.8, 69.0, -49.0, 69.3])?)
//!     .filter(FilterBuilder::property("percent_valid_pixels").gte(90))
//!     .build();
//!
//! for href in client.search_hrefs(&params, 100, ".nc").await? {
//!     println!("{href}");
//! }
//! # Ok(())
//! # }
//! ```

use super::{Item, SearchParams, collect_data_hrefs};
use crate::error::Result;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Public ITS_LIVE STAC API.
pub const DEFAULT_STAC_API_URL: &str = "https://stac.itslive.cloud/";

/// Collection holding the velocity image pair granules.
pub const ITSLIVE_GRANULES: &str = "itslive-granules";

/// Page size requested when the parameters do not set one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ItemPage {
    #[serde(default)]
    features: Vec<Item>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
struct Link {
    rel: String,
    href: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<Map<String, Value>>,
    #[serde(default)]
    merge: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Get(Url),
    Post(Url, Map<String, Value>),
}

/// Follow-up request for the page after the one just read, if any.
fn next_request(links: &[Link], previous_body: &Map<String, Value>) -> Result<Option<PageRequest>> {
    let Some(link) = links.iter().find(|l| l.rel == "next") else {
        return Ok(None);
    };
    let url = Url::parse(&link.href)?;
    let is_post = link
        .method
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("POST"));
    if !is_post {
        return Ok(Some(PageRequest::Get(url)));
    }

    let body = match &link.body {
        Some(body) if link.merge => {
            let mut merged = previous_body.clone();
            merged.extend(body.clone());
            merged
        }
        Some(body) => body.clone(),
        None => previous_body.clone(),
    };
    Ok(Some(PageRequest::Post(url, body)))
}

/// STAC API search client.
#[derive(Clone, Debug)]
pub struct StacApiClient {
    http_client: ReqwestClient,
    search_url: Url,
}

impl StacApiClient {
    /// Creates a client for the API rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Self::with_http_client(base_url, http_client)
    }

    /// Creates a client using a pre-configured HTTP client.
    pub fn with_http_client(base_url: &str, http_client: ReqwestClient) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http_client,
            search_url: base.join("search")?,
        })
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }

    /// Searches the API, following `next` links until `max_items` items are
    /// collected or the results run out.
    pub async fn search(&self, params: &SearchParams, max_items: usize) -> Result<Vec<Item>> {
        let mut body = params.to_search_body();
        if !body.contains_key("limit") {
            body.insert(
                "limit".into(),
                Value::from(DEFAULT_PAGE_SIZE.min(max_items.max(1))),
            );
        }

        let mut items = Vec::new();
        let mut request = Some(PageRequest::Post(self.search_url.clone(), body));
        while let Some(current) = request.take() {
            if items.len() >= max_items {
                break;
            }
            let (page, sent_body) = match current {
                PageRequest::Get(url) => {
                    log::debug!("GET {url}");
                    let page = self.fetch(self.http_client.get(url)).await?;
                    (page, Map::new())
                }
                PageRequest::Post(url, body) => {
                    log::debug!("POST {url}");
                    let page = self.fetch(self.http_client.post(url).json(&body)).await?;
                    (page, body)
                }
            };
            if page.features.is_empty() {
                break;
            }
            items.extend(page.features);
            request = next_request(&page.links, &sent_body)?;
        }

        items.truncate(max_items);
        log::info!("STAC API returned {} items", items.len());
        Ok(items)
    }

    /// Sorted, deduplicated data hrefs ending with `suffix` from [`search`](Self::search).
    pub async fn search_hrefs(
        &self,
        params: &SearchParams,
        max_items: usize,
        suffix: &str,
    ) -> Result<Vec<String>> {
        let items = self.search(params, max_items).await?;
        Ok(collect_data_hrefs(&items, suffix).into_iter().collect())
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<ItemPage> {
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<ItemPage>().await?)
    }
}
