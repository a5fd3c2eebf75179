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

//! Query engines.
//!
//! An engine runs one search against one partition glob and returns the data
//! asset hrefs it found. Two engines ship with the crate:
//!
//! - [`StructuredEngine`]: hands the filter tree and geometry to a STAC-aware
//!   client ([`ItemSearcher`]) and extracts hrefs from the returned items.
//! - [`SqlEngine`]: renders one SQL statement per glob and hands it to a
//!   columnar SQL executor ([`SqlExecutor`]).
//!
//! Engines are looked up by name in an [`EngineRegistry`].

pub mod sql;
pub mod stac_api;
pub mod structured;

use crate::error::{Error, Result};
use crate::filter::FilterExpr;
use crate::geometry::SearchGeometry;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use typed_builder::TypedBuilder;

pub use sql::{SqlEngine, SqlExecutor, build_sql_query};
pub use stac_api::StacApiClient;
pub use structured::{ItemSearcher, StructuredEngine, StructuredQuery};

/// Executes a search against a single partition glob.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Registry name of the engine.
    fn name(&self) -> &str;

    /// Rejects parameters this engine can never run, before any I/O.
    fn validate(&self, _params: &SearchParams) -> Result<()> {
        Ok(())
    }

    /// Data asset hrefs matching `params` in the files under `glob`.
    async fn query(&self, glob: &str, params: &SearchParams) -> Result<BTreeSet<String>>;
}

/// Engines available to a search, keyed by name.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn QueryEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `engine` under its own name, replacing any previous one.
    pub fn register(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engines.insert(engine.name().to_ascii_lowercase(), engine);
        self
    }

    /// Looks up an engine by name, case-insensitively.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn QueryEngine>> {
        self.engines
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnsupportedEngine(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Closed or half-open time interval, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        match (start, end) {
            (None, None) => Err(Error::InvalidDatetime(
                "both ends of the interval are open".into(),
            )),
            (Some(s), Some(e)) if s > e => Err(Error::InvalidDatetime(format!(
                "start {s} is after end {e}"
            ))),
            _ => Ok(Self { start, end }),
        }
    }
}

impl fmt::Display for DateRange {
    /// STAC interval form, `..` marking an open end.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |d: Option<DateTime<Utc>>| match d {
            Some(d) => d.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            None => "..".to_string(),
        };
        write!(f, "{}/{}", side(self.start), side(self.end))
    }
}

impl FromStr for DateRange {
    type Err = Error;

    /// Parses `start/end` with `..` or an empty side for an open end. Each
    /// side is RFC 3339 or a plain `YYYY-MM-DD` date. A single instant is a
    /// zero-length interval.
    fn from_str(s: &str) -> Result<Self> {
        let parse_side = |side: &str| -> Result<Option<DateTime<Utc>>> {
            let side = side.trim();
            if side.is_empty() || side == ".." {
                return Ok(None);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(side) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            NaiveDate::parse_from_str(side, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Some(dt.and_utc()))
                .ok_or_else(|| Error::InvalidDatetime(format!("cannot parse '{side}'")))
        };

        match s.split_once('/') {
            Some((start, end)) => DateRange::new(parse_side(start)?, parse_side(end)?),
            None => {
                let instant = parse_side(s)?;
                DateRange::new(instant, instant)
            }
        }
    }
}

/// Parameters of one logical search, shared by every partition query.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct SearchParams {
    #[builder(default, setter(strip_option))]
    pub filter: Option<FilterExpr>,
    /// Spatial constraint; also drives partition elimination.
    #[builder(default, setter(strip_option))]
    pub intersects: Option<SearchGeometry>,
    /// Page size for paged engines; SQL statements ignore it.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub datetime: Option<DateRange>,
    #[builder(default, setter(into))]
    pub collections: Vec<String>,
    /// Extra API parameters, forwarded untouched by the structured engine.
    #[builder(default)]
    pub extra: Map<String, Value>,
}

impl SearchParams {
    /// The filter, unless it is absent or an empty conjunction.
    pub fn effective_filter(&self) -> Option<&FilterExpr> {
        self.filter.as_ref().filter(|f| !f.is_empty())
    }

    /// STAC API `/search` request body for these parameters.
    pub fn to_search_body(&self) -> Map<String, Value> {
        let mut body = self.extra.clone();
        if !self.collections.is_empty() {
            body.insert("collections".into(), Value::from(self.collections.clone()));
        }
        if let Some(geometry) = &self.intersects {
            body.insert("intersects".into(), geometry.to_geojson());
        }
        if let Some(filter) = self.effective_filter() {
            body.insert("filter".into(), filter.to_cql2_json());
            body.insert("filter-lang".into(), Value::from("cql2-json"));
        }
        if let Some(limit) = self.limit {
            body.insert("limit".into(), Value::from(limit));
        }
        if let Some(datetime) = &self.datetime {
            body.insert("datetime".into(), Value::from(datetime.to_string()));
        }
        body
    }
}

/// STAC asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Asset {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// STAC item, as returned by the engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
}

impl Item {
    /// Hrefs of assets with the `data` role whose href ends with `suffix`.
    pub fn data_hrefs<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.assets
            .values()
            .filter(move |asset| asset.has_role("data") && asset.href.ends_with(suffix))
            .map(|asset| asset.href.as_str())
    }
}

/// Collects the data hrefs of `items` into a sorted set.
pub fn collect_data_hrefs<'a, I>(items: I, suffix: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut hrefs = BTreeSet::new();
    for item in items {
        hrefs.extend(item.data_hrefs(suffix).map(String::from));
    }
    hrefs
}
