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

//! Engine backed by a SQL executor over stac-geoparquet files.
//!
//! Each partition is queried with a single statement in the DuckDB spatial
//! dialect:
//!
//! ```sql
//! SELECT assets.data.href AS href
//! FROM read_parquet('s3://bucket/latlon/sentinel2/N60W040/**/*.parquet', union_by_name = true)
//! WHERE ST_Intersects(geometry, ST_GeomFromGeoJSON('{"type":"Polygon",...}'))
//!   AND (percent_valid_pixels >= 50)
//! ```

use super::{QueryEngine, SearchParams};
use crate::error::{Error, Result};
use crate::filter::translator::{quote_string, translate};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Name of the result column holding asset hrefs.
pub const HREF_COLUMN: &str = "href";

/// Columnar SQL engine able to read parquet globs.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs `sql` and returns its rows keyed by column name.
    async fn execute(&self, sql: &str) -> Result<Vec<Map<String, Value>>>;
}

#[async_trait]
impl<T: SqlExecutor + ?Sized> SqlExecutor for Arc<T> {
    async fn execute(&self, sql: &str) -> Result<Vec<Map<String, Value>>> {
        (**self).execute(sql).await
    }
}

/// Builds the statement selecting data asset hrefs from `glob`.
///
/// Clauses are only emitted for the constraints present in `params`. A
/// statement returns every matching row, so the `limit` page size and the
/// `extra` API parameters have no effect here.
pub fn build_sql_query(glob: &str, params: &SearchParams) -> Result<String> {
    let mut conditions = Vec::new();

    if let Some(geometry) = &params.intersects {
        let geojson = serde_json::to_string(&geometry.to_geojson())?;
        conditions.push(format!(
            "ST_Intersects(geometry, ST_GeomFromGeoJSON({}))",
            quote_string(&geojson)
        ));
    }
    if let Some(filter) = params.effective_filter() {
        if let Some(predicate) = translate(filter)? {
            conditions.push(format!("({predicate})"));
        }
    }
    if let Some(range) = &params.datetime {
        if let Some(start) = range.start {
            conditions.push(format!("datetime >= TIMESTAMPTZ '{}'", start.to_rfc3339()));
        }
        if let Some(end) = range.end {
            conditions.push(format!("datetime <= TIMESTAMPTZ '{}'", end.to_rfc3339()));
        }
    }
    if !params.collections.is_empty() {
        let list: Vec<String> = params.collections.iter().map(|c| quote_string(c)).collect();
        conditions.push(format!("collection IN ({})", list.join(", ")));
    }

    let mut sql = format!(
        "SELECT assets.data.href AS {HREF_COLUMN} FROM read_parquet({}, union_by_name = true)",
        quote_string(glob)
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    Ok(sql)
}

/// Runs each partition query as one SQL statement.
///
/// There is no paging: [`SearchParams::limit`] and [`SearchParams::extra`]
/// only apply to the structured engine.
pub struct SqlEngine<X> {
    executor: X,
    data_asset_suffix: String,
}

impl<X: SqlExecutor> SqlEngine<X> {
    pub const NAME: &'static str = "sql";

    pub fn new(executor: X, data_asset_suffix: impl Into<String>) -> Self {
        Self {
            executor,
            data_asset_suffix: data_asset_suffix.into(),
        }
    }
}

#[async_trait]
impl<X: SqlExecutor> QueryEngine for SqlEngine<X> {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// The filter must translate; otherwise every partition would fail the
    /// same way.
    fn validate(&self, params: &SearchParams) -> Result<()> {
        if let Some(filter) = params.effective_filter() {
            translate(filter)?;
        }
        Ok(())
    }

    async fn query(&self, glob: &str, params: &SearchParams) -> Result<BTreeSet<String>> {
        let sql = build_sql_query(glob, params)?;
        log::debug!("{sql}");
        let rows = self.executor.execute(&sql).await?;

        let mut hrefs = BTreeSet::new();
        for row in rows {
            match row.get(HREF_COLUMN) {
                Some(Value::String(href)) if href.ends_with(&self.data_asset_suffix) => {
                    hrefs.insert(href.clone());
                }
                Some(Value::String(_)) | Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(Error::partition_query(
                        glob,
                        format!("'{HREF_COLUMN}' column holds a non-string value: {other}"),
                    ));
                }
            }
        }
        Ok(hrefs)
    }
}
