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

//! Search configuration.
//!
//! Every field has a default matching the ITS_LIVE deployment; override in
//! code through the builder or at runtime through `CRYOFORGE_*` variables:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `CRYOFORGE_PARTITION_SCHEME` | `scheme` | `latlon` |
//! | `CRYOFORGE_MISSIONS` | `missions` (comma separated) | `landsatOLI,sentinel1,sentinel2` |
//! | `CRYOFORGE_REDUCE_SPATIAL_SEARCH` | `reduce_spatial_search` | `true` |
//! | `CRYOFORGE_FILE_EXTENSION` | `file_extension` | `parquet` |
//! | `CRYOFORGE_DATA_ASSET_SUFFIX` | `data_asset_suffix` | `.nc` |
//! | `CRYOFORGE_MAX_CONCURRENCY` | `max_concurrency` | `8` |
//! | `CRYOFORGE_PROBE_TIMEOUT_SECS` | `probe_timeout` | `10` |
//! | `CRYOFORGE_QUERY_TIMEOUT_SECS` | `query_timeout` | `120` |
//! | `CRYOFORGE_ENGINE` | `engine` | `structured` |
//! | `CRYOFORGE_S3_ANONYMOUS` | `store.anonymous` | `false` |
//! | `CRYOFORGE_S3_REGION` | `store.region` | unset |
//! | `CRYOFORGE_S3_ENDPOINT` | `store.endpoint` | unset |

use crate::error::{Error, Result};
use crate::grid::PartitionScheme;
use crate::storage::StoreOptions;
use std::str::FromStr;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Mission segments of the lat/lon catalog layout.
pub const DEFAULT_MISSIONS: [&str; 3] = ["landsatOLI", "sentinel1", "sentinel2"];

pub const DEFAULT_FILE_EXTENSION: &str = "parquet";

pub const DEFAULT_DATA_ASSET_SUFFIX: &str = ".nc";

pub const DEFAULT_ENGINE: &str = "structured";

/// Settings for planning and federating one search.
#[derive(Clone, Debug, TypedBuilder)]
pub struct FederationConfig {
    #[builder(default)]
    pub scheme: PartitionScheme,
    /// Dataset segments crossed with every lat/lon partition.
    #[builder(default = default_missions(), setter(into))]
    pub missions: Vec<String>,
    /// When false, or when no geometry is given, every search scans the
    /// whole catalog.
    #[builder(default = true)]
    pub reduce_spatial_search: bool,
    #[builder(default = DEFAULT_FILE_EXTENSION.to_string(), setter(into))]
    pub file_extension: String,
    /// Only data assets whose href ends with this suffix are returned.
    #[builder(default = DEFAULT_DATA_ASSET_SUFFIX.to_string(), setter(into))]
    pub data_asset_suffix: String,
    #[builder(default = 8)]
    pub max_concurrency: usize,
    #[builder(default = Duration::from_secs(10))]
    pub probe_timeout: Duration,
    #[builder(default = Duration::from_secs(120))]
    pub query_timeout: Duration,
    /// Name of the registered engine to run queries with.
    #[builder(default = DEFAULT_ENGINE.to_string(), setter(into))]
    pub engine: String,
    #[builder(default)]
    pub store: StoreOptions,
}

fn default_missions() -> Vec<String> {
    DEFAULT_MISSIONS.iter().map(|m| m.to_string()).collect()
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FederationConfig {
    /// Worker limit for fan-out; zero is treated as one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Rejects settings that would make every search come back empty.
    ///
    /// The lat/lon layout keeps data under `<root>/<mission>/<tile>`, so it
    /// needs at least one mission.
    pub fn validate(&self) -> Result<()> {
        if self.scheme == PartitionScheme::LatLonGrid && self.missions.is_empty() {
            return Err(Error::InvalidConfig(
                "the latlon scheme needs at least one mission".into(),
            ));
        }
        Ok(())
    }

    /// Reads the configuration from `CRYOFORGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// missing keys. Unparseable values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("CRYOFORGE_PARTITION_SCHEME") {
            config.scheme = v.parse()?;
        }
        log::debug!("CRYOFORGE_PARTITION_SCHEME={}", config.scheme);

        if let Some(v) = get("CRYOFORGE_MISSIONS") {
            config.missions = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if config.missions.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "CRYOFORGE_MISSIONS={v:?} names no missions"
                )));
            }
        }
        log::debug!("CRYOFORGE_MISSIONS={}", config.missions.join(","));

        if let Some(v) = get("CRYOFORGE_REDUCE_SPATIAL_SEARCH") {
            config.reduce_spatial_search = parse_value("CRYOFORGE_REDUCE_SPATIAL_SEARCH", &v)?;
        }
        log::debug!(
            "CRYOFORGE_REDUCE_SPATIAL_SEARCH={}",
            config.reduce_spatial_search
        );

        if let Some(v) = get("CRYOFORGE_FILE_EXTENSION") {
            config.file_extension = v.trim_start_matches('.').to_string();
        }
        log::debug!("CRYOFORGE_FILE_EXTENSION={}", config.file_extension);

        if let Some(v) = get("CRYOFORGE_DATA_ASSET_SUFFIX") {
            config.data_asset_suffix = v;
        }
        log::debug!("CRYOFORGE_DATA_ASSET_SUFFIX={}", config.data_asset_suffix);

        if let Some(v) = get("CRYOFORGE_MAX_CONCURRENCY") {
            config.max_concurrency = parse_value("CRYOFORGE_MAX_CONCURRENCY", &v)?;
        }
        log::debug!("CRYOFORGE_MAX_CONCURRENCY={}", config.max_concurrency);

        if let Some(v) = get("CRYOFORGE_PROBE_TIMEOUT_SECS") {
            config.probe_timeout =
                Duration::from_secs(parse_value("CRYOFORGE_PROBE_TIMEOUT_SECS", &v)?);
        }
        log::debug!("CRYOFORGE_PROBE_TIMEOUT_SECS={:?}", config.probe_timeout);

        if let Some(v) = get("CRYOFORGE_QUERY_TIMEOUT_SECS") {
            config.query_timeout =
                Duration::from_secs(parse_value("CRYOFORGE_QUERY_TIMEOUT_SECS", &v)?);
        }
        log::debug!("CRYOFORGE_QUERY_TIMEOUT_SECS={:?}", config.query_timeout);

        if let Some(v) = get("CRYOFORGE_ENGINE") {
            config.engine = v.to_ascii_lowercase();
        }
        log::debug!("CRYOFORGE_ENGINE={}", config.engine);

        if let Some(v) = get("CRYOFORGE_S3_ANONYMOUS") {
            config.store.anonymous = parse_value("CRYOFORGE_S3_ANONYMOUS", &v)?;
        }
        log::debug!("CRYOFORGE_S3_ANONYMOUS={}", config.store.anonymous);

        config.store.region = get("CRYOFORGE_S3_REGION");
        log::debug!("CRYOFORGE_S3_REGION={:?}", config.store.region);

        config.store.endpoint = get("CRYOFORGE_S3_ENDPOINT");
        log::debug!("CRYOFORGE_S3_ENDPOINT={:?}", config.store.endpoint);

        Ok(config)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::OverlapPolicy;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FederationConfig::default();
        assert_eq!(config.scheme, PartitionScheme::LatLonGrid);
        assert_eq!(config.missions, vec!["landsatOLI", "sentinel1", "sentinel2"]);
        assert!(config.reduce_spatial_search);
        assert_eq!(config.file_extension, "parquet");
        assert_eq!(config.data_asset_suffix, ".nc");
        assert_eq!(config.concurrency(), 8);
        assert_eq!(config.engine, "structured");
        assert!(!config.store.anonymous);
    }

    #[test]
    fn test_zero_concurrency_means_one() {
        let config = FederationConfig::builder().max_concurrency(0).build();
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = FederationConfig::from_lookup(lookup(&[
            ("CRYOFORGE_PARTITION_SCHEME", "h3:2:center"),
            ("CRYOFORGE_MISSIONS", " sentinel1 , ,sentinel2"),
            ("CRYOFORGE_REDUCE_SPATIAL_SEARCH", "false"),
            ("CRYOFORGE_FILE_EXTENSION", ".geoparquet"),
            ("CRYOFORGE_MAX_CONCURRENCY", "32"),
            ("CRYOFORGE_QUERY_TIMEOUT_SECS", "5"),
            ("CRYOFORGE_ENGINE", "SQL"),
            ("CRYOFORGE_S3_ANONYMOUS", "true"),
            ("CRYOFORGE_S3_REGION", "us-west-2"),
        ]))
        .unwrap();
        assert_eq!(
            config.scheme,
            PartitionScheme::H3Grid {
                resolution: 2,
                policy: OverlapPolicy::Center
            }
        );
        assert_eq!(config.missions, vec!["sentinel1", "sentinel2"]);
        assert!(!config.reduce_spatial_search);
        assert_eq!(config.file_extension, "geoparquet");
        assert_eq!(config.max_concurrency, 32);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.engine, "sql");
        assert!(config.store.anonymous);
        assert_eq!(config.store.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.store.endpoint, None);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let err =
            FederationConfig::from_lookup(lookup(&[("CRYOFORGE_MAX_CONCURRENCY", "many")]))
                .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");

        let err = FederationConfig::from_lookup(lookup(&[("CRYOFORGE_PARTITION_SCHEME", "s2")]))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)), "{err}");
    }

    #[test]
    fn test_blank_mission_list_is_rejected() {
        let err = FederationConfig::from_lookup(lookup(&[("CRYOFORGE_MISSIONS", " , ")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_needs_missions_for_latlon() {
        assert!(FederationConfig::default().validate().is_ok());

        let config = FederationConfig::builder().missions(Vec::<String>::new()).build();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");

        let config = FederationConfig::builder()
            .scheme(PartitionScheme::H3Grid {
                resolution: 3,
                policy: OverlapPolicy::Overlap,
            })
            .missions(Vec::<String>::new())
            .build();
        assert!(config.validate().is_ok());
    }
}
