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

use clap::{Args, Parser, Subcommand};
use cryoforge_search::config::FederationConfig;
use cryoforge_search::engine::stac_api::{DEFAULT_STAC_API_URL, ITSLIVE_GRANULES};
use cryoforge_search::engine::{DateRange, SearchParams, StacApiClient};
use cryoforge_search::filter::{FilterBuilder, FilterExpr, translate};
use cryoforge_search::geometry::SearchGeometry;
use cryoforge_search::grid::{PartitionScheme, compute_candidate_partitions};
use cryoforge_search::paths::build_search_globs;
use cryoforge_search::storage::{CatalogRoot, ObjectStoreProbe};
use serde_json::json;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Plan and run searches over the partitioned ITS_LIVE STAC catalog.
///
/// Defaults come from the CRYOFORGE_* environment variables.
#[derive(Parser)]
#[command(name = "cryoforge-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the partitions a geometry can intersect.
    Partitions {
        #[command(flatten)]
        area: AreaArgs,
        /// Partition scheme: latlon or h3:<resolution>[:<policy>]
        #[arg(long)]
        scheme: Option<String>,
    },
    /// Print the search globs that hold data for a geometry.
    Globs {
        /// Catalog root, e.g. s3://its-live-data/test-space/stac/geoparquet/latlon
        root: String,
        #[command(flatten)]
        area: AreaArgs,
        #[arg(long)]
        scheme: Option<String>,
        /// Comma separated mission segments.
        #[arg(long, value_delimiter = ',')]
        missions: Option<Vec<String>>,
    },
    /// Translate a CQL2-JSON filter into a SQL predicate.
    Translate {
        /// Filter as JSON text.
        filter: String,
    },
    /// Search a STAC API and print data hrefs as a JSON array.
    StacSearch {
        #[arg(long, default_value = DEFAULT_STAC_API_URL)]
        url: String,
        #[command(flatten)]
        area: AreaArgs,
        #[arg(long = "collection", default_value = ITSLIVE_GRANULES)]
        collections: Vec<String>,
        #[arg(long, default_value_t = 100)]
        max_items: usize,
        /// Keep items with at least this percentage of valid pixels.
        #[arg(long)]
        percent_valid_pixels: Option<u32>,
        /// Interval such as 2020-01-01/2020-12-31 or 2022-06-01/..
        #[arg(long)]
        datetime: Option<String>,
        /// Data asset suffix to keep.
        #[arg(long, default_value = ".nc")]
        suffix: String,
    },
}

#[derive(Args)]
struct AreaArgs {
    /// GeoJSON geometry or Feature, inline or as a file path.
    #[arg(long, conflicts_with = "bbox")]
    geometry: Option<String>,
    /// min_lon,min_lat,max_lon,max_lat
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,
}

impl AreaArgs {
    fn geometry(&self) -> CliResult<SearchGeometry> {
        if let Some(bbox) = &self.bbox {
            let bbox: [f64; 4] = bbox
                .as_slice()
                .try_into()
                .map_err(|_| "--bbox takes exactly four numbers")?;
            return Ok(SearchGeometry::from_bbox(bbox)?);
        }
        match &self.geometry {
            Some(text) if text.trim_start().starts_with('{') => {
                Ok(SearchGeometry::from_geojson_str(text)?)
            }
            Some(path) => Ok(SearchGeometry::from_geojson_str(
                &std::fs::read_to_string(path)?,
            )?),
            None => Err("one of --geometry or --bbox is required".into()),
        }
    }
}

fn config_with(
    scheme: Option<&str>,
    missions: Option<Vec<String>>,
) -> CliResult<FederationConfig> {
    let mut config = FederationConfig::from_env()?;
    if let Some(scheme) = scheme {
        config.scheme = scheme.parse::<PartitionScheme>()?;
    }
    if let Some(missions) = missions {
        config.missions = missions;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> CliResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Partitions { area, scheme } => {
            let config = config_with(scheme.as_deref(), None)?;
            let partitions = compute_candidate_partitions(&area.geometry()?, &config.scheme)?;
            for partition in partitions {
                println!("{partition}");
            }
        }
        Command::Globs {
            root,
            area,
            scheme,
            missions,
        } => {
            let config = config_with(scheme.as_deref(), missions)?;
            let root = CatalogRoot::parse(&root)?;
            let probe = ObjectStoreProbe::for_root(&root, &config.store)?;
            let partitions = compute_candidate_partitions(&area.geometry()?, &config.scheme)?;
            let resolved = build_search_globs(&probe, &root, &partitions, &config).await;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Command::Translate { filter } => {
            let value: serde_json::Value = serde_json::from_str(&filter)?;
            match translate(&FilterExpr::from_cql2_json(&value)?)? {
                Some(predicate) => println!("{predicate}"),
                None => log::info!("empty filter, no predicate"),
            }
        }
        Command::StacSearch {
            url,
            area,
            collections,
            max_items,
            percent_valid_pixels,
            datetime,
            suffix,
        } => {
            let mut params = SearchParams::builder()
                .intersects(area.geometry()?)
                .collections(collections)
                .build();
            if let Some(percent) = percent_valid_pixels {
                params.filter = Some(FilterBuilder::property("percent_valid_pixels").gte(percent));
            }
            if let Some(datetime) = datetime {
                params.datetime = Some(datetime.parse::<DateRange>()?);
            }

            let client = StacApiClient::new(&url)?;
            log::info!("searching {} for {:?}", client.search_url(), params.collections);
            let hrefs = client.search_hrefs(&params, max_items, &suffix).await?;
            println!("{}", serde_json::to_string_pretty(&json!(hrefs))?);
        }
    }

    Ok(())
}
