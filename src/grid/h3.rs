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

//! H3 cell coverage of a search geometry.

use super::OverlapPolicy;
use crate::error::{Error, Result};
use crate::geometry::SearchGeometry;
use geo_types::{Coord, Polygon, Rect};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::BTreeSet;

/// Finest H3 resolution.
pub const MAX_RESOLUTION: u8 = 15;

impl OverlapPolicy {
    /// Tiler mode for the policy. `BboxOverlap` starts from the covering set
    /// and widens it in [`candidate_cells`].
    fn containment_mode(self) -> ContainmentMode {
        match self {
            OverlapPolicy::Center => ContainmentMode::ContainsCentroid,
            OverlapPolicy::Full => ContainmentMode::ContainsBoundary,
            OverlapPolicy::Overlap => ContainmentMode::IntersectsBoundary,
            OverlapPolicy::BboxOverlap => ContainmentMode::Covers,
        }
    }
}

/// Cells at `resolution` covering `geometry` under `policy`, as raw indexes.
///
/// Points map to their containing cell whatever the policy.
pub fn candidate_cells(
    geometry: &SearchGeometry,
    resolution: u8,
    policy: OverlapPolicy,
) -> Result<BTreeSet<u64>> {
    let resolution = Resolution::try_from(resolution)
        .map_err(|_| Error::UnsupportedScheme(format!("h3 resolution {resolution}")))?;

    let mut cells = BTreeSet::new();
    for point in geometry.points() {
        let ll = LatLng::new(point.y(), point.x())
            .map_err(|e| Error::Geometry(format!("point cannot be indexed: {e}")))?;
        cells.insert(u64::from(ll.to_cell(resolution)));
    }

    let polygons = geometry.polygons();
    if polygons.is_empty() {
        return Ok(cells);
    }

    let covered = tile(&polygons, resolution, policy.containment_mode())?;
    if policy != OverlapPolicy::BboxOverlap {
        cells.extend(covered.into_iter().map(u64::from));
        return Ok(cells);
    }

    // Every overlapping cell, plus neighbours whose bounds reach the geometry.
    let overlapping = tile(&polygons, resolution, ContainmentMode::IntersectsBoundary)?;
    cells.extend(overlapping.iter().copied().map(u64::from));
    let ring: BTreeSet<CellIndex> = covered
        .iter()
        .flat_map(|cell| cell.grid_disk::<Vec<_>>(1))
        .collect();
    for cell in ring {
        if !overlapping.contains(&cell)
            && geometry.intersects_polygon(&cell_bounds(cell).to_polygon())
        {
            cells.insert(u64::from(cell));
        }
    }
    Ok(cells)
}

fn tile(
    polygons: &[Polygon<f64>],
    resolution: Resolution,
    mode: ContainmentMode,
) -> Result<BTreeSet<CellIndex>> {
    let mut tiler = TilerBuilder::new(resolution).containment_mode(mode).build();
    for polygon in polygons {
        tiler
            .add(polygon.clone())
            .map_err(|e| Error::Geometry(format!("polygon cannot be tiled: {e}")))?;
    }
    Ok(tiler.into_coverage().collect())
}

/// Lon/lat bounding box of a cell's boundary.
fn cell_bounds(cell: CellIndex) -> Rect<f64> {
    let boundary = cell.boundary();
    let mut min = Coord {
        x: f64::MAX,
        y: f64::MAX,
    };
    let mut max = Coord {
        x: f64::MIN,
        y: f64::MIN,
    };
    for vertex in boundary.iter() {
        min.x = min.x.min(vertex.lng());
        min.y = min.y.min(vertex.lat());
        max.x = max.x.max(vertex.lng());
        max.y = max.y.max(vertex.lat());
    }
    Rect::new(min, max)
}

/// Parses a cell token (hex string or decimal index) into its raw index.
pub fn parse_cell(token: &str) -> Result<u64> {
    let cell = match token.parse::<u64>() {
        Ok(raw) => CellIndex::try_from(raw).ok(),
        Err(_) => token.parse::<CellIndex>().ok(),
    };
    cell.map(u64::from)
        .ok_or_else(|| Error::Geometry(format!("'{token}' is not an H3 cell")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn test_point_maps_to_single_cell() {
        let geom = SearchGeometry::Point(Point::new(-49.5, 69.2));
        let cells = candidate_cells(&geom, 3, OverlapPolicy::Overlap).unwrap();
        assert_eq!(cells.len(), 1);
        let cell = CellIndex::try_from(*cells.iter().next().unwrap()).unwrap();
        assert_eq!(cell.resolution(), Resolution::Three);
    }

    #[test]
    fn test_overlap_is_superset_of_center() {
        let geom = SearchGeometry::from_bbox([-52.0, 66.0, -46.0, 71.0]).unwrap();
        let center = candidate_cells(&geom, 3, OverlapPolicy::Center).unwrap();
        let overlap = candidate_cells(&geom, 3, OverlapPolicy::Overlap).unwrap();
        assert!(!overlap.is_empty());
        assert!(center.is_subset(&overlap));
    }

    #[test]
    fn test_bbox_overlap_widens_overlap() {
        let shapes = [
            SearchGeometry::from_bbox([-52.0, 66.0, -46.0, 71.0]).unwrap(),
            SearchGeometry::from_bbox([-49.3, 69.1, -49.1, 69.2]).unwrap(),
            SearchGeometry::from_geojson(&serde_json::json!({
                "type": "Polygon",
                "coordinates": [[[-54.0, 61.0], [-36.0, 74.0], [-37.0, 74.0], [-54.0, 61.0]]]
            }))
            .unwrap(),
        ];

        let mut widened = 0;
        for geom in &shapes {
            for resolution in 1..=4 {
                let overlap = candidate_cells(geom, resolution, OverlapPolicy::Overlap).unwrap();
                let bbox = candidate_cells(geom, resolution, OverlapPolicy::BboxOverlap).unwrap();
                assert!(overlap.is_subset(&bbox), "resolution {resolution}");
                if bbox.len() > overlap.len() {
                    widened += 1;
                }
            }
        }
        assert!(widened > 0);
    }

    #[test]
    fn test_cell_bounds_contain_centre() {
        let cell = LatLng::new(69.2, -49.5).unwrap().to_cell(Resolution::Three);
        let bounds = cell_bounds(cell);
        let centre = LatLng::from(cell);
        assert!(bounds.min().x < centre.lng() && centre.lng() < bounds.max().x);
        assert!(bounds.min().y < centre.lat() && centre.lat() < bounds.max().y);
    }

    #[test]
    fn test_small_polygon_is_never_empty_with_overlap() {
        let geom = SearchGeometry::from_bbox([-49.01, 69.0, -49.0, 69.01]).unwrap();
        let cells = candidate_cells(&geom, 2, OverlapPolicy::Overlap).unwrap();
        assert!(!cells.is_empty());
    }

    #[test]
    fn test_parse_cell_tokens() {
        let raw = 0x832a10fffffffff_u64;
        assert_eq!(parse_cell("832a10fffffffff").unwrap(), raw);
        assert_eq!(parse_cell(&raw.to_string()).unwrap(), raw);
        assert!(parse_cell("not-a-cell").is_err());
    }
}
