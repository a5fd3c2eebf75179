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

//! 10°×10° latitude/longitude tiles.
//!
//! Tiles are centred on multiples of 10° and named by that centre: latitude
//! token `N`/`S` plus two digits, then longitude token `E`/`W` plus three
//! digits. `N60W040` spans 55°N..65°N and 45°W..35°W.

use crate::error::{Error, Result};
use crate::geometry::SearchGeometry;
use geo_types::{Coord, Polygon, Rect};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Tile edge length in degrees.
pub const TILE_SIZE: i32 = 10;

const HALF_TILE: f64 = TILE_SIZE as f64 / 2.0;

/// A tile, keyed by its centre in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatLonTile {
    pub lat: i32,
    pub lon: i32,
}

impl LatLonTile {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// The tile's extent as a closed polygon.
    pub fn to_polygon(&self) -> Polygon<f64> {
        let (lat, lon) = (self.lat as f64, self.lon as f64);
        Rect::new(
            Coord {
                x: lon - HALF_TILE,
                y: lat - HALF_TILE,
            },
            Coord {
                x: lon + HALF_TILE,
                y: lat + HALF_TILE,
            },
        )
        .to_polygon()
    }
}

impl fmt::Display for LatLonTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat < 0 { 'S' } else { 'N' };
        let ew = if self.lon < 0 { 'W' } else { 'E' };
        write!(
            f,
            "{ns}{:02}{ew}{:03}",
            self.lat.unsigned_abs(),
            self.lon.unsigned_abs()
        )
    }
}

impl FromStr for LatLonTile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Geometry(format!("'{s}' is not a lat/lon tile name"));
        if s.len() != 7 || !s.is_ascii() {
            return Err(invalid());
        }
        let (lat_part, lon_part) = s.split_at(3);
        let sign = |c: u8, pos: u8, neg: u8| match c {
            c if c == pos => Some(1),
            c if c == neg => Some(-1),
            _ => None,
        };
        let lat_sign = sign(lat_part.as_bytes()[0], b'N', b'S').ok_or_else(invalid)?;
        let lon_sign = sign(lon_part.as_bytes()[0], b'E', b'W').ok_or_else(invalid)?;
        let lat: i32 = lat_part[1..].parse().map_err(|_| invalid())?;
        let lon: i32 = lon_part[1..].parse().map_err(|_| invalid())?;
        if lat > 90 || lon > 180 {
            return Err(invalid());
        }
        Ok(LatLonTile::new(lat_sign * lat, lon_sign * lon))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for LatLonTile {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        // Tiles fully inside the lon/lat domain.
        let lat = (i32::from(<u8 as quickcheck::Arbitrary>::arbitrary(g)) % 17 - 8) * TILE_SIZE;
        let lon = (i32::from(<u8 as quickcheck::Arbitrary>::arbitrary(g)) % 35 - 17) * TILE_SIZE;
        LatLonTile::new(lat, lon)
    }
}

/// Tiles whose extent intersects `geometry`, touching included.
///
/// The bounding box is padded by half a tile on each side and rounded
/// outward to tile centres, then every candidate tile is tested against the
/// geometry itself.
pub fn candidate_tiles(geometry: &SearchGeometry) -> Result<BTreeSet<LatLonTile>> {
    let bounds = geometry.bounding_rect()?;
    let (lat_lo, lat_hi) = center_range(bounds.min().y, bounds.max().y, 90);
    let (lon_lo, lon_hi) = center_range(bounds.min().x, bounds.max().x, 180);

    let mut tiles = BTreeSet::new();
    for lat in (lat_lo..=lat_hi).step_by(TILE_SIZE as usize) {
        for lon in (lon_lo..=lon_hi).step_by(TILE_SIZE as usize) {
            let tile = LatLonTile::new(lat, lon);
            if geometry.intersects_polygon(&tile.to_polygon()) {
                tiles.insert(tile);
            }
        }
    }
    Ok(tiles)
}

/// Inclusive range of tile centres covering `[min, max]` padded by half a tile.
fn center_range(min: f64, max: f64, limit: i32) -> (i32, i32) {
    let size = TILE_SIZE as f64;
    let lo = (((min - HALF_TILE) / size).floor() * size) as i32;
    let hi = (((max + HALF_TILE) / size).ceil() * size) as i32;
    (lo.max(-limit), hi.min(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use serde_json::json;

    fn names(tiles: &BTreeSet<LatLonTile>) -> Vec<String> {
        tiles.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_tile_names() {
        assert_eq!(LatLonTile::new(60, -40).to_string(), "N60W040");
        assert_eq!(LatLonTile::new(-70, 170).to_string(), "S70E170");
        assert_eq!(LatLonTile::new(0, 0).to_string(), "N00E000");
        assert_eq!(LatLonTile::new(-10, -180).to_string(), "S10W180");
    }

    #[test]
    fn test_tile_name_parsing() {
        assert_eq!(
            "N60W040".parse::<LatLonTile>().unwrap(),
            LatLonTile::new(60, -40)
        );
        assert_eq!(
            "S80E120".parse::<LatLonTile>().unwrap(),
            LatLonTile::new(-80, 120)
        );
        for bad in ["N60W40", "X60W040", "N60Q040", "N95E000", "N6xW040"] {
            assert!(bad.parse::<LatLonTile>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_tile_polygon_extent() {
        let polygon = LatLonTile::new(60, -40).to_polygon();
        let xs: Vec<f64> = polygon.exterior().coords().map(|c| c.x).collect();
        let ys: Vec<f64> = polygon.exterior().coords().map(|c| c.y).collect();
        assert_eq!(xs.iter().cloned().fold(f64::MAX, f64::min), -45.0);
        assert_eq!(xs.iter().cloned().fold(f64::MIN, f64::max), -35.0);
        assert_eq!(ys.iter().cloned().fold(f64::MAX, f64::min), 55.0);
        assert_eq!(ys.iter().cloned().fold(f64::MIN, f64::max), 65.0);
    }

    #[test]
    fn test_point_at_tile_centre() {
        let geom = SearchGeometry::Point(Point::new(-40.0, 60.0));
        assert_eq!(names(&candidate_tiles(&geom).unwrap()), vec!["N60W040"]);
    }

    #[test]
    fn test_point_on_shared_corner_hits_all_four_tiles() {
        let geom = SearchGeometry::Point(Point::new(-45.0, 55.0));
        assert_eq!(
            names(&candidate_tiles(&geom).unwrap()),
            vec!["N50W050", "N50W040", "N60W050", "N60W040"]
        );
    }

    #[test]
    fn test_polygon_inside_one_tile() {
        let geom = SearchGeometry::from_bbox([-44.0, 56.0, -36.0, 64.0]).unwrap();
        assert_eq!(names(&candidate_tiles(&geom).unwrap()), vec!["N60W040"]);
    }

    #[test]
    fn test_polygon_spanning_two_tiles() {
        let geom = SearchGeometry::from_bbox([-52.0, 58.0, -38.0, 62.0]).unwrap();
        assert_eq!(
            names(&candidate_tiles(&geom).unwrap()),
            vec!["N60W050", "N60W040"]
        );
    }

    #[test]
    fn test_bbox_corner_outside_polygon_is_skipped() {
        // A thin diagonal triangle whose bbox covers four tiles but whose
        // area only crosses three of them.
        let geom = SearchGeometry::from_geojson(&json!({
            "type": "Polygon",
            "coordinates": [[[-54.0, 51.0], [-36.0, 64.0], [-37.0, 64.0], [-54.0, 51.0]]]
        }))
        .unwrap();
        let tiles = names(&candidate_tiles(&geom).unwrap());
        assert!(tiles.contains(&"N50W050".to_string()));
        assert!(tiles.contains(&"N60W040".to_string()));
        assert!(!tiles.contains(&"N50W040".to_string()), "{tiles:?}");
    }

    quickcheck! {
        fn prop_box_inside_tile_maps_to_that_tile(tile: LatLonTile, a: u8, b: u8, c: u8, d: u8) -> bool {
            let offset = |v: u8| 0.5 + 4.0 * f64::from(v) / 255.0;
            let width = |v: u8| 0.1 + 4.0 * f64::from(v) / 255.0;
            let min_x = tile.lon as f64 - HALF_TILE + offset(a);
            let min_y = tile.lat as f64 - HALF_TILE + offset(b);
            let geom = SearchGeometry::from_bbox([min_x, min_y, min_x + width(c), min_y + width(d)]).unwrap();
            let tiles = candidate_tiles(&geom).unwrap();
            tiles.len() == 1 && tiles.contains(&tile) && tiles == candidate_tiles(&geom).unwrap()
        }

        fn prop_point_is_never_missed(x: u16, y: u16) -> bool {
            let lon = f64::from(x % 3401) / 10.0 - 170.0;
            let lat = f64::from(y % 1601) / 10.0 - 80.0;
            let tiles = candidate_tiles(&SearchGeometry::Point(Point::new(lon, lat))).unwrap();
            let nearest = LatLonTile::new(
                ((lat / 10.0).round() * 10.0) as i32,
                ((lon / 10.0).round() * 10.0) as i32,
            );
            !tiles.is_empty() && tiles.len() <= 4 && tiles.contains(&nearest)
        }
    }

    #[test]
    fn test_polar_tiles_are_clamped() {
        let geom = SearchGeometry::from_bbox([-10.0, 86.0, 10.0, 90.0]).unwrap();
        let tiles = candidate_tiles(&geom).unwrap();
        assert!(tiles.iter().all(|t| t.lat <= 90));
        assert!(tiles.contains(&LatLonTile::new(90, 0)));
    }
}
