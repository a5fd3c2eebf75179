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

//! Search geometries in geographic coordinates (EPSG:4326).
//!
//! Geometries arrive as GeoJSON and are validated once on construction:
//! coordinates must be finite and inside the lon/lat domain, and polygonal
//! input that is not valid (self-intersections, bad winding, unclosed rings)
//! is repaired with a self-union, the zero-distance buffer. A
//! [`SearchGeometry`] is never mutated afterwards.

use crate::error::{Error, Result};
use geo::{BooleanOps, BoundingRect, Intersects, Validation};
use geo_types::{Coord, LineString, MultiPoint, MultiPolygon, Point, Polygon, Rect};
use serde_json::{Value, json};

/// A validated spatial filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchGeometry {
    Point(Point<f64>),
    MultiPoint(MultiPoint<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl SearchGeometry {
    /// Parses a GeoJSON geometry, or a `Feature` wrapping one.
    ///
    /// Supported types are `Point`, `MultiPoint`, `Polygon` and
    /// `MultiPolygon`. Rings do not need to be closed and winding order is
    /// not checked; invalid polygons are repaired.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Geometry("GeoJSON object has no 'type'".into()))?;

        if kind == "Feature" {
            let inner = value
                .get("geometry")
                .filter(|g| !g.is_null())
                .ok_or_else(|| Error::Geometry("feature has no geometry".into()))?;
            return Self::from_geojson(inner);
        }

        let coords = value
            .get("coordinates")
            .ok_or_else(|| Error::Geometry(format!("{kind} has no 'coordinates'")))?;

        let geometry = match kind {
            "Point" => SearchGeometry::Point(Point::from(parse_position(coords)?)),
            "MultiPoint" => SearchGeometry::MultiPoint(MultiPoint::new(
                as_array(coords, "MultiPoint")?
                    .iter()
                    .map(|p| parse_position(p).map(Point::from))
                    .collect::<Result<Vec<_>>>()?,
            )),
            "Polygon" => SearchGeometry::Polygon(parse_polygon(coords)?),
            "MultiPolygon" => SearchGeometry::MultiPolygon(MultiPolygon::new(
                as_array(coords, "MultiPolygon")?
                    .iter()
                    .map(parse_polygon)
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => {
                return Err(Error::Geometry(format!(
                    "unsupported GeoJSON geometry type '{other}'"
                )));
            }
        };

        geometry.validated()
    }

    /// Parses GeoJSON text.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Geometry(format!("not valid GeoJSON: {e}")))?;
        Self::from_geojson(&value)
    }

    /// Builds a rectangle from `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn from_bbox(bbox: [f64; 4]) -> Result<Self> {
        let [min_x, min_y, max_x, max_y] = bbox;
        if min_x > max_x || min_y > max_y {
            return Err(Error::Geometry(format!(
                "bbox minimums exceed maximums: {bbox:?}"
            )));
        }
        if min_x == max_x && min_y == max_y {
            return SearchGeometry::Point(Point::new(min_x, min_y)).validated();
        }
        if min_x == max_x || min_y == max_y {
            return Err(Error::Geometry(format!(
                "bbox has zero width or height and describes a line: {bbox:?}"
            )));
        }
        let rect = Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        );
        SearchGeometry::Polygon(rect.to_polygon()).validated()
    }

    /// Axis-aligned bounds of the geometry.
    pub fn bounding_rect(&self) -> Result<Rect<f64>> {
        let rect = match self {
            SearchGeometry::Point(p) => Some(p.bounding_rect()),
            SearchGeometry::MultiPoint(mp) => mp.bounding_rect(),
            SearchGeometry::Polygon(p) => p.bounding_rect(),
            SearchGeometry::MultiPolygon(mp) => mp.bounding_rect(),
        };
        rect.ok_or_else(|| Error::Geometry("geometry is empty".into()))
    }

    /// Closed-set intersection test: touching boundaries count.
    pub fn intersects_polygon(&self, other: &Polygon<f64>) -> bool {
        match self {
            SearchGeometry::Point(p) => p.intersects(other),
            SearchGeometry::MultiPoint(mp) => mp.intersects(other),
            SearchGeometry::Polygon(p) => p.intersects(other),
            SearchGeometry::MultiPolygon(mp) => mp.intersects(other),
        }
    }

    /// Polygonal parts, empty for point geometries.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        match self {
            SearchGeometry::Polygon(p) => vec![p.clone()],
            SearchGeometry::MultiPolygon(mp) => mp.0.clone(),
            _ => Vec::new(),
        }
    }

    /// Point parts, empty for polygonal geometries.
    pub fn points(&self) -> Vec<Point<f64>> {
        match self {
            SearchGeometry::Point(p) => vec![*p],
            SearchGeometry::MultiPoint(mp) => mp.0.clone(),
            _ => Vec::new(),
        }
    }

    /// Serialises back to a GeoJSON geometry object.
    pub fn to_geojson(&self) -> Value {
        match self {
            SearchGeometry::Point(p) => json!({
                "type": "Point",
                "coordinates": [p.x(), p.y()],
            }),
            SearchGeometry::MultiPoint(mp) => json!({
                "type": "MultiPoint",
                "coordinates": mp.0.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>(),
            }),
            SearchGeometry::Polygon(p) => json!({
                "type": "Polygon",
                "coordinates": polygon_rings(p),
            }),
            SearchGeometry::MultiPolygon(mp) => json!({
                "type": "MultiPolygon",
                "coordinates": mp.0.iter().map(polygon_rings).collect::<Vec<_>>(),
            }),
        }
    }

    fn validated(self) -> Result<Self> {
        for p in self.points() {
            check_position(p.x(), p.y())?;
        }
        match self {
            SearchGeometry::Point(_) => Ok(self),
            SearchGeometry::MultiPoint(ref mp) if mp.0.is_empty() => {
                Err(Error::Geometry("MultiPoint has no points".into()))
            }
            SearchGeometry::MultiPoint(_) => Ok(self),
            SearchGeometry::Polygon(p) => repair(MultiPolygon::new(vec![p])),
            SearchGeometry::MultiPolygon(mp) => repair(mp),
        }
    }
}

/// Replaces an invalid polygonal shape with its self-union.
fn repair(shape: MultiPolygon<f64>) -> Result<SearchGeometry> {
    if shape.0.is_empty() {
        return Err(Error::Geometry("polygonal geometry has no polygons".into()));
    }
    for polygon in &shape.0 {
        for c in polygon.exterior().coords() {
            check_position(c.x, c.y)?;
        }
        for ring in polygon.interiors() {
            for c in ring.coords() {
                check_position(c.x, c.y)?;
            }
        }
    }

    let shape = if shape.is_valid() {
        shape
    } else {
        log::debug!("repairing invalid search polygon with a self-union");
        let repaired = shape.union(&shape);
        if repaired.0.is_empty() || !repaired.0.iter().all(|p| p.is_valid()) {
            return Err(Error::Geometry(
                "polygon is invalid and could not be repaired".into(),
            ));
        }
        repaired
    };

    let mut polygons = shape.0;
    if polygons.len() == 1 {
        Ok(SearchGeometry::Polygon(polygons.remove(0)))
    } else {
        Ok(SearchGeometry::MultiPolygon(MultiPolygon::new(polygons)))
    }
}

fn check_position(x: f64, y: f64) -> Result<()> {
    if !x.is_finite() || !y.is_finite() {
        return Err(Error::Geometry(format!("non-finite coordinate ({x}, {y})")));
    }
    if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
        return Err(Error::Geometry(format!(
            "coordinate ({x}, {y}) is outside the longitude/latitude domain"
        )));
    }
    Ok(())
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::Geometry(format!("{what} coordinates must be an array")))
}

fn parse_position(value: &Value) -> Result<Coord<f64>> {
    let parts = as_array(value, "position")?;
    if parts.len() < 2 {
        return Err(Error::Geometry(format!(
            "position needs at least two numbers, got {value}"
        )));
    }
    let number = |v: &Value| {
        v.as_f64()
            .ok_or_else(|| Error::Geometry(format!("position holds a non-number: {value}")))
    };
    Ok(Coord {
        x: number(&parts[0])?,
        y: number(&parts[1])?,
    })
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let coords = as_array(value, "ring")?
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = as_array(value, "Polygon")?
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Err(Error::Geometry("Polygon has no rings".into()));
    }
    let exterior = rings.remove(0);
    // Polygon::new closes every ring.
    Ok(Polygon::new(exterior, rings))
}

fn polygon_rings(p: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}
