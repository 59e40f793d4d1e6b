//! Minimal point and polygon geometry with GeoJSON Feature output.

use serde_json::{Value, json};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

/// A polygon made of an exterior ring and zero or more holes.
///
/// Rings may be given open or closed; [`Polygon::to_feature`] always emits
/// closed rings.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub interiors: Vec<Vec<Point>>,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    fn coordinates(&self) -> Value {
        json!([self.lon, self.lat])
    }

    pub fn to_feature(&self) -> Value {
        feature("Point", self.coordinates())
    }
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    pub fn with_interior(mut self, ring: Vec<Point>) -> Self {
        self.interiors.push(ring);
        self
    }

    pub fn to_feature(&self) -> Value {
        let rings: Vec<Value> = std::iter::once(&self.exterior)
            .chain(self.interiors.iter())
            .map(|ring| ring_coordinates(ring))
            .collect();
        feature("Polygon", Value::Array(rings))
    }
}

fn ring_coordinates(ring: &[Point]) -> Value {
    let mut coords: Vec<Value> = ring.iter().map(Point::coordinates).collect();
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if ring.len() > 1 && first != last {
            coords.push(first.coordinates());
        }
    }
    Value::Array(coords)
}

fn feature(geometry_type: &str, coordinates: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": geometry_type,
            "coordinates": coordinates,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_feature() {
        let feature = Point::new(-118.49, 34.01).to_feature();
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["properties"], json!({}));
        assert_eq!(feature["geometry"]["type"], "Point");
        assert_eq!(feature["geometry"]["coordinates"], json!([-118.49, 34.01]));
    }

    #[test]
    fn test_polygon_feature_closes_ring() {
        let square = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]);
        let feature = square.to_feature();
        let ring = &feature["geometry"]["coordinates"][0];

        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(ring.as_array().unwrap().len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn test_polygon_with_hole() {
        let outer = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 0.0),
        ];
        let hole = vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0), Point::new(2.0, 2.0)];
        let feature = Polygon::new(outer).with_interior(hole).to_feature();
        let rings = feature["geometry"]["coordinates"].as_array().unwrap();

        assert_eq!(rings.len(), 2);
        // already closed, left alone
        assert_eq!(rings[0].as_array().unwrap().len(), 4);
        assert_eq!(rings[1].as_array().unwrap().len(), 4);
    }
}
