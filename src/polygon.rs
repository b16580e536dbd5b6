//! # Working-area polygons.
//!
//! A working area is stored on the employee document as a JSON string:
//! either a single polygon (an array of rings) or an array of polygons.
//! Each ring is an array of `[longitude, latitude]` pairs. Containment only
//! looks at the outer ring (index 0) of each polygon; inner rings are holes
//! and are ignored.

use anyhow::{bail, ensure, Result};
use serde_json::Value;

/// A parsed multi-polygon working area.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPolygon {
    polygons: Vec<Polygon>,
}

/// A single polygon: one outer ring, any number of holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    rings: Vec<Vec<[f64; 2]>>,
}

impl MultiPolygon {
    /// Parses a working-area payload.
    ///
    /// Accepts both the single-polygon shape `[ring, ...]` and the
    /// multi-polygon shape `[[ring, ...], ...]`; the former is auto-wrapped.
    /// Any structural violation fails the parse: non-array input, empty
    /// polygon, ring shorter than 3 points, non-numeric coordinate, or
    /// coordinate arity other than 2.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Array(items) = value else {
            bail!("working area must be a JSON array");
        };
        ensure!(!items.is_empty(), "working area is empty");

        // A polygon is an array of rings, a ring an array of pairs. Probing
        // three levels down distinguishes the two accepted shapes.
        let is_multi = matches!(
            items.first().and_then(|polygon| polygon.get(0)).and_then(|ring| ring.get(0)),
            Some(Value::Array(_))
        );

        let polygons = if is_multi {
            items.iter().map(parse_polygon).collect::<Result<_>>()?
        } else {
            vec![parse_polygon(&Value::Array(items))?]
        };

        Ok(Self { polygons })
    }

    /// Returns whether the point lies inside the outer ring of any polygon.
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.polygons
            .iter()
            .any(|polygon| polygon.contains(longitude, latitude))
    }

    /// Number of polygons in the area.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Returns whether the area has no polygons. Cannot happen after a
    /// successful parse.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

impl Polygon {
    fn contains(&self, longitude: f64, latitude: f64) -> bool {
        match self.rings.first() {
            Some(outer) => point_in_ring(outer, longitude, latitude),
            None => false,
        }
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon> {
    let Value::Array(rings) = value else {
        bail!("polygon must be an array of rings");
    };
    ensure!(!rings.is_empty(), "polygon has no rings");

    let rings = rings
        .iter()
        .map(|ring| {
            let Value::Array(points) = ring else {
                bail!("ring must be an array of coordinate pairs");
            };
            ensure!(points.len() >= 3, "ring has fewer than 3 points");
            points
                .iter()
                .map(|point| {
                    let Value::Array(pair) = point else {
                        bail!("coordinate must be a [longitude, latitude] pair");
                    };
                    ensure!(pair.len() == 2, "coordinate arity must be 2");
                    let longitude = pair[0].as_f64();
                    let latitude = pair[1].as_f64();
                    match (longitude, latitude) {
                        (Some(longitude), Some(latitude)) => Ok([longitude, latitude]),
                        _ => bail!("coordinate is not numeric"),
                    }
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Polygon { rings })
}

/// Standard ray casting.
///
/// Edges are half-open; behavior for points exactly on an edge is
/// implementation-defined.
fn point_in_ring(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if ((yi > y) != (yj > y)) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_SQUARE: &str = "[[[0,0],[1,0],[1,1],[0,1]]]";

    #[test]
    fn test_parse_single_polygon() {
        let area = MultiPolygon::parse(UNIT_SQUARE).unwrap();
        assert_eq!(area.len(), 1);
    }

    #[test]
    fn test_parse_multi_polygon() {
        let raw = "[[[[0,0],[1,0],[1,1],[0,1]]],[[[5,5],[6,5],[6,6],[5,6]]]]";
        let area = MultiPolygon::parse(raw).unwrap();
        assert_eq!(area.len(), 2);
        assert!(area.contains(0.5, 0.5));
        assert!(area.contains(5.5, 5.5));
        assert!(!area.contains(3.0, 3.0));
    }

    #[test]
    fn test_parse_failures() {
        // Non-JSON, non-array, empty, short ring, bad arity, non-numeric.
        assert!(MultiPolygon::parse("not json").is_err());
        assert!(MultiPolygon::parse("{\"a\":1}").is_err());
        assert!(MultiPolygon::parse("[]").is_err());
        assert!(MultiPolygon::parse("[[[0,0],[1,1]]]").is_err());
        assert!(MultiPolygon::parse("[[[0,0,0],[1,0],[1,1]]]").is_err());
        assert!(MultiPolygon::parse("[[[\"a\",0],[1,0],[1,1]]]").is_err());
    }

    #[test]
    fn test_ray_cast_canonical_cases() {
        let area = MultiPolygon::parse(UNIT_SQUARE).unwrap();
        assert!(area.contains(0.5, 0.5));
        assert!(!area.contains(1.5, 0.5));
        assert!(!area.contains(-0.1, 0.5));
    }

    #[test]
    fn test_concave_ring() {
        // U-shaped ring: the notch at the top center is outside.
        let raw = "[[[0,0],[4,0],[4,3],[3,3],[3,1],[1,1],[1,3],[0,3]]]";
        let area = MultiPolygon::parse(raw).unwrap();
        assert!(area.contains(0.5, 2.0));
        assert!(area.contains(3.5, 2.0));
        assert!(!area.contains(2.0, 2.0));
    }

    #[test]
    fn test_nairobi_office_area() {
        // Roughly the polygon used in staging: a small box around the office.
        let raw = "[[[36.80,-1.29],[36.82,-1.29],[36.82,-1.27],[36.80,-1.27]]]";
        let area = MultiPolygon::parse(raw).unwrap();
        assert!(area.contains(36.81, -1.28));
        assert!(!area.contains(36.79, -1.28));
    }

    #[test]
    fn test_holes_are_ignored() {
        // Inner ring would exclude the center, but only the outer ring is
        // consulted.
        let raw = "[[[0,0],[10,0],[10,10],[0,10]],[[4,4],[6,4],[6,6],[4,6]]]";
        let area = MultiPolygon::parse(raw).unwrap();
        assert!(area.contains(5.0, 5.0));
    }
}
