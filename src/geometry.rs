//! Planar helpers over GeoJSON geometry values

use crate::error::{LyraError, LyraResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub type Position = [f64; 2];
pub type Ring = Vec<Position>;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bbox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> LyraResult<Self> {
        if !(xmin <= xmax && ymin <= ymax) {
            return Err(LyraError::InvalidBbox(format!(
                "{},{},{},{}",
                xmin, ymin, xmax, ymax
            )));
        }
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    pub fn from_array(a: [f64; 4]) -> LyraResult<Self> {
        Self::new(a[0], a[1], a[2], a[3])
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.xmin <= other.xmax
            && other.xmin <= self.xmax
            && self.ymin <= other.ymax
            && other.ymin <= self.ymax
    }

    /// Smallest box covering all positions
    pub fn covering<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        let mut bbox = Self {
            xmin: first[0],
            ymin: first[1],
            xmax: first[0],
            ymax: first[1],
        };
        for p in iter {
            bbox.xmin = bbox.xmin.min(p[0]);
            bbox.ymin = bbox.ymin.min(p[1]);
            bbox.xmax = bbox.xmax.max(p[0]);
            bbox.ymax = bbox.ymax.max(p[1]);
        }
        Some(bbox)
    }

    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
        }
    }
}

impl FromStr for Bbox {
    type Err = LyraError;

    /// Parse `xmin,ymin,xmax,ymax`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| LyraError::InvalidBbox(format!("{}: {}", s, e)))?;
        match parts.as_slice() {
            [xmin, ymin, xmax, ymax] => Self::new(*xmin, *ymin, *xmax, *ymax),
            _ => Err(LyraError::InvalidBbox(format!(
                "{}: expected four comma separated numbers",
                s
            ))),
        }
    }
}

fn position(value: &Value) -> Option<Position> {
    let coords = value.as_array()?;
    Some([coords.first()?.as_f64()?, coords.get(1)?.as_f64()?])
}

fn ring(value: &Value) -> Ring {
    value
        .as_array()
        .map(|points| points.iter().filter_map(position).collect())
        .unwrap_or_default()
}

fn rings(value: &Value) -> Vec<Ring> {
    value
        .as_array()
        .map(|rings| rings.iter().map(ring).collect())
        .unwrap_or_default()
}

/// Polygons of a Polygon or MultiPolygon geometry, each as a list of rings
pub fn polygons(geometry: &Value) -> Vec<Vec<Ring>> {
    let coords = &geometry["coordinates"];
    match geometry["type"].as_str() {
        Some("Polygon") => vec![rings(coords)],
        Some("MultiPolygon") => coords
            .as_array()
            .map(|polys| polys.iter().map(rings).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Every position of a geometry regardless of type
pub fn positions(geometry: &Value) -> Vec<Position> {
    fn walk(value: &Value, out: &mut Vec<Position>) {
        if let Some(p) = position(value) {
            out.push(p);
        } else if let Some(items) = value.as_array() {
            for item in items {
                walk(item, out);
            }
        }
    }

    let mut out = Vec::new();
    if geometry["type"] == "GeometryCollection" {
        for g in geometry["geometries"].as_array().into_iter().flatten() {
            out.extend(positions(g));
        }
    } else {
        walk(&geometry["coordinates"], &mut out);
    }
    out
}

/// Bounding box of a geometry, `None` when it has no coordinates
pub fn envelope(geometry: &Value) -> Option<Bbox> {
    Bbox::covering(&positions(geometry))
}

/// Shoelace signed area
pub fn signed_area(ring: &[Position]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for w in ring.windows(2) {
        sum += w[0][0] * w[1][1] - w[1][0] * w[0][1];
    }
    let (first, last) = (ring[0], ring[ring.len() - 1]);
    sum += last[0] * first[1] - first[0] * last[1];
    sum / 2.0
}

fn ring_centroid(ring: &[Position]) -> Option<Position> {
    let area = signed_area(ring);
    if area.abs() < f64::EPSILON {
        let n = ring.len() as f64;
        if ring.is_empty() {
            return None;
        }
        let (sx, sy) = ring
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        return Some([sx / n, sy / n]);
    }

    let mut cx = 0.0;
    let mut cy = 0.0;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a[0] * b[1] - b[0] * a[1];
        cx += (a[0] + b[0]) * cross;
        cy += (a[1] + b[1]) * cross;
    }
    Some([cx / (6.0 * area), cy / (6.0 * area)])
}

/// A display point for a geometry
///
/// Points return themselves; polygons return the centroid of their largest
/// exterior ring. Only used for layout, never for topology.
pub fn representative_point(geometry: &Value) -> Option<Position> {
    if geometry["type"] == "Point" {
        return position(&geometry["coordinates"]);
    }

    let largest = polygons(geometry)
        .into_iter()
        .filter_map(|rings| rings.into_iter().next())
        .max_by(|a, b| signed_area(a).abs().total_cmp(&signed_area(b).abs()));

    match largest {
        Some(ring) => ring_centroid(&ring),
        None => {
            let all = positions(geometry);
            ring_centroid(&all)
        }
    }
}
