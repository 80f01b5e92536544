//! TopoJSON encoding with shared arcs
//!
//! Polygons are quantized onto an integer grid, rings are cut into arcs at
//! junctions (vertices whose neighbors differ between rings), identical
//! arcs are stored once and referenced in either direction, and each
//! stored arc is simplified with Douglas-Peucker. Because a shared boundary
//! is one arc, adjacent catchments stay aligned after simplification.
//! Rings rebuilt from simplified arcs always keep at least four positions.

use crate::geometry::{self, Bbox, Ring};
use crate::error::{LyraError, LyraResult};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

type Point = (i64, i64);

/// Encoder parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopoOptions {
    /// Douglas-Peucker tolerance in input coordinate units; 0 disables
    pub simplify: f64,
    /// Number of grid steps per axis
    pub quantize: f64,
}

impl Default for TopoOptions {
    fn default() -> Self {
        Self {
            simplify: 0.0001,
            quantize: 1e6,
        }
    }
}

/// Affine mapping between input coordinates and the integer grid
#[derive(Debug, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

impl Transform {
    fn fit(bbox: &Bbox, quantize: f64) -> Self {
        let steps = quantize.max(2.0) - 1.0;
        let kx = if bbox.xmax > bbox.xmin {
            (bbox.xmax - bbox.xmin) / steps
        } else {
            1.0
        };
        let ky = if bbox.ymax > bbox.ymin {
            (bbox.ymax - bbox.ymin) / steps
        } else {
            1.0
        };
        Self {
            scale: [kx, ky],
            translate: [bbox.xmin, bbox.ymin],
        }
    }

    fn quantize(&self, p: &[f64; 2]) -> Point {
        (
            ((p[0] - self.translate[0]) / self.scale[0]).round() as i64,
            ((p[1] - self.translate[1]) / self.scale[1]).round() as i64,
        )
    }

    fn real(&self, p: Point) -> [f64; 2] {
        [
            p.0 as f64 * self.scale[0] + self.translate[0],
            p.1 as f64 * self.scale[1] + self.translate[1],
        ]
    }
}

/// Quantized ring without the closing duplicate; `None` when degenerate
fn quantize_ring(ring: &Ring, transform: &Transform) -> Option<Vec<Point>> {
    let mut out: Vec<Point> = Vec::with_capacity(ring.len());
    for p in ring {
        let q = transform.quantize(p);
        if out.last() != Some(&q) {
            out.push(q);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    (out.len() >= 3).then_some(out)
}

/// Vertices whose neighbor pair is not the same in every ring using them
fn find_junctions(rings: &[Vec<Point>]) -> HashSet<Point> {
    let mut neighbors: HashMap<Point, (Point, Point)> = HashMap::new();
    let mut junctions = HashSet::new();

    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            let p = ring[i];
            let (a, b) = (ring[(i + n - 1) % n], ring[(i + 1) % n]);
            let pair = if a <= b { (a, b) } else { (b, a) };
            match neighbors.get(&p) {
                Some(seen) if *seen != pair => {
                    junctions.insert(p);
                }
                Some(_) => {}
                None => {
                    neighbors.insert(p, pair);
                }
            }
        }
    }
    junctions
}

/// Split a ring into arcs starting and ending at junctions
fn cut_ring(ring: &[Point], junctions: &HashSet<Point>) -> Vec<Vec<Point>> {
    let start = match ring.iter().position(|p| junctions.contains(p)) {
        Some(i) => i,
        None => {
            let mut closed = ring.to_vec();
            closed.push(ring[0]);
            return vec![closed];
        }
    };

    let mut seq: Vec<Point> = ring[start..].iter().chain(&ring[..start]).copied().collect();
    seq.push(ring[start]);

    let mut arcs = Vec::new();
    let mut current = vec![seq[0]];
    for p in &seq[1..] {
        current.push(*p);
        if junctions.contains(p) {
            arcs.push(std::mem::replace(&mut current, vec![*p]));
        }
    }
    arcs
}

/// Stores arcs once and hands out TopoJSON arc indexes
#[derive(Default)]
struct ArcTable {
    arcs: Vec<Vec<Point>>,
    index: HashMap<Vec<Point>, i64>,
}

impl ArcTable {
    /// Index of `arc`, or the one's complement of its reverse
    fn intern(&mut self, arc: Vec<Point>) -> i64 {
        if let Some(i) = self.index.get(&arc) {
            return *i;
        }
        let reversed: Vec<Point> = arc.iter().rev().copied().collect();
        if let Some(i) = self.index.get(&reversed) {
            return !*i;
        }
        let i = self.arcs.len() as i64;
        self.index.insert(arc.clone(), i);
        self.arcs.push(arc);
        i
    }
}

fn perpendicular_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2)).sqrt();
    }
    (dy * p[0] - dx * p[1] + b[0] * a[1] - b[1] * a[0]).abs() / len2.sqrt()
}

/// Douglas-Peucker keep mask over one arc, endpoints always kept
fn simplify_mask(real: &[[f64; 2]], tolerance: f64) -> Vec<bool> {
    let n = real.len();
    if tolerance <= 0.0 || n < 3 {
        return vec![true; n];
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let (mut max_dist, mut max_i) = (0.0, first);
        for i in first + 1..last {
            let d = perpendicular_distance(real[i], real[first], real[last]);
            if d > max_dist {
                max_dist = d;
                max_i = i;
            }
        }
        if max_dist > tolerance {
            keep[max_i] = true;
            stack.push((first, max_i));
            stack.push((max_i, last));
        }
    }
    keep
}

fn arc_index(id: i64) -> usize {
    if id < 0 {
        !id as usize
    } else {
        id as usize
    }
}

/// Positions of a ring rebuilt from its kept arc vertices, closing point included
fn ring_len(ids: &[i64], keep: &[Vec<bool>]) -> usize {
    ids.iter()
        .map(|id| keep[arc_index(*id)].iter().filter(|k| **k).count() - 1)
        .sum::<usize>()
        + 1
}

/// Restore dropped vertices until the ring is a polygon again
///
/// Each round pins the farthest dropped vertex of the ring's longest arc
/// that still has one. Arcs only gain vertices, so rings fixed earlier
/// stay valid when a shared arc is touched again.
fn prevent_oversimplify(ids: &[i64], real: &[Vec<[f64; 2]>], keep: &mut [Vec<bool>]) {
    while ring_len(ids, keep) < 4 {
        let longest = ids
            .iter()
            .map(|id| arc_index(*id))
            .filter(|&i| keep[i].iter().any(|k| !k))
            .max_by_key(|&i| real[i].len());
        let Some(i) = longest else { break };

        let arc = &real[i];
        let (a, b) = (arc[0], arc[arc.len() - 1]);
        let farthest = (1..arc.len() - 1)
            .filter(|&j| !keep[i][j])
            .max_by(|&x, &y| {
                perpendicular_distance(arc[x], a, b).total_cmp(&perpendicular_distance(arc[y], a, b))
            });
        match farthest {
            Some(j) => keep[i][j] = true,
            None => break,
        }
    }
}

fn delta_encode(arc: &[Point]) -> Value {
    let mut prev = (0, 0);
    let points: Vec<Value> = arc
        .iter()
        .map(|p| {
            let d = json!([p.0 - prev.0, p.1 - prev.1]);
            prev = *p;
            d
        })
        .collect();
    Value::Array(points)
}

/// Encode a GeoJSON FeatureCollection as a TopoJSON Topology
///
/// Features end up as geometries of the `data` object, keeping their
/// properties. Non-areal geometries are carried as points or `null`.
pub fn encode(collection: &Value, options: &TopoOptions) -> LyraResult<Value> {
    let features = collection["features"]
        .as_array()
        .ok_or_else(|| LyraError::Internal("expected a FeatureCollection".to_string()))?;

    let bbox = features
        .iter()
        .filter_map(|f| geometry::envelope(&f["geometry"]))
        .reduce(|a, b| a.union(&b))
        .unwrap_or(Bbox {
            xmin: 0.0,
            ymin: 0.0,
            xmax: 0.0,
            ymax: 0.0,
        });
    let transform = Transform::fit(&bbox, options.quantize);

    // Quantize every polygon first so shared vertices coincide exactly
    let shapes: Vec<Vec<Vec<Vec<Point>>>> = features
        .iter()
        .map(|f| {
            geometry::polygons(&f["geometry"])
                .iter()
                .map(|rings| {
                    rings
                        .iter()
                        .filter_map(|r| quantize_ring(r, &transform))
                        .collect::<Vec<_>>()
                })
                .filter(|rings| !rings.is_empty())
                .collect()
        })
        .collect();

    let all_rings: Vec<Vec<Point>> = shapes.iter().flatten().flatten().cloned().collect();
    let junctions = find_junctions(&all_rings);

    let mut table = ArcTable::default();
    let mut ring_ids: Vec<Vec<i64>> = Vec::new();
    let mut geometries = Vec::with_capacity(features.len());

    for (feature, polygons) in features.iter().zip(&shapes) {
        let poly_arcs: Vec<Value> = polygons
            .iter()
            .map(|rings| {
                let ring_arcs: Vec<Value> = rings
                    .iter()
                    .map(|ring| {
                        let ids: Vec<i64> = cut_ring(ring, &junctions)
                            .into_iter()
                            .map(|arc| table.intern(arc))
                            .collect();
                        let value = json!(ids);
                        ring_ids.push(ids);
                        value
                    })
                    .collect();
                Value::Array(ring_arcs)
            })
            .collect();

        let mut object = Map::new();
        match (feature["geometry"]["type"].as_str(), poly_arcs.len()) {
            (Some("Polygon"), 1) => {
                object.insert("type".into(), "Polygon".into());
                object.insert("arcs".into(), poly_arcs[0].clone());
            }
            (Some("Polygon" | "MultiPolygon"), n) if n > 0 => {
                object.insert("type".into(), "MultiPolygon".into());
                object.insert("arcs".into(), Value::Array(poly_arcs));
            }
            (Some("Point"), _) => {
                let p = geometry::positions(&feature["geometry"])
                    .first()
                    .map(|p| transform.quantize(p))
                    .unwrap_or((0, 0));
                object.insert("type".into(), "Point".into());
                object.insert("coordinates".into(), json!([p.0, p.1]));
            }
            _ => {
                object.insert("type".into(), Value::Null);
            }
        }
        if let Some(props) = feature["properties"].as_object() {
            object.insert("properties".into(), Value::Object(props.clone()));
        }
        if !feature["id"].is_null() {
            object.insert("id".into(), feature["id"].clone());
        }
        geometries.push(Value::Object(object));
    }

    // Simplify arcs, then make sure no ring fell below a polygon
    let real: Vec<Vec<[f64; 2]>> = table
        .arcs
        .iter()
        .map(|arc| arc.iter().map(|p| transform.real(*p)).collect())
        .collect();
    let mut keep: Vec<Vec<bool>> = real
        .iter()
        .map(|arc| simplify_mask(arc, options.simplify))
        .collect();
    for ids in &ring_ids {
        prevent_oversimplify(ids, &real, &mut keep);
    }

    let arcs: Vec<Value> = table
        .arcs
        .iter()
        .zip(&keep)
        .map(|(arc, mask)| {
            let kept: Vec<Point> = arc
                .iter()
                .zip(mask)
                .filter(|(_, k)| **k)
                .map(|(p, _)| *p)
                .collect();
            delta_encode(&kept)
        })
        .collect();

    Ok(json!({
        "type": "Topology",
        "bbox": bbox.to_array(),
        "transform": {
            "scale": transform.scale,
            "translate": transform.translate,
        },
        "objects": {
            "data": {
                "type": "GeometryCollection",
                "geometries": geometries,
            }
        },
        "arcs": arcs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(id: i64, ring: &[[f64; 2]]) -> Value {
        json!({
            "type": "Feature",
            "properties": { "CatchIDN": id },
            "geometry": { "type": "Polygon", "coordinates": [ring] }
        })
    }

    fn collection(features: Vec<Value>) -> Value {
        json!({ "type": "FeatureCollection", "features": features })
    }

    fn adjacent_squares() -> Value {
        collection(vec![
            feature(1, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]),
            feature(2, &[[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 0.0]]),
        ])
    }

    /// Undo delta encoding
    fn decode(arc: &Value) -> Vec<Point> {
        let mut acc = (0, 0);
        arc.as_array()
            .unwrap()
            .iter()
            .map(|d| {
                acc = (acc.0 + d[0].as_i64().unwrap(), acc.1 + d[1].as_i64().unwrap());
                acc
            })
            .collect()
    }

    #[test]
    fn shared_edge_is_one_arc() {
        let topo = encode(&adjacent_squares(), &TopoOptions::default()).unwrap();
        assert_eq!(topo["type"], "Topology");
        assert_eq!(topo["arcs"].as_array().unwrap().len(), 3);

        let geoms = topo["objects"]["data"]["geometries"].as_array().unwrap();
        assert_eq!(geoms.len(), 2);
        let first: Vec<i64> = serde_json::from_value(geoms[0]["arcs"][0].clone()).unwrap();
        let second: Vec<i64> = serde_json::from_value(geoms[1]["arcs"][0].clone()).unwrap();
        // One ring references the shared arc forward, the other reversed
        assert!(first.iter().any(|i| second.contains(&!*i)));
        assert_eq!(geoms[1]["properties"]["CatchIDN"], 2);
    }

    #[test]
    fn quantized_arcs_stay_on_grid() {
        let options = TopoOptions {
            simplify: 0.0,
            quantize: 11.0,
        };
        let topo = encode(&adjacent_squares(), &options).unwrap();
        assert_eq!(topo["transform"]["scale"][0], 0.2);
        for arc in topo["arcs"].as_array().unwrap() {
            for (x, y) in decode(arc) {
                assert!((0..=10).contains(&x) && (0..=10).contains(&y));
            }
        }
    }

    #[test]
    fn simplification_drops_collinear_noise() {
        let ring = [
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [0.00001, 0.5],
            [0.0, 0.0],
        ];
        let coarse = encode(
            &collection(vec![feature(1, &ring)]),
            &TopoOptions {
                simplify: 0.001,
                quantize: 1e6,
            },
        )
        .unwrap();
        let fine = encode(
            &collection(vec![feature(1, &ring)]),
            &TopoOptions {
                simplify: 0.0,
                quantize: 1e6,
            },
        )
        .unwrap();
        let coarse_len = decode(&coarse["arcs"][0]).len();
        let fine_len = decode(&fine["arcs"][0]).len();
        assert_eq!(fine_len, 6);
        assert_eq!(coarse_len, 5);
    }

    #[test]
    fn tiny_ring_is_not_collapsed() {
        let ring = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let topo = encode(
            &collection(vec![feature(1, &ring)]),
            &TopoOptions {
                simplify: 10.0,
                quantize: 1e4,
            },
        )
        .unwrap();
        assert_eq!(decode(&topo["arcs"][0]).len(), 4);
    }

    /// Positions of one ring rebuilt from its arc references
    fn ring_points(topo: &Value, ids: &Value) -> Vec<Point> {
        let mut points: Vec<Point> = Vec::new();
        for id in ids.as_array().unwrap() {
            let id = id.as_i64().unwrap();
            let mut arc = decode(&topo["arcs"][arc_index(id)]);
            if id < 0 {
                arc.reverse();
            }
            let skip = usize::from(!points.is_empty());
            points.extend(arc.into_iter().skip(skip));
        }
        points
    }

    fn assert_rings_are_polygons(topo: &Value) {
        for geom in topo["objects"]["data"]["geometries"].as_array().unwrap() {
            for ids in geom["arcs"].as_array().unwrap() {
                let ring = ring_points(topo, ids);
                assert!(ring.len() >= 4, "ring collapsed to {} points", ring.len());
                assert_eq!(ring.first(), ring.last());
            }
        }
    }

    #[test]
    fn heavy_simplification_keeps_junction_rings_valid() {
        let options = TopoOptions {
            simplify: 10.0,
            quantize: 1e6,
        };
        let topo = encode(&adjacent_squares(), &options).unwrap();
        assert_rings_are_polygons(&topo);

        // The shared edge is still referenced by both rings
        let geoms = topo["objects"]["data"]["geometries"].as_array().unwrap();
        let first: Vec<i64> = serde_json::from_value(geoms[0]["arcs"][0].clone()).unwrap();
        let second: Vec<i64> = serde_json::from_value(geoms[1]["arcs"][0].clone()).unwrap();
        assert!(first.iter().any(|i| second.contains(&!*i)));
    }

    #[test]
    fn heavy_simplification_keeps_three_way_junctions_valid() {
        let topo = encode(
            &collection(vec![
                feature(1, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]),
                feature(2, &[[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 0.0]]),
                feature(
                    3,
                    &[[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [0.0, 2.0], [0.0, 1.0]],
                ),
            ]),
            &TopoOptions {
                simplify: 100.0,
                quantize: 1e4,
            },
        )
        .unwrap();
        assert_rings_are_polygons(&topo);
    }

    #[test]
    fn rejects_non_collections() {
        assert!(encode(&json!({"type": "Feature"}), &TopoOptions::default()).is_err());
    }
}
