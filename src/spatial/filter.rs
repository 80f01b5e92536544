//! Feature selection by bounding box and attributes

use crate::geometry::{self, Bbox};
use serde::Serialize;
use serde_json::{json, Value};

/// Which features of the catchment layer to keep
///
/// Empty lists mean "no restriction". Lists are kept sorted and
/// deduplicated so equal filters produce equal cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpatialFilter {
    pub bbox: Option<Bbox>,
    pub watersheds: Vec<String>,
    pub catchidns: Vec<i64>,
}

impl SpatialFilter {
    pub fn new(bbox: Option<Bbox>, mut watersheds: Vec<String>, mut catchidns: Vec<i64>) -> Self {
        watersheds.sort();
        watersheds.dedup();
        catchidns.sort_unstable();
        catchidns.dedup();
        Self {
            bbox,
            watersheds,
            catchidns,
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.bbox.is_none() && self.watersheds.is_empty() && self.catchidns.is_empty()
    }

    /// Whether a single feature passes every active restriction
    pub fn matches(&self, feature: &Value, id_column: &str, watershed_column: &str) -> bool {
        let props = &feature["properties"];

        if !self.watersheds.is_empty() {
            let keep = props[watershed_column]
                .as_str()
                .is_some_and(|w| self.watersheds.iter().any(|x| x == w));
            if !keep {
                return false;
            }
        }

        if !self.catchidns.is_empty() {
            let keep = feature_id(&props[id_column])
                .is_some_and(|id| self.catchidns.binary_search(&id).is_ok());
            if !keep {
                return false;
            }
        }

        match &self.bbox {
            Some(bbox) => geometry::envelope(&feature["geometry"])
                .is_some_and(|envelope| envelope.intersects(bbox)),
            None => true,
        }
    }
}

fn feature_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// New FeatureCollection holding the features of `collection` that match
pub fn filter_features(
    collection: &Value,
    filter: &SpatialFilter,
    id_column: &str,
    watershed_column: &str,
) -> Value {
    let features: Vec<Value> = collection["features"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|f| filter.matches(f, id_column, watershed_column))
        .cloned()
        .collect();

    let mut out = json!({ "type": "FeatureCollection", "features": features });
    if !collection["crs"].is_null() {
        out["crs"] = collection["crs"].clone();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: Value, watershed: &str, x: f64, y: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": { "CatchIDN": id, "Watershed": watershed },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + 0.01, y], [x + 0.01, y + 0.01], [x, y + 0.01], [x, y]]]
            }
        })
    }

    fn layer() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                square(json!(10), "Aliso", -117.70, 33.50),
                square(json!("23"), "Aliso", -117.71, 33.51),
                square(json!(500.0), "San Juan", -117.00, 33.00),
            ]
        })
    }

    fn ids(collection: &Value) -> Vec<Value> {
        collection["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["properties"]["CatchIDN"].clone())
            .collect()
    }

    #[test]
    fn new_normalizes_lists() {
        let filter = SpatialFilter::new(None, vec!["b".into(), "a".into(), "b".into()], vec![3, 1, 3]);
        assert_eq!(filter.watersheds, vec!["a", "b"]);
        assert_eq!(filter.catchidns, vec![1, 3]);
        assert!(!filter.is_unfiltered());
        assert!(SpatialFilter::default().is_unfiltered());
    }

    #[test]
    fn bbox_keeps_intersecting_features() {
        let bbox = Bbox::from_array([-117.78, 33.45, -117.58, 33.72]).unwrap();
        let out = filter_features(
            &layer(),
            &SpatialFilter::new(Some(bbox), vec![], vec![]),
            "CatchIDN",
            "Watershed",
        );
        assert_eq!(ids(&out), vec![json!(10), json!("23")]);
    }

    #[test]
    fn watershed_filter() {
        let out = filter_features(
            &layer(),
            &SpatialFilter::new(None, vec!["San Juan".into()], vec![]),
            "CatchIDN",
            "Watershed",
        );
        assert_eq!(ids(&out), vec![json!(500.0)]);
    }

    #[test]
    fn catchment_filter_accepts_loose_id_encodings() {
        let out = filter_features(
            &layer(),
            &SpatialFilter::new(None, vec![], vec![23, 500]),
            "CatchIDN",
            "Watershed",
        );
        assert_eq!(ids(&out), vec![json!("23"), json!(500.0)]);
    }
}
