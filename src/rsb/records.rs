//! Catchment records parsed from GeoJSON or CSV bytes

use crate::error::{LyraError, LyraResult};
use crate::geometry;
use crate::source::SourceFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of named fields
pub type Row = Map<String, Value>;

/// Representative point columns added to every parsed row
pub const REP_X: &str = "rep_x";
pub const REP_Y: &str = "rep_y";

/// Column holding the watershed name
pub const WATERSHED: &str = "Watershed";

/// Typed view of one catchment row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentRecord {
    pub catchment_id: i64,
    pub downstream_catchment_id: i64,
    pub watershed_name: String,
    pub representative_x: f64,
    pub representative_y: f64,
}

impl CatchmentRecord {
    pub fn new(catchment_id: i64, downstream_catchment_id: i64, watershed_name: &str) -> Self {
        Self {
            catchment_id,
            downstream_catchment_id,
            watershed_name: watershed_name.to_string(),
            representative_x: 0.0,
            representative_y: 0.0,
        }
    }

    pub fn with_point(mut self, x: f64, y: f64) -> Self {
        self.representative_x = x;
        self.representative_y = y;
        self
    }

    /// Row form using the given id column names
    pub fn to_row(&self, source_column: &str, target_column: &str) -> Row {
        let mut row = Row::new();
        row.insert(source_column.to_string(), self.catchment_id.into());
        row.insert(
            target_column.to_string(),
            self.downstream_catchment_id.into(),
        );
        row.insert(WATERSHED.to_string(), self.watershed_name.clone().into());
        row.insert(REP_X.to_string(), self.representative_x.into());
        row.insert(REP_Y.to_string(), self.representative_y.into());
        row
    }
}

/// Read an integer id from a row
///
/// Accepts JSON integers, integral floats and numeric strings; a missing
/// or null field is a malformed record.
pub fn id_field(row: &Row, column: &str, index: usize) -> LyraResult<i64> {
    let value = match row.get(column) {
        None | Some(Value::Null) => return Err(LyraError::malformed(column, index)),
        Some(v) => v,
    };

    let invalid = |reason: &str| LyraError::InvalidRecordValue {
        column: column.to_string(),
        row: index,
        reason: format!("{}: {}", reason, value),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                    _ => Err(invalid("not an integer id")),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid("not an integer id")),
        _ => Err(invalid("not an integer id")),
    }
}

/// Parse rows from bytes in either supported encoding
pub fn parse_rows(bytes: &[u8]) -> LyraResult<Vec<Row>> {
    match SourceFormat::detect(bytes) {
        SourceFormat::GeoJson => rows_from_geojson(bytes),
        SourceFormat::Csv => rows_from_csv(bytes),
    }
}

/// Feature properties of a GeoJSON FeatureCollection
///
/// Geometry is dropped; a representative point is kept as `rep_x`/`rep_y`.
pub fn rows_from_geojson(bytes: &[u8]) -> LyraResult<Vec<Row>> {
    let doc: Value = serde_json::from_slice(bytes)?;
    let features = doc["features"].as_array().cloned().unwrap_or_default();

    Ok(features
        .into_iter()
        .map(|feature| {
            let mut row = feature["properties"].as_object().cloned().unwrap_or_default();
            let point = geometry::representative_point(&feature["geometry"]).unwrap_or([0.0, 0.0]);
            row.insert(REP_X.to_string(), point[0].into());
            row.insert(REP_Y.to_string(), point[1].into());
            row
        })
        .collect())
}

/// Rows of a CSV table with a header line
///
/// Numeric fields become numbers, empty fields become null. Double-quoted
/// fields may contain commas and doubled quotes.
pub fn rows_from_csv(bytes: &[u8]) -> LyraResult<Vec<Row>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LyraError::Internal(format!("topology csv is not utf-8: {}", e)))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header = match lines.next() {
        Some(h) => split_csv_line(h.trim_start_matches('\u{feff}')),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        let mut row = Row::new();
        for (name, field) in header.iter().zip(fields) {
            row.insert(name.clone(), csv_value(&field));
        }
        // x/y are accepted as representative point aliases
        for (alias, column) in [("x", REP_X), ("y", REP_Y)] {
            if !row.contains_key(column) {
                if let Some(v) = row.get(alias).cloned() {
                    row.insert(column.to_string(), v);
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn csv_value(field: &str) -> Value {
    let field = field.trim();
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return i.into();
    }
    if let Ok(f) = field.parse::<f64>() {
        if f.is_finite() {
            return f.into();
        }
    }
    Value::String(field.to_string())
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
