//! Metrics query construction and aggregation

use crate::error::{LyraError, LyraResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One row of `DTMetrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub catchidn: i64,
    pub variable: i64,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// One row of `DTMetricsCategories`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub variable: i64,
    pub variable_name: String,
}

/// A metrics row with its variable code resolved to a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub catchidn: i64,
    pub variable: String,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// Month-resolution point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> LyraResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(LyraError::InvalidDate(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }
}

impl FromStr for YearMonth {
    type Err = LyraError;

    /// Parse `YYYY-MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LyraError::InvalidDate(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Reduction applied to each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Mean,
    Min,
    Max,
}

impl FromStr for Aggregation {
    type Err = LyraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(LyraError::UnknownAggregation(s.to_string())),
        }
    }
}

impl Aggregation {
    fn apply(self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Time resolution of aggregated output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Month,
    Year,
}

impl FromStr for Granularity {
    type Err = LyraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(LyraError::UnknownAggregation(format!("by {s}"))),
        }
    }
}

/// Aggregated value for one variable and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub variable: String,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    pub value: f64,
}

/// Reduce records per `variable, year[, month]`, in key order
pub fn aggregate(
    records: &[MetricRecord],
    aggregation: Aggregation,
    granularity: Granularity,
) -> Vec<AggregateRecord> {
    let mut groups: BTreeMap<(String, i32, Option<u32>), Vec<f64>> = BTreeMap::new();
    for r in records {
        let month = match granularity {
            Granularity::Month => Some(r.month),
            Granularity::Year => None,
        };
        groups
            .entry((r.variable.clone(), r.year, month))
            .or_default()
            .push(r.value);
    }

    groups
        .into_iter()
        .map(|((variable, year, month), values)| AggregateRecord {
            variable,
            year,
            month,
            value: aggregation.apply(&values),
        })
        .collect()
}

/// Parameterized filter over `DTMetrics`
///
/// Each set filter becomes an OR-group of equality tests; an unset one
/// becomes `1=?` bound to 1 so the parameter layout never changes shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsQuery {
    pub catchidns: Option<Vec<i64>>,
    pub variables: Option<Vec<i64>>,
    pub years: Option<Vec<i64>>,
    pub months: Option<Vec<i64>>,
}

impl MetricsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catchidns(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.catchidns = Some(ids.into_iter().collect());
        self
    }

    pub fn variables(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.variables = Some(codes.into_iter().collect());
        self
    }

    pub fn years(mut self, years: impl IntoIterator<Item = i64>) -> Self {
        self.years = Some(years.into_iter().collect());
        self
    }

    pub fn months(mut self, months: impl IntoIterator<Item = i64>) -> Self {
        self.months = Some(months.into_iter().collect());
        self
    }

    fn group(column: &str, values: &Option<Vec<i64>>, params: &mut Vec<i64>) -> String {
        match values {
            Some(values) if !values.is_empty() => {
                params.extend(values);
                vec![format!("{column} = ?"); values.len()].join(" or ")
            }
            _ => {
                params.push(1);
                "1=?".to_string()
            }
        }
    }

    /// SQL text and positional parameters
    pub fn to_sql(&self) -> (String, Vec<i64>) {
        let mut params = Vec::new();
        let catch = Self::group("catchidn", &self.catchidns, &mut params);
        let var = Self::group("variable", &self.variables, &mut params);
        let year = Self::group("year", &self.years, &mut params);
        let month = Self::group("month", &self.months, &mut params);

        let sql = format!(
            "select catchidn, variable, year, month, value from DTMetrics \
             where ({catch}) and ({var}) and ({year}) and ({month}) \
             order by catchidn asc, variable asc, year asc, month asc"
        );
        (sql, params)
    }

    /// Filters used, for reporting an empty result
    pub fn filters(&self) -> Value {
        json!({
            "catchidn": self.catchidns,
            "variable": self.variables,
            "year": self.years,
            "month": self.months,
        })
    }
}
