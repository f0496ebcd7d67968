// Statistical transforms: raw dataset -> derived dataset

use crate::aes::{Aesthetic, Mapping};
use crate::data::{as_number, category_key, field, number, Record};
use crate::error::{GraphicError, Result};
use crate::group::group_data;
use crate::scale::ScaleKind;
use crate::spec::StatisticSpec;
use crate::template::Selector;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_BINS: usize = 20;
/// Upper bound on bins, whether requested or implied by `binsize`.
pub const MAX_BINS: usize = 10_000;

/// Order in which box statistic groups are emitted.
#[derive(Clone, Default, Deserialize)]
#[serde(try_from = "GroupOrderingRepr")]
pub enum GroupOrdering {
    /// Numbers ascending, then everything else lexically.
    #[default]
    ByName,
    /// Listed names first, in list order; the rest by name.
    Listed(Vec<String>),
    /// Sort key computed from the group name.
    Custom(Arc<dyn Fn(&Value) -> f64 + Send + Sync>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupOrderingRepr {
    Named(String),
    Listed(Vec<Value>),
}

impl TryFrom<GroupOrderingRepr> for GroupOrdering {
    type Error = String;

    fn try_from(repr: GroupOrderingRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            GroupOrderingRepr::Named(name) if name == "identity" || name == "name" => Ok(GroupOrdering::ByName),
            GroupOrderingRepr::Named(name) => Err(format!("Unknown group ordering '{}'", name)),
            GroupOrderingRepr::Listed(values) => {
                Ok(GroupOrdering::Listed(values.iter().map(category_key).collect()))
            }
        }
    }
}

impl fmt::Debug for GroupOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupOrdering::ByName => f.write_str("ByName"),
            GroupOrdering::Listed(names) => f.debug_tuple("Listed").field(names).finish(),
            GroupOrdering::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl GroupOrdering {
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match self {
            GroupOrdering::ByName => compare_names(a, b),
            GroupOrdering::Listed(names) => {
                let pos = |v: &Value| {
                    let key = category_key(v);
                    names.iter().position(|n| *n == key).unwrap_or(names.len())
                };
                pos(a).cmp(&pos(b)).then_with(|| compare_names(a, b))
            }
            GroupOrdering::Custom(key) => key(a).total_cmp(&key(b)),
        }
    }
}

fn compare_names(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => category_key(a).cmp(&category_key(b)),
    }
}

/// One coordinate of an arrow anchor.
#[derive(Debug, Clone, PartialEq)]
pub enum Coord {
    Value(Value),
    /// Take this coordinate from the selected record.
    Select(Selector),
}

pub type AnchorFn = Arc<dyn Fn(&[Record]) -> Option<(Value, Value)> + Send + Sync>;

/// Where an arrow starts or ends, in data space.
#[derive(Clone, Deserialize)]
#[serde(try_from = "AnchorRepr")]
pub enum Anchor {
    /// Both coordinates from one selected record.
    Select(Selector),
    Point { x: Coord, y: Coord },
    Custom(AnchorFn),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnchorRepr {
    Selector(String),
    Point { x: CoordRepr, y: CoordRepr },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<CoordRepr> for Coord {
    type Error = String;

    fn try_from(repr: CoordRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            CoordRepr::Number(n) => Ok(Coord::Value(number(n))),
            CoordRepr::Text(s) => match Selector::parse(&s) {
                Ok(selector) => Ok(Coord::Select(selector)),
                // Plain strings are literal coordinates (dates, categories)
                Err(_) => Ok(Coord::Value(Value::String(s))),
            },
        }
    }
}

impl TryFrom<AnchorRepr> for Anchor {
    type Error = String;

    fn try_from(repr: AnchorRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            AnchorRepr::Selector(s) => Selector::parse(&s).map(Anchor::Select).map_err(|e| e.to_string()),
            AnchorRepr::Point { x, y } => Ok(Anchor::Point {
                x: x.try_into()?,
                y: y.try_into()?,
            }),
        }
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Select(s) => f.debug_tuple("Select").field(s).finish(),
            Anchor::Point { x, y } => f.debug_struct("Point").field("x", x).field("y", y).finish(),
            Anchor::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl Anchor {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[Record]) -> Option<(Value, Value)> + Send + Sync + 'static,
    {
        Anchor::Custom(Arc::new(f))
    }

    fn resolve(&self, data: &[Record], x_field: &str, y_field: &str) -> Option<(Value, Value)> {
        let pick = |record: &Record, name: &str| field(record, name).filter(|v| !v.is_null()).cloned();
        match self {
            Anchor::Select(selector) => {
                let record = selector.select(data)?;
                Some((pick(record, x_field)?, pick(record, y_field)?))
            }
            Anchor::Point { x, y } => {
                let coord = |c: &Coord, name: &str| match c {
                    Coord::Value(v) => Some(v.clone()),
                    Coord::Select(selector) => pick(selector.select(data)?, name),
                };
                Some((coord(x, x_field)?, coord(y, y_field)?))
            }
            Anchor::Custom(f) => f(data),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinStatistic {
    pub variable: String,
    pub bins: usize,
    pub binsize: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SumStatistic {
    pub variable: String,
    pub group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoxStatistic {
    pub variable: String,
    pub group: Option<String>,
    pub ordering: GroupOrdering,
}

#[derive(Debug, Clone)]
pub struct ArrowStatistic {
    pub head: Anchor,
    pub tail: Anchor,
    pub x_field: String,
    pub y_field: String,
}

/// A layer's data transform.
#[derive(Debug, Clone, Default)]
pub enum Statistic {
    #[default]
    Identity,
    Bin(BinStatistic),
    Sum(SumStatistic),
    Box(BoxStatistic),
    Arrow(ArrowStatistic),
}

impl Statistic {
    /// Build a statistic from its spec. `mapping` is the layer's mapping,
    /// used for fields the statistic leaves implicit.
    pub fn from_spec(spec: Option<&StatisticSpec>, mapping: &Mapping) -> Result<Self> {
        let Some(spec) = spec else {
            return Ok(Statistic::Identity);
        };
        let y_field = || mapping.field_for(&Aesthetic::Y).map(str::to_string);
        let require = |variable: Option<String>| {
            variable.ok_or_else(|| {
                GraphicError::invalid_spec(format!("Statistic '{}' requires a 'variable'", spec.kind))
            })
        };

        let stat = match spec.kind.as_str() {
            "identity" => Statistic::Identity,
            "bin" => {
                let mut bins = spec.bins.unwrap_or(DEFAULT_BINS);
                if bins == 0 {
                    warn!("Bin statistic with 0 bins; using 1");
                    bins = 1;
                }
                if bins > MAX_BINS {
                    return Err(GraphicError::invalid_spec(format!(
                        "Bin statistic asks for {} bins; at most {} are allowed",
                        bins, MAX_BINS
                    )));
                }
                if let Some(size) = spec.binsize {
                    if !size.is_finite() || size <= 0.0 {
                        return Err(GraphicError::invalid_spec(format!(
                            "Bin size must be positive, got {}",
                            size
                        )));
                    }
                }
                Statistic::Bin(BinStatistic {
                    variable: require(spec.variable.clone())?,
                    bins,
                    binsize: spec.binsize,
                })
            }
            "sum" => Statistic::Sum(SumStatistic {
                variable: require(spec.variable.clone().or_else(y_field))?,
                group: spec.group.clone(),
            }),
            "box" => Statistic::Box(BoxStatistic {
                variable: require(spec.variable.clone().or_else(y_field))?,
                group: spec.group.clone(),
                ordering: spec.group_ordering.clone().unwrap_or_default(),
            }),
            "arrow" => {
                let anchor = |a: &Option<Anchor>, name: &str| {
                    a.clone().ok_or_else(|| {
                        GraphicError::invalid_spec(format!("Arrow statistic requires a '{}' anchor", name))
                    })
                };
                Statistic::Arrow(ArrowStatistic {
                    head: anchor(&spec.head, "head")?,
                    tail: anchor(&spec.tail, "tail")?,
                    x_field: mapping.field_for(&Aesthetic::X).unwrap_or("x").to_string(),
                    y_field: mapping.field_for(&Aesthetic::Y).unwrap_or("y").to_string(),
                })
            }
            other => {
                return Err(GraphicError::invalid_spec(format!(
                    "Unknown statistic '{}'. Expected identity, bin, sum, box or arrow",
                    other
                )))
            }
        };
        Ok(stat)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Identity => "identity",
            Statistic::Bin(_) => "bin",
            Statistic::Sum(_) => "sum",
            Statistic::Box(_) => "box",
            Statistic::Arrow(_) => "arrow",
        }
    }

    /// Mappings filled in for aesthetics the user left unmapped.
    pub fn default_mapping(&self) -> Vec<(Aesthetic, &'static str)> {
        match self {
            Statistic::Bin(_) => vec![(Aesthetic::X, "bin"), (Aesthetic::Y, "count")],
            Statistic::Sum(_) => vec![(Aesthetic::X, "group"), (Aesthetic::Y, "sum")],
            Statistic::Box(_) => vec![(Aesthetic::X, "group")],
            Statistic::Identity | Statistic::Arrow(_) => Vec::new(),
        }
    }

    /// Scale kind preferred over the aesthetic's default, if any.
    pub fn scale_hint(&self, aesthetic: &Aesthetic) -> Option<ScaleKind> {
        match (self, aesthetic) {
            (Statistic::Sum(_) | Statistic::Box(_), Aesthetic::X) => Some(ScaleKind::Categorical),
            _ => None,
        }
    }

    pub fn compute(&self, data: &[Record]) -> Vec<Record> {
        let derived = match self {
            Statistic::Identity => data.to_vec(),
            Statistic::Bin(bin) => bin.compute(data),
            Statistic::Sum(sum) => sum.compute(data),
            Statistic::Box(b) => b.compute(data),
            Statistic::Arrow(arrow) => arrow.compute(data),
        };
        debug!(statistic = self.name(), input = data.len(), output = derived.len(), "Computed statistic");
        derived
    }

    /// Fallback extent for an aesthetic the derived records carry no
    /// values for.
    pub fn data_range(&self, derived: &[Record], aesthetic: &Aesthetic) -> Option<(f64, f64)> {
        let aesthetic = aesthetic.scale_aesthetic();
        match self {
            Statistic::Identity => None,
            Statistic::Bin(_) => match aesthetic {
                Aesthetic::X => extent(derived, &["x0", "x1"]),
                Aesthetic::Y => extent(derived, &["count"]).map(|(_, hi)| (0.0, hi)),
                _ => None,
            },
            Statistic::Sum(_) => match aesthetic {
                Aesthetic::Y => extent(derived, &["sum"]).map(|(lo, hi)| (lo.min(0.0), hi.max(0.0))),
                _ => None,
            },
            Statistic::Box(_) => match aesthetic {
                Aesthetic::Y => extent(derived, &["min", "max"]),
                _ => None,
            },
            Statistic::Arrow(_) => match aesthetic {
                Aesthetic::X => extent(derived, &["head.x", "tail.x"]),
                Aesthetic::Y => extent(derived, &["head.y", "tail.y"]),
                _ => None,
            },
        }
    }
}

fn extent(records: &[Record], fields: &[&str]) -> Option<(f64, f64)> {
    let values = records
        .iter()
        .flat_map(|r| fields.iter().filter_map(move |f| field(r, f).and_then(as_number)));
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn numeric_values(data: &[Record], variable: &str) -> Vec<f64> {
    data.iter()
        .filter_map(|r| field(r, variable).and_then(as_number))
        .filter(|v| v.is_finite())
        .collect()
}

/// Numeric values of `variable`, or `EmptyDataset` when there are none.
fn required_values(data: &[Record], variable: &str, statistic: &str) -> Result<Vec<f64>> {
    let values = numeric_values(data, variable);
    if values.is_empty() {
        return Err(GraphicError::EmptyDataset { statistic: statistic.to_string() });
    }
    Ok(values)
}

impl BinStatistic {
    fn compute(&self, data: &[Record]) -> Vec<Record> {
        let values = match required_values(data, &self.variable, "bin") {
            Ok(values) => values,
            Err(e) => {
                debug!(variable = %self.variable, error = %e, "Emitting empty bins");
                return (0..self.bins).map(|i| bin_record(i, 0.0, 0.0, 0, 0.0, 0.0)).collect();
            }
        };
        let total = values.len();

        let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let range = max - min;

        let (bin_count, width) = match self.binsize {
            Some(size) if range / size > MAX_BINS as f64 => {
                warn!(binsize = size, range, max = MAX_BINS, "Bin size too small for data range; clamping bin count");
                (MAX_BINS, range / MAX_BINS as f64)
            }
            Some(size) => (((range / size).ceil() as usize).max(1), size),
            None if range == 0.0 => (self.bins, 1.0),
            None => (self.bins, range / self.bins as f64),
        };

        let mut counts = vec![0usize; bin_count];
        for v in &values {
            // The maximum falls on the upper edge of the last bin
            let idx = (((v - min) / width).floor() as usize).min(bin_count - 1);
            counts[idx] += 1;
        }

        counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let x0 = min + i as f64 * width;
                let density = count as f64 / (total as f64 * width);
                let ncount = count as f64 / total as f64;
                bin_record(i, x0, x0 + width, count, density, ncount)
            })
            .collect()
    }
}

fn bin_record(bin: usize, x0: f64, x1: f64, count: usize, density: f64, ncount: f64) -> Record {
    let mut record = Record::new();
    record.insert("bin".to_string(), json!(bin));
    record.insert("x0".to_string(), number(x0));
    record.insert("x1".to_string(), number(x1));
    record.insert("count".to_string(), json!(count));
    record.insert("density".to_string(), number(density));
    record.insert("ncount".to_string(), number(ncount));
    record
}

impl SumStatistic {
    fn compute(&self, data: &[Record]) -> Vec<Record> {
        group_data(data, self.group.as_deref())
            .into_iter()
            .map(|group| {
                let values = numeric_values(&group.records, &self.variable);
                let mut record = Record::new();
                record.insert("group".to_string(), group.name);
                record.insert("count".to_string(), json!(values.len()));
                let sum: f64 = values.iter().sum();
                record.insert("sum".to_string(), number(sum));
                if values.is_empty() {
                    for key in ["min", "max", "mean"] {
                        record.insert(key.to_string(), Value::Null);
                    }
                } else {
                    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                    record.insert("min".to_string(), number(min));
                    record.insert("max".to_string(), number(max));
                    record.insert("mean".to_string(), number(sum / values.len() as f64));
                }
                record
            })
            .collect()
    }
}

/// Linear interpolation between closest ranks.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }

    let rank = p * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

impl BoxStatistic {
    fn compute(&self, data: &[Record]) -> Vec<Record> {
        let mut boxes: Vec<(Value, Record)> = Vec::new();
        for group in group_data(data, self.group.as_deref()) {
            let mut values = match required_values(&group.records, &self.variable, "box") {
                Ok(values) => values,
                Err(e) => {
                    debug!(group = %group.key(), error = %e, "Skipping box group");
                    continue;
                }
            };
            values.sort_by(f64::total_cmp);

            let q1 = percentile(&values, 0.25);
            let median = percentile(&values, 0.5);
            let q3 = percentile(&values, 0.75);
            let iqr = q3 - q1;
            let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

            let inside: Vec<f64> = values.iter().copied().filter(|v| *v >= low_fence && *v <= high_fence).collect();
            let outliers: Vec<Value> = values
                .iter()
                .filter(|v| **v < low_fence || **v > high_fence)
                .map(|v| number(*v))
                .collect();
            // Quartiles always lie inside the fences, so `inside` is never empty
            let lower = inside.first().copied().unwrap_or(q1);
            let upper = inside.last().copied().unwrap_or(q3);

            let mut record = Record::new();
            record.insert("group".to_string(), group.name.clone());
            record.insert("count".to_string(), json!(values.len()));
            record.insert("q1".to_string(), number(q1));
            record.insert("median".to_string(), number(median));
            record.insert("q3".to_string(), number(q3));
            record.insert("lower".to_string(), number(lower));
            record.insert("upper".to_string(), number(upper));
            record.insert("outliers".to_string(), Value::Array(outliers));
            record.insert("min".to_string(), number(values[0]));
            record.insert("max".to_string(), number(values[values.len() - 1]));
            boxes.push((group.name, record));
        }

        boxes.sort_by(|a, b| self.ordering.compare(&a.0, &b.0));
        boxes.into_iter().map(|(_, r)| r).collect()
    }
}

impl ArrowStatistic {
    fn compute(&self, data: &[Record]) -> Vec<Record> {
        let head = self.head.resolve(data, &self.x_field, &self.y_field);
        let tail = self.tail.resolve(data, &self.x_field, &self.y_field);
        match (head, tail) {
            (Some((hx, hy)), Some((tx, ty))) => {
                let mut record = Record::new();
                record.insert("head".to_string(), json!({ "x": hx, "y": hy }));
                record.insert("tail".to_string(), json!({ "x": tx, "y": ty }));
                vec![record]
            }
            _ => {
                debug!("Arrow anchors did not resolve; no arrow drawn");
                Vec::new()
            }
        }
    }
}
