// Declarative chart specification (the input contract)

use crate::error::Result;
use crate::stat::{Anchor, GroupOrdering};
use crate::RenderOptions;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Complete chart specification
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChartSpec {
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub scales: Vec<ScaleSpec>,
    #[serde(default, alias = "facet")]
    pub facets: Option<FacetSpec>,
    #[serde(default)]
    pub options: Option<RenderOptions>,
}

impl ChartSpec {
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn parse(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

/// One visual series: geometry + mapping + statistic + display parameters
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    #[serde(default = "default_geometry")]
    pub geometry: String,
    /// Aesthetic name to field name, `"{template}"` or constant
    #[serde(default)]
    pub mapping: BTreeMap<String, Value>,
    #[serde(default)]
    pub statistic: Option<StatisticSpec>,

    // Fixed visual properties (not data-driven)
    pub size: Option<f64>,
    pub width: Option<f64>,
    pub color: Option<String>,
    pub fill: Option<String>,
    pub opacity: Option<f64>,
    pub linewidth: Option<f64>,
    /// `"hover"` makes the marks visible on hover only
    pub show: Option<String>,
    pub arrow: Option<ArrowHeadSpec>,
    /// Accepted for compatibility; lines are drawn as straight segments
    #[serde(default)]
    pub smooth: bool,
}

fn default_geometry() -> String {
    "point".to_string()
}

impl Default for LayerSpec {
    fn default() -> Self {
        LayerSpec {
            geometry: default_geometry(),
            mapping: BTreeMap::new(),
            statistic: None,
            size: None,
            width: None,
            color: None,
            fill: None,
            opacity: None,
            linewidth: None,
            show: None,
            arrow: None,
            smooth: false,
        }
    }
}

impl LayerSpec {
    pub fn new(geometry: &str) -> Self {
        LayerSpec {
            geometry: geometry.to_string(),
            ..Default::default()
        }
    }

    pub fn map(mut self, aesthetic: &str, field: &str) -> Self {
        self.mapping.insert(aesthetic.to_string(), Value::String(field.to_string()));
        self
    }

    pub fn with_statistic(mut self, statistic: StatisticSpec) -> Self {
        self.statistic = Some(statistic);
        self
    }
}

/// Arrow head dimensions in pixels
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ArrowHeadSpec {
    #[serde(default = "default_arrow_length")]
    pub length: f64,
    #[serde(default = "default_arrow_width")]
    pub width: f64,
}

fn default_arrow_length() -> f64 { 10.0 }
fn default_arrow_width() -> f64 { 3.0 }

impl Default for ArrowHeadSpec {
    fn default() -> Self {
        Self {
            length: default_arrow_length(),
            width: default_arrow_width(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatisticSpec {
    pub kind: String,
    pub variable: Option<String>,
    pub bins: Option<usize>,
    pub binsize: Option<f64>,
    pub group: Option<String>,
    #[serde(rename = "groupOrdering", alias = "group_ordering")]
    pub group_ordering: Option<GroupOrdering>,
    pub head: Option<Anchor>,
    pub tail: Option<Anchor>,
}

impl StatisticSpec {
    pub fn new(kind: &str) -> Self {
        StatisticSpec {
            kind: kind.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScaleSpec {
    pub aesthetic: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub center: Option<Value>,
    pub values: Option<Vec<Value>>,
    /// Two numbers (pixel interval) or a list of colors
    pub range: Option<Vec<Value>>,
    pub legend: Option<String>,
    /// Band padding for categorical scales, in band units
    pub padding: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacetSpec {
    #[serde(rename = "type", default = "default_facet_kind")]
    pub kind: String,
    pub x: Option<String>,
    pub y: Option<String>,
    pub scales: Option<String>,
}

fn default_facet_kind() -> String {
    "single".to_string()
}
