use crate::aes::Aesthetic;
use crate::data::{as_number, category_key};
use crate::error::{GraphicError, Result};
use crate::spec::ScaleSpec;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// d3's category20 palette, the default range of color scales.
pub const CATEGORY20: [&str; 20] = [
    "#1f77b4", "#aec7e8", "#ff7f0e", "#ffbb78", "#2ca02c", "#98df8a", "#d62728", "#ff9896",
    "#9467bd", "#c5b0d5", "#8c564b", "#c49c94", "#e377c2", "#f7b6d2", "#7f7f7f", "#c7c7c7",
    "#bcbd22", "#dbdb8d", "#17becf", "#9edae5",
];

/// Default range for `size` scales (circle radius in pixels).
const DEFAULT_SIZE_RANGE: (f64, f64) = (2.0, 10.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    Linear,
    Log,
    /// Continuous over epoch milliseconds.
    Time,
    Categorical,
    Color,
}

impl ScaleKind {
    /// Convention used when a layer needs a scale the chart spec never declared.
    pub fn default_for(aesthetic: &Aesthetic) -> Self {
        match aesthetic {
            Aesthetic::Color | Aesthetic::Fill => ScaleKind::Color,
            _ => ScaleKind::Linear,
        }
    }

    pub fn is_continuous(self) -> bool {
        matches!(self, ScaleKind::Linear | ScaleKind::Log | ScaleKind::Time)
    }
}

impl FromStr for ScaleKind {
    type Err = GraphicError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(ScaleKind::Linear),
            "log" => Ok(ScaleKind::Log),
            "time" => Ok(ScaleKind::Time),
            "categorical" | "ordinal" => Ok(ScaleKind::Categorical),
            "color" | "colour" => Ok(ScaleKind::Color),
            other => Err(GraphicError::invalid_spec(format!("Unknown scale type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    Continuous(f64, f64),
    /// Ordered category keys (see [`category_key`]).
    Discrete(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleRange {
    Interval(f64, f64),
    /// Equal bands across `[start, end]`, padding in band units.
    Bands { start: f64, end: f64, padding: f64 },
    Palette(Vec<String>),
}

/// Output of a scale lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaledValue {
    Number(f64),
    Color(String),
}

impl ScaledValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScaledValue::Number(n) => Some(*n),
            ScaledValue::Color(_) => None,
        }
    }

    pub fn into_color(self) -> Option<String> {
        match self {
            ScaledValue::Color(c) => Some(c),
            ScaledValue::Number(_) => None,
        }
    }
}

/// One axis tick: pixel position and label.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

#[derive(Debug, Clone)]
enum RangeOverride {
    Interval(f64, f64),
    Palette(Vec<String>),
}

/// Maps domain values for one aesthetic onto range values.
#[derive(Debug, Clone)]
pub struct Scale {
    aesthetic: Aesthetic,
    kind: ScaleKind,
    min: Option<f64>,
    max: Option<f64>,
    center: Option<f64>,
    values: Option<Vec<String>>,
    range_override: Option<RangeOverride>,
    legend: Option<String>,
    padding: f64,
    domain: Option<Domain>,
    domain_set: bool,
    range: Option<ScaleRange>,
}

impl Scale {
    pub fn new(aesthetic: Aesthetic, kind: ScaleKind) -> Self {
        Scale {
            aesthetic,
            kind,
            min: None,
            max: None,
            center: None,
            values: None,
            range_override: None,
            legend: None,
            padding: 1.0,
            domain: None,
            domain_set: false,
            range: None,
        }
    }

    /// Default scale for an aesthetic the chart spec never declared.
    pub fn default_for(aesthetic: Aesthetic) -> Self {
        let kind = ScaleKind::default_for(&aesthetic);
        Scale::new(aesthetic, kind)
    }

    pub fn from_spec(spec: &ScaleSpec) -> Result<Self> {
        let aesthetic: Aesthetic = spec.aesthetic.parse()?;
        let kind = match &spec.kind {
            Some(k) => k.parse()?,
            None => ScaleKind::default_for(&aesthetic),
        };
        let mut scale = Scale::new(aesthetic, kind);
        scale.legend = spec.legend.clone();

        let bound = |name: &str, v: &Option<Value>| -> Result<Option<f64>> {
            match v {
                None => Ok(None),
                Some(v) => scale.numeric(v).map(Some).ok_or_else(|| {
                    GraphicError::invalid_spec(format!("Scale '{}' has non-numeric {}: {}", spec.aesthetic, name, v))
                }),
            }
        };
        let min = bound("min", &spec.min)?;
        let max = bound("max", &spec.max)?;
        let center = bound("center", &spec.center)?;
        if kind == ScaleKind::Log {
            if let Some(bad) = [min, max].into_iter().flatten().find(|v| *v <= 0.0) {
                return Err(GraphicError::invalid_spec(format!(
                    "Log scale '{}' needs positive bounds, got {}",
                    spec.aesthetic, bad
                )));
            }
        }
        scale.min = min;
        scale.max = max;
        scale.center = center;

        if let Some(p) = spec.padding {
            if p < 0.0 {
                return Err(GraphicError::invalid_spec("Scale padding must be non-negative"));
            }
            scale.padding = p;
        }

        if let Some(range) = &spec.range {
            scale.range_override = Some(parse_range(range)?);
        }

        if let Some(values) = &spec.values {
            if kind.is_continuous() {
                return Err(GraphicError::invalid_spec(format!(
                    "Scale '{}': 'values' requires a categorical or color scale",
                    spec.aesthetic
                )));
            }
            let keys: Vec<String> = values.iter().map(category_key).collect();
            scale.values = Some(keys.clone());
            scale.fix_domain(Domain::Discrete(keys));
        } else if let (Some(min), Some(max)) = (min, max) {
            if kind.is_continuous() {
                let (lo, hi) = scale.centered(min, max);
                scale.fix_domain(Domain::Continuous(lo, hi));
            }
        }

        Ok(scale)
    }

    pub fn aesthetic(&self) -> &Aesthetic {
        &self.aesthetic
    }

    pub fn kind(&self) -> ScaleKind {
        self.kind
    }

    pub fn legend(&self) -> Option<&str> {
        self.legend.as_deref()
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.domain.as_ref()
    }

    pub fn range(&self) -> Option<&ScaleRange> {
        self.range.as_ref()
    }

    /// True once the domain is fixed, by the chart spec or by data.
    pub fn domain_set(&self) -> bool {
        self.domain_set
    }

    pub fn is_trained(&self) -> bool {
        self.domain.is_some() && self.range.is_some()
    }

    fn fix_domain(&mut self, domain: Domain) {
        debug!(aesthetic = %self.aesthetic, ?domain, "Scale domain fixed");
        self.domain = Some(domain);
        self.domain_set = true;
    }

    /// Forget a domain that was inferred from data. Spec-supplied domains stay.
    pub fn reset_domain(&mut self) {
        let from_spec = self.values.is_some()
            || (self.kind.is_continuous() && self.min.is_some() && self.max.is_some());
        if !from_spec {
            self.domain = None;
            self.domain_set = false;
        }
    }

    /// Numeric view of a domain value for this scale's kind.
    fn numeric(&self, value: &Value) -> Option<f64> {
        match self.kind {
            ScaleKind::Time => parse_time(value),
            _ => as_number(value),
        }
    }

    fn centered(&self, min: f64, max: f64) -> (f64, f64) {
        match self.center {
            Some(c) => {
                let half = (max - c).max((min - c).abs());
                (c - half, c + half)
            }
            None => (min, max),
        }
    }

    /// Infer the domain from observed values unless it is already fixed.
    /// Training with no usable values leaves a provisional domain that a
    /// later call may still replace.
    pub fn default_domain(&mut self, values: &[Value]) {
        if self.domain_set {
            return;
        }

        if self.kind.is_continuous() {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for v in values {
                match self.numeric(v) {
                    Some(n) if self.kind != ScaleKind::Log || n > 0.0 => {
                        lo = lo.min(n);
                        hi = hi.max(n);
                    }
                    _ => {}
                }
            }
            let observed = lo.is_finite();
            let min = self.min.or(observed.then_some(lo));
            let max = self.max.or(observed.then_some(hi));
            match (min, max) {
                (Some(min), Some(max)) => {
                    let (lo, hi) = self.centered(min, max);
                    self.fix_domain(Domain::Continuous(lo, hi));
                }
                _ => {
                    let fallback = if self.kind == ScaleKind::Log { (1.0, 10.0) } else { (0.0, 1.0) };
                    let lo = min.unwrap_or(fallback.0);
                    let hi = max.unwrap_or(if lo < fallback.1 { fallback.1 } else { lo + 1.0 });
                    debug!(aesthetic = %self.aesthetic, "No values to train scale; using provisional domain");
                    self.domain = Some(Domain::Continuous(lo, hi));
                }
            }
        } else {
            let keys = order_categories(values);
            if keys.is_empty() {
                self.domain = Some(Domain::Discrete(Vec::new()));
            } else {
                self.fix_domain(Domain::Discrete(keys));
            }
        }
    }

    /// Set the output interval. Positional scales get the plotting region;
    /// color scales use their palette whatever the interval.
    pub fn set_range(&mut self, interval: (f64, f64)) {
        let range = match (&self.range_override, self.kind) {
            (Some(RangeOverride::Palette(colors)), _) => ScaleRange::Palette(colors.clone()),
            (_, ScaleKind::Color) => ScaleRange::Palette(CATEGORY20.iter().map(|c| c.to_string()).collect()),
            (Some(RangeOverride::Interval(a, b)), ScaleKind::Categorical) => {
                ScaleRange::Bands { start: *a, end: *b, padding: self.padding }
            }
            (None, ScaleKind::Categorical) => {
                ScaleRange::Bands { start: interval.0, end: interval.1, padding: self.padding }
            }
            (Some(RangeOverride::Interval(a, b)), _) => ScaleRange::Interval(*a, *b),
            (None, _) => ScaleRange::Interval(interval.0, interval.1),
        };
        self.range = Some(range);
    }

    /// Range for non-positional aesthetics, which no plotting region determines.
    pub fn ensure_default_range(&mut self) {
        if self.range.is_none() {
            let interval = match self.aesthetic {
                Aesthetic::Size => DEFAULT_SIZE_RANGE,
                _ => (0.0, 1.0),
            };
            self.set_range(interval);
        }
    }

    fn trained(&self) -> Result<(&Domain, &ScaleRange)> {
        match (&self.domain, &self.range) {
            (Some(d), Some(r)) => Ok((d, r)),
            _ => Err(GraphicError::ScaleNotTrained { aesthetic: self.aesthetic.to_string() }),
        }
    }

    /// Map a domain value into the range. `Ok(None)` means the value cannot be
    /// placed (absent, non-numeric, unknown category, non-positive on a log scale).
    pub fn scale(&self, value: &Value) -> Result<Option<ScaledValue>> {
        let (domain, range) = self.trained()?;
        let scaled = match domain {
            Domain::Continuous(d0, d1) => self.numeric(value).and_then(|v| {
                let t = match self.kind {
                    ScaleKind::Log => {
                        if v <= 0.0 || *d0 <= 0.0 || *d1 <= 0.0 {
                            return None;
                        }
                        ratio(v.log10(), d0.log10(), d1.log10())
                    }
                    _ => ratio(v, *d0, *d1),
                };
                Some(interpolate(range, t))
            }),
            Domain::Discrete(keys) => {
                let key = category_key(value);
                keys.iter().position(|k| *k == key).map(|i| match range {
                    ScaleRange::Palette(colors) if !colors.is_empty() => {
                        ScaledValue::Color(colors[i % colors.len()].clone())
                    }
                    ScaleRange::Palette(_) => ScaledValue::Color("black".to_string()),
                    ScaleRange::Bands { start, end, padding } => {
                        ScaledValue::Number(band_center(*start, *end, *padding, keys.len(), i))
                    }
                    ScaleRange::Interval(a, b) => {
                        let t = if keys.len() > 1 { i as f64 / (keys.len() - 1) as f64 } else { 0.5 };
                        ScaledValue::Number(a + t * (b - a))
                    }
                })
            }
        };
        Ok(scaled)
    }

    /// Numeric lookup, for positional and size aesthetics.
    pub fn scale_number(&self, value: &Value) -> Result<Option<f64>> {
        Ok(self.scale(value)?.and_then(|v| v.as_f64()))
    }

    /// Pixel position of the low end of the domain (the baseline of bars).
    pub fn scaled_min(&self) -> Result<f64> {
        let (_, range) = self.trained()?;
        Ok(range_start(range))
    }

    /// Width of one category band in pixels; zero for continuous scales.
    pub fn band_width(&self) -> f64 {
        match (&self.domain, &self.range) {
            (Some(Domain::Discrete(keys)), Some(ScaleRange::Bands { start, end, padding })) => {
                band_width(*start, *end, *padding, keys.len())
            }
            _ => 0.0,
        }
    }

    /// Tick positions and labels for an axis drawn from this scale.
    pub fn ticks(&self, count: usize) -> Result<Vec<Tick>> {
        let (domain, _) = self.trained()?;
        let ticks = match domain {
            Domain::Discrete(keys) => keys
                .iter()
                .filter_map(|k| {
                    let position = self.scale_number(&Value::String(k.clone())).ok().flatten()?;
                    Some(Tick { position, label: k.clone() })
                })
                .collect(),
            Domain::Continuous(d0, d1) => {
                let values = match self.kind {
                    ScaleKind::Log => log_ticks(*d0, *d1),
                    _ => nice_ticks(*d0, *d1, count),
                };
                values
                    .into_iter()
                    .filter(|v| *v >= d0.min(*d1) - 1e-9 && *v <= d0.max(*d1) + 1e-9)
                    .filter_map(|v| {
                        let position = self.scale_number(&crate::data::number(v)).ok().flatten()?;
                        let label = match self.kind {
                            ScaleKind::Time => format_time(v),
                            _ => format_number(v),
                        };
                        Some(Tick { position, label })
                    })
                    .collect()
            }
        };
        Ok(ticks)
    }
}

fn parse_range(range: &[Value]) -> Result<RangeOverride> {
    if range.len() == 2 {
        if let (Some(a), Some(b)) = (range[0].as_f64(), range[1].as_f64()) {
            return Ok(RangeOverride::Interval(a, b));
        }
    }
    range
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| GraphicError::invalid_spec(format!("Scale range entry {} is not a color", v)))
        })
        .collect::<Result<Vec<_>>>()
        .map(RangeOverride::Palette)
}

fn ratio(v: f64, d0: f64, d1: f64) -> f64 {
    let denom = d1 - d0;
    if denom == 0.0 {
        0.5
    } else {
        (v - d0) / denom
    }
}

fn interpolate(range: &ScaleRange, t: f64) -> ScaledValue {
    match range {
        ScaleRange::Interval(r0, r1) | ScaleRange::Bands { start: r0, end: r1, .. } => {
            ScaledValue::Number(r0 + t * (r1 - r0))
        }
        ScaleRange::Palette(colors) => {
            if colors.is_empty() {
                return ScaledValue::Color("black".to_string());
            }
            let idx = (t.clamp(0.0, 1.0) * (colors.len() - 1) as f64).round() as usize;
            ScaledValue::Color(colors[idx].clone())
        }
    }
}

fn range_start(range: &ScaleRange) -> f64 {
    match range {
        ScaleRange::Interval(r0, _) | ScaleRange::Bands { start: r0, .. } => *r0,
        ScaleRange::Palette(_) => 0.0,
    }
}

fn band_width(start: f64, end: f64, padding: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let denom = n + padding * (n - 1.0) + 2.0 * padding;
    if denom == 0.0 {
        0.0
    } else {
        (end - start).abs() / denom
    }
}

fn band_center(start: f64, end: f64, padding: f64, n: usize, index: usize) -> f64 {
    let bw = band_width(start, end, padding, n);
    let sign = if end >= start { 1.0 } else { -1.0 };
    let offset = bw * padding + bw * (1.0 + padding) * index as f64 + bw / 2.0;
    start + sign * offset
}

/// Distinct category keys: numeric order when every value is numeric,
/// first-seen order otherwise.
pub fn order_categories(values: &[Value]) -> Vec<String> {
    let mut seen: Vec<(String, Option<f64>)> = Vec::new();
    for v in values {
        if v.is_null() {
            continue;
        }
        let key = category_key(v);
        if !seen.iter().any(|(k, _)| *k == key) {
            seen.push((key, as_number(v)));
        }
    }
    if seen.iter().all(|(_, n)| n.is_some()) {
        seen.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }
    seen.into_iter().map(|(k, _)| k).collect()
}

/// Epoch milliseconds from a number, an RFC 3339 timestamp or a `YYYY-MM-DD` date.
pub fn parse_time(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis() as f64);
            }
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis() as f64)
        }
        _ => None,
    }
}

fn format_time(ms: f64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms as i64) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => format_number(ms),
    }
}

fn format_number(v: f64) -> String {
    let rounded = (v * 1e6).round() / 1e6;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

fn nice_ticks(mut min: f64, mut max: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    if min == max {
        return vec![min];
    }
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }
    let step = nice_step((max - min) / count as f64);
    if step == 0.0 {
        return vec![min, max];
    }
    let start = (min / step).ceil();
    let stop = (max / step).floor();
    let n = (stop - start).max(0.0).min(10_000.0) as usize;
    (0..=n).map(|i| (start + i as f64) * step).collect()
}

fn nice_step(step: f64) -> f64 {
    if !step.is_finite() || step <= 0.0 {
        return 0.0;
    }
    let power = 10f64.powf(step.log10().floor());
    let err = step / power;
    let factor = if err >= 7.5 {
        10.0
    } else if err >= 3.5 {
        5.0
    } else if err >= 1.5 {
        2.0
    } else {
        1.0
    };
    factor * power
}

fn log_ticks(min: f64, max: f64) -> Vec<f64> {
    if min <= 0.0 || max <= 0.0 {
        return Vec::new();
    }
    let (lo, hi) = (min.min(max).log10().ceil() as i32, min.max(max).log10().floor() as i32);
    let ticks: Vec<f64> = (lo..=hi).map(|p| 10f64.powi(p)).collect();
    if ticks.len() < 2 {
        nice_ticks(min, max, 5)
    } else {
        ticks
    }
}

/// The graphic-wide table of scales, one per aesthetic.
#[derive(Debug, Clone, Default)]
pub struct ScaleSet {
    scales: BTreeMap<Aesthetic, Scale>,
}

impl ScaleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declared scale. A later declaration for the same aesthetic wins.
    pub fn insert(&mut self, scale: Scale) {
        self.scales.insert(scale.aesthetic().clone(), scale);
    }

    pub fn get(&self, aesthetic: &Aesthetic) -> Option<&Scale> {
        self.scales.get(&aesthetic.scale_aesthetic())
    }

    pub fn get_mut(&mut self, aesthetic: &Aesthetic) -> Option<&mut Scale> {
        self.scales.get_mut(&aesthetic.scale_aesthetic())
    }

    /// The scale for an aesthetic, created by convention if missing.
    pub fn ensure(&mut self, aesthetic: &Aesthetic, hint: Option<ScaleKind>) -> &mut Scale {
        let key = aesthetic.scale_aesthetic();
        self.scales.entry(key.clone()).or_insert_with(|| {
            let kind = hint.unwrap_or_else(|| ScaleKind::default_for(&key));
            debug!(aesthetic = %key, ?kind, "Created default scale");
            Scale::new(key, kind)
        })
    }

    /// Lookup through the scale for `aesthetic`.
    pub fn scale(&self, aesthetic: &Aesthetic, value: &Value) -> Result<Option<ScaledValue>> {
        self.get(aesthetic)
            .ok_or_else(|| GraphicError::ScaleNotTrained { aesthetic: aesthetic.to_string() })?
            .scale(value)
    }

    pub fn reset_domains(&mut self) {
        for scale in self.scales.values_mut() {
            scale.reset_domain();
        }
    }

    /// Forget inferred `x` and `y` domains; color, fill and size keep theirs.
    pub fn reset_positional(&mut self) {
        for aesthetic in [Aesthetic::X, Aesthetic::Y] {
            if let Some(scale) = self.scales.get_mut(&aesthetic) {
                scale.reset_domain();
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scale> {
        self.scales.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Scale> {
        self.scales.values_mut()
    }
}
