// Geometries: how a prepared layer turns into shapes

use crate::aes::Aesthetic;
use crate::data::{category_key, field, Record};
use crate::error::{GraphicError, Result};
use crate::layer::Layer;
use crate::scale::{ScaleKind, ScaleSet, CATEGORY20};
use crate::spec::{ArrowHeadSpec, LayerSpec};
use crate::surface::{GroupId, Shape, Style, Surface};
use serde_json::Value;
use std::str::FromStr;
use tracing::trace;

const DEFAULT_POINT_SIZE: f64 = 5.0;
const DEFAULT_BAR_WIDTH: f64 = 5.0;
const DEFAULT_BOX_WIDTH: f64 = 10.0;
const DEFAULT_LINE_WIDTH: f64 = 1.5;
const OUTLIER_RADIUS: f64 = 2.0;

/// Fixed (not data-driven) visual properties of a layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Appearance {
    pub size: Option<f64>,
    pub width: Option<f64>,
    pub color: Option<String>,
    pub fill: Option<String>,
    pub opacity: Option<f64>,
    pub linewidth: Option<f64>,
    pub hover: bool,
    pub arrow: ArrowHeadSpec,
}

impl Appearance {
    pub fn from_spec(spec: &LayerSpec) -> Result<Self> {
        let hover = match spec.show.as_deref() {
            None | Some("always") => false,
            Some("hover") => true,
            Some(other) => {
                return Err(GraphicError::invalid_spec(format!(
                    "Unknown show mode '{}'. Expected 'always' or 'hover'",
                    other
                )))
            }
        };
        Ok(Appearance {
            size: spec.size,
            width: spec.width,
            color: spec.color.clone(),
            fill: spec.fill.clone(),
            opacity: spec.opacity,
            linewidth: spec.linewidth,
            hover,
            arrow: spec.arrow.unwrap_or_default(),
        })
    }

    fn style(&self) -> Style {
        Style {
            opacity: self.opacity,
            hover: self.hover,
            class: self.hover.then(|| "hover".to_string()),
            ..Default::default()
        }
    }
}

/// Kind of mark a layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Point,
    Line,
    Area,
    /// Bars rising from the bottom of the y scale.
    Interval,
    Box,
    Text,
    Arrow,
}

impl FromStr for Geometry {
    type Err = GraphicError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "point" => Ok(Geometry::Point),
            "line" => Ok(Geometry::Line),
            "area" => Ok(Geometry::Area),
            "interval" | "bar" => Ok(Geometry::Interval),
            "box" => Ok(Geometry::Box),
            "text" => Ok(Geometry::Text),
            "arrow" => Ok(Geometry::Arrow),
            other => Err(GraphicError::invalid_spec(format!(
                "Unknown geometry '{}'. Expected point, line, area, interval, box, text or arrow",
                other
            ))),
        }
    }
}

impl Geometry {
    pub fn name(self) -> &'static str {
        match self {
            Geometry::Point => "point",
            Geometry::Line => "line",
            Geometry::Area => "area",
            Geometry::Interval => "interval",
            Geometry::Box => "box",
            Geometry::Text => "text",
            Geometry::Arrow => "arrow",
        }
    }

    /// Aesthetics that must have a trained scale before drawing, mapped or not.
    pub fn required_aesthetics(self) -> Vec<Aesthetic> {
        match self {
            Geometry::Text => vec![Aesthetic::X, Aesthetic::Y, Aesthetic::Text],
            _ => vec![Aesthetic::X, Aesthetic::Y],
        }
    }

    pub fn render(self, layer: &Layer, scales: &ScaleSet, surface: &mut dyn Surface, group: GroupId) -> Result<()> {
        let mut painter = Painter { layer, scales, surface, group };
        match self {
            Geometry::Point => painter.points(),
            Geometry::Line => painter.lines(false),
            Geometry::Area => painter.lines(true),
            Geometry::Interval => painter.intervals(),
            Geometry::Box => painter.boxes(),
            Geometry::Text => painter.texts(),
            Geometry::Arrow => painter.arrows(),
        }
    }
}

struct Painter<'a> {
    layer: &'a Layer,
    scales: &'a ScaleSet,
    surface: &'a mut dyn Surface,
    group: GroupId,
}

impl Painter<'_> {
    fn appearance(&self) -> &Appearance {
        self.layer.appearance()
    }

    fn draw(&mut self, shape: Shape) {
        self.surface.append_shape(self.group, shape);
    }

    /// Pixel position of a record along x and y; `None` drops the point.
    fn position(&self, record: &Record) -> Result<Option<(f64, f64)>> {
        let x = self.layer.number(record, &Aesthetic::X, self.scales)?;
        let y = self.layer.number(record, &Aesthetic::Y, self.scales)?;
        Ok(x.zip(y))
    }

    /// Pixel position of a raw derived field through the scale of `aesthetic`.
    fn field_position(&self, record: &Record, name: &str, aesthetic: &Aesthetic) -> Result<Option<f64>> {
        match field(record, name) {
            Some(value) if !value.is_null() => Ok(self.scales.scale(aesthetic, value)?.and_then(|v| v.as_f64())),
            _ => Ok(None),
        }
    }

    /// Color of a record: mapped aesthetic first, then the layer's fixed color.
    fn color(&self, record: &Record, aesthetic: &Aesthetic) -> Result<String> {
        if self.layer.mapping().contains(aesthetic) {
            if let Some(color) = self.layer.aesthetic_value(record, aesthetic, self.scales)? {
                if let Some(c) = color.into_color() {
                    return Ok(c);
                }
            }
        }
        let appearance = self.appearance();
        let fixed = match aesthetic {
            Aesthetic::Fill => appearance.fill.as_ref().or(appearance.color.as_ref()),
            _ => appearance.color.as_ref(),
        };
        Ok(fixed.cloned().unwrap_or_else(|| CATEGORY20[0].to_string()))
    }

    fn fill_color(&self, record: &Record) -> Result<String> {
        if self.layer.mapping().contains(&Aesthetic::Fill) {
            self.color(record, &Aesthetic::Fill)
        } else if self.appearance().fill.is_some() {
            Ok(self.appearance().fill.clone().unwrap_or_default())
        } else {
            self.color(record, &Aesthetic::Color)
        }
    }

    /// Mark width: the fixed width, else the category band, else `default`.
    fn mark_width(&self, default: f64) -> f64 {
        if let Some(w) = self.appearance().width {
            return w;
        }
        match self.scales.get(&Aesthetic::X) {
            Some(scale) if scale.kind() == ScaleKind::Categorical && scale.band_width() > 0.0 => scale.band_width(),
            _ => default,
        }
    }

    fn points(&mut self) -> Result<()> {
        let layer = self.layer;
        for record in layer.records() {
            let Some((cx, cy)) = self.position(record)? else {
                trace!("Point dropped: unplaceable x or y");
                continue;
            };
            let r = if self.layer.mapping().contains(&Aesthetic::Size) {
                self.layer.number(record, &Aesthetic::Size, self.scales)?
            } else {
                Some(self.appearance().size.unwrap_or(DEFAULT_POINT_SIZE))
            };
            let Some(r) = r else {
                trace!("Point dropped: unplaceable size");
                continue;
            };
            let mut style = self.appearance().style();
            style.fill = Some(self.fill_color(record)?);
            self.draw(Shape::Circle { cx, cy, r, style });
        }
        Ok(())
    }

    /// One path per group: a polyline, or a closed band down to `y0` (or the
    /// bottom of the y scale) for areas.
    fn lines(&mut self, area: bool) -> Result<()> {
        let baseline = match self.scales.get(&Aesthetic::Y) {
            Some(scale) => scale.scaled_min()?,
            None => return Err(GraphicError::ScaleNotTrained { aesthetic: Aesthetic::Y.to_string() }),
        };
        let layer = self.layer;
        let mapping = layer.mapping();
        let top = if area && mapping.contains(&Aesthetic::Y1) { Aesthetic::Y1 } else { Aesthetic::Y };
        let has_y0 = area && mapping.contains(&Aesthetic::Y0);

        for group in layer.groups() {
            let mut upper = Vec::new();
            let mut lower = Vec::new();
            for record in &group.records {
                let x = self.layer.number(record, &Aesthetic::X, self.scales)?;
                let y = self.layer.number(record, &top, self.scales)?;
                let (Some(x), Some(y)) = (x, y) else {
                    trace!(group = %group.key(), "Line vertex dropped");
                    continue;
                };
                upper.push((x, y));
                if area {
                    let y0 = if has_y0 {
                        self.layer.number(record, &Aesthetic::Y0, self.scales)?.unwrap_or(baseline)
                    } else {
                        baseline
                    };
                    lower.push((x, y0));
                }
            }
            if upper.len() < 2 {
                continue;
            }

            let Some(first) = group.records.first() else { continue };
            let mut style = self.appearance().style();
            if area {
                style.fill = Some(self.fill_color(first)?);
                upper.extend(lower.into_iter().rev());
            } else {
                style.stroke = Some(self.color(first, &Aesthetic::Color)?);
                style.stroke_width = Some(self.appearance().linewidth.unwrap_or(DEFAULT_LINE_WIDTH));
            }
            self.draw(Shape::Path {
                points: upper,
                closed: area,
                style,
            });
        }
        Ok(())
    }

    fn intervals(&mut self) -> Result<()> {
        let base = match self.scales.get(&Aesthetic::Y) {
            Some(scale) => scale.scaled_min()?,
            None => return Err(GraphicError::ScaleNotTrained { aesthetic: Aesthetic::Y.to_string() }),
        };
        let width = self.mark_width(DEFAULT_BAR_WIDTH);
        let layer = self.layer;
        for record in layer.records() {
            let Some((cx, cy)) = self.position(record)? else {
                trace!("Bar dropped: unplaceable x or y");
                continue;
            };
            let mut style = self.appearance().style();
            style.fill = Some(self.fill_color(record)?);
            self.draw(Shape::Rect {
                x: cx - width / 2.0,
                y: cy.min(base),
                width,
                height: (base - cy).abs(),
                style,
            });
        }
        Ok(())
    }

    fn boxes(&mut self) -> Result<()> {
        let width = self.appearance().width.unwrap_or(DEFAULT_BOX_WIDTH);
        let half = width / 2.0;
        let tick = width * 0.4 / 2.0;
        let layer = self.layer;
        for record in layer.records() {
            let Some(cx) = self.layer.number(record, &Aesthetic::X, self.scales)? else {
                trace!("Box dropped: unplaceable x");
                continue;
            };
            let y = |name: &str| self.field_position(record, name, &Aesthetic::Y);
            let (Some(q1), Some(median), Some(q3), Some(lower), Some(upper)) =
                (y("q1")?, y("median")?, y("q3")?, y("lower")?, y("upper")?)
            else {
                trace!("Box dropped: missing quartiles");
                continue;
            };
            let mut outliers = Vec::new();
            if let Some(Value::Array(values)) = record.get("outliers") {
                for v in values {
                    if let Some(oy) = self.scales.scale(&Aesthetic::Y, v)?.and_then(|s| s.as_f64()) {
                        outliers.push(oy);
                    }
                }
            }

            let color = self.color(record, &Aesthetic::Color)?;
            let fill = self.fill_color(record)?;
            let base = self.appearance().style();
            let stroke = Style { stroke: Some(color.clone()), stroke_width: Some(1.0), ..base.clone() };

            self.draw(Shape::line((cx, q3), (cx, upper), stroke.clone()));
            self.draw(Shape::line((cx, q1), (cx, lower), stroke.clone()));
            self.draw(Shape::line((cx - tick, upper), (cx + tick, upper), stroke.clone()));
            self.draw(Shape::line((cx - tick, lower), (cx + tick, lower), stroke.clone()));
            self.draw(Shape::Rect {
                x: cx - half,
                y: q1.min(q3),
                width,
                height: (q1 - q3).abs(),
                style: Style {
                    fill: Some(fill),
                    ..stroke.clone()
                },
            });
            self.draw(Shape::line((cx - half, median), (cx + half, median), stroke));
            for oy in outliers {
                self.draw(Shape::Circle {
                    cx,
                    cy: oy,
                    r: OUTLIER_RADIUS,
                    style: Style { fill: Some(color.clone()), ..base.clone() },
                });
            }
        }
        Ok(())
    }

    fn texts(&mut self) -> Result<()> {
        let layer = self.layer;
        for record in layer.records() {
            let Some((x, y)) = self.position(record)? else {
                trace!("Label dropped: unplaceable x or y");
                continue;
            };
            let Some(content) = self.layer.data_value(record, &Aesthetic::Text) else {
                trace!("Label dropped: no text");
                continue;
            };
            let mut style = self.appearance().style();
            style.fill = Some(self.color(record, &Aesthetic::Color)?);
            style.font_size = self.appearance().size;
            self.draw(Shape::text(x, y, category_key(&content), style));
        }
        Ok(())
    }

    fn arrows(&mut self) -> Result<()> {
        let head_spec = self.appearance().arrow;
        let layer = self.layer;
        for record in layer.records() {
            let coords = (
                self.field_position(record, "tail.x", &Aesthetic::X)?,
                self.field_position(record, "tail.y", &Aesthetic::Y)?,
                self.field_position(record, "head.x", &Aesthetic::X)?,
                self.field_position(record, "head.y", &Aesthetic::Y)?,
            );
            let (Some(tx), Some(ty), Some(hx), Some(hy)) = coords else {
                trace!("Arrow dropped: unplaceable anchor");
                continue;
            };
            let color = self.color(record, &Aesthetic::Color)?;
            let base = self.appearance().style();
            let stroke_width = self.appearance().linewidth.unwrap_or(DEFAULT_LINE_WIDTH);
            self.draw(Shape::line(
                (tx, ty),
                (hx, hy),
                Style { stroke: Some(color.clone()), stroke_width: Some(stroke_width), ..base.clone() },
            ));
            if let Some(head) = arrow_head((tx, ty), (hx, hy), &head_spec) {
                self.draw(Shape::Path {
                    points: head,
                    closed: true,
                    style: Style { fill: Some(color), ..base },
                });
            }
        }
        Ok(())
    }
}

/// Triangle with its tip on `head`, pointing away from `tail`.
fn arrow_head(tail: (f64, f64), head: (f64, f64), spec: &ArrowHeadSpec) -> Option<Vec<(f64, f64)>> {
    let (dx, dy) = (head.0 - tail.0, head.1 - tail.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);
    let base = (head.0 - ux * spec.length, head.1 - uy * spec.length);
    let (nx, ny) = (-uy * spec.width, ux * spec.width);
    Some(vec![head, (base.0 + nx, base.1 + ny), (base.0 - nx, base.1 - ny)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry() {
        assert_eq!("interval".parse::<Geometry>().unwrap(), Geometry::Interval);
        assert_eq!("bar".parse::<Geometry>().unwrap(), Geometry::Interval);
        assert!(matches!("pie".parse::<Geometry>(), Err(GraphicError::InvalidSpec(_))));
    }

    #[test]
    fn test_required_aesthetics() {
        assert!(Geometry::Box.required_aesthetics().contains(&Aesthetic::Y));
        assert!(Geometry::Arrow.required_aesthetics().contains(&Aesthetic::X));
    }

    #[test]
    fn test_show_hover() {
        let spec = LayerSpec { show: Some("hover".to_string()), ..LayerSpec::new("text") };
        let appearance = Appearance::from_spec(&spec).unwrap();
        assert!(appearance.hover);
        assert!(appearance.style().hover);

        let spec = LayerSpec { show: Some("sometimes".to_string()), ..LayerSpec::new("text") };
        assert!(Appearance::from_spec(&spec).is_err());
    }

    #[test]
    fn test_arrow_head_points_along_shaft() {
        let spec = ArrowHeadSpec { length: 10.0, width: 3.0 };
        let head = arrow_head((0.0, 0.0), (20.0, 0.0), &spec).unwrap();
        assert_eq!(head[0], (20.0, 0.0));
        assert_eq!(head[1], (10.0, 3.0));
        assert_eq!(head[2], (10.0, -3.0));
        assert!(arrow_head((1.0, 1.0), (1.0, 1.0), &spec).is_none());
    }
}
