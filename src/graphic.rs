// A graphic: layers and scales rendered onto a surface

use crate::aes::Aesthetic;
use crate::data::Record;
use crate::error::{GraphicError, Result};
use crate::facet::Facet;
use crate::layer::Layer;
use crate::scale::{Domain, Scale, ScaleSet};
use crate::spec::ChartSpec;
use crate::surface::{Axis, GroupId, Orientation, Region, Shape, Style, Surface, TextAnchor};
use serde_json::Value;
use tracing::debug;

/// Inset reserved around the plotting area for the axes.
pub const DEFAULT_PADDING: f64 = 25.0;

const BACKGROUND: &str = "#ebebeb";
const TEXT_COLOR: &str = "#333333";
const TITLE_SIZE: f64 = 11.0;
const LEGEND_ROW: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicState {
    Constructed,
    Prepared,
    Rendered,
}

#[derive(Debug, Clone)]
pub struct Graphic {
    layers: Vec<Layer>,
    scales: ScaleSet,
    facet: Facet,
    padding: f64,
    state: GraphicState,
}

impl Graphic {
    pub fn from_spec(spec: &ChartSpec) -> Result<Self> {
        let layers = spec.layers.iter().map(Layer::from_spec).collect::<Result<Vec<_>>>()?;
        let mut scales = ScaleSet::new();
        for scale_spec in &spec.scales {
            scales.insert(Scale::from_spec(scale_spec)?);
        }
        let padding = spec.options.as_ref().map(|o| o.padding).unwrap_or(DEFAULT_PADDING);
        if !padding.is_finite() || padding < 0.0 {
            return Err(GraphicError::invalid_spec(format!("Padding must be non-negative, got {}", padding)));
        }

        debug!(layers = layers.len(), scales = spec.scales.len(), "Constructed graphic");
        Ok(Graphic {
            layers,
            scales,
            facet: Facet::from_spec(spec.facets.as_ref())?,
            padding,
            state: GraphicState::Constructed,
        })
    }

    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    pub fn state(&self) -> GraphicState {
        self.state
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn scales(&self) -> &ScaleSet {
        &self.scales
    }

    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    /// Unfix every domain inferred from data, so the next render retrains
    /// on its own dataset. Domains declared in the chart spec are kept.
    pub fn reset_domains(&mut self) {
        self.scales.reset_domains();
    }

    /// Unfix inferred x and y domains only, so per-panel training leaves
    /// color and size mappings consistent with the shared legend.
    pub(crate) fn reset_positional_domains(&mut self) {
        self.scales.reset_positional();
    }

    /// Prepare every layer against `data`, laying out into `region`
    /// (the padding is applied here).
    pub fn prepare(&mut self, data: &[Record], region: &Region) -> Result<()> {
        let inner = region.inset(self.padding);
        for layer in &mut self.layers {
            layer.prepare(data, &mut self.scales, &inner)?;
        }
        self.state = GraphicState::Prepared;
        Ok(())
    }

    /// Draw the whole graphic into a `width` x `height` surface.
    pub fn render(&mut self, width: f64, height: f64, surface: &mut dyn Surface, data: &[Record]) -> Result<()> {
        debug!(width, height, records = data.len(), facet = self.facet.name(), "Rendering graphic");
        let facet = self.facet.clone();
        facet.render(self, &Region::new(0.0, 0.0, width, height), surface, data)?;
        self.state = GraphicState::Rendered;
        Ok(())
    }

    /// Single-panel pipeline: prepare, background, axes, then layers in order.
    /// Axis titles and legends are drawn between the axes and the layers
    /// when `labels` is set.
    pub(crate) fn render_panel(
        &mut self,
        region: &Region,
        surface: &mut dyn Surface,
        data: &[Record],
        labels: bool,
    ) -> Result<()> {
        self.prepare(data, region)?;
        let inner = region.inset(self.padding);

        let background = surface.create_group("base");
        surface.append_shape(
            background,
            Shape::Rect {
                x: region.left,
                y: region.top,
                width: region.width,
                height: region.height,
                style: Style::fill(BACKGROUND).with_class("base"),
            },
        );

        let x_scale = self.required_scale(&Aesthetic::X)?;
        let y_scale = self.required_scale(&Aesthetic::Y)?;
        surface.append_axis(&Axis::new(x_scale, Orientation::Bottom, -inner.height, inner.bottom(), &inner)?);
        surface.append_axis(&Axis::new(y_scale, Orientation::Left, -inner.width, inner.left, &inner)?);

        if labels {
            self.render_labels(region, surface)?;
        }

        for layer in &self.layers {
            layer.render(&self.scales, surface)?;
        }
        Ok(())
    }

    fn required_scale(&self, aesthetic: &Aesthetic) -> Result<&Scale> {
        self.scales
            .get(aesthetic)
            .ok_or_else(|| GraphicError::ScaleNotTrained { aesthetic: aesthetic.to_string() })
    }

    /// Axis titles and the color legend, placed relative to `region`.
    pub(crate) fn render_labels(&self, region: &Region, surface: &mut dyn Surface) -> Result<()> {
        let inner = region.inset(self.padding);
        let group = surface.create_group("labels");
        let style = Style {
            fill: Some(TEXT_COLOR.to_string()),
            font_size: Some(TITLE_SIZE),
            ..Default::default()
        };

        if let Some(title) = self.legend_for(&Aesthetic::X) {
            let x = inner.left + inner.width / 2.0;
            let y = region.bottom() - 2.0;
            surface.append_shape(group, Shape::text(x, y, title, style.clone().with_class("x title")));
        }
        if let Some(title) = self.legend_for(&Aesthetic::Y) {
            surface.append_shape(
                group,
                Shape::Text {
                    x: region.left + TITLE_SIZE,
                    y: inner.top + inner.height / 2.0,
                    content: title,
                    anchor: TextAnchor::Middle,
                    angle: -90.0,
                    style: style.clone().with_class("y title"),
                },
            );
        }

        self.render_color_legend(&inner, surface, group, &style)
    }

    fn render_color_legend(&self, inner: &Region, surface: &mut dyn Surface, group: GroupId, style: &Style) -> Result<()> {
        let Some(scale) = self.scales.get(&Aesthetic::Color) else {
            return Ok(());
        };
        let Some(Domain::Discrete(keys)) = scale.domain() else {
            return Ok(());
        };
        if keys.is_empty() || !scale.is_trained() {
            return Ok(());
        }

        let x = inner.right() - 90.0;
        let mut y = inner.top + LEGEND_ROW;
        if let Some(title) = self.legend_for(&Aesthetic::Color) {
            surface.append_shape(
                group,
                Shape::Text {
                    x,
                    y,
                    content: title,
                    anchor: TextAnchor::Start,
                    angle: 0.0,
                    style: style.clone().with_class("legend title"),
                },
            );
            y += LEGEND_ROW;
        }
        for key in keys {
            let Some(color) = scale.scale(&Value::String(key.clone()))?.and_then(|c| c.into_color()) else {
                continue;
            };
            surface.append_shape(
                group,
                Shape::Circle {
                    cx: x + 4.0,
                    cy: y - 4.0,
                    r: 4.0,
                    style: Style::fill(color).with_class("legend"),
                },
            );
            surface.append_shape(
                group,
                Shape::Text {
                    x: x + 12.0,
                    y,
                    content: key.clone(),
                    anchor: TextAnchor::Start,
                    angle: 0.0,
                    style: style.clone().with_class("legend"),
                },
            );
            y += LEGEND_ROW;
        }
        Ok(())
    }

    /// Title text for an aesthetic: the scale's `legend`, else the field the
    /// first layer mapping it uses.
    pub fn legend_for(&self, aesthetic: &Aesthetic) -> Option<String> {
        if let Some(legend) = self.scales.get(aesthetic).and_then(Scale::legend) {
            return Some(legend.to_string());
        }
        self.layers
            .iter()
            .find_map(|layer| layer.mapping().field_for(aesthetic))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::from_json;
    use crate::surface::Scene;
    use serde_json::json;

    fn graphic(spec: serde_json::Value) -> Graphic {
        Graphic::from_spec(&ChartSpec::from_json(&spec).unwrap()).unwrap()
    }

    fn rates() -> Vec<Record> {
        from_json(&json!([
            { "d": 1, "r": 10, "kind": "a" },
            { "d": 2, "r": 30, "kind": "b" },
            { "d": 3, "r": 20 }
        ]))
        .unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut g = graphic(json!({ "layers": [{ "geometry": "point", "mapping": { "x": "d", "y": "r" } }] }));
        assert_eq!(g.state(), GraphicState::Constructed);
        g.prepare(&rates(), &Region::new(0.0, 0.0, 200.0, 100.0)).unwrap();
        assert_eq!(g.state(), GraphicState::Prepared);
        let mut scene = Scene::new(200.0, 100.0);
        g.render(200.0, 100.0, &mut scene, &rates()).unwrap();
        assert_eq!(g.state(), GraphicState::Rendered);
    }

    #[test]
    fn test_render_order() {
        let mut g = graphic(json!({ "layers": [
            { "geometry": "line", "mapping": { "x": "d", "y": "r" } },
            { "geometry": "point", "mapping": { "x": "d", "y": "r" } }
        ] }));
        let mut scene = Scene::new(400.0, 300.0);
        g.render(400.0, 300.0, &mut scene, &rates()).unwrap();

        let classes: Vec<&str> = scene.groups().iter().map(|g| g.class.as_str()).collect();
        assert_eq!(classes, vec!["base", "labels", "layer geometry-line", "layer geometry-point"]);
        assert_eq!(scene.axes().len(), 2);
        assert_eq!(scene.axes()[0].orientation, Orientation::Bottom);
        assert_eq!(scene.axes()[0].offset, 275.0);
        assert_eq!(scene.axes()[0].tick_size, -250.0);
        assert_eq!(scene.count("circle"), 3);
    }

    #[test]
    fn test_unknown_kinds_rejected() {
        for spec in [
            json!({ "layers": [{ "geometry": "pie" }] }),
            json!({ "layers": [{ "statistic": { "kind": "loess" } }] }),
            json!({ "scales": [{ "aesthetic": "x", "type": "radial" }] }),
            json!({ "facets": { "type": "wrap" } }),
        ] {
            let err = Graphic::from_spec(&ChartSpec::from_json(&spec).unwrap()).unwrap_err();
            assert!(matches!(err, GraphicError::InvalidSpec(_)), "{:?}", spec);
        }
    }

    #[test]
    fn test_legend_text() {
        let g = graphic(json!({
            "layers": [
                { "geometry": "point", "mapping": { "x": "d", "y": "r" } },
                { "geometry": "line", "mapping": { "x": "other", "y": "r2" } }
            ],
            "scales": [{ "aesthetic": "y", "legend": "Rate" }]
        }));
        assert_eq!(g.legend_for(&Aesthetic::Y).as_deref(), Some("Rate"));
        assert_eq!(g.legend_for(&Aesthetic::X).as_deref(), Some("d"));
        assert_eq!(g.legend_for(&Aesthetic::Color), None);
    }

    #[test]
    fn test_color_legend_entries() {
        let mut g = graphic(json!({ "layers": [
            { "geometry": "point", "mapping": { "x": "d", "y": "r", "color": "kind" } }
        ] }));
        let mut scene = Scene::new(400.0, 300.0);
        g.render(400.0, 300.0, &mut scene, &rates()).unwrap();
        let legend = scene.groups_with_class("labels").next().unwrap();
        let entries = legend.shapes.iter().filter(|s| s.style().class.as_deref() == Some("legend")).count();
        // one swatch and one label per category
        assert_eq!(entries, 4);
    }

    #[test]
    fn test_rerender_keeps_fixed_domain() {
        let mut g = graphic(json!({ "layers": [{ "geometry": "point", "mapping": { "x": "d", "y": "r" } }] }));
        let mut scene = Scene::new(100.0, 100.0);
        g.render(100.0, 100.0, &mut scene, &rates()).unwrap();
        let other = from_json(&json!([{ "d": 100, "r": 1000 }])).unwrap();
        g.render(100.0, 100.0, &mut Scene::new(100.0, 100.0), &other).unwrap();
        assert_eq!(g.scales().get(&Aesthetic::X).unwrap().domain(), Some(&Domain::Continuous(1.0, 3.0)));

        g.reset_domains();
        g.render(100.0, 100.0, &mut Scene::new(100.0, 100.0), &other).unwrap();
        assert_eq!(g.scales().get(&Aesthetic::X).unwrap().domain(), Some(&Domain::Continuous(100.0, 100.0)));
    }

    #[test]
    fn test_empty_dataset_renders_axes() {
        let mut g = graphic(json!({ "layers": [{ "geometry": "point", "mapping": { "x": "d", "y": "r" } }] }));
        let mut scene = Scene::new(100.0, 100.0);
        g.render(100.0, 100.0, &mut scene, &[]).unwrap();
        assert_eq!(scene.axes().len(), 2);
        assert_eq!(scene.count("circle"), 0);
    }

    #[test]
    fn test_negative_padding_rejected() {
        let spec = ChartSpec::from_json(&json!({ "options": { "padding": -1 } })).unwrap();
        assert!(Graphic::from_spec(&spec).is_err());
    }
}
