// Library exports for ggspec

pub mod aes;
pub mod backend;
pub mod data;
pub mod error;
pub mod facet;
pub mod geom;
pub mod graphic;
pub mod group;
pub mod layer;
pub mod scale;
pub mod spec;
pub mod stat;
pub mod surface;
pub mod template;

pub use error::{GraphicError, Result};
pub use graphic::Graphic;
pub use spec::ChartSpec;
pub use surface::{Scene, Surface};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default, alias = "type")]
    pub format: OutputFormat,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_padding() -> f64 { graphic::DEFAULT_PADDING }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            padding: default_padding(),
            format: OutputFormat::Png,
        }
    }
}

/// Build a graphic from a chart spec and render it into a fresh [`Scene`].
/// `options` take precedence over the chart spec's own `options`.
pub fn gg(spec: &ChartSpec, data: &[data::Record], options: &RenderOptions) -> Result<Scene> {
    let mut graphic = Graphic::from_spec(spec)?.with_padding(options.padding);
    let mut scene = Scene::new(options.width as f64, options.height as f64);
    graphic.render(options.width as f64, options.height as f64, &mut scene, data)?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_options_defaults() {
        let options: RenderOptions = serde_json::from_value(json!({ "width": 300 })).unwrap();
        assert_eq!(options.width, 300);
        assert_eq!(options.height, 600);
        assert_eq!(options.padding, 25.0);
        assert_eq!(options.format, OutputFormat::Png);

        let options: RenderOptions = serde_json::from_value(json!({ "format": "svg" })).unwrap();
        assert_eq!(options.format, OutputFormat::Svg);
    }

    #[test]
    fn test_gg_renders_scene() {
        let spec = ChartSpec::from_json(&json!({
            "layers": [{ "geometry": "point", "mapping": { "x": "a", "y": "b" } }]
        }))
        .unwrap();
        let data = data::from_json(&json!([{ "a": 1, "b": 2 }, { "a": 2, "b": 4 }])).unwrap();
        let scene = gg(&spec, &data, &RenderOptions::default()).unwrap();
        assert_eq!(scene.count("circle"), 2);
        assert_eq!(scene.width, 800.0);
    }
}
