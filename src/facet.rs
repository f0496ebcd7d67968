// Facets: how the plotting area is split into panels

use crate::data::{category_key, field, Record};
use crate::error::{GraphicError, Result};
use crate::graphic::Graphic;
use crate::scale::order_categories;
use crate::spec::FacetSpec;
use crate::surface::{Region, Shape, Style, Surface, TextAnchor};
use serde_json::Value;
use tracing::debug;

const STRIP_SIZE: f64 = 10.0;

/// Whether panels share scale domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacetScales {
    /// Every panel trains on the full dataset
    #[default]
    Fixed,
    /// Each panel trains x and y on its own subset; color, fill and size
    /// stay shared with the legend
    Free,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Facet {
    #[default]
    Single,
    /// Grid of panels: columns by `x`, rows by `y`.
    Xy {
        x: Option<String>,
        y: Option<String>,
        scales: FacetScales,
    },
}

impl Facet {
    pub fn from_spec(spec: Option<&FacetSpec>) -> Result<Self> {
        let Some(spec) = spec else {
            return Ok(Facet::Single);
        };
        match spec.kind.as_str() {
            "single" => Ok(Facet::Single),
            "xy" | "grid" => {
                let scales = match spec.scales.as_deref() {
                    None | Some("fixed") => FacetScales::Fixed,
                    Some("free") => FacetScales::Free,
                    Some(other) => {
                        return Err(GraphicError::invalid_spec(format!(
                            "Unknown facet scales '{}'. Expected 'fixed' or 'free'",
                            other
                        )))
                    }
                };
                Ok(Facet::Xy {
                    x: spec.x.clone(),
                    y: spec.y.clone(),
                    scales,
                })
            }
            other => Err(GraphicError::invalid_spec(format!(
                "Unknown facet type '{}'. Expected 'single' or 'xy'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Facet::Single => "single",
            Facet::Xy { .. } => "xy",
        }
    }

    pub fn render(&self, graphic: &mut Graphic, region: &Region, surface: &mut dyn Surface, data: &[Record]) -> Result<()> {
        match self {
            Facet::Single => graphic.render_panel(region, surface, data, true),
            Facet::Xy { x, y, scales } => render_grid(graphic, region, surface, data, x.as_deref(), y.as_deref(), *scales),
        }
    }
}

/// Distinct values of a facet field in axis order; a single `None` cell
/// when the grid is not split along this direction.
fn facet_values(data: &[Record], name: Option<&str>) -> Vec<Option<String>> {
    match name {
        None => vec![None],
        Some(name) => {
            let values: Vec<Value> = data.iter().filter_map(|r| field(r, name).cloned()).collect();
            let keys = order_categories(&values);
            if keys.is_empty() {
                vec![None]
            } else {
                keys.into_iter().map(Some).collect()
            }
        }
    }
}

fn in_cell(record: &Record, name: Option<&str>, key: &Option<String>) -> bool {
    match (name, key) {
        (Some(name), Some(key)) => field(record, name).is_some_and(|v| category_key(v) == *key),
        _ => true,
    }
}

fn render_grid(
    graphic: &mut Graphic,
    region: &Region,
    surface: &mut dyn Surface,
    data: &[Record],
    x: Option<&str>,
    y: Option<&str>,
    scales: FacetScales,
) -> Result<()> {
    let columns = facet_values(data, x);
    let rows = facet_values(data, y);
    let cell_width = region.width / columns.len() as f64;
    let cell_height = region.height / rows.len() as f64;
    debug!(columns = columns.len(), rows = rows.len(), ?scales, "Rendering facet grid");

    // Shared domains come from the whole dataset before any panel is drawn
    graphic.prepare(data, region)?;

    for (row, row_key) in rows.iter().enumerate() {
        for (column, column_key) in columns.iter().enumerate() {
            let cell = Region::new(
                region.left + column as f64 * cell_width,
                region.top + row as f64 * cell_height,
                cell_width,
                cell_height,
            );
            let subset: Vec<Record> = data
                .iter()
                .filter(|r| in_cell(r, x, column_key) && in_cell(r, y, row_key))
                .cloned()
                .collect();

            if scales == FacetScales::Free {
                graphic.reset_positional_domains();
            }
            graphic.render_panel(&cell, surface, &subset, false)?;

            let label: Vec<&str> = [column_key, row_key].into_iter().flatten().map(String::as_str).collect();
            if !label.is_empty() {
                let group = surface.create_group("strip");
                surface.append_shape(
                    group,
                    Shape::Text {
                        x: cell.left + cell.width / 2.0,
                        y: cell.top + STRIP_SIZE + 2.0,
                        content: label.join(", "),
                        anchor: TextAnchor::Middle,
                        angle: 0.0,
                        style: Style {
                            font_size: Some(STRIP_SIZE),
                            ..Style::fill("#333333")
                        }
                        .with_class("strip"),
                    },
                );
            }
        }
    }

    // Panel backgrounds cover the whole region, so shared labels go on top
    graphic.render_labels(region, surface)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::Aesthetic;
    use crate::data::from_json;
    use crate::scale::Domain;
    use crate::spec::ChartSpec;
    use crate::surface::Scene;
    use serde_json::json;

    fn tips() -> Vec<Record> {
        from_json(&json!([
            { "sex": "F", "smoker": "no", "bill": 10, "tip": 2 },
            { "sex": "M", "smoker": "no", "bill": 20, "tip": 3 },
            { "sex": "F", "smoker": "yes", "bill": 30, "tip": 5 },
            { "sex": "M", "smoker": "yes", "bill": 40, "tip": 4 },
            { "sex": "M", "smoker": "yes", "bill": 50, "tip": 9 }
        ]))
        .unwrap()
    }

    fn graphic(facets: serde_json::Value) -> Graphic {
        let spec = ChartSpec::from_json(&json!({
            "layers": [{ "geometry": "point", "mapping": { "x": "bill", "y": "tip" } }],
            "facets": facets
        }))
        .unwrap();
        Graphic::from_spec(&spec).unwrap()
    }

    #[test]
    fn test_parse_facets() {
        assert_eq!(Facet::from_spec(None).unwrap(), Facet::Single);
        let spec: FacetSpec = serde_json::from_value(json!({ "type": "xy", "x": "sex", "scales": "free" })).unwrap();
        assert_eq!(
            Facet::from_spec(Some(&spec)).unwrap(),
            Facet::Xy { x: Some("sex".to_string()), y: None, scales: FacetScales::Free }
        );
        let spec: FacetSpec = serde_json::from_value(json!({ "type": "xy", "scales": "loose" })).unwrap();
        assert!(Facet::from_spec(Some(&spec)).is_err());
    }

    #[test]
    fn test_grid_partitions_data() {
        let mut g = graphic(json!({ "type": "xy", "x": "sex", "y": "smoker" }));
        let mut scene = Scene::new(400.0, 400.0);
        g.render(400.0, 400.0, &mut scene, &tips()).unwrap();

        // four panels, each with its own axes
        assert_eq!(scene.axes().len(), 8);
        assert_eq!(scene.count("circle"), 5);
        let strips: Vec<String> = scene
            .groups_with_class("strip")
            .flat_map(|g| g.shapes.iter())
            .filter_map(|s| match s {
                Shape::Text { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strips, vec!["F, no", "M, no", "F, yes", "M, yes"]);
    }

    #[test]
    fn test_fixed_scales_share_domain() {
        let mut g = graphic(json!({ "type": "xy", "x": "sex" }));
        g.render(400.0, 200.0, &mut Scene::new(400.0, 200.0), &tips()).unwrap();
        assert_eq!(g.scales().get(&Aesthetic::X).unwrap().domain(), Some(&Domain::Continuous(10.0, 50.0)));
    }

    #[test]
    fn test_free_scales_train_per_panel() {
        let mut g = graphic(json!({ "type": "xy", "x": "sex", "scales": "free" }));
        g.render(400.0, 200.0, &mut Scene::new(400.0, 200.0), &tips()).unwrap();
        // the last panel drawn is "M"
        assert_eq!(g.scales().get(&Aesthetic::X).unwrap().domain(), Some(&Domain::Continuous(20.0, 50.0)));
    }

    fn class_positions(scene: &Scene, class: &str) -> Vec<usize> {
        scene
            .groups()
            .iter()
            .enumerate()
            .filter(|(_, g)| g.class.split_whitespace().any(|c| c == class))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_shared_labels_painted_over_panels() {
        let spec = ChartSpec::from_json(&json!({
            "layers": [{ "geometry": "point", "mapping": { "x": "bill", "y": "tip", "color": "smoker" } }],
            "facets": { "type": "xy", "x": "sex" }
        }))
        .unwrap();
        let mut g = Graphic::from_spec(&spec).unwrap();
        let mut scene = Scene::new(400.0, 300.0);
        g.render(400.0, 300.0, &mut scene, &tips()).unwrap();

        let labels = class_positions(&scene, "labels");
        let bases = class_positions(&scene, "base");
        assert_eq!(labels.len(), 1);
        assert_eq!(bases.len(), 2);
        assert!(bases.iter().all(|b| *b < labels[0]));
        let legend = scene.groups()[labels[0]]
            .shapes
            .iter()
            .filter(|s| s.kind() == "text" && s.style().class.as_deref() == Some("legend"))
            .count();
        assert_eq!(legend, 2);
    }

    #[test]
    fn test_free_scales_keep_colors_shared() {
        let spec = ChartSpec::from_json(&json!({
            "layers": [{ "geometry": "point", "mapping": { "x": "bill", "y": "tip", "color": "kind" } }],
            "facets": { "type": "xy", "x": "sex", "scales": "free" }
        }))
        .unwrap();
        let data = from_json(&json!([
            { "sex": "F", "kind": "a", "bill": 10, "tip": 1 },
            { "sex": "F", "kind": "b", "bill": 20, "tip": 2 },
            { "sex": "M", "kind": "b", "bill": 30, "tip": 3 },
            { "sex": "M", "kind": "b", "bill": 40, "tip": 4 }
        ]))
        .unwrap();
        let mut g = Graphic::from_spec(&spec).unwrap();
        let mut scene = Scene::new(400.0, 300.0);
        g.render(400.0, 300.0, &mut scene, &data).unwrap();

        let fills: Vec<&str> = scene
            .groups_with_class("geometry-point")
            .flat_map(|g| g.shapes.iter())
            .filter_map(|s| s.style().fill.as_deref())
            .collect();
        assert_eq!(fills, vec!["#1f77b4", "#aec7e8", "#aec7e8", "#aec7e8"]);
        assert_eq!(
            g.scales().get(&Aesthetic::Color).unwrap().domain(),
            Some(&Domain::Discrete(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_single_is_one_panel() {
        let mut g = graphic(json!({ "type": "single" }));
        let mut scene = Scene::new(200.0, 200.0);
        g.render(200.0, 200.0, &mut scene, &tips()).unwrap();
        assert_eq!(scene.axes().len(), 2);
        assert_eq!(scene.groups_with_class("strip").count(), 0);
    }
}
