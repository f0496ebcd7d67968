// A layer: geometry + mapping + statistic, prepared against a dataset

use crate::aes::{Aesthetic, Mapping};
use crate::data::{number, Record};
use crate::error::Result;
use crate::geom::{Appearance, Geometry};
use crate::group::{group_data, Group};
use crate::scale::{ScaleSet, ScaledValue};
use crate::spec::LayerSpec;
use crate::stat::Statistic;
use crate::surface::{Region, Surface};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Layer {
    geometry: Geometry,
    mapping: Mapping,
    statistic: Statistic,
    appearance: Appearance,
    derived: Vec<Record>,
    groups: Vec<Group>,
}

impl Layer {
    pub fn from_spec(spec: &LayerSpec) -> Result<Self> {
        let geometry = spec.geometry.parse::<Geometry>()?;
        let mapping = Mapping::from_json(&spec.mapping)?;
        let statistic = Statistic::from_spec(spec.statistic.as_ref(), &mapping)?;
        let mapping = mapping.with_defaults(&statistic.default_mapping());
        Ok(Layer {
            geometry,
            mapping,
            statistic,
            appearance: Appearance::from_spec(spec)?,
            derived: Vec::new(),
            groups: Vec::new(),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    /// Derived records from the last `prepare`.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.derived.iter()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Run the statistic, split into groups and train every scale this
    /// layer draws through. `region` supplies the x and y pixel ranges.
    pub fn prepare(&mut self, data: &[Record], scales: &mut ScaleSet, region: &Region) -> Result<()> {
        self.derived = self.statistic.compute(data);
        self.groups = group_data(&self.derived, self.mapping.field_for(&Aesthetic::Group));

        // Y0/Y1 values train the y scale along with y
        let mut channels: BTreeMap<Aesthetic, Vec<Value>> = BTreeMap::new();
        let required = self.geometry.required_aesthetics();
        for aesthetic in self.mapping.aesthetics().chain(required.iter()) {
            if !aesthetic.is_scaled() {
                continue;
            }
            let values = channels.entry(aesthetic.scale_aesthetic()).or_default();
            values.extend(self.derived.iter().filter_map(|r| self.data_value(r, aesthetic)));
        }

        for (aesthetic, values) in channels {
            let scale = scales.ensure(&aesthetic, self.statistic.scale_hint(&aesthetic));
            if !scale.domain_set() {
                if values.is_empty() {
                    match self.statistic.data_range(&self.derived, &aesthetic) {
                        Some((lo, hi)) => scale.default_domain(&[number(lo), number(hi)]),
                        None => scale.default_domain(&[]),
                    }
                } else {
                    scale.default_domain(&values);
                }
            }
            match aesthetic {
                Aesthetic::X => scale.set_range(region.x_range()),
                Aesthetic::Y => scale.set_range(region.y_range()),
                _ => scale.ensure_default_range(),
            }
        }

        debug!(
            geometry = self.geometry.name(),
            statistic = self.statistic.name(),
            records = self.derived.len(),
            groups = self.groups.len(),
            "Prepared layer"
        );
        Ok(())
    }

    /// The raw value mapped to `aesthetic`, or `None` if it is unmapped or absent.
    pub fn data_value(&self, record: &Record, aesthetic: &Aesthetic) -> Option<Value> {
        match self.mapping.get(aesthetic)?.require(record) {
            Ok(value) => Some(value),
            Err(e) => {
                trace!(aesthetic = %aesthetic, error = %e, "Value absorbed");
                None
            }
        }
    }

    /// The mapped value passed through the aesthetic's scale.
    pub fn aesthetic_value(&self, record: &Record, aesthetic: &Aesthetic, scales: &ScaleSet) -> Result<Option<ScaledValue>> {
        let Some(value) = self.data_value(record, aesthetic) else {
            trace!(aesthetic = %aesthetic, "No value for aesthetic");
            return Ok(None);
        };
        scales.scale(aesthetic, &value)
    }

    /// Numeric `aesthetic_value`, for positions and sizes.
    pub fn number(&self, record: &Record, aesthetic: &Aesthetic, scales: &ScaleSet) -> Result<Option<f64>> {
        Ok(self.aesthetic_value(record, aesthetic, scales)?.and_then(|v| v.as_f64()))
    }

    pub fn render(&self, scales: &ScaleSet, surface: &mut dyn Surface) -> Result<()> {
        let group = surface.create_group(&format!("layer geometry-{}", self.geometry.name()));
        self.geometry.render(self, scales, surface, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::from_json;
    use crate::error::GraphicError;
    use crate::scale::{Domain, Scale, ScaleKind};
    use crate::spec::StatisticSpec;
    use crate::surface::Scene;
    use serde_json::json;

    fn region() -> Region {
        Region::new(0.0, 0.0, 100.0, 100.0)
    }

    fn rates() -> Vec<Record> {
        from_json(&json!([
            { "d": 1, "r": 10, "g": "a" },
            { "d": 2, "r": 30, "g": "a" },
            { "d": 3, "r": 20, "g": "b" }
        ]))
        .unwrap()
    }

    #[test]
    fn test_prepare_trains_scales() {
        let mut layer = Layer::from_spec(&LayerSpec::new("point").map("x", "d").map("y", "r")).unwrap();
        let mut scales = ScaleSet::new();
        layer.prepare(&rates(), &mut scales, &region()).unwrap();

        assert_eq!(scales.get(&Aesthetic::X).unwrap().domain(), Some(&Domain::Continuous(1.0, 3.0)));
        assert_eq!(scales.get(&Aesthetic::Y).unwrap().domain(), Some(&Domain::Continuous(10.0, 30.0)));
        let record = layer.records().next().unwrap().clone();
        assert_eq!(layer.data_value(&record, &Aesthetic::X), Some(json!(1)));
        assert_eq!(layer.number(&record, &Aesthetic::X, &scales).unwrap(), Some(0.0));
        assert_eq!(layer.number(&record, &Aesthetic::Y, &scales).unwrap(), Some(100.0));
    }

    #[test]
    fn test_fixed_domain_survives_later_layers() {
        let mut scales = ScaleSet::new();
        let mut first = Layer::from_spec(&LayerSpec::new("point").map("x", "d").map("y", "r")).unwrap();
        first.prepare(&rates(), &mut scales, &region()).unwrap();

        let wider = from_json(&json!([{ "d": -50, "r": 500 }])).unwrap();
        let mut second = Layer::from_spec(&LayerSpec::new("line").map("x", "d").map("y", "r")).unwrap();
        second.prepare(&wider, &mut scales, &region()).unwrap();

        assert_eq!(scales.get(&Aesthetic::Y).unwrap().domain(), Some(&Domain::Continuous(10.0, 30.0)));
    }

    #[test]
    fn test_absent_field_is_unplaceable() {
        let mut layer = Layer::from_spec(&LayerSpec::new("point").map("x", "d").map("y", "missing")).unwrap();
        let mut scales = ScaleSet::new();
        layer.prepare(&rates(), &mut scales, &region()).unwrap();
        let record = layer.records().next().unwrap().clone();
        assert_eq!(layer.aesthetic_value(&record, &Aesthetic::Y, &scales).unwrap(), None);
    }

    #[test]
    fn test_grouping_by_mapping() {
        let mut layer = Layer::from_spec(&LayerSpec::new("line").map("x", "d").map("y", "r").map("group", "g")).unwrap();
        layer.prepare(&rates(), &mut ScaleSet::new(), &region()).unwrap();
        assert_eq!(layer.groups().len(), 2);
    }

    #[test]
    fn test_box_trains_y_from_data_range() {
        let spec = LayerSpec::new("box").with_statistic(StatisticSpec {
            variable: Some("r".to_string()),
            group: Some("g".to_string()),
            ..StatisticSpec::new("box")
        });
        let mut layer = Layer::from_spec(&spec).unwrap();
        let mut scales = ScaleSet::new();
        layer.prepare(&rates(), &mut scales, &region()).unwrap();

        assert_eq!(scales.get(&Aesthetic::X).unwrap().kind(), ScaleKind::Categorical);
        assert_eq!(scales.get(&Aesthetic::Y).unwrap().domain(), Some(&Domain::Continuous(10.0, 30.0)));
    }

    #[test]
    fn test_bin_default_mapping() {
        let spec = LayerSpec::new("interval").with_statistic(StatisticSpec {
            variable: Some("r".to_string()),
            bins: Some(2),
            ..StatisticSpec::new("bin")
        });
        let mut layer = Layer::from_spec(&spec).unwrap();
        let mut scales = ScaleSet::new();
        layer.prepare(&rates(), &mut scales, &region()).unwrap();
        assert_eq!(layer.mapping().field_for(&Aesthetic::X), Some("bin"));
        assert_eq!(scales.get(&Aesthetic::Y).unwrap().domain(), Some(&Domain::Continuous(1.0, 2.0)));
    }

    #[test]
    fn test_render_before_prepare_fails() {
        let layer = Layer::from_spec(&LayerSpec::new("line").map("x", "d").map("y", "r")).unwrap();
        let mut scene = Scene::new(100.0, 100.0);
        let err = layer.render(&ScaleSet::new(), &mut scene).unwrap_err();
        assert!(matches!(err, GraphicError::ScaleNotTrained { .. }));
    }

    #[test]
    fn test_declared_scale_is_used() {
        let mut scales = ScaleSet::new();
        let mut log = Scale::new(Aesthetic::Y, ScaleKind::Log);
        log.default_domain(&[json!(1), json!(100)]);
        scales.insert(log);
        let mut layer = Layer::from_spec(&LayerSpec::new("point").map("x", "d").map("y", "r")).unwrap();
        layer.prepare(&rates(), &mut scales, &region()).unwrap();
        let record = layer.records().next().unwrap().clone();
        let y = layer.number(&record, &Aesthetic::Y, &scales).unwrap().unwrap();
        assert!((y - 50.0).abs() < 1e-9);
    }
}
