// Aesthetic channels and layer mappings

use crate::data::{field, Record};
use crate::error::{GraphicError, Result};
use crate::template::{is_template, Template};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named visual channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aesthetic {
    X,
    Y,
    /// Lower edge of a ranged mark (areas); shares the `y` scale.
    Y0,
    /// Upper edge of a ranged mark; shares the `y` scale.
    Y1,
    Color,
    Fill,
    Size,
    Text,
    /// Splits a layer into series; never scaled.
    Group,
    Other(String),
}

impl Aesthetic {
    pub fn as_str(&self) -> &str {
        match self {
            Aesthetic::X => "x",
            Aesthetic::Y => "y",
            Aesthetic::Y0 => "y0",
            Aesthetic::Y1 => "y1",
            Aesthetic::Color => "color",
            Aesthetic::Fill => "fill",
            Aesthetic::Size => "size",
            Aesthetic::Text => "text",
            Aesthetic::Group => "group",
            Aesthetic::Other(s) => s,
        }
    }

    /// The aesthetic whose scale this channel is drawn through.
    pub fn scale_aesthetic(&self) -> Aesthetic {
        match self {
            Aesthetic::Y0 | Aesthetic::Y1 => Aesthetic::Y,
            other => other.clone(),
        }
    }

    /// Whether values on this channel go through a scale at all.
    pub fn is_scaled(&self) -> bool {
        !matches!(self, Aesthetic::Group | Aesthetic::Text)
    }
}

impl FromStr for Aesthetic {
    type Err = GraphicError;

    fn from_str(s: &str) -> Result<Self> {
        let aes = match s {
            "x" => Aesthetic::X,
            "y" => Aesthetic::Y,
            "y0" | "ymin" => Aesthetic::Y0,
            "y1" | "ymax" => Aesthetic::Y1,
            "color" | "colour" => Aesthetic::Color,
            "fill" => Aesthetic::Fill,
            "size" => Aesthetic::Size,
            "text" => Aesthetic::Text,
            "group" => Aesthetic::Group,
            "" => return Err(GraphicError::invalid_spec("Empty aesthetic name")),
            other => Aesthetic::Other(other.to_string()),
        };
        Ok(aes)
    }
}

impl fmt::Display for Aesthetic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an aesthetic is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingValue {
    Field(String),
    Template(Template),
    Constant(Value),
}

impl MappingValue {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if is_template(s) => Ok(MappingValue::Template(Template::parse(s)?)),
            Value::String(s) => Ok(MappingValue::Field(s.clone())),
            Value::Number(_) | Value::Bool(_) => Ok(MappingValue::Constant(value.clone())),
            Value::Object(obj) if obj.len() == 1 && obj.contains_key("value") => {
                Ok(MappingValue::Constant(obj["value"].clone()))
            }
            other => Err(GraphicError::invalid_spec(format!(
                "Mapping must be a field name, template or constant, got {}",
                other
            ))),
        }
    }

    /// Raw value for a record; `None` when the field is absent.
    pub fn value(&self, record: &Record) -> Option<Value> {
        self.require(record).ok()
    }

    /// Raw value for a record, or `MissingField` naming the absent field.
    pub fn require(&self, record: &Record) -> Result<Value> {
        let present = |name: &str| field(record, name).filter(|v| !v.is_null());
        match self {
            MappingValue::Field(f) => present(f)
                .cloned()
                .ok_or_else(|| GraphicError::MissingField { field: f.clone() }),
            MappingValue::Template(t) => t.render(record).map(Value::String).ok_or_else(|| {
                let missing = t.fields().find(|f| field(record, f).is_none()).unwrap_or_default();
                GraphicError::MissingField { field: missing.to_string() }
            }),
            MappingValue::Constant(v) => Ok(v.clone()),
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            MappingValue::Field(f) => Some(f),
            _ => None,
        }
    }
}

/// Partial function from aesthetic to field/template/constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: BTreeMap<Aesthetic, MappingValue>,
}

impl Mapping {
    pub fn from_json(spec: &BTreeMap<String, Value>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (name, value) in spec {
            entries.insert(name.parse::<Aesthetic>()?, MappingValue::from_json(value)?);
        }
        Ok(Mapping { entries })
    }

    pub fn get(&self, aesthetic: &Aesthetic) -> Option<&MappingValue> {
        self.entries.get(aesthetic)
    }

    pub fn contains(&self, aesthetic: &Aesthetic) -> bool {
        self.entries.contains_key(aesthetic)
    }

    pub fn insert(&mut self, aesthetic: Aesthetic, value: MappingValue) {
        self.entries.insert(aesthetic, value);
    }

    /// Fill in entries the user left unmapped.
    pub fn with_defaults(mut self, defaults: &[(Aesthetic, &str)]) -> Self {
        for (aes, f) in defaults {
            self.entries
                .entry(aes.clone())
                .or_insert_with(|| MappingValue::Field(f.to_string()));
        }
        self
    }

    pub fn aesthetics(&self) -> impl Iterator<Item = &Aesthetic> {
        self.entries.keys()
    }

    /// Field name mapped to an aesthetic, if it is a plain field mapping.
    pub fn field_for(&self, aesthetic: &Aesthetic) -> Option<&str> {
        self.get(aesthetic).and_then(MappingValue::field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_aesthetic() {
        assert_eq!("x".parse::<Aesthetic>().unwrap(), Aesthetic::X);
        assert_eq!("colour".parse::<Aesthetic>().unwrap(), Aesthetic::Color);
        assert_eq!("ymax".parse::<Aesthetic>().unwrap(), Aesthetic::Y1);
        assert_eq!("shape".parse::<Aesthetic>().unwrap(), Aesthetic::Other("shape".to_string()));
        assert!("".parse::<Aesthetic>().is_err());
    }

    #[test]
    fn test_y_edges_share_y_scale() {
        assert_eq!(Aesthetic::Y0.scale_aesthetic(), Aesthetic::Y);
        assert_eq!(Aesthetic::Color.scale_aesthetic(), Aesthetic::Color);
        assert!(!Aesthetic::Group.is_scaled());
    }

    #[test]
    fn test_mapping_values() {
        let mut spec = BTreeMap::new();
        spec.insert("x".to_string(), json!("d"));
        spec.insert("text".to_string(), json!("{d}, {r}"));
        spec.insert("size".to_string(), json!(4));
        let mapping = Mapping::from_json(&spec).unwrap();

        let record = json!({ "d": 1, "r": 2 });
        let record = record.as_object().unwrap();
        assert_eq!(mapping.get(&Aesthetic::X).unwrap().value(record), Some(json!(1)));
        assert_eq!(mapping.get(&Aesthetic::Text).unwrap().value(record), Some(json!("1, 2")));
        assert_eq!(mapping.get(&Aesthetic::Size).unwrap().value(record), Some(json!(4)));
        assert_eq!(mapping.field_for(&Aesthetic::X), Some("d"));
    }

    #[test]
    fn test_missing_field_is_none() {
        let value = MappingValue::Field("nope".to_string());
        let record = Record::new();
        assert_eq!(value.value(&record), None);
        let err = value.require(&record).unwrap_err();
        assert!(matches!(err, GraphicError::MissingField { ref field } if field == "nope"));
    }

    #[test]
    fn test_template_names_missing_field() {
        let value = MappingValue::from_json(&json!("{d}, {r}")).unwrap();
        let record = json!({ "d": 1 });
        let err = value.require(record.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, GraphicError::MissingField { ref field } if field == "r"));
    }

    #[test]
    fn test_defaults_do_not_override() {
        let mut mapping = Mapping::default();
        mapping.insert(Aesthetic::Y, MappingValue::Field("density".to_string()));
        let mapping = mapping.with_defaults(&[(Aesthetic::X, "bin"), (Aesthetic::Y, "count")]);
        assert_eq!(mapping.field_for(&Aesthetic::X), Some("bin"));
        assert_eq!(mapping.field_for(&Aesthetic::Y), Some("density"));
    }

    #[test]
    fn test_rejects_array_mapping() {
        assert!(MappingValue::from_json(&json!([1, 2])).is_err());
    }
}
