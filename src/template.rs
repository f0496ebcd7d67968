// Parsers for the small string languages embedded in chart specs:
// text templates ("{d}, {r}") and arrow anchor selectors ("max:y").

use crate::data::{category_key, field, Record};
use crate::error::{GraphicError, Result};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// One piece of a text template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed `"{field} text"` template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(input: &str) -> Result<Self> {
        match all_consuming(many0(segment))(input) {
            Ok((_, segments)) => Ok(Template { segments }),
            Err(e) => Err(GraphicError::invalid_spec(format!(
                "Malformed text template '{}': {:?}",
                input, e
            ))),
        }
    }

    /// Fields referenced by the template, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(f.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Fill the template from a record. Returns `None` if a referenced field is absent.
    pub fn render(&self, record: &Record) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(f) => out.push_str(&category_key(field(record, f)?)),
            }
        }
        Some(out)
    }
}

/// Does this mapping string look like a template rather than a field name?
pub fn is_template(input: &str) -> bool {
    input.contains('{')
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '}' && c != '{' && c != ':')(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(
            delimited(char('{'), delimited(multispace0, field_name, multispace0), char('}')),
            |f: &str| Segment::Field(f.trim().to_string()),
        ),
        map(is_not("{}"), |s: &str| Segment::Literal(s.to_string())),
    ))(input)
}

/// Picks one record out of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Record with the largest numeric value of the field.
    Max(String),
    /// Record with the smallest numeric value of the field.
    Min(String),
    First,
    Last,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        match all_consuming(delimited(multispace0, selector, multispace0))(input) {
            Ok((_, s)) => Ok(s),
            Err(_) => Err(GraphicError::invalid_spec(format!(
                "Unknown selector '{}' (expected max:<field>, min:<field>, first or last)",
                input
            ))),
        }
    }

    pub fn select<'a>(&self, data: &'a [Record]) -> Option<&'a Record> {
        let numeric = |r: &&Record, f: &str| field(r, f).and_then(crate::data::as_number);
        match self {
            Selector::First => data.first(),
            Selector::Last => data.last(),
            Selector::Max(f) => data
                .iter()
                .filter(|r| numeric(r, f).is_some())
                .max_by(|a, b| numeric(a, f).partial_cmp(&numeric(b, f)).unwrap_or(std::cmp::Ordering::Equal)),
            Selector::Min(f) => data
                .iter()
                .filter(|r| numeric(r, f).is_some())
                .min_by(|a, b| numeric(a, f).partial_cmp(&numeric(b, f)).unwrap_or(std::cmp::Ordering::Equal)),
        }
    }
}

fn selector(input: &str) -> IResult<&str, Selector> {
    alt((
        map(preceded(tag("max:"), field_name), |f: &str| Selector::Max(f.to_string())),
        map(preceded(tag("min:"), field_name), |f: &str| Selector::Min(f.to_string())),
        map(tag("first"), |_| Selector::First),
        map(tag("last"), |_| Selector::Last),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_template() {
        let t = Template::parse("{d}, {r}").unwrap();
        assert_eq!(t.fields().collect::<Vec<_>>(), vec!["d", "r"]);
        assert_eq!(t.render(&record(json!({ "d": 1, "r": 2.5 }))), Some("1, 2.5".to_string()));
    }

    #[test]
    fn test_template_missing_field() {
        let t = Template::parse("{d}!").unwrap();
        assert_eq!(t.render(&record(json!({ "r": 1 }))), None);
    }

    #[test]
    fn test_template_unclosed_brace() {
        assert!(Template::parse("{d, r").is_err());
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(Selector::parse("max:y").unwrap(), Selector::Max("y".to_string()));
        assert_eq!(Selector::parse(" first ").unwrap(), Selector::First);
        assert!(Selector::parse("biggest").is_err());
    }

    #[test]
    fn test_select_max() {
        let data = vec![
            record(json!({ "x": 0, "y": 1 })),
            record(json!({ "x": 1, "y": 7 })),
            record(json!({ "x": 2, "y": 3 })),
        ];
        let picked = Selector::Max("y".to_string()).select(&data).unwrap();
        assert_eq!(picked["x"], json!(1));
        let picked = Selector::Last.select(&data).unwrap();
        assert_eq!(picked["x"], json!(2));
    }
}
