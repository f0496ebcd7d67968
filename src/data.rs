use crate::error::{GraphicError, Result};
use serde_json::{Map, Value};
use std::io::Read;

/// A single datum: field name to scalar (or nested) value.
pub type Record = Map<String, Value>;

/// An ordered sequence of records. Order is meaningful (e.g. line drawing order).
pub type Dataset = Vec<Record>;

/// Create a Dataset from a JSON array of objects
pub fn from_json(value: &Value) -> Result<Dataset> {
    let array = value
        .as_array()
        .ok_or_else(|| GraphicError::Data("Input data must be a JSON array of objects".to_string()))?;

    array
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_object().cloned().ok_or_else(|| {
                GraphicError::Data(format!("Item {} in data array is not an object", idx))
            })
        })
        .collect()
}

/// Read a Dataset from CSV. The header row names the fields; numeric cells
/// become numbers and empty cells are left out of the record.
pub fn from_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let mut record = Record::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            record.insert(header.clone(), parse_cell(cell));
        }
        records.push(record);
    }

    Ok(records)
}

fn parse_cell(cell: &str) -> Value {
    match cell.parse::<f64>() {
        Ok(n) if n.is_finite() => number(n),
        _ => Value::String(cell.to_string()),
    }
}

/// Wrap an `f64` as a JSON number, preferring an integer representation.
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Numeric view of a value: numbers, and strings that parse as numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Canonical key used to compare categorical values.
pub fn category_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => format!("{}", f),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Look up a possibly nested field (`head.x`) in a record.
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    if let Some(v) = record.get(name) {
        return Some(v);
    }
    let mut parts = name.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let data = from_json(&json!([{ "d": 1, "r": 2 }, { "d": 3, "r": "x" }])).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1]["r"], json!("x"));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(from_json(&json!([1, 2])).is_err());
        assert!(from_json(&json!({ "d": 1 })).is_err());
    }

    #[test]
    fn test_from_json_empty_is_ok() {
        assert!(from_json(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_from_csv() {
        let csv = "category,count,note\nfoo,100,\nbar,59.5,hi\n";
        let data = from_csv(csv.as_bytes()).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["category"], json!("foo"));
        assert_eq!(data[0]["count"], json!(100));
        assert!(!data[0].contains_key("note"));
        assert_eq!(data[1]["count"], json!(59.5));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(2.5)), Some(2.5));
        assert_eq!(as_number(&json!("3")), Some(3.0));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(as_number(&json!(null)), None);
    }

    #[test]
    fn test_category_key() {
        assert_eq!(category_key(&json!(1)), "1");
        assert_eq!(category_key(&json!(1.0)), "1");
        assert_eq!(category_key(&json!(2.5)), "2.5");
        assert_eq!(category_key(&json!("a")), "a");
    }

    #[test]
    fn test_nested_field() {
        let record = json!({ "head": { "x": 1, "y": 2 } });
        let record = record.as_object().unwrap();
        assert_eq!(field(record, "head.y"), Some(&json!(2)));
        assert_eq!(field(record, "head.z"), None);
    }
}
