use crate::data::{category_key, field, Record};
use serde_json::Value;
use std::collections::HashMap;

/// Name given to the single group of ungrouped data.
pub const UNGROUPED: &str = "data";

/// A named partition of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Value of the grouping field shared by every record (null when the
    /// field is absent), or [`UNGROUPED`].
    pub name: Value,
    pub records: Vec<Record>,
}

impl Group {
    pub fn key(&self) -> String {
        category_key(&self.name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition `data` by the value of `group_field`, in first-seen order.
/// Without a field the result is exactly one group holding everything,
/// even when `data` is empty.
pub fn group_data(data: &[Record], group_field: Option<&str>) -> Vec<Group> {
    let Some(group_field) = group_field else {
        return vec![Group {
            name: Value::String(UNGROUPED.to_string()),
            records: data.to_vec(),
        }];
    };

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in data {
        let name = field(record, group_field).cloned().unwrap_or(Value::Null);
        let key = category_key(&name);
        match index.get(&key) {
            Some(&idx) => groups[idx].records.push(record.clone()),
            None => {
                index.insert(key, groups.len());
                groups.push(Group {
                    name,
                    records: vec![record.clone()],
                });
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: serde_json::Value) -> Vec<Record> {
        crate::data::from_json(&v).unwrap()
    }

    #[test]
    fn test_ungrouped_is_one_group() {
        let d = data(json!([{ "v": 1 }, { "v": 2 }]));
        let groups = group_data(&d, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].name, json!(UNGROUPED));
    }

    #[test]
    fn test_ungrouped_empty_input() {
        let groups = group_data(&[], None);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
    }

    #[test]
    fn test_first_seen_order_and_stability() {
        let d = data(json!([
            { "g": "b", "v": 1 },
            { "g": "a", "v": 2 },
            { "g": "b", "v": 3 },
            { "g": "a", "v": 4 },
            { "v": 5 }
        ]));
        let groups = group_data(&d, Some("g"));
        let names: Vec<String> = groups.iter().map(Group::key).collect();
        assert_eq!(names, vec!["b", "a", "null"]);
        let b: Vec<&Value> = groups[0].records.iter().map(|r| &r["v"]).collect();
        assert_eq!(b, vec![&json!(1), &json!(3)]);
    }

    #[test]
    fn test_total_count_preserved() {
        let d = data(json!([
            { "g": 1 }, { "g": 2 }, { "g": 1 }, { "g": 3 }, { "g": 2 }, { "g": 1.0 }
        ]));
        for field in [None, Some("g"), Some("missing")] {
            let total: usize = group_data(&d, field).iter().map(Group::len).sum();
            assert_eq!(total, d.len());
        }
        assert_eq!(group_data(&d, Some("g")).len(), 3);
    }

    #[test]
    fn test_many_groups_keep_first_seen_order() {
        let d: Vec<Record> = (0..2000)
            .map(|i| {
                let mut r = Record::new();
                r.insert("g".to_string(), json!(format!("k{}", (i * 7) % 500)));
                r
            })
            .collect();
        let groups = group_data(&d, Some("g"));
        assert_eq!(groups.len(), 500);
        assert_eq!(groups[0].key(), "k0");
        assert_eq!(groups[1].key(), "k7");
        assert!(groups.iter().all(|g| g.len() == 4));
    }
}
