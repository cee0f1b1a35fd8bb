use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use super::value::encode;
use crate::domain::documents::query::{Direction, FieldFilter, FilterOp, Query};

static SIMPLE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Renders a dotted path in Firestore field-path syntax, back-quoting
/// segments that are not plain identifiers.
pub fn field_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            if SIMPLE_SEGMENT.is_match(segment) {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn operator(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Equal => "EQUAL",
        FilterOp::NotEqual => "NOT_EQUAL",
        FilterOp::LessThan => "LESS_THAN",
        FilterOp::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
        FilterOp::GreaterThan => "GREATER_THAN",
        FilterOp::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::ArrayContains => "ARRAY_CONTAINS",
        FilterOp::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
        FilterOp::In => "IN",
        FilterOp::NotIn => "NOT_IN",
    }
}

fn field_filter(filter: &FieldFilter) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": field_path(&filter.field) },
            "op": operator(filter.op),
            "value": encode(&filter.value),
        }
    })
}

/// Body for `documents:runQuery`.
pub fn run_query_body(query: &Query) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": query.collection.id() }],
    });
    match query.filters.as_slice() {
        [] => {}
        [single] => structured["where"] = field_filter(single),
        many => {
            structured["where"] = json!({
                "compositeFilter": {
                    "op": "AND",
                    "filters": many.iter().map(field_filter).collect::<Vec<_>>(),
                }
            });
        }
    }
    if !query.orders.is_empty() {
        structured["orderBy"] = Value::Array(
            query
                .orders
                .iter()
                .map(|o| {
                    json!({
                        "field": { "fieldPath": field_path(&o.field) },
                        "direction": match o.direction {
                            Direction::Ascending => "ASCENDING",
                            Direction::Descending => "DESCENDING",
                        },
                    })
                })
                .collect(),
        );
    }
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    json!({ "structuredQuery": structured })
}
