use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::document::{Document, compare_values, same_type, values_equal};
use super::error::StoreError;
use super::reference::CollectionRef;

/// Upper bound on the operand list of `in`, `not-in` and `array-contains-any`.
pub const MAX_DISJUNCTION: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equal => "==",
            FilterOp::NotEqual => "!=",
            FilterOp::LessThan => "<",
            FilterOp::LessThanOrEqual => "<=",
            FilterOp::GreaterThan => ">",
            FilterOp::GreaterThanOrEqual => ">=",
            FilterOp::ArrayContains => "array-contains",
            FilterOp::ArrayContainsAny => "array-contains-any",
            FilterOp::In => "in",
            FilterOp::NotIn => "not-in",
        }
    }

    fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOp::In | FilterOp::NotIn | FilterOp::ArrayContainsAny
        )
    }

    fn is_negation(&self) -> bool {
        matches!(self, FilterOp::NotEqual | FilterOp::NotIn)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "==" => FilterOp::Equal,
            "!=" => FilterOp::NotEqual,
            "<" => FilterOp::LessThan,
            "<=" => FilterOp::LessThanOrEqual,
            ">" => FilterOp::GreaterThan,
            ">=" => FilterOp::GreaterThanOrEqual,
            "array-contains" => FilterOp::ArrayContains,
            "array-contains-any" => FilterOp::ArrayContainsAny,
            "in" => FilterOp::In,
            "not-in" => FilterOp::NotIn,
            other => return Err(StoreError::invalid(format!("unknown filter op '{other}'"))),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.field(&self.field) else {
            return false;
        };
        let operands = || self.value.as_array().into_iter().flatten();
        match self.op {
            FilterOp::Equal => values_equal(actual, &self.value),
            // Firestore leaves null-valued fields out of negative filters.
            FilterOp::NotEqual => !actual.is_null() && !values_equal(actual, &self.value),
            FilterOp::LessThan => self.range(actual, |o| o == Ordering::Less),
            FilterOp::LessThanOrEqual => self.range(actual, |o| o != Ordering::Greater),
            FilterOp::GreaterThan => self.range(actual, |o| o == Ordering::Greater),
            FilterOp::GreaterThanOrEqual => self.range(actual, |o| o != Ordering::Less),
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|i| values_equal(i, &self.value))),
            FilterOp::ArrayContainsAny => actual.as_array().is_some_and(|items| {
                items
                    .iter()
                    .any(|i| operands().any(|candidate| values_equal(i, candidate)))
            }),
            FilterOp::In => operands().any(|candidate| values_equal(actual, candidate)),
            FilterOp::NotIn => {
                !actual.is_null() && !operands().any(|candidate| values_equal(actual, candidate))
            }
        }
    }

    // Range filters only match values of the same type as the operand.
    fn range(&self, actual: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
        same_type(actual, &self.value) && accept(compare_values(actual, &self.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for Direction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => Err(StoreError::invalid(format!("unknown direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryConstraint {
    Where(FieldFilter),
    OrderBy(OrderBy),
    Limit(usize),
}

/// A collection read: AND-combined filters, ordering clauses, optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionRef,
    pub filters: Vec<FieldFilter>,
    pub orders: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionRef) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    pub fn with_constraints(
        collection: CollectionRef,
        constraints: impl IntoIterator<Item = QueryConstraint>,
    ) -> Result<Self, StoreError> {
        let mut query = Self::new(collection);
        for constraint in constraints {
            match constraint {
                QueryConstraint::Where(filter) => query.filters.push(filter),
                QueryConstraint::OrderBy(order) => query.orders.push(order),
                QueryConstraint::Limit(n) => query.limit = Some(n),
            }
        }
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for path in self
            .filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.orders.iter().map(|o| o.field.as_str()))
        {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(StoreError::invalid(format!("invalid field path '{path}'")));
            }
        }
        for filter in &self.filters {
            if filter.op.takes_list() {
                let Some(items) = filter.value.as_array() else {
                    return Err(StoreError::invalid(format!(
                        "'{}' on '{}' requires an array value",
                        filter.op, filter.field
                    )));
                };
                if items.is_empty() || items.len() > MAX_DISJUNCTION {
                    return Err(StoreError::invalid(format!(
                        "'{}' on '{}' takes 1 to {MAX_DISJUNCTION} values",
                        filter.op, filter.field
                    )));
                }
            }
        }
        if self.filters.iter().filter(|f| f.op.is_negation()).count() > 1 {
            return Err(StoreError::invalid(
                "a query may use at most one '!=' or 'not-in' filter",
            ));
        }
        if self.limit == Some(0) {
            return Err(StoreError::invalid("limit must be positive"));
        }
        Ok(())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
            && self.orders.iter().all(|o| doc.field(&o.field).is_some())
    }

    /// Orders two matching documents; the document id breaks ties.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for order in &self.orders {
            let ord = match (a.field(&order.field), b.field(&order.field)) {
                (Some(x), Some(y)) => compare_values(x, y),
                (x, y) => x.is_some().cmp(&y.is_some()),
            };
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Filters, sorts and truncates an unordered set of documents.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        out.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}
