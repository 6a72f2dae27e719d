//! Row filter shared by the relational and document adapters.
//!
//! Only what the client needs: equality predicates, one ordering column and
//! an optional row limit.

use std::cmp::Ordering;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    filters: Vec<(String, String)>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep rows whose `column` equals `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    pub fn order_by(&self) -> Option<(&str, Direction)> {
        self.order.as_ref().map(|(c, d)| (c.as_str(), *d))
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// A limit without an ordering column.  PostgREST refuses such a query on
    /// `PATCH` and `DELETE` (PGRST109) since the rows it would touch are
    /// unspecified.
    pub fn has_unordered_limit(&self) -> bool {
        self.limit.is_some() && self.order.is_none()
    }

    /// Render as PostgREST query parameters, e.g.
    /// `task_id=eq.42&order=created_at.asc&limit=1`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(col, val)| (col.clone(), format!("eq.{val}")))
            .collect();

        if let Some((col, dir)) = &self.order {
            let suffix = match dir {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            params.push(("order".to_string(), format!("{col}.{suffix}")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Whether a JSON row satisfies every equality filter.  Non-string
    /// column values are compared through their JSON rendering.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|(col, expected)| match row.get(col) {
            Some(Value::String(actual)) => actual == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        })
    }

    /// Filter, order and truncate an in-memory row set.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        self.apply_by(rows, |row| row)
    }

    /// Like [`apply`](Self::apply) for items that carry their JSON row
    /// alongside other data.
    pub fn apply_by<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        row: impl Fn(&T) -> &Value,
    ) -> Vec<T> {
        let mut out: Vec<T> = items.into_iter().filter(|i| self.matches(row(i))).collect();

        if let Some((col, dir)) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare_json(row(a).get(col), row(b).get(col));
                match dir {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
