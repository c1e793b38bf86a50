//! Static data provider.
//!
//! Serves the records embedded in the schema. Filtering, sorting, paging
//! and field selection are applied in memory; the cache is never involved.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::traits::{DataProvider, Fetched};
use crate::endpoint;
use crate::types::{DatasourceSchema, QueryDefaults, RequestContext};
use crate::{MimirError, Result};

/// Provider for `static` sources.
pub struct StaticProvider {
    schema: Arc<DatasourceSchema>,
    records: Arc<Vec<Value>>,
    query: Option<QueryDefaults>,
}

impl StaticProvider {
    pub fn new(schema: Arc<DatasourceSchema>) -> Result<Self> {
        let records = schema.source.data.clone().ok_or_else(|| {
            MimirError::Configuration(format!("static datasource '{}' has no data", schema.name))
        })?;
        Ok(Self {
            schema,
            records: Arc::new(records),
            query: None,
        })
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn process_request(&mut self, request: &RequestContext) -> Result<()> {
        self.query = Some(endpoint::resolve(&self.schema, request).query);
        Ok(())
    }

    fn endpoint(&self) -> Option<&str> {
        None
    }

    async fn load(&self, _request: &RequestContext) -> Result<Fetched> {
        let query = self.query.as_ref().unwrap_or(&self.schema.query);
        Ok(Fetched::uncached(apply_query(
            &self.records,
            query,
            self.schema.paginate,
        )))
    }

    fn destroy(&mut self) {
        self.query = None;
    }
}

/// Filter, sort, page and project `records`.
///
/// Returns `{ results, metadata: { page, limit, totalCount, totalPages } }`.
pub fn apply_query(records: &[Value], query: &QueryDefaults, paginate: bool) -> Value {
    let mut matched: Vec<&Value> = records
        .iter()
        .filter(|record| matches_filter(record, &query.filter))
        .collect();

    if !query.sort.is_empty() {
        matched.sort_by(|a, b| compare_records(a, b, &query.sort));
    }

    let total = matched.len();
    let (page, limit) = if paginate && query.count > 0 {
        (query.page.max(1) as usize, query.count as usize)
    } else {
        (1, total)
    };
    let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };

    let fields = query
        .fields
        .as_ref()
        .map(|f| f.names())
        .filter(|names| !names.is_empty());

    let results: Vec<Value> = matched
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .map(|record| match &fields {
            Some(names) => project(record, names),
            None => record.clone(),
        })
        .collect();

    json!({
        "results": results,
        "metadata": {
            "page": page,
            "limit": limit,
            "totalCount": total,
            "totalPages": total_pages,
        }
    })
}

fn matches_filter(record: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| record.get(field).is_some_and(|actual| loosely_equal(actual, expected)))
}

/// Equality that treats `"3"` and `3` as the same, since route parameters
/// arrive as strings.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => false,
    }
}

fn compare_records(a: &Value, b: &Value, sort: &Map<String, Value>) -> Ordering {
    for (field, direction) in sort {
        let ordering = compare_values(a.get(field), b.get(field));
        let ordering = if direction.as_i64() == Some(-1) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn project(record: &Value, names: &[&str]) -> Value {
    let Value::Object(object) = record else {
        return record.clone();
    };
    let selected: Map<String, Value> = names
        .iter()
        .filter_map(|name| object.get(*name).map(|v| (name.to_string(), v.clone())))
        .collect();
    Value::Object(selected)
}
