// src/query_planner.rs
// Query planner - decides whether a point index can drive a lookup

use serde_json::{json, Value};

use crate::document::ID_FIELD;
use crate::index::{IndexKey, IndexManager};
use crate::query::Query;

/// Query plan - describes how to execute a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Full ordered collection scan (no index used)
    CollectionScan,

    /// Direct `_id` lookup
    IdLookup { id: String },

    /// Point lookup in a secondary index
    IndexScan { field: String, key: IndexKey },
}

/// Query planner - picks the access path for a compiled query
pub struct QueryPlanner;

impl QueryPlanner {
    /// Only top-level bare equality clauses qualify. `_id` wins over any other
    /// indexed field; otherwise the first qualifying clause in key order is used.
    pub fn plan(query: &Query, indexes: &IndexManager) -> QueryPlan {
        let mut chosen = None;

        for (field, value) in query.equality_clauses() {
            if field == ID_FIELD {
                if let Value::String(id) = value {
                    return QueryPlan::IdLookup { id: id.clone() };
                }
                continue;
            }

            if chosen.is_some() || indexes.get(field).is_none() {
                continue;
            }
            // null, arrays and objects are never looked up; the scan handles them
            if let Some(key) = IndexKey::from_value(value) {
                chosen = Some(QueryPlan::IndexScan {
                    field: field.to_string(),
                    key,
                });
            }
        }

        chosen.unwrap_or(QueryPlan::CollectionScan)
    }

    /// Create a query plan description for explain output
    pub fn explain(plan: &QueryPlan, available_indexes: &[String]) -> Value {
        match plan {
            QueryPlan::IdLookup { id } => json!({
                "queryPlan": "IdLookup",
                "indexUsed": ID_FIELD,
                "stage": "FETCH_BY_ID",
                "searchKey": id,
                "estimatedCost": "O(1)",
            }),
            QueryPlan::IndexScan { field, key } => json!({
                "queryPlan": "IndexScan",
                "indexUsed": field,
                "field": field,
                "stage": "FETCH_WITH_INDEX",
                "indexType": "equality",
                "searchKey": format!("{:?}", key),
                "estimatedCost": "O(1)",
            }),
            QueryPlan::CollectionScan => json!({
                "queryPlan": "CollectionScan",
                "indexUsed": null,
                "stage": "FULL_SCAN",
                "reason": "No suitable index found for query",
                "estimatedCost": "O(n)",
                "availableIndexes": available_indexes,
            }),
        }
    }
}
