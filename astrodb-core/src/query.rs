// src/query.rs
// Predicate evaluator: decides whether a document satisfies a query
use regex::Regex;
use serde_json::{Map, Value};

use crate::document::{resolve_path, values_equal, Document};
use crate::error::{AstroDbError, Result};

/// Compiled query.
///
/// `$and` takes precedence over `$or`, and either one makes the evaluator ignore
/// every sibling key at the same level. Without them every key is a field clause.
#[derive(Debug, Clone)]
pub enum Query {
    And(Vec<Query>),
    Or(Vec<Query>),
    Fields(Vec<FieldClause>),
}

#[derive(Debug, Clone)]
pub struct FieldClause {
    pub field: String,
    pub condition: Condition,
}

#[derive(Debug, Clone)]
pub enum Condition {
    /// Bare (non-object) value
    Equals(Value),
    /// `{op: operand, ...}`, all operators ANDed
    Operators(Vec<QueryOperator>),
}

#[derive(Debug, Clone)]
pub enum QueryOperator {
    Gt(f64),                 // $gt
    Gte(f64),                // $gte
    Lt(f64),                 // $lt
    Lte(f64),                // $lte
    Ne(Value),               // $ne
    In(Vec<Value>),          // $in
    Nin(Vec<Value>),         // $nin
    All(Vec<Value>),         // $all
    ElemMatch(Box<Query>),   // $elemMatch
    Regex(Regex),            // $regex
    Size(f64),               // $size
    Exists(bool),            // $exists
    /// Unknown operator, or an operand of the wrong shape. Never satisfied.
    Unsupported(String),
}

impl Query {
    /// Match-everything query (`{}`)
    pub fn all() -> Self {
        Query::Fields(Vec::new())
    }

    /// Compile a JSON query. The query itself and every `$and`/`$or` branch must
    /// be objects; operator-level problems only make the clause fail.
    pub fn from_json(json: &Value) -> Result<Self> {
        match json {
            Value::Object(map) => Self::from_map(map),
            other => Err(AstroDbError::invalid_query(format!(
                "query must be an object, got {}",
                json_type(other)
            ))),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        if let Some(branches) = map.get("$and") {
            return Ok(Query::And(Self::parse_branches("$and", branches)?));
        }
        if let Some(branches) = map.get("$or") {
            return Ok(Query::Or(Self::parse_branches("$or", branches)?));
        }

        let mut clauses = Vec::with_capacity(map.len());
        for (field, value) in map {
            clauses.push(FieldClause {
                field: field.clone(),
                condition: Self::parse_condition(value)?,
            });
        }
        Ok(Query::Fields(clauses))
    }

    fn parse_branches(op: &str, value: &Value) -> Result<Vec<Query>> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_json).collect(),
            _ => Err(AstroDbError::invalid_query(format!("{} requires array", op))),
        }
    }

    fn parse_condition(value: &Value) -> Result<Condition> {
        match value {
            Value::Object(ops) => {
                let mut operators = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    operators.push(Self::parse_operator(op, operand)?);
                }
                Ok(Condition::Operators(operators))
            }
            other => Ok(Condition::Equals(other.clone())),
        }
    }

    fn parse_operator(op: &str, operand: &Value) -> Result<QueryOperator> {
        let unsupported = || QueryOperator::Unsupported(op.to_string());

        let operator = match op {
            "$gt" => operand.as_f64().map_or_else(unsupported, QueryOperator::Gt),
            "$gte" => operand.as_f64().map_or_else(unsupported, QueryOperator::Gte),
            "$lt" => operand.as_f64().map_or_else(unsupported, QueryOperator::Lt),
            "$lte" => operand.as_f64().map_or_else(unsupported, QueryOperator::Lte),
            "$ne" => QueryOperator::Ne(operand.clone()),
            "$in" => match operand {
                Value::Array(items) => QueryOperator::In(items.clone()),
                _ => unsupported(),
            },
            "$nin" => match operand {
                Value::Array(items) => QueryOperator::Nin(items.clone()),
                _ => unsupported(),
            },
            "$all" => match operand {
                Value::Array(items) => QueryOperator::All(items.clone()),
                _ => unsupported(),
            },
            "$elemMatch" => match operand {
                Value::Object(map) => QueryOperator::ElemMatch(Box::new(Self::from_map(map)?)),
                _ => unsupported(),
            },
            "$regex" => match operand.as_str().map(Regex::new) {
                Some(Ok(re)) => QueryOperator::Regex(re),
                _ => unsupported(),
            },
            "$size" => operand.as_f64().map_or_else(unsupported, QueryOperator::Size),
            "$exists" => operand.as_bool().map_or_else(unsupported, QueryOperator::Exists),
            _ => unsupported(),
        };
        Ok(operator)
    }

    /// Does the field map satisfy this query
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        match self {
            Query::And(branches) => branches.iter().all(|q| q.matches(document)),
            Query::Or(branches) => branches.iter().any(|q| q.matches(document)),
            Query::Fields(clauses) => clauses.iter().all(|clause| clause.matches(document)),
        }
    }

    pub fn matches_document(&self, document: &Document) -> bool {
        self.matches(document.as_map())
    }

    /// Top-level bare equality clauses, the only clauses an index may drive
    pub fn equality_clauses(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        let clauses: &[FieldClause] = match self {
            Query::Fields(clauses) => clauses,
            _ => &[],
        };
        clauses.iter().filter_map(|clause| match &clause.condition {
            Condition::Equals(value) => Some((clause.field.as_str(), value)),
            Condition::Operators(_) => None,
        })
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldClause {
    fn matches(&self, document: &Map<String, Value>) -> bool {
        self.condition.matches(resolve_path(document, &self.field))
    }
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(target) => value.map_or(false, |v| equals_or_contains(v, target)),
            Condition::Operators(operators) => operators.iter().all(|op| op.matches(value)),
        }
    }
}

impl QueryOperator {
    fn matches(&self, value: Option<&Value>) -> bool {
        // An absent field only satisfies `$exists: false`
        let value = match value {
            Some(v) => v,
            None => return matches!(self, QueryOperator::Exists(false)),
        };

        match self {
            QueryOperator::Gt(target) => value.as_f64().map_or(false, |v| v > *target),
            QueryOperator::Gte(target) => value.as_f64().map_or(false, |v| v >= *target),
            QueryOperator::Lt(target) => value.as_f64().map_or(false, |v| v < *target),
            QueryOperator::Lte(target) => value.as_f64().map_or(false, |v| v <= *target),
            QueryOperator::Ne(target) => !values_equal(value, target),
            QueryOperator::In(targets) => in_membership(value, targets),
            QueryOperator::Nin(targets) => !in_membership(value, targets),
            QueryOperator::All(targets) => value
                .as_array()
                .map_or(false, |items| targets.iter().all(|t| contains(items, t))),
            QueryOperator::ElemMatch(query) => value.as_array().map_or(false, |items| {
                items
                    .iter()
                    .any(|item| item.as_object().map_or(false, |obj| query.matches(obj)))
            }),
            QueryOperator::Regex(re) => value.as_str().map_or(false, |s| re.is_match(s)),
            QueryOperator::Size(expected) => value
                .as_array()
                .map_or(false, |items| items.len() as f64 == *expected),
            QueryOperator::Exists(should_exist) => !value.is_null() == *should_exist,
            QueryOperator::Unsupported(_) => false,
        }
    }
}

/// Compile and evaluate in one step
pub fn matches(document: &Map<String, Value>, query: &Value) -> Result<bool> {
    Ok(Query::from_json(query)?.matches(document))
}

/// Bare-value semantics: a scalar against a list is a membership test,
/// anything else is structural equality.
fn equals_or_contains(doc_value: &Value, target: &Value) -> bool {
    match doc_value {
        Value::Array(items) if !target.is_array() => contains(items, target),
        _ => values_equal(doc_value, target),
    }
}

fn in_membership(value: &Value, targets: &[Value]) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| contains(targets, item)),
        _ => contains(targets, value),
    }
}

fn contains(items: &[Value], target: &Value) -> bool {
    items.iter().any(|item| values_equal(item, target))
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
