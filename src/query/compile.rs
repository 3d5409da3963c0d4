//! # Predicate Compiler
//!
//! Turns a table name, field selector and predicate list into a fully
//! configured row statement. Pure: no I/O, no suspension.
//!
//! Each operator maps to exactly one backend code through `strategy`, an
//! exhaustive match, so adding an operator without an encoding does not
//! compile. Values are rendered into the `column=<code>.<value>` query
//! form; a value the operator cannot encode is rejected here, before any
//! request exists.

use reqwest::Method;
use serde_json::Value;

use super::filter::{Fields, Filter, FilterOperator};
use super::Row;
use crate::errors::{ClientError, ClientResult};

/// `Prefer` directive asking the backend to echo affected rows
pub const RETURN_REPRESENTATION: &str = "return=representation";
/// `Prefer` directive turning an insert into an upsert
pub const MERGE_DUPLICATES: &str = "resolution=merge-duplicates";

/// A compiled row statement, ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub method: Method,
    pub table: String,
    /// Query parameters in construction order
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// `Prefer` header directives
    pub prefer: Vec<&'static str>,
    /// Ask for a single object instead of an array
    pub accept_object: bool,
}

impl Statement {
    fn new(method: Method, table: &str) -> Self {
        Self {
            method,
            table: table.to_string(),
            params: Vec::new(),
            body: None,
            prefer: Vec::new(),
            accept_object: false,
        }
    }

    /// Value of the `Prefer` header, if any
    pub fn prefer_header(&self) -> Option<String> {
        if self.prefer.is_empty() {
            None
        } else {
            Some(self.prefer.join(","))
        }
    }

    /// First value of a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Encoder = fn(&'static str, &Value) -> Result<String, String>;

/// Backend code and value encoder for each operator
fn strategy(op: FilterOperator) -> (&'static str, Encoder) {
    match op {
        FilterOperator::Eq => ("eq", encode_scalar),
        FilterOperator::Neq => ("neq", encode_scalar),
        FilterOperator::Lt => ("lt", encode_scalar),
        FilterOperator::Lte => ("lte", encode_scalar),
        FilterOperator::Gt => ("gt", encode_scalar),
        FilterOperator::Gte => ("gte", encode_scalar),
        FilterOperator::Like => ("like", encode_pattern),
        FilterOperator::Ilike => ("ilike", encode_pattern),
        FilterOperator::Is => ("is", encode_is),
        FilterOperator::In => ("in", encode_in),
        FilterOperator::Contains => ("cs", encode_containment),
        FilterOperator::ContainedBy => ("cd", encode_containment),
        FilterOperator::Overlaps => ("ov", encode_overlaps),
        FilterOperator::RangeLt => ("sl", encode_range),
        FilterOperator::RangeGt => ("sr", encode_range),
        FilterOperator::RangeLte => ("nxr", encode_range),
        FilterOperator::RangeGte => ("nxl", encode_range),
        FilterOperator::RangeAdjacent => ("adj", encode_range),
        FilterOperator::TextSearch => ("fts", encode_text_search),
    }
}

/// Compile one predicate into its `(column, "<code>.<value>")` parameter
pub fn encode_filter(filter: &Filter) -> ClientResult<(String, String)> {
    if filter.column.trim().is_empty() {
        return Err(ClientError::validation("Filter column cannot be empty"));
    }

    let (code, encode) = strategy(filter.operator);
    let rendered = encode(code, &filter.value).map_err(|reason| {
        ClientError::validation(format!(
            "Invalid value for operator '{}' on column '{}': {}",
            filter.operator, filter.column, reason
        ))
    })?;

    Ok((filter.column.clone(), rendered))
}

/// Compile a predicate list, preserving order
pub fn encode_filters(filters: &[Filter]) -> ClientResult<Vec<(String, String)>> {
    filters.iter().map(encode_filter).collect()
}

/// Reject empty table names
pub fn check_table(table: &str) -> ClientResult<()> {
    if table.trim().is_empty() {
        return Err(ClientError::validation("Table name cannot be empty"));
    }
    Ok(())
}

/// `GET` returning every matching row
pub fn compile_select(table: &str, fields: &Fields, filters: &[Filter]) -> ClientResult<Statement> {
    check_table(table)?;

    let mut stmt = Statement::new(Method::GET, table);
    stmt.params.push(("select".to_string(), fields.to_param()?));
    stmt.params.extend(encode_filters(filters)?);
    Ok(stmt)
}

/// `GET` returning exactly one row as an object
pub fn compile_select_one(
    table: &str,
    fields: &Fields,
    filters: &[Filter],
) -> ClientResult<Statement> {
    let mut stmt = compile_select(table, fields, filters)?;
    stmt.accept_object = true;
    Ok(stmt)
}

/// `POST` of one object or a batch of objects
pub fn compile_insert(table: &str, payload: &Value, upsert: bool) -> ClientResult<Statement> {
    check_table(table)?;

    match payload {
        Value::Object(map) if !map.is_empty() => {}
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {}
        Value::Object(_) | Value::Array(_) => {
            return Err(ClientError::validation(format!(
                "Insert payload for '{}' cannot be empty",
                table
            )))
        }
        _ => {
            return Err(ClientError::validation(
                "Insert payload must be an object or a list of objects",
            ))
        }
    }

    let mut stmt = Statement::new(Method::POST, table);
    stmt.body = Some(payload.clone());
    stmt.prefer.push(RETURN_REPRESENTATION);
    if upsert {
        stmt.prefer.push(MERGE_DUPLICATES);
    }
    Ok(stmt)
}

/// `PATCH` of the matching rows
///
/// At least one predicate is required. An empty list fails here with
/// `ErrorKind::Validation`, before any request, and never reaches the
/// backend as a `Query` error.
pub fn compile_update(table: &str, changes: &Value, filters: &[Filter]) -> ClientResult<Statement> {
    check_table(table)?;

    let changes = match changes {
        Value::Object(map) if !map.is_empty() => map,
        Value::Object(_) => return Err(ClientError::validation("Update changes cannot be empty")),
        _ => return Err(ClientError::validation("Update changes must be an object")),
    };
    require_filters("update", filters)?;

    let mut stmt = Statement::new(Method::PATCH, table);
    stmt.params.extend(encode_filters(filters)?);
    stmt.body = Some(Value::Object(serialize_changes(changes)));
    stmt.prefer.push(RETURN_REPRESENTATION);
    Ok(stmt)
}

/// `DELETE` of the matching rows, echoing them back
///
/// Same predicate rule as `compile_update`: no filters is a local
/// `ErrorKind::Validation`.
pub fn compile_delete(table: &str, filters: &[Filter]) -> ClientResult<Statement> {
    check_table(table)?;
    require_filters("delete", filters)?;

    let mut stmt = Statement::new(Method::DELETE, table);
    stmt.params.extend(encode_filters(filters)?);
    stmt.prefer.push(RETURN_REPRESENTATION);
    Ok(stmt)
}

/// Top-level booleans become lowercase text; everything else is unchanged
pub fn serialize_changes(changes: &Row) -> Row {
    changes
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Bool(b) => Value::String(b.to_string()),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn require_filters(verb: &str, filters: &[Filter]) -> ClientResult<()> {
    if filters.is_empty() {
        return Err(ClientError::validation(format!(
            "Refusing to {} without filters",
            verb
        )));
    }
    Ok(())
}

// ==================
// Value encoders
// ==================

fn scalar(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err("expected a scalar value".to_string()),
    }
}

fn encode_scalar(code: &'static str, value: &Value) -> Result<String, String> {
    Ok(format!("{}.{}", code, scalar(value)?))
}

fn encode_pattern(code: &'static str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(pattern) => Ok(format!("{}.{}", code, pattern)),
        _ => Err("expected a pattern string".to_string()),
    }
}

fn encode_is(code: &'static str, value: &Value) -> Result<String, String> {
    let rendered = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => {
            let lowered = s.to_ascii_lowercase();
            match lowered.as_str() {
                "null" | "true" | "false" | "unknown" => lowered,
                _ => return Err(format!("expected null, true, false or unknown, got '{}'", s)),
            }
        }
        _ => return Err("expected null, true, false or unknown".to_string()),
    };
    Ok(format!("{}.{}", code, rendered))
}

fn encode_in(code: &'static str, value: &Value) -> Result<String, String> {
    let items = value.as_array().ok_or("expected a list of values")?;
    let rendered = items
        .iter()
        .map(|item| scalar(item).map(|s| quote_if(&s, ",:()\"\\")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{}.({})", code, rendered.join(",")))
}

fn encode_containment(code: &'static str, value: &Value) -> Result<String, String> {
    match value {
        Value::Array(items) => Ok(format!("{}.{}", code, array_literal(items)?)),
        Value::Object(_) => Ok(format!("{}.{}", code, value)),
        Value::String(range) => Ok(format!("{}.{}", code, range)),
        _ => Err("expected a list, an object or a range literal".to_string()),
    }
}

fn encode_overlaps(code: &'static str, value: &Value) -> Result<String, String> {
    match value {
        Value::Array(items) => Ok(format!("{}.{}", code, array_literal(items)?)),
        Value::String(range) => Ok(format!("{}.{}", code, range)),
        _ => Err("expected a list or a range literal".to_string()),
    }
}

fn encode_range(code: &'static str, value: &Value) -> Result<String, String> {
    match value {
        Value::Array(bounds) if bounds.len() == 2 => {
            Ok(format!("{}.({},{})", code, scalar(&bounds[0])?, scalar(&bounds[1])?))
        }
        Value::String(range) => Ok(format!("{}.{}", code, range)),
        _ => Err("expected a two-element list or a range literal".to_string()),
    }
}

fn encode_text_search(_code: &'static str, value: &Value) -> Result<String, String> {
    let (query, kind, config) = match value {
        Value::String(query) => (query.as_str(), None, None),
        Value::Object(map) => {
            let query = map
                .get("query")
                .and_then(Value::as_str)
                .ok_or("expected a 'query' string")?;
            let kind = match map.get("type") {
                None | Some(Value::Null) => None,
                Some(Value::String(kind)) => Some(kind.as_str()),
                Some(_) => return Err("'type' must be a string".to_string()),
            };
            let config = match map.get("config") {
                None | Some(Value::Null) => None,
                Some(Value::String(config)) => Some(config.as_str()),
                Some(_) => return Err("'config' must be a string".to_string()),
            };
            (query, kind, config)
        }
        _ => return Err("expected a query string or {query, type, config}".to_string()),
    };

    let code = match kind {
        None => "fts",
        Some("plain") => "plfts",
        Some("phrase") => "phfts",
        Some("websearch") => "wfts",
        Some(other) => return Err(format!("unknown text search type '{}'", other)),
    };

    match config {
        Some(config) => Ok(format!("{}({}).{}", code, config, query)),
        None => Ok(format!("{}.{}", code, query)),
    }
}

/// `{a,b}` with array-literal quoting
fn array_literal(items: &[Value]) -> Result<String, String> {
    let rendered = items
        .iter()
        .map(|item| scalar(item).map(|s| quote_if(&s, ",{}\" \\")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{{{}}}", rendered.join(",")))
}

/// Double-quote `raw` when it contains any reserved character
fn quote_if(raw: &str, reserved: &str) -> String {
    if raw.is_empty() || raw.chars().any(|c| reserved.contains(c)) {
        let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        raw.to_string()
    }
}
