//! # Filter Predicates
//!
//! `(column, operator, value)` triples and the field selector for row
//! operations. A list of filters is AND-combined in list order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ClientError, ClientResult};

/// Filter operators accepted by the facade (fixed, case-sensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equals
    Eq,
    /// Not equals
    Neq,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Pattern match (LIKE)
    Like,
    /// Case-insensitive pattern match (ILIKE)
    Ilike,
    /// IS null / true / false
    Is,
    /// Value in list
    In,
    /// Array, range or JSON containment
    Contains,
    /// Contained by array, range or JSON
    ContainedBy,
    /// Range strictly left of
    RangeLt,
    /// Range does not extend right of
    RangeLte,
    /// Range strictly right of
    RangeGt,
    /// Range does not extend left of
    RangeGte,
    /// Range adjacent to
    RangeAdjacent,
    /// Arrays or ranges overlap
    Overlaps,
    /// Full-text search
    TextSearch,
}

impl FilterOperator {
    /// Every supported operator
    pub const ALL: [FilterOperator; 19] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Like,
        FilterOperator::Ilike,
        FilterOperator::Is,
        FilterOperator::In,
        FilterOperator::Contains,
        FilterOperator::ContainedBy,
        FilterOperator::RangeLt,
        FilterOperator::RangeLte,
        FilterOperator::RangeGt,
        FilterOperator::RangeGte,
        FilterOperator::RangeAdjacent,
        FilterOperator::Overlaps,
        FilterOperator::TextSearch,
    ];

    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
            FilterOperator::Contains => "contains",
            FilterOperator::ContainedBy => "contained_by",
            FilterOperator::RangeLt => "range_lt",
            FilterOperator::RangeLte => "range_lte",
            FilterOperator::RangeGt => "range_gt",
            FilterOperator::RangeGte => "range_gte",
            FilterOperator::RangeAdjacent => "range_adjacent",
            FilterOperator::Overlaps => "overlaps",
            FilterOperator::TextSearch => "text_search",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ClientError::validation(format!("Unsupported operator: {}", s)))
    }
}

/// A filter predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column to filter on
    pub column: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// Value to compare against
    pub value: Value,
}

impl Filter {
    /// Create a new filter predicate
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Create a predicate from an operator string, rejecting unknown operators
    pub fn parse(column: impl Into<String>, operator: &str, value: impl Into<Value>) -> ClientResult<Self> {
        let column = column.into();
        if column.trim().is_empty() {
            return Err(ClientError::validation("Filter column cannot be empty"));
        }
        Ok(Self::new(column, operator.parse()?, value))
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Neq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Gt, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Lt, value)
    }

    /// Create an "in list" filter
    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(column, FilterOperator::In, Value::Array(values))
    }

    /// Create an `IS NULL` filter
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Is, Value::Null)
    }
}

impl<C, V> TryFrom<(C, &str, V)> for Filter
where
    C: Into<String>,
    V: Into<Value>,
{
    type Error = ClientError;

    fn try_from((column, operator, value): (C, &str, V)) -> Result<Self, Self::Error> {
        Filter::parse(column, operator, value)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

/// Render a predicate list for logs
pub fn describe_filters(filters: &[Filter]) -> String {
    let parts: Vec<String> = filters.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Columns to return from a row operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fields {
    /// Every column
    #[default]
    All,
    /// Named columns, in order, as given
    Columns(Vec<String>),
}

impl Fields {
    /// Select the given columns
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fields::Columns(columns.into_iter().map(Into::into).collect())
    }

    /// Value of the `select` query parameter
    pub fn to_param(&self) -> ClientResult<String> {
        match self {
            Fields::All => Ok("*".to_string()),
            Fields::Columns(columns) => {
                if columns.is_empty() {
                    return Err(ClientError::validation("Field list cannot be empty"));
                }
                if let Some(blank) = columns.iter().find(|c| c.trim().is_empty()) {
                    return Err(ClientError::validation(format!(
                        "Field names cannot be blank: {:?}",
                        blank
                    )));
                }
                Ok(columns.join(","))
            }
        }
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fields::All => f.write_str("*"),
            Fields::Columns(columns) => f.write_str(&columns.join(",")),
        }
    }
}
