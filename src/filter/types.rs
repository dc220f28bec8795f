use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Option<Self> {
        Some(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            _ => return None,
        })
    }

    /// Comparison operators that can be written as `field[op]=value` in a query string.
    pub fn from_bracket(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "gte" => FilterOp::Gte,
            "gt" => FilterOp::Gt,
            "lte" => FilterOp::Lte,
            "lt" => FilterOp::Lt,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::In => "$in",
            FilterOp::NIn => "$nin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

impl FilterOrderInfo {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), sort: SortDirection::Asc }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), sort: SortDirection::Desc }
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<serde_json::Value>,
}

/// How a column is compared when it appears in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Boolean,
}

/// Declared kinds of a table's columns. Anything not listed is compared
/// through its JSON text form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnKinds {
    pub numeric: &'static [&'static str],
    pub boolean: &'static [&'static str],
}

impl ColumnKinds {
    pub fn of(&self, column: &str) -> ColumnKind {
        if self.numeric.contains(&column) {
            ColumnKind::Number
        } else if self.boolean.contains(&column) {
            ColumnKind::Boolean
        } else {
            ColumnKind::Text
        }
    }
}
