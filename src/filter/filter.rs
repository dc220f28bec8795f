use serde_json::{json, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::is_valid_identifier;
use super::types::{ColumnKinds, FilterOrderInfo, SqlResult};

/// Largest row count or offset Postgres accepts in a LIMIT/OFFSET clause.
pub const MAX_WINDOW: u64 = i64::MAX as u64;

/// Lazy query handle: conditions, projection, ordering and window for one
/// collection. Nothing runs until a record store executes it.
#[derive(Debug, Clone)]
pub struct Filter {
    table_name: String,
    column_kinds: ColumnKinds,
    select_columns: Vec<String>,
    exclude_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if !is_valid_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(table_name));
        }
        Ok(Self {
            table_name,
            column_kinds: ColumnKinds::default(),
            select_columns: vec![],
            exclude_columns: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    /// Declares which columns compare as numbers or booleans when rendered to SQL.
    pub fn column_kinds(&mut self, kinds: ColumnKinds) -> &mut Self {
        self.column_kinds = kinds;
        self
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        Self::validate_columns(&columns)?;
        self.select_columns = columns;
        Ok(self)
    }

    /// Fields stripped from every returned document.
    pub fn exclude(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        Self::validate_columns(&columns)?;
        for column in columns {
            if !self.exclude_columns.contains(&column) {
                self.exclude_columns.push(column);
            }
        }
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = if conditions.is_null() { None } else { Some(conditions) };
        Ok(self)
    }

    /// Adds conditions on top of whatever is already set.
    pub fn and_where(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        if conditions.is_null() || conditions.as_object().map(|o| o.is_empty()).unwrap_or(false) {
            return Ok(self);
        }
        self.where_data = Some(match self.where_data.take() {
            None => conditions,
            Some(existing) => json!({ "$and": [existing, conditions] }),
        });
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &str) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::parse_sort_param(order_spec)?;
        Ok(self)
    }

    pub fn order_by(&mut self, infos: Vec<FilterOrderInfo>) -> Result<&mut Self, FilterError> {
        Self::validate_columns(&infos.iter().map(|i| i.column.clone()).collect::<Vec<_>>())?;
        self.order_data = infos;
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64, offset: Option<u64>) -> Result<&mut Self, FilterError> {
        self.limit = Some(limit.min(MAX_WINDOW));
        self.offset = offset.map(|o| o.min(MAX_WINDOW));
        Ok(self)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn select_columns(&self) -> &[String] {
        &self.select_columns
    }

    pub fn exclude_columns(&self) -> &[String] {
        &self.exclude_columns
    }

    pub fn where_data(&self) -> Option<&Value> {
        self.where_data.as_ref()
    }

    pub fn order_data(&self) -> &[FilterOrderInfo] {
        &self.order_data
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Every field the query mentions, so a store can check them against its schema.
    pub fn referenced_columns(&self) -> Result<Vec<String>, FilterError> {
        let mut columns = self.select_columns.clone();
        if let Some(where_data) = &self.where_data {
            columns.extend(FilterWhere::columns(where_data)?);
        }
        columns.extend(self.order_data.iter().map(|o| o.column.clone()));
        Ok(columns)
    }

    /// The full SELECT statement around a caller-supplied select list,
    /// e.g. a whole-row JSON expression.
    pub fn to_sql_selecting(&self, select_clause: &str) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let order_clause = FilterOrder::generate(&self.order_data)?;
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT {}", select_clause),
            format!("FROM \"{}\"", self.table_name),
            if where_result.query.is_empty() { String::new() } else { format!("WHERE {}", where_result.query) },
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (query, params) = match &self.where_data {
            Some(where_data) => FilterWhere::generate(where_data, 0, &self.column_kinds)?,
            None => (String::new(), vec![]),
        };
        Ok(SqlResult { query, params })
    }

    fn validate_columns(columns: &[String]) -> Result<(), FilterError> {
        for column in columns {
            if !is_valid_identifier(column) {
                return Err(FilterError::InvalidColumn(column.clone()));
            }
        }
        Ok(())
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) if o > 0 => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), _) => format!("LIMIT {}", l),
            (None, Some(o)) if o > 0 => format!("OFFSET {}", o),
            _ => String::new(),
        }
    }
}
