use serde_json::Value;

use super::error::FilterError;
use super::is_valid_identifier;
use super::types::{ColumnKind, ColumnKinds, FilterOp, FilterWhereInfo};

/// Renders a Mongo-style condition document into a parameterized SQL predicate.
///
/// `{ "price": { "$gte": 100 }, "$or": [{ "difficulty": "easy" }, { "duration": 5 }] }`
/// becomes `"price" >= $1 AND (("difficulty"...) OR ("duration" = $3))`.
///
/// Operands are compared in the column's declared kind. A number or boolean
/// column meets a matching operand directly; every other pairing goes through
/// the column's JSON text form with the operand bound as text.
pub struct FilterWhere<'k> {
    kinds: &'k ColumnKinds,
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<String>,
}

impl<'k> FilterWhere<'k> {
    pub fn new(starting_param_index: usize, kinds: &'k ColumnKinds) -> Self {
        Self {
            kinds,
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    /// Returns the predicate (empty when there is nothing to filter) and its bind values.
    pub fn generate(
        where_data: &Value,
        starting_param_index: usize,
        kinds: &ColumnKinds,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = FilterWhere::new(starting_param_index, kinds);
        filter_where.parse_where_data(where_data)?;
        Ok((filter_where.conditions.join(" AND "), filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("filter must be an object".to_string())),
        }
    }

    /// Every field name referenced by the condition document, in document order.
    pub fn columns(where_data: &Value) -> Result<Vec<String>, FilterError> {
        let mut out = Vec::new();
        Self::collect_columns(where_data, &mut out)?;
        Ok(out)
    }

    fn collect_columns(where_data: &Value, out: &mut Vec<String>) -> Result<(), FilterError> {
        let Value::Object(obj) = where_data else { return Ok(()) };
        for (key, value) in obj {
            match key.as_str() {
                "$and" | "$or" => {
                    for v in value.as_array().into_iter().flatten() {
                        Self::collect_columns(v, out)?;
                    }
                }
                "$not" => Self::collect_columns(value, out)?,
                field => {
                    if !is_valid_identifier(field) {
                        return Err(FilterError::InvalidColumn(field.to_string()));
                    }
                    out.push(field.to_string());
                }
            }
        }
        Ok(())
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        self.parse_logical_operator(key, value)?;
                    } else {
                        self.parse_field_condition(key, value)?;
                    }
                }
                Ok(())
            }
            _ => Err(FilterError::InvalidWhereClause("Unsupported filter format".to_string())),
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut sql_parts = Vec::new();
                for v in arr {
                    let sql = self.generate_nested(v)?;
                    sql_parts.push(format!("({})", sql));
                }
                if sql_parts.is_empty() {
                    return Ok(());
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                self.conditions.push(format!("({})", sql_parts.join(joiner)));
                Ok(())
            }
            "$not" => {
                let sql = self.generate_nested(value)?;
                self.conditions.push(format!("NOT ({})", sql));
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn generate_nested(&mut self, value: &Value) -> Result<String, FilterError> {
        let (sql, params) = FilterWhere::generate(value, self.param_index, self.kinds)?;
        self.param_index += params.len();
        self.param_values.extend(params);
        Ok(if sql.is_empty() { "1=1".to_string() } else { sql })
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(field.to_string()));
        }
        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    let info = FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() };
                    let sql = self.build_sql_condition(&info)?;
                    self.conditions.push(sql);
                }
            }
            _ => {
                // Implicit equality: { field: value }
                let info = FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() };
                let sql = self.build_sql_condition(&info)?;
                self.conditions.push(sql);
            }
        }
        Ok(())
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let kind = self.kinds.of(&condition.column);
        let native = match (condition.operator, &condition.data) {
            (FilterOp::In | FilterOp::NIn, Value::Array(values)) => {
                values.iter().all(|v| Self::is_native(kind, v))
            }
            (_, other) => Self::is_native(kind, other),
        };
        let column = if native {
            format!("\"{}\"", condition.column)
        } else {
            format!("(to_jsonb(\"{}\") #>> '{{}}')", condition.column)
        };
        let operand = |v: Value| if native { v } else { Self::as_text(v) };
        let data = condition.data.clone();
        Ok(match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { format!("\"{}\" IS NULL", condition.column) }
                else { format!("{} = {}", column, self.param(operand(data))) }
            }
            FilterOp::Ne => {
                if data.is_null() { format!("\"{}\" IS NOT NULL", condition.column) }
                else { format!("{} IS DISTINCT FROM {}", column, self.param(operand(data))) }
            }
            FilterOp::Gt => format!("{} > {}", column, self.param(operand(data))),
            FilterOp::Gte => format!("{} >= {}", column, self.param(operand(data))),
            FilterOp::Lt => format!("{} < {}", column, self.param(operand(data))),
            FilterOp::Lte => format!("{} <= {}", column, self.param(operand(data))),
            FilterOp::In | FilterOp::NIn => {
                let values = match data {
                    Value::Array(values) => values,
                    other => vec![other],
                };
                let negate = condition.operator == FilterOp::NIn;
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let params: Vec<String> = values.into_iter().map(|v| self.param(operand(v))).collect();
                let keyword = if negate { "NOT IN" } else { "IN" };
                format!("{} {} ({})", column, keyword, params.join(", "))
            }
        })
    }

    /// Whether the operand can be bound against the column without a cast.
    fn is_native(kind: ColumnKind, operand: &Value) -> bool {
        matches!(
            (kind, operand),
            (ColumnKind::Number, Value::Number(_)) | (ColumnKind::Boolean, Value::Bool(_))
        )
    }

    fn as_text(value: Value) -> Value {
        match value {
            Value::Null | Value::String(_) => value,
            other => Value::String(other.to_string()),
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KINDS: ColumnKinds = ColumnKinds {
        numeric: &["price", "duration"],
        boolean: &["secretTour"],
    };

    fn render(where_data: Value, start: usize) -> (String, Vec<Value>) {
        FilterWhere::generate(&where_data, start, &KINDS).unwrap()
    }

    #[test]
    fn renders_range_operators() {
        let (sql, params) = render(json!({"price": {"$gte": 100, "$lte": 500}}), 0);
        assert_eq!(sql, "\"price\" >= $1 AND \"price\" <= $2");
        assert_eq!(params, vec![json!(100), json!(500)]);
    }

    #[test]
    fn string_operands_compare_json_text() {
        let (sql, params) = render(json!({"difficulty": "easy"}), 0);
        assert_eq!(sql, "(to_jsonb(\"difficulty\") #>> '{}') = $1");
        assert_eq!(params, vec![json!("easy")]);
    }

    #[test]
    fn numeric_operand_on_text_column_binds_text() {
        let (sql, params) = render(json!({"name": 1234567890}), 0);
        assert_eq!(sql, "(to_jsonb(\"name\") #>> '{}') = $1");
        assert_eq!(params, vec![json!("1234567890")]);
    }

    #[test]
    fn boolean_operand_on_text_column_binds_text() {
        let (sql, params) = render(json!({"summary": true}), 0);
        assert_eq!(sql, "(to_jsonb(\"summary\") #>> '{}') = $1");
        assert_eq!(params, vec![json!("true")]);
    }

    #[test]
    fn text_operand_on_numeric_column_compares_text() {
        let (sql, params) = render(json!({"price": {"$lte": "cheap"}}), 0);
        assert_eq!(sql, "(to_jsonb(\"price\") #>> '{}') <= $1");
        assert_eq!(params, vec![json!("cheap")]);
    }

    #[test]
    fn boolean_column_keeps_native_comparison() {
        let (sql, params) = render(json!({"secretTour": {"$ne": true}}), 1);
        assert_eq!(sql, "\"secretTour\" IS DISTINCT FROM $2");
        assert_eq!(params, vec![json!(true)]);
    }

    #[test]
    fn nested_logical_operators_number_params_in_order() {
        let where_data = json!({
            "$or": [{"duration": 5}, {"duration": {"$gt": 10}}],
            "price": {"$lt": 1000}
        });
        let (sql, params) = render(where_data, 0);
        assert_eq!(sql, "((\"duration\" = $1) OR (\"duration\" > $2)) AND \"price\" < $3");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn membership_expands_params() {
        let (sql, params) = render(json!({"difficulty": {"$in": ["easy", "medium"]}}), 2);
        assert_eq!(sql, "(to_jsonb(\"difficulty\") #>> '{}') IN ($3, $4)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn mixed_membership_on_text_column_binds_every_value_as_text() {
        let (sql, params) = render(json!({"difficulty": {"$in": ["easy", 5]}}), 0);
        assert_eq!(sql, "(to_jsonb(\"difficulty\") #>> '{}') IN ($1, $2)");
        assert_eq!(params, vec![json!("easy"), json!("5")]);

        let (sql, params) = render(json!({"price": {"$in": [497, 997]}}), 0);
        assert_eq!(sql, "\"price\" IN ($1, $2)");
        assert_eq!(params, vec![json!(497), json!(997)]);
    }

    #[test]
    fn null_operands_test_the_raw_column() {
        let (sql, params) = render(json!({"priceDiscount": null, "price": {"$ne": null}}), 0);
        assert_eq!(sql, "\"price\" IS NOT NULL AND \"priceDiscount\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_injected_field_names() {
        let err = FilterWhere::generate(&json!({"price\" OR 1=1 --": 5}), 0, &KINDS).unwrap_err();
        assert!(matches!(err, FilterError::InvalidColumn(_)));
        let err = FilterWhere::generate(&json!({"$where": "sleep(100)"}), 0, &KINDS).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator(_)));
    }

    #[test]
    fn collects_columns_through_logical_operators() {
        let cols = FilterWhere::columns(&json!({"$and": [{"price": 1}, {"$not": {"name": "x"}}]})).unwrap();
        assert_eq!(cols, vec!["price".to_string(), "name".to_string()]);
    }
}
