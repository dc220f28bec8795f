//! Query-string driven filtering, sorting, projection and pagination.
//!
//! `QueryFeatures` decorates a [`Filter`] handle step by step:
//!
//! ```ignore
//! let query = QueryFeatures::new(Filter::new("tours")?, &params, &config.query)
//!     .filter()?
//!     .sort()?
//!     .limit_fields()?
//!     .paginate()?
//!     .query;
//! ```
//!
//! Nothing here touches the network; the store executes the resulting handle.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use super::error::FilterError;
use super::filter::Filter;
use super::filter_order::FilterOrder;
use super::is_valid_identifier;
use super::types::{FilterOp, FilterOrderInfo};
use crate::config::QueryConfig;

/// Parameters that drive the window and shape of a query rather than filtering it.
pub const RESERVED_PARAMS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Internal optimistic-concurrency counter, never returned to callers.
pub const VERSION_FIELD: &str = "version";

pub const DEFAULT_SORT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Single(String),
    Multiple(Vec<String>),
}

/// Decoded query string with duplicate-parameter protection: repeated keys
/// keep only their last value unless they are on the whitelist, in which
/// case every value is kept.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>, whitelist: &[String]) -> Self {
        let pairs = raw
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect::<Vec<_>>())
            .unwrap_or_default();
        Self::from_pairs(pairs, whitelist)
    }

    pub fn from_pairs<I, K, V>(pairs: I, whitelist: &[String]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values: BTreeMap<String, ParamValue> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            let allow_repeat = whitelist.iter().any(|w| *w == key);
            match values.get_mut(&key) {
                Some(existing) if allow_repeat => {
                    let merged = match std::mem::replace(existing, ParamValue::Multiple(vec![])) {
                        ParamValue::Single(prev) => vec![prev, value],
                        ParamValue::Multiple(mut all) => {
                            all.push(value);
                            all
                        }
                    };
                    *existing = ParamValue::Multiple(merged);
                }
                _ => {
                    values.insert(key, ParamValue::Single(value));
                }
            }
        }
        Self { values }
    }

    /// Single-valued view of a parameter; for repeated keys, the last value.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            ParamValue::Single(v) => Some(v.as_str()),
            ParamValue::Multiple(all) => all.last().map(String::as_str),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), ParamValue::Single(value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

pub struct QueryFeatures<'a> {
    pub query: Filter,
    params: &'a QueryParams,
    options: &'a QueryConfig,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(query: Filter, params: &'a QueryParams, options: &'a QueryConfig) -> Self {
        Self { query, params, options }
    }

    /// Applies every non-reserved parameter as a filter condition.
    /// `price[gte]=100` becomes `{ "price": { "$gte": 100 } }`; repeated
    /// whitelisted keys become `$in` conditions. A plain value next to bracket
    /// operators on the same field joins them as `$eq`.
    pub fn filter(mut self) -> Result<Self, FilterError> {
        let mut conditions = Map::new();
        for (key, value) in self.params.iter() {
            if RESERVED_PARAMS.contains(&key.as_str()) {
                continue;
            }
            match split_bracket(key) {
                Some((field, op)) => {
                    ensure_field(field)?;
                    let raw = match value {
                        ParamValue::Single(v) => v.as_str(),
                        ParamValue::Multiple(all) => all.last().map(String::as_str).unwrap_or_default(),
                    };
                    add_condition(&mut conditions, field, op, coerce(raw));
                }
                None => {
                    ensure_field(key)?;
                    match value {
                        ParamValue::Single(v) => add_condition(&mut conditions, key, FilterOp::Eq, coerce(v)),
                        ParamValue::Multiple(all) => add_condition(
                            &mut conditions,
                            key,
                            FilterOp::In,
                            Value::Array(all.iter().map(|v| coerce(v)).collect()),
                        ),
                    }
                }
            }
        }

        if !conditions.is_empty() {
            self.query.and_where(Value::Object(conditions))?;
        }
        Ok(self)
    }

    /// `sort=-price,name`; defaults to newest first.
    pub fn sort(mut self) -> Result<Self, FilterError> {
        let requested = match self.params.get("sort") {
            Some(spec) => FilterOrder::parse_sort_param(spec)?,
            None => vec![],
        };
        let order = if requested.is_empty() {
            vec![FilterOrderInfo::desc(DEFAULT_SORT_FIELD)]
        } else {
            requested
        };
        self.query.order_by(order)?;
        Ok(self)
    }

    /// `fields=name,price` projects; `fields=-description` drops. The version
    /// counter is always dropped.
    pub fn limit_fields(mut self) -> Result<Self, FilterError> {
        if let Some(spec) = self.params.get("fields") {
            let mut include = Vec::new();
            let mut exclude = Vec::new();
            for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match part.strip_prefix('-') {
                    Some(field) => exclude.push(field.to_string()),
                    None => include.push(part.to_string()),
                }
            }
            if !include.is_empty() {
                if !include.iter().any(|f| f == "id") {
                    include.insert(0, "id".to_string());
                }
                include.dedup();
                self.query.select(include)?;
            }
            self.query.exclude(exclude)?;
        }
        self.query.exclude(vec![VERSION_FIELD.to_string()])?;
        Ok(self)
    }

    /// `page` and `limit` as positive integers (defaults 1 and the configured
    /// default limit); skips `(page - 1) * limit` documents.
    pub fn paginate(mut self) -> Result<Self, FilterError> {
        let page = positive(self.params.get("page")).unwrap_or(1);
        let mut limit = positive(self.params.get("limit")).unwrap_or(self.options.default_limit);
        if let Some(max) = self.options.max_limit {
            if limit > max {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max);
                limit = max;
            }
        }
        let skip = (page - 1).saturating_mul(limit);
        self.query.limit(limit, Some(skip))?;
        Ok(self)
    }

    pub fn into_query(self) -> Filter {
        self.query
    }
}

fn split_bracket(key: &str) -> Option<(&str, FilterOp)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    let op = FilterOp::from_bracket(inner)?;
    Some((&key[..open], op))
}

/// Bare equality stays `{ field: value }` until another operator lands on the
/// same field, at which point both live in one operator object.
fn add_condition(conditions: &mut Map<String, Value>, field: &str, op: FilterOp, value: Value) {
    if let Some(existing) = conditions.get_mut(field) {
        if !existing.is_object() {
            let mut ops = Map::new();
            ops.insert(FilterOp::Eq.key().to_string(), existing.take());
            *existing = Value::Object(ops);
        }
        if let Value::Object(ops) = existing {
            ops.insert(op.key().to_string(), value);
        }
        return;
    }
    if op == FilterOp::Eq {
        conditions.insert(field.to_string(), value);
    } else {
        let mut ops = Map::new();
        ops.insert(op.key().to_string(), value);
        conditions.insert(field.to_string(), Value::Object(ops));
    }
}

fn ensure_field(field: &str) -> Result<(), FilterError> {
    if is_valid_identifier(field) {
        Ok(())
    } else {
        Err(FilterError::InvalidColumn(field.to_string()))
    }
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

/// Query strings only carry text; numbers and booleans are restored so
/// comparisons are numeric rather than lexical.
pub fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if raw.contains('.') {
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::SortDirection;
    use serde_json::json;

    fn params(query: &str) -> QueryParams {
        QueryParams::parse(Some(query), &QueryConfig::default().whitelist)
    }

    fn build(query: &str, options: &QueryConfig) -> Filter {
        let params = params(query);
        QueryFeatures::new(Filter::new("tours").unwrap(), &params, options)
            .filter().unwrap()
            .sort().unwrap()
            .limit_fields().unwrap()
            .paginate().unwrap()
            .into_query()
    }

    #[test]
    fn bracket_operators_become_store_operators() {
        let query = build("price[gte]=100&price[lte]=500&difficulty=easy&page=2", &QueryConfig::default());
        assert_eq!(
            query.where_data().unwrap(),
            &json!({"difficulty": "easy", "price": {"$gte": 100, "$lte": 500}})
        );
    }

    #[test]
    fn reserved_params_never_filter() {
        let query = build("page=1&sort=price&limit=3&fields=name", &QueryConfig::default());
        assert!(query.where_data().is_none());
    }

    #[test]
    fn sort_defaults_to_newest_first() {
        let query = build("", &QueryConfig::default());
        assert_eq!(query.order_data(), &[FilterOrderInfo::desc("createdAt")]);

        let query = build("sort=-price,name", &QueryConfig::default());
        assert_eq!(query.order_data()[0].sort, SortDirection::Desc);
        assert_eq!(query.order_data()[1], FilterOrderInfo::asc("name"));
    }

    #[test]
    fn projection_keeps_id_and_drops_version() {
        let query = build("fields=name,price", &QueryConfig::default());
        assert_eq!(query.select_columns(), &["id".to_string(), "name".to_string(), "price".to_string()]);
        assert!(query.exclude_columns().contains(&"version".to_string()));

        let query = build("", &QueryConfig::default());
        assert!(query.select_columns().is_empty());
        assert_eq!(query.exclude_columns(), &["version".to_string()]);
    }

    #[test]
    fn pagination_window() {
        let query = build("page=3&limit=10", &QueryConfig::default());
        assert_eq!(query.limit_value(), Some(10));
        assert_eq!(query.offset_value(), Some(20));

        let query = build("page=0&limit=abc", &QueryConfig::default());
        assert_eq!(query.limit_value(), Some(100));
        assert_eq!(query.offset_value(), Some(0));
    }

    #[test]
    fn huge_windows_stay_in_bigint_range() {
        let query = build("limit=18446744073709551615", &QueryConfig::default());
        assert_eq!(query.limit_value(), Some(i64::MAX as u64));
        assert_eq!(query.offset_value(), Some(0));

        let query = build("page=200000000000000000&limit=100", &QueryConfig::default());
        assert_eq!(query.limit_value(), Some(100));
        assert_eq!(query.offset_value(), Some(i64::MAX as u64));
    }

    #[test]
    fn plain_value_joins_bracket_operators_as_eq() {
        let query = build("price=500&price[lte]=600", &QueryConfig::default());
        assert_eq!(query.where_data().unwrap(), &json!({"price": {"$eq": 500, "$lte": 600}}));

        let query = build("price[gte]=100&price=500", &QueryConfig::default());
        assert_eq!(query.where_data().unwrap(), &json!({"price": {"$eq": 500, "$gte": 100}}));

        let query = build("difficulty=easy&difficulty=medium&difficulty[gt]=a", &QueryConfig::default());
        assert_eq!(
            query.where_data().unwrap(),
            &json!({"difficulty": {"$gt": "a", "$in": ["easy", "medium"]}})
        );
    }

    #[test]
    fn limit_is_uncapped_unless_configured() {
        let query = build("limit=5000", &QueryConfig::default());
        assert_eq!(query.limit_value(), Some(5000));

        let capped = QueryConfig { max_limit: Some(200), ..QueryConfig::default() };
        let query = build("limit=5000", &capped);
        assert_eq!(query.limit_value(), Some(200));
    }

    #[test]
    fn duplicate_params_respect_whitelist() {
        let p = params("sort=price&sort=name&difficulty=easy&difficulty=medium");
        assert_eq!(p.get("sort"), Some("name"));
        assert_eq!(
            p.iter().find(|(k, _)| k.as_str() == "difficulty").map(|(_, v)| v.clone()),
            Some(ParamValue::Multiple(vec!["easy".into(), "medium".into()]))
        );

        let query = build("difficulty=easy&difficulty=medium", &QueryConfig::default());
        assert_eq!(query.where_data().unwrap(), &json!({"difficulty": {"$in": ["easy", "medium"]}}));
    }

    #[test]
    fn values_are_coerced() {
        assert_eq!(coerce("5"), json!(5));
        assert_eq!(coerce("4.7"), json!(4.7));
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("The Forest Hiker"), json!("The Forest Hiker"));
        assert_eq!(coerce("1e3"), json!("1e3"));
    }

    #[test]
    fn operator_injection_is_rejected() {
        let p = params("%24where=1");
        let config = QueryConfig::default();
        let result = QueryFeatures::new(Filter::new("tours").unwrap(), &p, &config).filter();
        assert!(result.is_err());
    }
}
