use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::database::manager::{quote_identifier, DatabaseError};
use crate::database::models::{Collection, Document};
use crate::filter::filter_where::FilterWhere;
use crate::filter::types::SqlResult;
use crate::filter::Filter;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Renders document-shaped statements for one collection. Every statement
/// yields a single `doc` column holding the whole row as JSON.
pub struct QueryBuilder {
    collection: &'static Collection,
}

impl QueryBuilder {
    pub fn new(collection: &'static Collection) -> Self {
        Self { collection }
    }

    fn table(&self) -> String {
        quote_identifier(self.collection.name)
    }

    fn row_expr(&self) -> String {
        format!("to_jsonb({}) AS doc", self.table())
    }

    /// Scope predicate rendered with parameters numbered after `start_idx`.
    fn scope_sql(&self, start_idx: usize) -> Result<(String, Vec<Value>), DatabaseError> {
        match self.collection.scope_conditions() {
            Some(scope) => Ok(FilterWhere::generate(&scope, start_idx, &self.collection.kinds)?),
            None => Ok((String::new(), vec![])),
        }
    }

    pub fn select(&self, query: &Filter) -> Result<SqlResult, DatabaseError> {
        let scoped = self.collection.scoped(query)?;
        Ok(scoped.to_sql_selecting(&self.row_expr())?)
    }

    pub fn insert(&self) -> String {
        format!(
            "INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, $1) RETURNING {row}",
            table = self.table(),
            row = self.row_expr(),
        )
    }

    /// `$1` is the id, `$2` the changes as JSON. Only the supplied fields are
    /// assigned; the version counter always moves forward.
    pub fn update(&self, changes: &Document) -> Result<SqlResult, DatabaseError> {
        let table = self.table();
        let mut assignments: Vec<String> = changes
            .keys()
            .map(|key| {
                let column = quote_identifier(key);
                format!(
                    "{column} = (SELECT r.{column} FROM jsonb_populate_record(NULL::{table}, $2) r)",
                    column = column,
                    table = table,
                )
            })
            .collect();
        assignments.push("\"version\" = \"version\" + 1".to_string());

        let (scope, params) = self.scope_sql(2)?;
        Ok(SqlResult {
            query: format!(
                "UPDATE {} SET {} WHERE \"id\" = $1{} RETURNING {}",
                table,
                assignments.join(", "),
                and_clause(&scope),
                self.row_expr(),
            ),
            params,
        })
    }

    pub fn delete(&self) -> Result<SqlResult, DatabaseError> {
        let (scope, params) = self.scope_sql(1)?;
        Ok(SqlResult {
            query: format!(
                "DELETE FROM {} WHERE \"id\" = $1{} RETURNING {}",
                self.table(),
                and_clause(&scope),
                self.row_expr(),
            ),
            params,
        })
    }

    pub async fn fetch_documents(&self, pool: &PgPool, query: &Filter) -> Result<Vec<Document>, DatabaseError> {
        let sql = self.select(query)?;
        let mut q = sqlx::query(&sql.query);
        for p in sql.params.iter() {
            q = bind_param(q, p);
        }
        q.fetch_all(pool).await?.iter().map(row_document).collect()
    }

    pub async fn insert_document(&self, pool: &PgPool, doc: &Document) -> Result<Document, DatabaseError> {
        let sql = self.insert();
        let row = sqlx::query(&sql)
            .bind(Value::Object(doc.clone()))
            .fetch_one(pool)
            .await?;
        row_document(&row)
    }

    pub async fn update_document(
        &self,
        pool: &PgPool,
        id: Uuid,
        changes: &Document,
    ) -> Result<Option<Document>, DatabaseError> {
        let sql = self.update(changes)?;
        let mut q = sqlx::query(&sql.query).bind(id).bind(Value::Object(changes.clone()));
        for p in sql.params.iter() {
            q = bind_param(q, p);
        }
        q.fetch_optional(pool).await?.as_ref().map(row_document).transpose()
    }

    pub async fn delete_document(&self, pool: &PgPool, id: Uuid) -> Result<Option<Document>, DatabaseError> {
        let sql = self.delete()?;
        let mut q = sqlx::query(&sql.query).bind(id);
        for p in sql.params.iter() {
            q = bind_param(q, p);
        }
        q.fetch_optional(pool).await?.as_ref().map(row_document).transpose()
    }
}

fn and_clause(predicate: &str) -> String {
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" AND {}", predicate)
    }
}

fn row_document(row: &sqlx::postgres::PgRow) -> Result<Document, DatabaseError> {
    match row.try_get::<Value, _>("doc")? {
        Value::Object(doc) => Ok(doc),
        other => Err(DatabaseError::QueryError(format!("expected a row object, got {}", other))),
    }
}

pub(crate) fn bind_param<'q>(q: PgQuery<'q>, v: &'q Value) -> PgQuery<'q> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{REVIEWS, TOURS, USERS};
    use serde_json::json;

    #[test]
    fn select_scopes_and_wraps_rows() {
        let mut query = TOURS.query().unwrap();
        query.where_clause(json!({"price": {"$lt": 1000}})).unwrap();
        let sql = QueryBuilder::new(&TOURS).select(&query).unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(\"tours\") AS doc FROM \"tours\" WHERE ((\"price\" < $1) AND (\"secretTour\" IS DISTINCT FROM $2))"
        );
        assert_eq!(sql.params, vec![json!(1000), json!(true)]);
    }

    #[test]
    fn select_compares_text_columns_as_text() {
        let mut query = TOURS.query().unwrap();
        query
            .where_clause(json!({"name": 1234567890, "summary": true, "price": {"$lte": 500}}))
            .unwrap();
        let sql = QueryBuilder::new(&TOURS).select(&query).unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(\"tours\") AS doc FROM \"tours\" WHERE (((to_jsonb(\"name\") #>> '{}') = $1 AND \"price\" <= $2 AND (to_jsonb(\"summary\") #>> '{}') = $3) AND (\"secretTour\" IS DISTINCT FROM $4))"
        );
        assert_eq!(sql.params, vec![json!("1234567890"), json!(500), json!("true"), json!(true)]);
    }

    #[test]
    fn select_binds_mixed_membership_as_text() {
        let mut query = TOURS.query().unwrap();
        query.where_clause(json!({"difficulty": {"$in": ["easy", 5]}})).unwrap();
        let sql = QueryBuilder::new(&TOURS).select(&query).unwrap();
        assert!(sql.query.contains("(to_jsonb(\"difficulty\") #>> '{}') IN ($1, $2)"));
        assert_eq!(sql.params, vec![json!("easy"), json!("5"), json!(true)]);
    }

    #[test]
    fn update_assigns_supplied_fields_and_bumps_version() {
        let changes = json!({"rating": 4}).as_object().cloned().unwrap();
        let sql = QueryBuilder::new(&REVIEWS).update(&changes).unwrap();
        assert_eq!(
            sql.query,
            "UPDATE \"reviews\" SET \"rating\" = (SELECT r.\"rating\" FROM jsonb_populate_record(NULL::\"reviews\", $2) r), \"version\" = \"version\" + 1 WHERE \"id\" = $1 RETURNING to_jsonb(\"reviews\") AS doc"
        );
        assert!(sql.params.is_empty());
    }

    #[test]
    fn delete_respects_scope() {
        let sql = QueryBuilder::new(&USERS).delete().unwrap();
        assert_eq!(
            sql.query,
            "DELETE FROM \"users\" WHERE \"id\" = $1 AND \"active\" IS DISTINCT FROM $2 RETURNING to_jsonb(\"users\") AS doc"
        );
        assert_eq!(sql.params, vec![json!(false)]);
    }
}
