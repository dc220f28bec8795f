pub mod booking;
pub mod review;
pub mod tour;
pub mod user;

pub use user::{Credentials, NewUser, ProfileUpdate, ResetToken, Role, User, UserRecord};

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::filter::error::FilterError;
use crate::filter::{ColumnKinds, Filter};

pub type Document = Map<String, Value>;

/// Field-name to message map reported with validation failures.
pub type FieldErrors = HashMap<String, String>;

/// Fields owned by the store; never accepted from request bodies.
pub const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "version"];

/// Static description of one collection: its columns and their SQL kinds,
/// the fields that never leave the store, unique keys and the conditions
/// every read is scoped to.
#[derive(Debug)]
pub struct Collection {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub kinds: ColumnKinds,
    pub hidden: &'static [&'static str],
    pub unique: &'static [&'static [&'static str]],
    pub scope: Option<fn() -> Value>,
}

impl Collection {
    /// Rejects queries that mention unknown or hidden fields.
    pub fn check(&self, query: &Filter) -> Result<(), FilterError> {
        for column in query.referenced_columns()? {
            if !self.columns.contains(&column.as_str()) || self.hidden.contains(&column.as_str()) {
                return Err(FilterError::InvalidColumn(column));
            }
        }
        Ok(())
    }

    /// The caller's query narrowed to this collection's visible rows.
    pub fn scoped(&self, query: &Filter) -> Result<Filter, FilterError> {
        self.check(query)?;
        let mut scoped = query.clone();
        scoped.column_kinds(self.kinds);
        if let Some(scope) = self.scope {
            scoped.and_where(scope())?;
        }
        Ok(scoped)
    }

    pub fn scope_conditions(&self) -> Option<Value> {
        self.scope.map(|scope| scope())
    }

    /// Drops keys that are not columns of this collection.
    pub fn retain_known(&self, doc: &mut Document) {
        doc.retain(|key, _| self.columns.contains(&key.as_str()));
    }

    pub fn strip_hidden(&self, doc: &mut Document) {
        for field in self.hidden {
            doc.remove(*field);
        }
    }

    pub fn query(&self) -> Result<Filter, FilterError> {
        let mut query = Filter::new(self.name)?;
        query.column_kinds(self.kinds);
        Ok(query)
    }
}

fn visible_tours() -> Value {
    json!({ "secretTour": { "$ne": true } })
}

fn active_users() -> Value {
    json!({ "active": { "$ne": false } })
}

pub static TOURS: Collection = Collection {
    name: "tours",
    columns: &[
        "id", "name", "slug", "duration", "maxGroupSize", "difficulty", "ratingsAverage",
        "ratingsQuantity", "price", "priceDiscount", "summary", "description", "imageCover",
        "images", "createdAt", "startDates", "secretTour", "startLocation", "locations",
        "guides", "version",
    ],
    kinds: ColumnKinds {
        numeric: &[
            "duration", "maxGroupSize", "ratingsAverage", "ratingsQuantity", "price",
            "priceDiscount", "version",
        ],
        boolean: &["secretTour"],
    },
    hidden: &["version"],
    unique: &[&["name"]],
    scope: Some(visible_tours),
};

pub static USERS: Collection = Collection {
    name: "users",
    columns: &[
        "id", "name", "email", "photo", "role", "password", "passwordChangedAt",
        "passwordResetToken", "passwordResetExpires", "active", "createdAt", "version",
    ],
    kinds: ColumnKinds { numeric: &["version"], boolean: &["active"] },
    hidden: &["password", "passwordResetToken", "passwordResetExpires", "active", "version"],
    unique: &[&["email"]],
    scope: Some(active_users),
};

pub static REVIEWS: Collection = Collection {
    name: "reviews",
    columns: &["id", "review", "rating", "createdAt", "tour", "user", "version"],
    kinds: ColumnKinds { numeric: &["rating", "version"], boolean: &[] },
    hidden: &["version"],
    unique: &[&["tour", "user"]],
    scope: None,
};

pub static BOOKINGS: Collection = Collection {
    name: "bookings",
    columns: &["id", "tour", "user", "price", "paid", "createdAt", "version"],
    kinds: ColumnKinds { numeric: &["price", "version"], boolean: &["paid"] },
    hidden: &["version"],
    unique: &[],
    scope: None,
};

/// Collects typed values from a request body into a store document,
/// recording a message per invalid field. In partial mode (updates) absent
/// fields are simply skipped.
pub struct FieldsValidator<'a> {
    input: &'a Document,
    partial: bool,
    errors: FieldErrors,
    output: Document,
}

impl<'a> FieldsValidator<'a> {
    pub fn create(input: &'a Document) -> Self {
        Self { input, partial: false, errors: FieldErrors::new(), output: Document::new() }
    }

    pub fn update(input: &'a Document) -> Self {
        Self { input, partial: true, errors: FieldErrors::new(), output: Document::new() }
    }

    fn present(&mut self, field: &str, required: Option<&str>) -> Option<&'a Value> {
        let input: &'a Document = self.input;
        match input.get(field) {
            Some(Value::Null) | None => {
                if let (false, Some(message)) = (self.partial, required) {
                    self.error(field, message);
                }
                None
            }
            Some(value) => Some(value),
        }
    }

    /// Trimmed string; empty strings count as missing.
    pub fn string(&mut self, field: &str, required: Option<&str>) -> Option<String> {
        let value = self.present(field, required)?;
        match value.as_str().map(str::trim) {
            Some("") => {
                self.error(field, required.unwrap_or("must not be empty"));
                None
            }
            Some(s) => {
                self.output.insert(field.to_string(), Value::String(s.to_string()));
                Some(s.to_string())
            }
            None => {
                self.error(field, "must be a string");
                None
            }
        }
    }

    pub fn number(&mut self, field: &str, required: Option<&str>) -> Option<f64> {
        let value = self.present(field, required)?;
        let number = match value {
            Value::Number(n) => Some(n.clone()),
            Value::String(s) => match crate::filter::features::coerce(s.trim()) {
                Value::Number(n) => Some(n),
                _ => None,
            },
            _ => None,
        };
        match number.and_then(|n| n.as_f64().map(|f| (n, f))) {
            Some((n, f)) if f.is_finite() => {
                self.output.insert(field.to_string(), Value::Number(n));
                Some(f)
            }
            _ => {
                self.error(field, "must be a number");
                None
            }
        }
    }

    pub fn boolean(&mut self, field: &str) -> Option<bool> {
        let value = self.present(field, None)?;
        match value.as_bool() {
            Some(b) => {
                self.output.insert(field.to_string(), Value::Bool(b));
                Some(b)
            }
            None => {
                self.error(field, "must be true or false");
                None
            }
        }
    }

    pub fn id(&mut self, field: &str, required: Option<&str>) -> Option<Uuid> {
        let value = self.present(field, required)?;
        match value.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok()) {
            Some(id) => {
                self.output.insert(field.to_string(), Value::String(id.to_string()));
                Some(id)
            }
            None => {
                self.error(field, "must be a valid id");
                None
            }
        }
    }

    pub fn ids(&mut self, field: &str) -> Option<Vec<Uuid>> {
        let value = self.present(field, None)?;
        let parsed: Option<Vec<Uuid>> = value.as_array().and_then(|items| {
            items
                .iter()
                .map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect()
        });
        match parsed {
            Some(ids) => {
                self.output.insert(
                    field.to_string(),
                    Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect()),
                );
                Some(ids)
            }
            None => {
                self.error(field, "must be a list of valid ids");
                None
            }
        }
    }

    /// Passes a JSON array through after checking its shape.
    pub fn array(&mut self, field: &str) -> Option<&'a Vec<Value>> {
        let value = self.present(field, None)?;
        match value.as_array() {
            Some(items) => {
                self.output.insert(field.to_string(), value.clone());
                Some(items)
            }
            None => {
                self.error(field, "must be a list");
                None
            }
        }
    }

    /// Passes a JSON object through after checking its shape.
    pub fn object(&mut self, field: &str) -> Option<&'a Document> {
        let value = self.present(field, None)?;
        match value.as_object() {
            Some(obj) => {
                self.output.insert(field.to_string(), value.clone());
                Some(obj)
            }
            None => {
                self.error(field, "must be an object");
                None
            }
        }
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.output.insert(field.to_string(), value);
    }

    /// Fills a default on create when the field was not supplied.
    pub fn default(&mut self, field: &str, value: Value) {
        if !self.partial && !self.output.contains_key(field) {
            self.output.insert(field.to_string(), value);
        }
    }

    pub fn error(&mut self, field: &str, message: &str) {
        self.errors.entry(field.to_string()).or_insert_with(|| message.to_string());
        self.output.remove(field);
    }

    pub fn finish(self) -> Result<Document, FieldErrors> {
        if self.errors.is_empty() {
            Ok(self.output)
        } else {
            Err(self.errors)
        }
    }
}

/// Reads a numeric field out of a document.
pub fn number_field(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

pub fn id_field(doc: &Document, field: &str) -> Option<Uuid> {
    doc.get(field).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}
