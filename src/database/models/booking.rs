use serde_json::json;

use super::{Document, FieldErrors, FieldsValidator};

pub fn validate_booking(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
    let mut v = if partial { FieldsValidator::update(input) } else { FieldsValidator::create(input) };

    v.id("tour", Some("Booking must belong to a Tour!"));
    v.id("user", Some("Booking must belong to a User!"));
    if let Some(price) = v.number("price", Some("Booking must have a price.")) {
        if price <= 0.0 {
            v.error("price", "Price must be positive");
        }
    }
    v.boolean("paid");
    v.default("paid", json!(true));

    v.finish()
}
