use super::{Document, FieldErrors, FieldsValidator};

pub fn validate_review(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
    let mut v = if partial { FieldsValidator::update(input) } else { FieldsValidator::create(input) };

    v.string("review", Some("Review can not be empty!"));

    if let Some(rating) = v.number("rating", Some("A review must have a rating")) {
        if !(1.0..=5.0).contains(&rating) {
            v.error("rating", "Rating must be between 1 and 5");
        }
    }

    if partial {
        // A review cannot be moved to another tour or author.
        for fixed in ["tour", "user"] {
            if input.contains_key(fixed) {
                v.error(fixed, "This field cannot be changed");
            }
        }
    } else {
        v.id("tour", Some("Review must belong to a tour."));
        v.id("user", Some("Review must belong to a user"));
    }

    v.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_requires_parent_ids() {
        let errors = validate_review(&doc(json!({"review": "Great", "rating": 5})), false).unwrap_err();
        assert!(errors.contains_key("tour"));
        assert!(errors.contains_key("user"));
    }

    #[test]
    fn rating_bounds() {
        let input = json!({
            "review": "Meh", "rating": 6,
            "tour": "6f1e2d8c-3b8f-4b9a-9f44-8f4a8a1c2d3e",
            "user": "0b7d6a54-2f7e-4c1b-8d3a-1e2f3a4b5c6d"
        });
        let errors = validate_review(&doc(input), false).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("rating"));
    }

    #[test]
    fn update_cannot_reassign() {
        let errors = validate_review(&doc(json!({"tour": "x"})), true).unwrap_err();
        assert!(errors.contains_key("tour"));
        assert!(validate_review(&doc(json!({"rating": 3})), true).is_ok());
    }
}
