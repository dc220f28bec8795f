pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod features;
pub mod error;

pub use types::*;
pub use filter::Filter;
pub use features::{ParamValue, QueryFeatures, QueryParams};

/// Column and table names must be plain ASCII identifiers; anything else
/// (including `$`-prefixed operators) is rejected before it reaches SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
