use super::error::FilterError;
use super::is_valid_identifier;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parses `-price,name` style sort keys; a leading `-` means descending.
    pub fn parse_sort_param(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let (column, sort) = match trimmed.strip_prefix('-') {
                Some(col) => (col, SortDirection::Desc),
                None => (trimmed.strip_prefix('+').unwrap_or(trimmed), SortDirection::Asc),
            };
            if !is_valid_identifier(column) {
                return Err(FilterError::InvalidColumn(column.to_string()));
            }
            out.push(FilterOrderInfo { column: column.to_string(), sort });
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> Result<String, FilterError> {
        if infos.is_empty() { return Ok(String::new()); }
        let mut parts = Vec::with_capacity(infos.len());
        for info in infos {
            if !is_valid_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(info.column.clone()));
            }
            parts.push(format!("\"{}\" {}", info.column, info.sort.to_sql()));
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_directions() {
        let infos = FilterOrder::parse_sort_param("-price, name").unwrap();
        assert_eq!(infos, vec![FilterOrderInfo::desc("price"), FilterOrderInfo::asc("name")]);
        assert_eq!(FilterOrder::generate(&infos).unwrap(), "ORDER BY \"price\" DESC, \"name\" ASC");
    }

    #[test]
    fn rejects_bad_sort_keys() {
        assert!(FilterOrder::parse_sort_param("price;drop").is_err());
        assert!(FilterOrder::parse_sort_param("-$natural").is_err());
    }

    #[test]
    fn empty_sort_renders_nothing() {
        assert!(FilterOrder::parse_sort_param(" , ").unwrap().is_empty());
        assert_eq!(FilterOrder::generate(&[]).unwrap(), "");
    }
}
