use crate::core::error::ParseError;
use std::collections::HashMap;

/// Normalize a list argument: a single entry is split on commas so that
/// `-l a,b` and `-l a -l b` are equivalent.
pub fn split_list(items: &[String]) -> Vec<String> {
    match items {
        [single] => single
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => items.to_vec(),
    }
}

/// Parse `KEY=VALUE` entries (repeated or comma-separated) into a map.
/// Later entries override earlier ones.
pub fn parse_pairs(items: &[String]) -> Result<HashMap<String, String>, ParseError> {
    let mut map = HashMap::new();
    for item in split_list(items) {
        let (key, value) = item
            .split_once('=')
            .filter(|(key, value)| !key.is_empty() && !value.contains('='))
            .ok_or_else(|| ParseError::InvalidMapping(item.clone()))?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}
