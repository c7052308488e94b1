use std::collections::HashMap;

/// Parse a raw query string (the part after `?`) into key/value pairs.
///
/// Values are URL-decoded, `+` is treated as a space as HTML forms send it.
/// Repeated keys keep the last value.
///
/// # Example
/// ```
/// use warbler::core::query_params::parse_query_params;
///
/// let params = parse_query_params("q=bob&page=2");
/// assert_eq!(params.get("q"), Some(&"bob".to_string()));
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let query = query.trim_start_matches('?');

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some((key, encoded_value)) = param.split_once('=') {
            let plus_decoded = encoded_value.replace('+', " ");
            let decoded = urlencoding::decode(&plus_decoded)
                .map(|v| v.into_owned())
                .unwrap_or(plus_decoded);
            params.insert(key.to_string(), decoded);
        } else {
            params.insert(param.to_string(), String::new());
        }
    }

    params
}

/// Non-empty, trimmed string parameter.
pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Integer parameter, at least 1.
pub fn get_int(params: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    params
        .get(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
        .max(1)
}
